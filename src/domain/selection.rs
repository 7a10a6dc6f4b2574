//! Cross-sectional ranking and top/bottom-k selection.

use crate::domain::error::FactorTraderError;
use crate::domain::factor::FactorScores;
use crate::domain::strategy::SelectionDirection;
use std::cmp::Ordering;

/// `ceil(universe × top_pct / 100)`, at least 1 and never more than
/// `universe` for any `top_pct` in `(0, 100]`.
pub fn selection_count(universe: usize, top_pct: f64) -> usize {
    if universe == 0 || !(top_pct > 0.0) {
        return 0;
    }
    let raw = universe as f64 * top_pct / 100.0;
    if !raw.is_finite() {
        return universe;
    }
    (raw.ceil() as usize).clamp(1, universe)
}

/// Picks the `k` most extreme tickers in `direction`, ties broken by symbol
/// ascending. Non-finite scores are not ranked.
pub fn select(
    scores: &FactorScores,
    top_pct: f64,
    direction: SelectionDirection,
) -> Result<Vec<String>, FactorTraderError> {
    if !(top_pct > 0.0 && top_pct <= 100.0) {
        return Err(FactorTraderError::ConfigInvalid {
            section: "backtest".into(),
            key: "top_pct".into(),
            reason: format!("top_pct must be in (0, 100], got {top_pct}"),
        });
    }

    let mut ranked: Vec<(&String, f64)> = scores
        .iter()
        .filter(|(_, s)| s.is_finite())
        .map(|(code, &s)| (code, s))
        .collect();

    let k = selection_count(ranked.len(), top_pct);
    if k == 0 {
        return Err(FactorTraderError::EmptySelection {
            universe: ranked.len(),
            top_pct,
        });
    }

    ranked.sort_by(|a, b| {
        let by_score = match direction {
            SelectionDirection::Top => b.1.total_cmp(&a.1),
            SelectionDirection::Bottom => a.1.total_cmp(&b.1),
        };
        match by_score {
            Ordering::Equal => a.0.cmp(b.0),
            other => other,
        }
    });

    Ok(ranked.into_iter().take(k).map(|(c, _)| c.clone()).collect())
}
