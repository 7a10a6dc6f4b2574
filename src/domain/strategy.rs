//! Factor strategy kinds and selection direction.

use std::fmt;

pub const DEFAULT_MOMENTUM_GAP: usize = 20;
pub const DEFAULT_REVERSAL_GAP: usize = 0;

/// Which end of the ranking becomes the portfolio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionDirection {
    /// Highest scores first.
    Top,
    /// Lowest scores first.
    Bottom,
}

impl SelectionDirection {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "top" => Some(SelectionDirection::Top),
            "bottom" => Some(SelectionDirection::Bottom),
            _ => None,
        }
    }
}

impl fmt::Display for SelectionDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectionDirection::Top => write!(f, "top"),
            SelectionDirection::Bottom => write!(f, "bottom"),
        }
    }
}

/// A ranking factor, or an OLS blend of several.
///
/// `lookback` and `gap` are counted in trading days. The score window for a
/// boundary `t` is `[t - gap - lookback, t - gap]`.
#[derive(Debug, Clone, PartialEq)]
pub enum StrategyKind {
    Momentum { lookback: usize, gap: usize },
    Reversal { lookback: usize, gap: usize },
    Blended(Vec<StrategyKind>),
}

impl StrategyKind {
    pub fn momentum(lookback: usize) -> Self {
        StrategyKind::Momentum {
            lookback,
            gap: DEFAULT_MOMENTUM_GAP,
        }
    }

    pub fn reversal(lookback: usize) -> Self {
        StrategyKind::Reversal {
            lookback,
            gap: DEFAULT_REVERSAL_GAP,
        }
    }

    /// Parses the single-letter strategy codes `M` and `R`.
    pub fn from_code(code: &str, lookback: usize, gap: Option<usize>) -> Option<Self> {
        match code.trim().to_uppercase().as_str() {
            "M" => Some(StrategyKind::Momentum {
                lookback,
                gap: gap.unwrap_or(DEFAULT_MOMENTUM_GAP),
            }),
            "R" => Some(StrategyKind::Reversal {
                lookback,
                gap: gap.unwrap_or(DEFAULT_REVERSAL_GAP),
            }),
            _ => None,
        }
    }

    pub fn is_blended(&self) -> bool {
        matches!(self, StrategyKind::Blended(_))
    }

    /// Momentum picks winners, reversal picks losers, a blend ranks by
    /// predicted return.
    pub fn default_direction(&self) -> SelectionDirection {
        match self {
            StrategyKind::Reversal { .. } => SelectionDirection::Bottom,
            StrategyKind::Momentum { .. } | StrategyKind::Blended(_) => SelectionDirection::Top,
        }
    }

    /// Single factors in evaluation order, with blends flattened.
    pub fn leaves(&self) -> Vec<&StrategyKind> {
        match self {
            StrategyKind::Blended(inner) => inner.iter().flat_map(|k| k.leaves()).collect(),
            leaf => vec![leaf],
        }
    }

    pub fn feature_count(&self) -> usize {
        self.leaves().len()
    }

    /// Longest `lookback + gap` over all factors, saturating.
    pub fn max_window(&self) -> usize {
        self.leaves()
            .iter()
            .map(|k| match k {
                StrategyKind::Momentum { lookback, gap } | StrategyKind::Reversal { lookback, gap } => {
                    lookback.saturating_add(*gap)
                }
                StrategyKind::Blended(_) => 0,
            })
            .max()
            .unwrap_or(0)
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrategyKind::Momentum { lookback, gap } => {
                write!(f, "momentum({lookback}d, gap {gap})")
            }
            StrategyKind::Reversal { lookback, gap } => {
                write!(f, "reversal({lookback}d, gap {gap})")
            }
            StrategyKind::Blended(inner) => {
                let parts: Vec<String> = inner.iter().map(|k| k.to_string()).collect();
                write!(f, "blend[{}]", parts.join(" + "))
            }
        }
    }
}
