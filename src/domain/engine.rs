//! Walk-forward rebalancing engine.
//!
//! Each period `[b_i, b_{i+1}]` between consecutive month-end boundaries
//! runs the same sequence: score every ticker on data ending at `b_i`
//! (optionally blended through a regression fitted on the period before),
//! select holdings, realize each holding's return to `b_{i+1}`, then split
//! and compound AUM. Holdings are fixed before any price after `b_i` is
//! read.
//!
//! [`WalkForward`] yields one [`PeriodOutcome`] per `next()` call and owns
//! the only mutable state ([`EngineState`]); [`run_walk_forward`] drives it
//! to completion.

use crate::domain::backtest::{
    BacktestConfig, BacktestResult, HoldingReturn, PerformanceRecord, PeriodOutcome, period_label,
};
use crate::domain::blender::{self, BlendModel};
use crate::domain::error::FactorTraderError;
use crate::domain::factor::{ExcludedTicker, FactorScores, cross_section, factor_vector, period_return};
use crate::domain::price_series::{PriceSeries, build_unified_timeline};
use crate::domain::selection::select;
use crate::domain::trading_days::TradingDayIndex;
use chrono::NaiveDate;
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Month-end boundaries over the unified trading timeline of the universe.
#[derive(Debug, Clone)]
pub struct RebalanceCalendar {
    timeline: TradingDayIndex,
    boundaries: Vec<NaiveDate>,
}

impl RebalanceCalendar {
    pub fn resolve(
        universe: &[PriceSeries],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Self, FactorTraderError> {
        let timeline = TradingDayIndex::new("calendar", build_unified_timeline(universe));
        let boundaries: Vec<NaiveDate> = timeline.month_ends(start, end).collect();
        if boundaries.len() < 2 {
            return Err(FactorTraderError::InsufficientPeriods {
                found: boundaries.len(),
            });
        }
        Ok(Self {
            timeline,
            boundaries,
        })
    }

    pub fn boundaries(&self) -> &[NaiveDate] {
        &self.boundaries
    }

    pub fn period_count(&self) -> usize {
        self.boundaries.len() - 1
    }

    pub fn timeline(&self) -> &TradingDayIndex {
        &self.timeline
    }

    /// The boundary a blend trains from when predicting period `period`.
    pub fn training_boundary(&self, period: usize) -> Option<NaiveDate> {
        match period {
            0 => self.timeline.previous_month_end(self.boundaries[0]),
            i => self.boundaries.get(i - 1).copied(),
        }
    }
}

/// `aum / n` into each of `n` holdings, compounded by each return.
pub fn apply_period_returns(aum: f64, returns: &[f64]) -> f64 {
    debug_assert!(!returns.is_empty());
    let allocation = aum / returns.len() as f64;
    returns.iter().map(|r| allocation * (1.0 + r)).sum()
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineState {
    pub aum: f64,
    /// Index of the next period to run.
    pub period: usize,
    pub finished: bool,
}

/// Scores, exclusions and optional fit produced for one boundary.
struct ScoredBoundary {
    scores: FactorScores,
    excluded: Vec<ExcludedTicker>,
    fit: Option<BlendModel>,
}

pub struct WalkForward<'a> {
    universe: &'a [PriceSeries],
    by_code: HashMap<&'a str, &'a PriceSeries>,
    config: &'a BacktestConfig,
    calendar: RebalanceCalendar,
    state: EngineState,
}

impl<'a> WalkForward<'a> {
    pub fn new(
        universe: &'a [PriceSeries],
        config: &'a BacktestConfig,
    ) -> Result<Self, FactorTraderError> {
        config.validate()?;
        if universe.is_empty() {
            return Err(FactorTraderError::ConfigInvalid {
                section: "backtest".into(),
                key: "codes".into(),
                reason: "no price series loaded".into(),
            });
        }
        let calendar = RebalanceCalendar::resolve(universe, config.start_date, config.end_date)?;
        info!(
            strategy = %config.strategy,
            selection = %config.selection,
            tickers = universe.len(),
            periods = calendar.period_count(),
            "walk-forward initialized"
        );
        Ok(Self {
            universe,
            by_code: universe.iter().map(|s| (s.code.as_str(), s)).collect(),
            config,
            calendar,
            state: EngineState {
                aum: config.initial_aum,
                period: 0,
                finished: false,
            },
        })
    }

    pub fn calendar(&self) -> &RebalanceCalendar {
        &self.calendar
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    /// First and last trading day of `[start_date, end_date]`.
    pub fn trading_span(&self) -> (NaiveDate, NaiveDate) {
        let timeline = self.calendar.timeline();
        let boundaries = self.calendar.boundaries();
        let first = timeline
            .first_on_or_after(self.config.start_date)
            .unwrap_or(boundaries[0]);
        let last = timeline
            .last_on_or_before(self.config.end_date)
            .unwrap_or(boundaries[boundaries.len() - 1]);
        (first, last)
    }

    fn compute_scores(
        &self,
        period: usize,
        boundary: NaiveDate,
        label: &str,
    ) -> Result<ScoredBoundary, FactorTraderError> {
        let section = cross_section(&self.config.strategy, self.universe, boundary)?;
        if section.vectors.is_empty() {
            return Err(FactorTraderError::EmptyUniverse {
                period: label.to_string(),
            });
        }

        if !self.config.strategy.is_blended() {
            return Ok(ScoredBoundary {
                scores: section.first_factor(),
                excluded: section.excluded,
                fit: None,
            });
        }

        let prior = self.calendar.training_boundary(period).ok_or_else(|| {
            FactorTraderError::DegenerateFit {
                reason: format!("no rebalance date before {boundary} to train on"),
            }
        })?;
        let model = self.fit_blend(prior, boundary)?;
        debug!(
            period = label,
            intercept = model.intercept,
            coefficients = ?model.coefficients,
            observations = model.observations,
            "blend refit"
        );
        let scores = section
            .vectors
            .iter()
            .map(|(code, v)| (code.clone(), model.predict_one(v)))
            .collect();
        Ok(ScoredBoundary {
            scores,
            excluded: section.excluded,
            fit: Some(model),
        })
    }

    /// Fits factor vectors observed at `prior` against returns realized over
    /// `[prior, boundary]`.
    fn fit_blend(&self, prior: NaiveDate, boundary: NaiveDate) -> Result<BlendModel, FactorTraderError> {
        let mut features = Vec::with_capacity(self.universe.len());
        let mut labels = Vec::with_capacity(self.universe.len());
        for series in self.universe {
            let observation = factor_vector(&self.config.strategy, series, prior).and_then(|x| {
                period_return(series, prior, boundary, self.config.include_dividends).map(|y| (x, y))
            });
            match observation {
                Ok((x, y)) => {
                    features.push(x);
                    labels.push(y);
                }
                Err(e) if e.is_ticker_gap() => {
                    debug!(code = %series.code, error = %e, "dropped from training set");
                }
                Err(e) => return Err(e),
            }
        }
        blender::fit(&features, &labels)
    }

    fn realize(
        &self,
        holdings: &[String],
        allocation: f64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> (Vec<HoldingReturn>, Vec<String>) {
        let mut returns = Vec::with_capacity(holdings.len());
        let mut unrealized = Vec::new();
        for code in holdings {
            let realized = self
                .by_code
                .get(code.as_str())
                .ok_or_else(|| FactorTraderError::DataSource {
                    reason: format!("{code} is not in the loaded universe"),
                })
                .and_then(|series| period_return(series, start, end, self.config.include_dividends));
            let period_return = match realized {
                Ok(r) => r,
                Err(e) => {
                    warn!(code = %code, error = %e, "holding not realized, held flat");
                    unrealized.push(code.clone());
                    0.0
                }
            };
            returns.push(HoldingReturn {
                code: code.clone(),
                allocation,
                period_return,
            });
        }
        (returns, unrealized)
    }

    fn step(&mut self) -> Result<PeriodOutcome, FactorTraderError> {
        let period = self.state.period;
        let start = self.calendar.boundaries[period];
        let end = self.calendar.boundaries[period + 1];
        let label = period_label(start, end);

        let scored = self.compute_scores(period, start, &label)?;
        for ex in &scored.excluded {
            warn!(period = %label, code = %ex.code, reason = %ex.reason, "excluded from ranking");
        }

        let holdings = select(&scored.scores, self.config.top_pct, self.config.selection)?;

        let aum_before = self.state.aum;
        let allocation = aum_before / holdings.len() as f64;
        let (returns, unrealized) = self.realize(&holdings, allocation, start, end);

        let period_returns: Vec<f64> = returns.iter().map(|h| h.period_return).collect();
        let aum_after = apply_period_returns(aum_before, &period_returns);
        debug!(period = %label, holdings = ?holdings, aum_before, aum_after, "period complete");

        self.state.aum = aum_after;
        self.state.period += 1;

        Ok(PeriodOutcome {
            label,
            start,
            end,
            holdings,
            returns,
            aum_before,
            aum_after,
            excluded: scored.excluded,
            unrealized,
            fit: scored.fit,
        })
    }
}

impl Iterator for WalkForward<'_> {
    type Item = Result<PeriodOutcome, FactorTraderError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.state.finished || self.state.period >= self.calendar.period_count() {
            self.state.finished = true;
            return None;
        }
        let outcome = self.step();
        if outcome.is_err() {
            self.state.finished = true;
        }
        Some(outcome)
    }
}

pub fn run_walk_forward(
    universe: &[PriceSeries],
    config: &BacktestConfig,
) -> Result<BacktestResult, FactorTraderError> {
    let engine = WalkForward::new(universe, config)?;
    let (first_trading_day, last_trading_day) = engine.trading_span();

    let mut record = PerformanceRecord::new();
    let mut periods = Vec::with_capacity(engine.calendar().period_count());
    for outcome in engine {
        let outcome = outcome?;
        record.push(outcome.label.clone(), outcome.aum_after);
        periods.push(outcome);
    }

    info!(
        periods = periods.len(),
        final_aum = record.last_aum().unwrap_or(config.initial_aum),
        "walk-forward complete"
    );

    Ok(BacktestResult {
        initial_aum: config.initial_aum,
        record,
        periods,
        first_trading_day,
        last_trading_day,
    })
}
