//! OLS blending of several factor scores into one predicted return.
//!
//! The model is `y = b0 + b1 * x1 + ... + bp * xp`, solved from the normal
//! equations. A fit needs at least `p + 1` observations and a full-rank
//! design matrix; anything less is a [`FactorTraderError::DegenerateFit`].

use crate::domain::error::FactorTraderError;
use nalgebra::{DMatrix, DVector};

/// Relative singular-value cutoff for the rank check.
const RANK_TOLERANCE: f64 = 1e-10;

#[derive(Debug, Clone, PartialEq)]
pub struct BlendModel {
    pub intercept: f64,
    pub coefficients: Vec<f64>,
    /// t-statistics for `[intercept, coefficients..]`. NaN when the fit has
    /// no residual degrees of freedom.
    pub t_values: Vec<f64>,
    pub observations: usize,
}

impl BlendModel {
    pub fn feature_count(&self) -> usize {
        self.coefficients.len()
    }

    pub fn predict_one(&self, features: &[f64]) -> f64 {
        self.intercept
            + self
                .coefficients
                .iter()
                .zip(features)
                .map(|(b, x)| b * x)
                .sum::<f64>()
    }
}

fn degenerate(reason: impl Into<String>) -> FactorTraderError {
    FactorTraderError::DegenerateFit {
        reason: reason.into(),
    }
}

pub fn fit(features: &[Vec<f64>], labels: &[f64]) -> Result<BlendModel, FactorTraderError> {
    let n = features.len();
    if n != labels.len() {
        return Err(degenerate(format!(
            "{n} feature rows but {} labels",
            labels.len()
        )));
    }
    let p = features.first().map(Vec::len).unwrap_or(0);
    if p == 0 {
        return Err(degenerate("no features"));
    }
    if features.iter().any(|row| row.len() != p) {
        return Err(degenerate("feature rows differ in length"));
    }
    if n < p + 1 {
        return Err(degenerate(format!(
            "{n} observations for {p} features, need at least {}",
            p + 1
        )));
    }
    if features.iter().flatten().chain(labels).any(|v| !v.is_finite()) {
        return Err(degenerate("non-finite training value"));
    }

    let x = DMatrix::from_fn(n, p + 1, |i, j| if j == 0 { 1.0 } else { features[i][j - 1] });
    let y = DVector::from_column_slice(labels);

    let singular = x.clone().svd(false, false).singular_values;
    let largest = singular.max();
    let rank = singular
        .iter()
        .filter(|&&s| s > largest * RANK_TOLERANCE)
        .count();
    if largest <= 0.0 || rank < p + 1 {
        return Err(degenerate(format!(
            "design matrix has rank {rank}, need {}",
            p + 1
        )));
    }

    let xtx = x.transpose() * &x;
    let xty = x.transpose() * &y;
    let xtx_inv = xtx
        .try_inverse()
        .ok_or_else(|| degenerate("normal equations are singular"))?;
    let beta = &xtx_inv * xty;

    let residuals = &y - &x * &beta;
    let rss = residuals.norm_squared();
    let dof = n - (p + 1);
    let sigma2 = if dof > 0 { rss / dof as f64 } else { f64::NAN };
    let t_values = (0..=p)
        .map(|j| beta[j] / (sigma2 * xtx_inv[(j, j)]).sqrt())
        .collect();

    Ok(BlendModel {
        intercept: beta[0],
        coefficients: beta.iter().skip(1).copied().collect(),
        t_values,
        observations: n,
    })
}

pub fn predict(model: &BlendModel, features: &[Vec<f64>]) -> Vec<f64> {
    features.iter().map(|row| model.predict_one(row)).collect()
}
