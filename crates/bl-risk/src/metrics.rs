//! Risk metrics computation.
//!
//! [`RiskCalculator`] takes the profile's weights, a covariance matrix, and
//! the performance history, and produces a [`RiskAssessment`] capturing the
//! current risk posture.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use bl_types::{AssetAllocation, AssetId, CovarianceMatrix, PerformanceSeries};

/// Trading days per year, used for de-annualizing volatility.
const TRADING_DAYS: f64 = 252.0;
/// 95% one-sided normal quantile and its density, for parametric VaR / ES.
const Z_95: f64 = 1.6449;
const PHI_Z_95: f64 = 0.1031;

/// Per-asset share of total portfolio variance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskContribution {
    pub asset_id: AssetId,
    /// Weight as 0–1 fraction.
    pub weight: f64,
    /// Marginal contribution `(Σw)ᵢ`.
    pub marginal: f64,
    /// Fraction of total portfolio variance attributable to this asset.
    pub contribution: f64,
}

/// A point-in-time portfolio risk assessment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,

    /// Annualized portfolio volatility from the weighted covariance.
    pub volatility: f64,
    /// Drawdown from the historical peak (0–1 fraction).
    pub current_drawdown: f64,
    pub max_drawdown: f64,
    /// Largest single-asset weight, percentage points.
    pub max_weight_pct: f64,
    /// Herfindahl–Hirschman index over weight fractions (1/n … 1).
    pub hhi: f64,
    pub risk_contributions: Vec<RiskContribution>,
    /// 1-day 95% parametric VaR as a positive fraction of portfolio value.
    pub var_95: f64,
    /// 1-day 95% Expected Shortfall (parametric).
    pub es_95: f64,
    /// Historical VaR / ES when enough return history exists.
    pub var_95_historical: Option<f64>,
    pub es_95_historical: Option<f64>,
}

/// Stateless calculator for risk metrics.
pub struct RiskCalculator;

impl RiskCalculator {
    /// Compute a full assessment from current allocations, a covariance
    /// matrix aligned with them, and the performance history.
    pub fn assess(
        allocations: &[AssetAllocation],
        covariance: &CovarianceMatrix,
        history: &PerformanceSeries,
        now: DateTime<Utc>,
    ) -> RiskAssessment {
        let weights: Vec<f64> = allocations.iter().map(|a| a.current_pct / 100.0).collect();
        let volatility = Self::portfolio_volatility(&weights, covariance);
        let contributions = Self::risk_contributions(allocations, &weights, covariance);

        let (current_drawdown, max_drawdown) = Self::drawdowns(&history.values());
        let (max_weight_pct, hhi) = Self::concentration(allocations);

        let daily_vol = volatility / TRADING_DAYS.sqrt();
        let var_95 = (Z_95 * daily_vol).max(0.0);
        let es_95 = (daily_vol * PHI_Z_95 / 0.05).max(0.0);

        let returns = history.returns();
        let (var_95_historical, es_95_historical) = Self::historical_var_es(&returns);

        RiskAssessment {
            id: Uuid::new_v4(),
            timestamp: now,
            volatility,
            current_drawdown,
            max_drawdown,
            max_weight_pct,
            hhi,
            risk_contributions: contributions,
            var_95,
            es_95,
            var_95_historical,
            es_95_historical,
        }
    }

    /// Annualized volatility `√(wᵀΣw)` of a weight vector.
    pub fn portfolio_volatility(weights: &[f64], covariance: &CovarianceMatrix) -> f64 {
        covariance.quadratic_form(weights).max(0.0).sqrt()
    }

    /// Per-asset risk contributions `wᵢ(Σw)ᵢ / wᵀΣw`, normalized to sum to 1
    /// when total variance is positive.
    pub fn risk_contributions(
        allocations: &[AssetAllocation],
        weights: &[f64],
        covariance: &CovarianceMatrix,
    ) -> Vec<RiskContribution> {
        let marginal = covariance.mul_vec(weights);
        let total_var: f64 = marginal.iter().zip(weights).map(|(m, w)| m * w).sum();

        allocations
            .iter()
            .enumerate()
            .map(|(i, alloc)| {
                let contribution = if total_var > 0.0 {
                    weights[i] * marginal[i] / total_var
                } else {
                    0.0
                };
                RiskContribution {
                    asset_id: alloc.asset_id.clone(),
                    weight: weights[i],
                    marginal: marginal[i],
                    contribution,
                }
            })
            .collect()
    }

    /// (current drawdown from peak, max drawdown) over a value series.
    pub fn drawdowns(values: &[f64]) -> (f64, f64) {
        let mut peak = f64::MIN;
        let mut max_dd = 0.0;
        let mut current_dd = 0.0;
        for &value in values {
            if value > peak {
                peak = value;
            }
            if peak > 0.0 {
                current_dd = (peak - value) / peak;
                if current_dd > max_dd {
                    max_dd = current_dd;
                }
            }
        }
        if values.is_empty() {
            (0.0, 0.0)
        } else {
            (current_dd.max(0.0), max_dd)
        }
    }

    /// (max single weight in percentage points, HHI over weight fractions).
    pub fn concentration(allocations: &[AssetAllocation]) -> (f64, f64) {
        let max_weight = allocations
            .iter()
            .map(|a| a.current_pct)
            .fold(0.0, f64::max);
        let hhi = allocations
            .iter()
            .map(|a| {
                let w = a.current_pct / 100.0;
                w * w
            })
            .sum();
        (max_weight, hhi)
    }

    /// Historical VaR/ES at 95% from periodic returns. Needs at least 20
    /// observations to say anything meaningful.
    fn historical_var_es(returns: &[f64]) -> (Option<f64>, Option<f64>) {
        if returns.len() < 20 {
            return (None, None);
        }
        let mut sorted = returns.to_vec();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let idx = (sorted.len() as f64 * 0.05) as usize;
        let var = -sorted[idx];
        let tail = &sorted[..=idx];
        let es = -(tail.iter().sum::<f64>() / tail.len() as f64);
        (Some(var), Some(es))
    }
}
