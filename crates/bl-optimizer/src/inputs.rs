//! Solver inputs, decoupled from profile storage.
//!
//! [`OptimizerInputs`] carries everything a solver needs as plain aligned
//! vectors: asset order is fixed once at construction and the covariance
//! matrix is re-indexed to match, so the numeric code never does id lookups.

use serde::{Deserialize, Serialize};

use bl_types::{
    validation_error, AssetId, BallastError, BallastResult, CovarianceMatrix, RebalancingProfile,
};

use crate::factor::FactorModel;

/// An absolute return view on a single asset, used by Black-Litterman.
/// Confidence is in (0, 1]; higher confidence shrinks the view's
/// uncertainty and pulls the posterior harder towards it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketView {
    pub asset_id: AssetId,
    pub expected_return: f64,
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizerInputs {
    pub assets: Vec<AssetId>,
    /// Annualized expected returns, aligned with `assets`.
    pub expected_returns: Vec<f64>,
    /// Row-major covariance aligned with `assets`.
    pub covariance: Vec<f64>,
    /// Per-asset weight bounds as fractions of the portfolio.
    pub lower_bounds: Vec<f64>,
    pub upper_bounds: Vec<f64>,
    /// Current weight fractions; starting point and turnover reference.
    pub current_weights: Vec<f64>,
    pub risk_aversion: f64,
    pub risk_free_rate: f64,
    /// Risk-parity targets; `None` means equal contribution per asset.
    pub target_risk_contributions: Option<Vec<f64>>,
    pub views: Vec<MarketView>,
    pub factor_model: Option<FactorModel>,
}

impl OptimizerInputs {
    pub fn new(
        assets: Vec<AssetId>,
        expected_returns: Vec<f64>,
        covariance: Vec<f64>,
        lower_bounds: Vec<f64>,
        upper_bounds: Vec<f64>,
        current_weights: Vec<f64>,
    ) -> Self {
        Self {
            assets,
            expected_returns,
            covariance,
            lower_bounds,
            upper_bounds,
            current_weights,
            risk_aversion: 3.0,
            risk_free_rate: 0.02,
            target_risk_contributions: None,
            views: Vec::new(),
            factor_model: None,
        }
    }

    /// Build inputs from a profile, re-indexing `covariance` to the
    /// profile's allocation order. Missing covariance entries become zero.
    pub fn from_profile(profile: &RebalancingProfile, covariance: &CovarianceMatrix) -> Self {
        let n = profile.allocations.len();
        let assets: Vec<AssetId> = profile.asset_ids();
        let index: Vec<Option<usize>> = assets
            .iter()
            .map(|a| covariance.assets.iter().position(|c| c == a))
            .collect();
        let mut aligned = vec![0.0; n * n];
        for i in 0..n {
            for j in 0..n {
                if let (Some(ci), Some(cj)) = (index[i], index[j]) {
                    aligned[i * n + j] = covariance.get(ci, cj);
                }
            }
        }
        let expected_returns = profile
            .allocations
            .iter()
            .map(|a| a.expected_return)
            .collect();
        let lower_bounds = profile
            .allocations
            .iter()
            .map(|a| a.min_pct / 100.0)
            .collect();
        let upper_bounds = profile
            .allocations
            .iter()
            .map(|a| a.max_pct / 100.0)
            .collect();
        let current_weights = profile
            .allocations
            .iter()
            .map(|a| a.current_pct / 100.0)
            .collect();
        Self::new(
            assets,
            expected_returns,
            aligned,
            lower_bounds,
            upper_bounds,
            current_weights,
        )
    }

    pub fn with_risk_aversion(mut self, risk_aversion: f64) -> Self {
        self.risk_aversion = risk_aversion;
        self
    }

    pub fn with_views(mut self, views: Vec<MarketView>) -> Self {
        self.views = views;
        self
    }

    pub fn with_factor_model(mut self, model: FactorModel) -> Self {
        self.factor_model = Some(model);
        self
    }

    pub fn with_target_contributions(mut self, targets: Vec<f64>) -> Self {
        self.target_risk_contributions = Some(targets);
        self
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    /// Shape and feasibility checks. Bounds that cannot reach a fully
    /// invested portfolio are reported as infeasible, not silently clamped.
    pub fn validate(&self) -> BallastResult<()> {
        let n = self.assets.len();
        if n == 0 {
            return Err(validation_error!("optimizer inputs contain no assets"));
        }
        if self.expected_returns.len() != n
            || self.lower_bounds.len() != n
            || self.upper_bounds.len() != n
            || self.current_weights.len() != n
        {
            return Err(validation_error!(
                "input vectors must all have length {}",
                n
            ));
        }
        if self.covariance.len() != n * n {
            return Err(validation_error!(
                "covariance must be {n}x{n}, got {} entries",
                self.covariance.len()
            ));
        }
        for i in 0..n {
            if self.lower_bounds[i] > self.upper_bounds[i] {
                return Err(BallastError::ConstraintInfeasible {
                    reason: format!(
                        "asset '{}' has lower bound {:.4} above upper bound {:.4}",
                        self.assets[i], self.lower_bounds[i], self.upper_bounds[i]
                    ),
                });
            }
        }
        let lo_sum: f64 = self.lower_bounds.iter().sum();
        let hi_sum: f64 = self.upper_bounds.iter().sum();
        if lo_sum > 1.0 + 1e-9 {
            return Err(BallastError::ConstraintInfeasible {
                reason: format!("lower bounds sum to {lo_sum:.4}, above full investment"),
            });
        }
        if hi_sum < 1.0 - 1e-9 {
            return Err(BallastError::ConstraintInfeasible {
                reason: format!("upper bounds sum to {hi_sum:.4}, below full investment"),
            });
        }
        if let Some(targets) = &self.target_risk_contributions {
            if targets.len() != n {
                return Err(validation_error!(
                    "risk contribution targets must have length {}",
                    n
                ));
            }
        }
        for view in &self.views {
            if !self.assets.contains(&view.asset_id) {
                return Err(validation_error!(
                    "view references unknown asset '{}'",
                    view.asset_id
                ));
            }
            if view.confidence <= 0.0 || view.confidence > 1.0 {
                return Err(validation_error!(
                    "view confidence for '{}' must be in (0, 1]",
                    view.asset_id
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bl_types::AssetAllocation;
    use chrono::Utc;

    fn two_asset_inputs(lo: [f64; 2], hi: [f64; 2]) -> OptimizerInputs {
        OptimizerInputs::new(
            vec![AssetId::from("A"), AssetId::from("B")],
            vec![0.08, 0.05],
            vec![0.04, 0.0, 0.0, 0.02],
            lo.to_vec(),
            hi.to_vec(),
            vec![0.5, 0.5],
        )
    }

    #[test]
    fn valid_inputs_pass() {
        assert!(two_asset_inputs([0.0, 0.0], [1.0, 1.0]).validate().is_ok());
    }

    #[test]
    fn infeasible_lower_bounds_rejected() {
        let err = two_asset_inputs([0.6, 0.6], [1.0, 1.0])
            .validate()
            .unwrap_err();
        assert!(matches!(err, BallastError::ConstraintInfeasible { .. }));
    }

    #[test]
    fn infeasible_upper_bounds_rejected() {
        let err = two_asset_inputs([0.0, 0.0], [0.3, 0.3])
            .validate()
            .unwrap_err();
        assert!(matches!(err, BallastError::ConstraintInfeasible { .. }));
    }

    #[test]
    fn from_profile_aligns_covariance() {
        let profile = RebalancingProfile::new(
            "growth",
            bl_types::RebalancingStrategy::Threshold { threshold_pct: 5.0 },
            vec![
                AssetAllocation::new("B", 40.0),
                AssetAllocation::new("A", 60.0),
            ],
            Utc::now(),
        );
        // Covariance declared in the opposite order.
        let cov = CovarianceMatrix::new(
            vec![AssetId::from("A"), AssetId::from("B")],
            vec![0.04, 0.01, 0.01, 0.09],
        );
        let inputs = OptimizerInputs::from_profile(&profile, &cov);
        assert_eq!(inputs.assets[0], AssetId::from("B"));
        // B's variance lands at position (0, 0) after re-indexing.
        assert!((inputs.covariance[0] - 0.09).abs() < 1e-12);
        assert!((inputs.covariance[3] - 0.04).abs() < 1e-12);
    }
}
