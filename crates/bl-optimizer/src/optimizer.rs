//! The optimizer facade: validates inputs, dispatches to the solver for
//! the requested kind and decorates the solution with portfolio stats,
//! sensitivity and a Monte-Carlo robustness check.

use chrono::Utc;
use tracing::{debug, info};
use uuid::Uuid;

use bl_types::BallastResult;

use crate::black_litterman::posterior_returns;
use crate::factor::{covariance_from_factors, factor_weights};
use crate::inputs::OptimizerInputs;
use crate::result::{
    OptimizationKind, OptimizationResult, OptimizationStatus, SensitivityEntry,
};
use crate::risk_parity::risk_parity;
use crate::robustness::simulate;
use crate::solver::{dot, mean_variance, quad_form};

#[derive(Debug, Clone)]
pub struct OptimizerConfig {
    pub max_iterations: usize,
    pub convergence_tol: f64,
    /// Expected-return bump applied per asset for sensitivity analysis.
    pub sensitivity_bump: f64,
    pub mc_paths: usize,
    pub mc_seed: u64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            max_iterations: 5_000,
            convergence_tol: 1e-8,
            sensitivity_bump: 0.001,
            mc_paths: 1_000,
            mc_seed: 42,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Optimizer {
    pub config: OptimizerConfig,
}

impl Optimizer {
    pub fn new(config: OptimizerConfig) -> Self {
        Self { config }
    }

    pub fn optimize(
        &self,
        kind: OptimizationKind,
        inputs: &OptimizerInputs,
    ) -> BallastResult<OptimizationResult> {
        inputs.validate()?;

        // Black-Litterman replaces the raw return estimates with the
        // view-blended posterior; everything downstream is plain
        // mean-variance on that posterior.
        let mu = match kind {
            OptimizationKind::BlackLitterman => posterior_returns(
                &inputs.covariance,
                &inputs.current_weights,
                inputs.risk_aversion,
                &inputs.views,
                |view| inputs.assets.iter().position(|a| *a == view.asset_id),
            )?,
            _ => inputs.expected_returns.clone(),
        };

        let cov = match (kind, &inputs.factor_model) {
            (OptimizationKind::FactorBased, Some(model)) => covariance_from_factors(model),
            _ => inputs.covariance.clone(),
        };

        let (weights, iterations, converged) = self.solve(kind, inputs, &mu, &cov)?;

        let expected_return = dot(&mu, &weights);
        let volatility = quad_form(&cov, &weights).max(0.0).sqrt();
        let sharpe_ratio = if volatility > 1e-12 {
            (expected_return - inputs.risk_free_rate) / volatility
        } else {
            0.0
        };

        let sensitivity = self.sensitivity(kind, inputs, &mu, &cov, &weights)?;
        let robustness = simulate(
            expected_return,
            volatility,
            self.config.mc_paths,
            self.config.mc_seed,
        );

        let status = if converged {
            OptimizationStatus::Converged
        } else {
            OptimizationStatus::MaxIterations {
                limit: self.config.max_iterations,
            }
        };
        info!(
            kind = kind.name(),
            iterations,
            expected_return,
            volatility,
            converged,
            "optimization finished"
        );

        Ok(OptimizationResult {
            id: Uuid::new_v4(),
            kind,
            status,
            weights: inputs.assets.iter().cloned().zip(weights).collect(),
            expected_return,
            volatility,
            sharpe_ratio,
            iterations,
            sensitivity,
            robustness: Some(robustness),
            completed_at: Utc::now(),
        })
    }

    fn solve(
        &self,
        kind: OptimizationKind,
        inputs: &OptimizerInputs,
        mu: &[f64],
        cov: &[f64],
    ) -> BallastResult<(Vec<f64>, usize, bool)> {
        match kind {
            OptimizationKind::MeanVariance | OptimizationKind::BlackLitterman => {
                Ok(mean_variance(
                    mu,
                    cov,
                    &inputs.lower_bounds,
                    &inputs.upper_bounds,
                    inputs.risk_aversion,
                    &inputs.current_weights,
                    self.config.max_iterations,
                    self.config.convergence_tol,
                ))
            }
            OptimizationKind::RiskParity => {
                let n = inputs.len();
                let targets = match &inputs.target_risk_contributions {
                    Some(targets) => {
                        let total: f64 = targets.iter().sum();
                        targets.iter().map(|t| t / total.max(1e-12)).collect()
                    }
                    None => vec![1.0 / n as f64; n],
                };
                Ok(risk_parity(
                    cov,
                    &targets,
                    &inputs.lower_bounds,
                    &inputs.upper_bounds,
                    self.config.max_iterations,
                    self.config.convergence_tol,
                ))
            }
            OptimizationKind::FactorBased => {
                let model = inputs.factor_model.as_ref().ok_or_else(|| {
                    bl_types::validation_error!("factor-based optimization requires a factor model")
                })?;
                let weights = factor_weights(
                    model,
                    mu,
                    inputs.risk_aversion,
                    &inputs.lower_bounds,
                    &inputs.upper_bounds,
                )?;
                Ok((weights, 1, true))
            }
        }
    }

    /// Re-solve with each asset's expected return bumped and record how far
    /// the weights move. Risk parity ignores returns, so its entries are a
    /// cheap zero check rather than a real perturbation.
    fn sensitivity(
        &self,
        kind: OptimizationKind,
        inputs: &OptimizerInputs,
        mu: &[f64],
        cov: &[f64],
        base: &[f64],
    ) -> BallastResult<Vec<SensitivityEntry>> {
        let bump = self.config.sensitivity_bump;
        let mut entries = Vec::with_capacity(inputs.len());
        for i in 0..inputs.len() {
            let mut bumped = mu.to_vec();
            bumped[i] += bump;
            let (weights, _, _) = self.solve(kind, inputs, &bumped, cov)?;
            let weight_shift: f64 = base
                .iter()
                .zip(&weights)
                .map(|(a, b)| (a - b).abs())
                .sum();
            debug!(asset = %inputs.assets[i], weight_shift, "sensitivity probe");
            entries.push(SensitivityEntry {
                asset_id: inputs.assets[i].clone(),
                return_bump: bump,
                weight_shift,
            });
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factor::FactorModel;
    use crate::inputs::MarketView;
    use bl_types::{AssetId, BallastError};

    fn inputs(mu: Vec<f64>, cov: Vec<f64>) -> OptimizerInputs {
        let n = mu.len();
        let assets = (0..n)
            .map(|i| AssetId::from(format!("A{i}").as_str()))
            .collect();
        OptimizerInputs::new(
            assets,
            mu,
            cov,
            vec![0.0; n],
            vec![1.0; n],
            vec![1.0 / n as f64; n],
        )
    }

    #[test]
    fn mean_variance_weights_are_feasible() {
        let optimizer = Optimizer::default();
        let result = optimizer
            .optimize(
                OptimizationKind::MeanVariance,
                &inputs(vec![0.08, 0.05, 0.02], vec![
                    0.04, 0.01, 0.0, //
                    0.01, 0.02, 0.0, //
                    0.0, 0.0, 0.001,
                ]),
            )
            .unwrap();
        assert!(result.status.is_converged());
        let sum: f64 = result.weights.iter().map(|(_, w)| w).sum();
        assert!((sum - 1.0).abs() < 1e-6);
        assert!(result.volatility > 0.0);
        assert!(result.sensitivity.len() == 3);
        assert!(result.robustness.is_some());
    }

    #[test]
    fn risk_parity_splits_equal_uncorrelated_assets_evenly() {
        let optimizer = Optimizer::default();
        let result = optimizer
            .optimize(
                OptimizationKind::RiskParity,
                &inputs(vec![0.06, 0.06], vec![0.04, 0.0, 0.0, 0.04]),
            )
            .unwrap();
        assert!(result.status.is_converged());
        assert!((result.weight_of(&AssetId::from("A0")).unwrap() - 0.5).abs() < 1e-6);
        assert!((result.weight_of(&AssetId::from("A1")).unwrap() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn infeasible_bounds_surface_as_error() {
        let optimizer = Optimizer::default();
        let mut bad = inputs(vec![0.06, 0.06], vec![0.04, 0.0, 0.0, 0.04]);
        bad.upper_bounds = vec![0.3, 0.3];
        let err = optimizer
            .optimize(OptimizationKind::MeanVariance, &bad)
            .unwrap_err();
        assert!(matches!(err, BallastError::ConstraintInfeasible { .. }));
    }

    #[test]
    fn bullish_view_tilts_black_litterman_weights() {
        let optimizer = Optimizer::default();
        let base = inputs(vec![0.05, 0.05], vec![0.04, 0.0, 0.0, 0.04]);
        let neutral = optimizer
            .optimize(OptimizationKind::BlackLitterman, &base)
            .unwrap();

        let opinionated = base.clone().with_views(vec![MarketView {
            asset_id: AssetId::from("A0"),
            expected_return: 0.25,
            confidence: 0.9,
        }]);
        let tilted = optimizer
            .optimize(OptimizationKind::BlackLitterman, &opinionated)
            .unwrap();

        let a0 = AssetId::from("A0");
        assert!(tilted.weight_of(&a0).unwrap() > neutral.weight_of(&a0).unwrap());
    }

    #[test]
    fn factor_based_requires_a_model() {
        let optimizer = Optimizer::default();
        let err = optimizer
            .optimize(
                OptimizationKind::FactorBased,
                &inputs(vec![0.06, 0.06], vec![0.04, 0.0, 0.0, 0.04]),
            )
            .unwrap_err();
        assert!(matches!(err, BallastError::Validation { .. }));
    }

    #[test]
    fn factor_based_produces_feasible_weights() {
        let optimizer = Optimizer::default();
        let base = inputs(
            vec![0.08, 0.05],
            vec![0.04, 0.0, 0.0, 0.04],
        )
        .with_factor_model(FactorModel {
            factors: vec!["market".into(), "value".into()],
            loadings: vec![vec![1.1, 0.2], vec![0.9, -0.1]],
            factor_covariance: vec![0.03, 0.0, 0.0, 0.01],
            idiosyncratic_variance: vec![0.005, 0.004],
        });
        let result = optimizer
            .optimize(OptimizationKind::FactorBased, &base)
            .unwrap();
        let sum: f64 = result.weights.iter().map(|(_, w)| w).sum();
        assert!((sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn repeated_runs_share_robustness_stats() {
        let optimizer = Optimizer::default();
        let base = inputs(vec![0.08, 0.05], vec![0.04, 0.0, 0.0, 0.04]);
        let a = optimizer
            .optimize(OptimizationKind::MeanVariance, &base)
            .unwrap();
        let b = optimizer
            .optimize(OptimizationKind::MeanVariance, &base)
            .unwrap();
        let (ra, rb) = (a.robustness.unwrap(), b.robustness.unwrap());
        assert_eq!(ra.mean_return, rb.mean_return);
        assert_eq!(ra.probability_of_loss, rb.probability_of_loss);
    }

    #[test]
    fn sensitivity_reacts_for_mean_variance() {
        let optimizer = Optimizer::new(OptimizerConfig {
            sensitivity_bump: 0.01,
            ..OptimizerConfig::default()
        });
        let result = optimizer
            .optimize(
                OptimizationKind::MeanVariance,
                &inputs(vec![0.06, 0.06], vec![0.04, 0.0, 0.0, 0.04]),
            )
            .unwrap();
        assert!(result.sensitivity.iter().any(|s| s.weight_shift > 1e-6));
    }
}
