//! Factor-based optimization. Asset covariance is rebuilt from a small
//! factor structure (`Sigma = B F B' + D`), the unconstrained optimum is
//! solved in factor space, and the implied asset weights are projected
//! back onto the box-simplex.

use serde::{Deserialize, Serialize};

use bl_types::{validation_error, BallastResult};

use crate::solver::{dot, project_box_simplex, solve_linear};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactorModel {
    pub factors: Vec<String>,
    /// Per-asset loadings, one row of `factors.len()` entries per asset.
    pub loadings: Vec<Vec<f64>>,
    /// Row-major factor covariance, `factors.len()` squared.
    pub factor_covariance: Vec<f64>,
    /// Idiosyncratic (diagonal) variance per asset.
    pub idiosyncratic_variance: Vec<f64>,
}

impl FactorModel {
    pub fn asset_count(&self) -> usize {
        self.loadings.len()
    }

    pub fn factor_count(&self) -> usize {
        self.factors.len()
    }

    pub fn validate(&self, n_assets: usize) -> BallastResult<()> {
        let k = self.factor_count();
        if k == 0 {
            return Err(validation_error!("factor model has no factors"));
        }
        if self.loadings.len() != n_assets || self.idiosyncratic_variance.len() != n_assets {
            return Err(validation_error!(
                "factor model covers {} assets, expected {}",
                self.loadings.len(),
                n_assets
            ));
        }
        if self.loadings.iter().any(|row| row.len() != k) {
            return Err(validation_error!(
                "every loading row must have {} entries",
                k
            ));
        }
        if self.factor_covariance.len() != k * k {
            return Err(validation_error!(
                "factor covariance must be {k}x{k}, got {} entries",
                self.factor_covariance.len()
            ));
        }
        Ok(())
    }
}

/// Reconstruct the dense asset covariance `B F B' + D`.
pub fn covariance_from_factors(model: &FactorModel) -> Vec<f64> {
    let n = model.asset_count();
    let k = model.factor_count();
    let mut cov = vec![0.0; n * n];
    // fb[i] = F * b_i, reused across the row loop.
    let fb: Vec<Vec<f64>> = model
        .loadings
        .iter()
        .map(|b| {
            (0..k)
                .map(|r| dot(&model.factor_covariance[r * k..(r + 1) * k], b))
                .collect()
        })
        .collect();
    for i in 0..n {
        for j in 0..n {
            cov[i * n + j] = dot(&model.loadings[i], &fb[j]);
        }
        cov[i * n + i] += model.idiosyncratic_variance[i];
    }
    cov
}

/// Solve mean-variance in factor space and map back to asset weights.
///
/// Factor expected returns come from regressing asset returns on the
/// loadings, the unconstrained factor optimum is `F^-1 mu_f / 2 lambda`,
/// and the implied asset weights `B y` are projected onto the box-simplex.
pub fn factor_weights(
    model: &FactorModel,
    mu: &[f64],
    risk_aversion: f64,
    lo: &[f64],
    hi: &[f64],
) -> BallastResult<Vec<f64>> {
    let n = mu.len();
    model.validate(n)?;
    let k = model.factor_count();

    // (B'B) mu_f = B' mu.
    let mut btb = vec![0.0; k * k];
    let mut bt_mu = vec![0.0; k];
    for (row, &ri) in model.loadings.iter().zip(mu) {
        for a in 0..k {
            bt_mu[a] += row[a] * ri;
            for b in 0..k {
                btb[a * k + b] += row[a] * row[b];
            }
        }
    }
    let mu_f = solve_linear(btb, bt_mu)
        .ok_or_else(|| validation_error!("factor loadings are collinear"))?;

    let scaled: Vec<f64> = mu_f.iter().map(|x| x / (2.0 * risk_aversion)).collect();
    let y = solve_linear(model.factor_covariance.clone(), scaled)
        .ok_or_else(|| validation_error!("factor covariance is singular"))?;

    let implied: Vec<f64> = model.loadings.iter().map(|row| dot(row, &y)).collect();
    Ok(project_box_simplex(&implied, lo, hi))
}
