//! Risk-parity solver: scale each weight by how far its risk
//! contribution sits from target, project back onto the box-simplex,
//! repeat. The square-root exponent damps the update enough that the
//! fixed point is stable for any positive-definite covariance.

use crate::solver::{mat_vec, project_box_simplex, quad_form};

const CONTRIBUTION_FLOOR: f64 = 1e-12;
const VOL_FLOOR: f64 = 1e-6;

/// Fractional risk contribution of each asset: `w_i (Sigma w)_i / w' Sigma w`.
/// Contributions sum to one for any fully invested `w` with positive risk.
pub fn risk_contributions(cov: &[f64], w: &[f64]) -> Vec<f64> {
    let sigma_w = mat_vec(cov, w);
    let total = quad_form(cov, w);
    if total < CONTRIBUTION_FLOOR {
        return vec![0.0; w.len()];
    }
    w.iter()
        .zip(&sigma_w)
        .map(|(wi, si)| wi * si / total)
        .collect()
}

/// Find weights whose risk contributions match `targets` (fractions
/// summing to one). Returns the weights, iterations used and whether the
/// worst contribution gap fell under `tol`.
pub fn risk_parity(
    cov: &[f64],
    targets: &[f64],
    lo: &[f64],
    hi: &[f64],
    max_iterations: usize,
    tol: f64,
) -> (Vec<f64>, usize, bool) {
    let n = targets.len();
    // Inverse-volatility start: exact already in the uncorrelated case.
    let mut w: Vec<f64> = (0..n)
        .map(|i| 1.0 / cov[i * n + i].sqrt().max(VOL_FLOOR))
        .collect();
    let sum: f64 = w.iter().sum();
    for wi in &mut w {
        *wi /= sum;
    }
    w = project_box_simplex(&w, lo, hi);

    for iter in 0..max_iterations {
        let contributions = risk_contributions(cov, &w);
        let worst_gap = contributions
            .iter()
            .zip(targets)
            .map(|(c, t)| (c - t).abs())
            .fold(0.0, f64::max);
        if worst_gap < tol {
            return (w, iter, true);
        }
        let scaled: Vec<f64> = w
            .iter()
            .zip(contributions.iter().zip(targets))
            .map(|(wi, (c, t))| wi * (t / c.max(CONTRIBUTION_FLOOR)).sqrt())
            .collect();
        let total: f64 = scaled.iter().sum();
        let normalized: Vec<f64> = scaled.iter().map(|wi| wi / total.max(1e-12)).collect();
        w = project_box_simplex(&normalized, lo, hi);
    }
    (w, max_iterations, false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uncorrelated_equal_vol_assets_split_evenly() {
        // Two uncorrelated assets with identical volatility: equal risk
        // contribution means a 50/50 split.
        let cov = [0.04, 0.0, 0.0, 0.04];
        let (w, _, converged) =
            risk_parity(&cov, &[0.5, 0.5], &[0.0, 0.0], &[1.0, 1.0], 1_000, 1e-8);
        assert!(converged);
        assert!((w[0] - 0.5).abs() < 1e-6);
        assert!((w[1] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn lower_vol_asset_gets_more_weight() {
        // 10% vs 20% vol, uncorrelated: parity weights scale with 1/vol.
        let cov = [0.01, 0.0, 0.0, 0.04];
        let (w, _, converged) =
            risk_parity(&cov, &[0.5, 0.5], &[0.0, 0.0], &[1.0, 1.0], 1_000, 1e-8);
        assert!(converged);
        assert!(w[0] > w[1]);
        assert!((w[0] / w[1] - 2.0).abs() < 1e-3);
    }

    #[test]
    fn custom_targets_shift_contributions() {
        let cov = [0.04, 0.0, 0.0, 0.04];
        let (w, _, converged) =
            risk_parity(&cov, &[0.75, 0.25], &[0.0, 0.0], &[1.0, 1.0], 2_000, 1e-8);
        assert!(converged);
        let contributions = risk_contributions(&cov, &w);
        assert!((contributions[0] - 0.75).abs() < 1e-6);
    }

    #[test]
    fn contributions_sum_to_one() {
        let cov = [0.04, 0.01, 0.01, 0.09];
        let contributions = risk_contributions(&cov, &[0.6, 0.4]);
        let sum: f64 = contributions.iter().sum();
        assert!((sum - 1.0).abs() < 1e-9);
    }
}
