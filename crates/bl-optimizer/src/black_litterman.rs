//! Black-Litterman posterior expected returns.
//!
//! Equilibrium returns are implied from the market (current) weights,
//! then blended with the caller's single-asset views. View uncertainty
//! is the diagonal `Omega` with entries `tau * (P Sigma P')_jj / confidence`,
//! so a confidence of one trusts the view as much as the prior and lower
//! confidence widens it. The posterior feeds the mean-variance solver.

use bl_types::{validation_error, BallastResult};

use crate::inputs::MarketView;
use crate::solver::{mat_vec, solve_linear};

const DEFAULT_TAU: f64 = 0.05;

/// Posterior expected returns given current market weights and views.
/// With no views this is just the equilibrium prior `lambda * Sigma * w`.
pub fn posterior_returns(
    cov: &[f64],
    market_weights: &[f64],
    risk_aversion: f64,
    views: &[MarketView],
    asset_index: impl Fn(&MarketView) -> Option<usize>,
) -> BallastResult<Vec<f64>> {
    let n = market_weights.len();
    let pi: Vec<f64> = mat_vec(cov, market_weights)
        .into_iter()
        .map(|x| risk_aversion * x)
        .collect();
    if views.is_empty() {
        return Ok(pi);
    }

    let mut rows = Vec::with_capacity(views.len());
    for view in views {
        let idx = asset_index(view).ok_or_else(|| {
            validation_error!("view references unknown asset '{}'", view.asset_id)
        })?;
        rows.push((idx, view));
    }
    let k = rows.len();

    // A = P tau Sigma P' + Omega, both k x k. With unit-vector view rows
    // P tau Sigma P' is just tau * Sigma restricted to the viewed assets.
    let mut a = vec![0.0; k * k];
    for (r, (i, _)) in rows.iter().enumerate() {
        for (c, (j, _)) in rows.iter().enumerate() {
            a[r * k + c] = DEFAULT_TAU * cov[i * n + j];
        }
    }
    for (r, (i, view)) in rows.iter().enumerate() {
        a[r * k + r] += DEFAULT_TAU * cov[i * n + i] / view.confidence;
    }

    let rhs: Vec<f64> = rows
        .iter()
        .map(|(i, view)| view.expected_return - pi[*i])
        .collect();
    let adjustment = solve_linear(a, rhs).ok_or_else(|| {
        validation_error!("view covariance is singular; views may be duplicated")
    })?;

    // mu = pi + tau Sigma P' x; column i of P' selects covariance column.
    let mut mu = pi;
    for (r, (j, _)) in rows.iter().enumerate() {
        for i in 0..n {
            mu[i] += DEFAULT_TAU * cov[i * n + j] * adjustment[r];
        }
    }
    Ok(mu)
}
