//! Re-derive target weights from the optimizer for strategies that demand
//! it. The cash sleeve keeps its configured target; only the risky sleeve
//! is re-optimized and scaled back into portfolio percentages.

use tracing::debug;

use bl_optimizer::{OptimizationKind, Optimizer, OptimizerInputs};
use bl_types::{
    AssetId, BallastResult, CovarianceMatrix, RebalancingProfile, RebalancingStrategy,
};

pub(crate) fn optimization_kind_for(strategy: &RebalancingStrategy) -> OptimizationKind {
    match strategy {
        RebalancingStrategy::RiskParity { .. } => OptimizationKind::RiskParity,
        _ => OptimizationKind::MeanVariance,
    }
}

/// Overwrite the profile's risky target percentages with optimized ones.
/// No-op for profiles with fewer than two risky assets.
pub(crate) fn retarget(
    profile: &mut RebalancingProfile,
    covariance: &CovarianceMatrix,
    optimizer: &Optimizer,
) -> BallastResult<()> {
    let risky: Vec<AssetId> = profile
        .allocations
        .iter()
        .filter(|a| !a.asset_id.is_cash())
        .map(|a| a.asset_id.clone())
        .collect();
    if risky.len() < 2 {
        return Ok(());
    }
    let cash_target: f64 = profile
        .allocations
        .iter()
        .filter(|a| a.asset_id.is_cash())
        .map(|a| a.target_pct)
        .sum();
    let sleeve = 100.0 - cash_target;
    if sleeve <= 0.0 {
        return Ok(());
    }

    let n = risky.len();
    let index: Vec<Option<usize>> = risky
        .iter()
        .map(|a| covariance.assets.iter().position(|c| c == a))
        .collect();
    let mut cov = vec![0.0; n * n];
    for i in 0..n {
        for j in 0..n {
            if let (Some(ci), Some(cj)) = (index[i], index[j]) {
                cov[i * n + j] = covariance.get(ci, cj);
            }
        }
    }

    let mut mu = Vec::with_capacity(n);
    let mut lo = Vec::with_capacity(n);
    let mut hi = Vec::with_capacity(n);
    let mut current = Vec::with_capacity(n);
    for asset in &risky {
        if let Some(alloc) = profile.allocation(asset) {
            mu.push(alloc.expected_return);
            lo.push((alloc.min_pct / sleeve).clamp(0.0, 1.0));
            hi.push((alloc.max_pct / sleeve).clamp(0.0, 1.0));
            current.push((alloc.current_pct / sleeve).clamp(0.0, 1.0));
        }
    }

    let mut inputs = OptimizerInputs::new(risky.clone(), mu, cov, lo, hi, current);
    let kind = optimization_kind_for(&profile.strategy);
    if let RebalancingStrategy::RiskParity {
        target_contributions,
        ..
    } = &profile.strategy
    {
        if !target_contributions.is_empty() {
            let targets: Vec<f64> = risky
                .iter()
                .map(|a| target_contributions.get(a).copied().unwrap_or(0.0))
                .collect();
            inputs = inputs.with_target_contributions(targets);
        }
    }

    let result = optimizer.optimize(kind, &inputs)?;
    for (asset, weight) in &result.weights {
        if let Some(alloc) = profile.allocation_mut(asset) {
            alloc.target_pct = weight * sleeve;
        }
    }
    debug!(profile = %profile.name, kind = kind.name(), "targets re-optimized");
    Ok(())
}
