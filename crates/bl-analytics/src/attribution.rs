//! Brinson-style return attribution against a static buy-and-hold
//! baseline. Whatever the per-asset effects cannot explain of the
//! realized portfolio return is reported as the rebalancing effect.

use serde::{Deserialize, Serialize};

use bl_types::AssetId;

/// One asset's weights and returns over the attribution period, as
/// fractions. Benchmark weight is the buy-and-hold (initial target)
/// weight; benchmark return is the asset's baseline return.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetPeriod {
    pub asset_id: AssetId,
    pub actual_weight: f64,
    pub benchmark_weight: f64,
    pub actual_return: f64,
    pub benchmark_return: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributionEntry {
    pub asset_id: AssetId,
    pub allocation_effect: f64,
    pub selection_effect: f64,
    pub interaction_effect: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attribution {
    pub entries: Vec<AttributionEntry>,
    pub benchmark_return: f64,
    pub allocation_effect: f64,
    pub selection_effect: f64,
    pub interaction_effect: f64,
    /// Residual of the realized return unexplained by the three effects:
    /// the contribution of rebalancing itself.
    pub rebalancing_effect: f64,
    pub active_return: f64,
}

/// Split `realized_return − benchmark_return` into allocation, selection,
/// interaction and a rebalancing residual.
pub fn attribute(periods: &[AssetPeriod], realized_return: f64) -> Attribution {
    let benchmark_return: f64 = periods
        .iter()
        .map(|p| p.benchmark_weight * p.benchmark_return)
        .sum();

    let entries: Vec<AttributionEntry> = periods
        .iter()
        .map(|p| {
            let over = p.actual_weight - p.benchmark_weight;
            AttributionEntry {
                asset_id: p.asset_id.clone(),
                allocation_effect: over * (p.benchmark_return - benchmark_return),
                selection_effect: p.benchmark_weight * (p.actual_return - p.benchmark_return),
                interaction_effect: over * (p.actual_return - p.benchmark_return),
            }
        })
        .collect();

    let allocation_effect: f64 = entries.iter().map(|e| e.allocation_effect).sum();
    let selection_effect: f64 = entries.iter().map(|e| e.selection_effect).sum();
    let interaction_effect: f64 = entries.iter().map(|e| e.interaction_effect).sum();
    let active_return = realized_return - benchmark_return;

    Attribution {
        entries,
        benchmark_return,
        allocation_effect,
        selection_effect,
        interaction_effect,
        rebalancing_effect: active_return
            - allocation_effect
            - selection_effect
            - interaction_effect,
        active_return,
    }
}
