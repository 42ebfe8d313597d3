//! Scenario stress testing.
//!
//! A scenario applies a per-asset shock vector to current weights:
//! `impact = Σ wᵢ·shockᵢ`, with a stressed volatility estimate (correlations
//! pushed toward 1) and a rough recovery horizon.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use bl_types::AssetAllocation;
use bl_types::AssetId;

/// Cap on the reported recovery horizon.
const MAX_RECOVERY_MONTHS: f64 = 120.0;

/// A named shock scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StressScenario {
    pub id: String,
    pub name: String,
    /// Per-asset return shocks as fractions (-0.30 = asset loses 30%).
    /// Assets missing from the map are unshocked.
    pub shocks: HashMap<AssetId, f64>,
    /// Multiplier applied on top of the correlation-stressed volatility.
    pub volatility_multiplier: f64,
}

impl StressScenario {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            shocks: HashMap::new(),
            volatility_multiplier: 1.5,
        }
    }

    pub fn with_shock(mut self, asset: impl Into<AssetId>, shock: f64) -> Self {
        self.shocks.insert(asset.into(), shock);
        self
    }

    /// Canned scenario library keyed by id.
    pub fn standard_library() -> Vec<StressScenario> {
        vec![
            StressScenario::new("equity_crash", "Equity crash (-35% risk assets)")
                .with_shock("equities", -0.35)
                .with_shock("real_estate", -0.25),
            StressScenario::new("rate_shock", "Rate shock (+300bps)")
                .with_shock("bonds", -0.12)
                .with_shock("equities", -0.10),
            StressScenario::new("liquidity_crunch", "Liquidity crunch")
                .with_shock("equities", -0.20)
                .with_shock("bonds", -0.05)
                .with_shock("real_estate", -0.30),
        ]
    }
}

/// Outcome of running one scenario against a profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StressResult {
    pub scenario_id: String,
    pub scenario_name: String,
    /// Weighted portfolio return under the scenario (fraction, negative =
    /// loss).
    pub portfolio_impact: f64,
    /// Portfolio value after applying the impact.
    pub stressed_value: Decimal,
    /// Volatility estimate with correlations pushed to 1, times the
    /// scenario multiplier.
    pub stressed_volatility: f64,
    /// Rough horizon to recover the loss at the portfolio's expected return.
    pub estimated_recovery_months: f64,
    /// Assets hit hardest, worst first.
    pub worst_assets: Vec<(AssetId, f64)>,
}

impl StressResult {
    /// Apply `scenario` to the given allocations.
    pub fn run(
        allocations: &[AssetAllocation],
        portfolio_value: Decimal,
        scenario: &StressScenario,
    ) -> StressResult {
        let mut impact = 0.0;
        let mut per_asset: Vec<(AssetId, f64)> = Vec::new();
        for alloc in allocations {
            let weight = alloc.current_pct / 100.0;
            let shock = scenario.shocks.get(&alloc.asset_id).copied().unwrap_or(0.0);
            let contribution = weight * shock;
            impact += contribution;
            if shock != 0.0 {
                per_asset.push((alloc.asset_id.clone(), contribution));
            }
        }
        per_asset.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));

        // Perfectly-correlated upper bound on volatility: Σ wᵢσᵢ.
        let stressed_volatility = allocations
            .iter()
            .map(|a| (a.current_pct / 100.0) * a.volatility)
            .sum::<f64>()
            * scenario.volatility_multiplier;

        // Recovery horizon: months of expected portfolio return needed to
        // earn the loss back.
        let expected_annual = allocations
            .iter()
            .map(|a| (a.current_pct / 100.0) * a.expected_return)
            .sum::<f64>();
        let monthly = (expected_annual / 12.0).max(1e-4);
        let estimated_recovery_months = if impact < 0.0 {
            (-impact / monthly).min(MAX_RECOVERY_MONTHS)
        } else {
            0.0
        };

        let stressed_value = portfolio_value
            + portfolio_value
                * Decimal::from_f64_retain(impact).unwrap_or(Decimal::ZERO);

        StressResult {
            scenario_id: scenario.id.clone(),
            scenario_name: scenario.name.clone(),
            portfolio_impact: impact,
            stressed_value,
            stressed_volatility,
            estimated_recovery_months,
            worst_assets: per_asset,
        }
    }
}
