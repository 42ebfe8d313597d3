//! Trade planning: weight deltas to a sized, capped trade list.
//!
//! The cash sleeve is never traded directly; it absorbs the residual of
//! the buys and sells when the executor commits.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::debug;

use bl_market::{CostModel, MarketSnapshot};
use bl_types::{
    AllocationSnapshot, AssetId, BallastError, BallastResult, RebalancingProfile,
    RebalancingTrade, TradeSide, WEIGHT_EPSILON,
};

#[derive(Debug, Clone)]
pub struct PlannedRebalance {
    pub trades: Vec<RebalancingTrade>,
    /// Assets skipped because their target sits outside the bounds and the
    /// profile forbids partial rebalancing.
    pub excluded: Vec<AssetId>,
    /// Assets dropped by the minimum-size or trade-count rules.
    pub dropped: Vec<AssetId>,
    pub notes: Vec<String>,
}

impl PlannedRebalance {
    pub fn is_partial(&self) -> bool {
        !self.excluded.is_empty() || !self.dropped.is_empty()
    }
}

/// Current weights of a profile, captured for an event snapshot.
pub fn allocation_snapshot(profile: &RebalancingProfile) -> AllocationSnapshot {
    AllocationSnapshot {
        weights: profile
            .allocations
            .iter()
            .map(|a| (a.asset_id.clone(), a.current_pct))
            .collect(),
    }
}

fn decimal_from(x: f64) -> Decimal {
    Decimal::from_f64_retain(x).unwrap_or_default()
}

/// Build the trade list closing `scale` of each asset's drift (1.0 for a
/// full rebalance, a fraction for one tranche of a gradual one).
///
/// Trades are sized against `portfolio_value`, clamped to the profile's
/// `[min_trade_size, max_trade_size]` and capped at
/// `max_trades_per_rebalance`, keeping the highest-priority, largest-drift
/// assets.
pub fn plan_trades(
    profile: &RebalancingProfile,
    snapshot: &MarketSnapshot,
    cost_model: &dyn CostModel,
    scale: f64,
) -> BallastResult<PlannedRebalance> {
    let mut plan = PlannedRebalance {
        trades: Vec::new(),
        excluded: Vec::new(),
        dropped: Vec::new(),
        notes: Vec::new(),
    };

    for alloc in &profile.allocations {
        if alloc.asset_id.is_cash() {
            continue;
        }
        let effective_target = if alloc.target_reachable() {
            alloc.target_pct
        } else if profile.rules.allow_partial_rebalancing {
            let clamped = alloc.target_pct.clamp(alloc.min_pct, alloc.max_pct);
            plan.notes.push(format!(
                "{}: target {:.2} clamped to {:.2} by bounds",
                alloc.asset_id, alloc.target_pct, clamped
            ));
            clamped
        } else {
            plan.excluded.push(alloc.asset_id.clone());
            plan.notes.push(format!(
                "{}: target outside bounds, excluded (partial rebalancing disabled)",
                alloc.asset_id
            ));
            continue;
        };

        let mut delta_pct = (effective_target - alloc.current_pct) * scale;
        if delta_pct.abs() < WEIGHT_EPSILON {
            continue;
        }

        let mut notional = profile.portfolio_value * decimal_from(delta_pct.abs() / 100.0);
        if notional < profile.rules.min_trade_size {
            plan.dropped.push(alloc.asset_id.clone());
            plan.notes
                .push(format!("{}: notional {} below minimum", alloc.asset_id, notional));
            continue;
        }
        if notional > profile.rules.max_trade_size {
            let ratio = (profile.rules.max_trade_size.to_f64().unwrap_or(0.0)
                / notional.to_f64().unwrap_or(1.0))
            .clamp(0.0, 1.0);
            delta_pct *= ratio;
            notional = profile.rules.max_trade_size;
            plan.notes
                .push(format!("{}: trade clamped to maximum size", alloc.asset_id));
        }

        let target_price = snapshot.price(&alloc.asset_id).ok_or_else(|| {
            BallastError::MarketData(format!("no price for {}", alloc.asset_id))
        })?;

        plan.trades.push(RebalancingTrade {
            asset_id: alloc.asset_id.clone(),
            side: if delta_pct > 0.0 {
                TradeSide::Buy
            } else {
                TradeSide::Sell
            },
            weight_delta_pct: delta_pct.abs(),
            notional,
            target_price,
            executed_price: None,
            transaction_cost: cost_model.cost(notional),
            slippage_bps: cost_model.expected_slippage_bps(notional),
            priority: alloc.priority,
        });
    }

    // Priority first, then drift magnitude: this ordering is also the
    // retention order when the trade cap bites.
    plan.trades.sort_by(|a, b| {
        a.priority
            .cmp(&b.priority)
            .then(b.weight_delta_pct.total_cmp(&a.weight_delta_pct))
    });
    let cap = profile.rules.max_trades_per_rebalance;
    if plan.trades.len() > cap {
        for trade in plan.trades.drain(cap..) {
            plan.notes
                .push(format!("{}: dropped by trade-count cap", trade.asset_id));
            plan.dropped.push(trade.asset_id);
        }
    }

    debug!(
        profile = %profile.name,
        trades = plan.trades.len(),
        excluded = plan.excluded.len(),
        dropped = plan.dropped.len(),
        "trade plan built"
    );
    Ok(plan)
}
