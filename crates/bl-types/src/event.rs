use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::asset::AssetId;
use crate::strategy::TriggerReason;

/// Unique rebalancing event identifier.
pub type EventId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeSide {
    Buy,
    Sell,
}

/// One buy or sell produced by a rebalance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RebalancingTrade {
    pub asset_id: AssetId,
    pub side: TradeSide,
    /// Weight moved by this trade, in percentage points (always positive).
    pub weight_delta_pct: f64,
    /// Notional traded, in portfolio currency.
    pub notional: Decimal,
    pub target_price: Decimal,
    /// Set once the venue reports the fill.
    pub executed_price: Option<Decimal>,
    pub transaction_cost: Decimal,
    pub slippage_bps: Decimal,
    pub priority: u8,
}

impl RebalancingTrade {
    pub fn is_executed(&self) -> bool {
        self.executed_price.is_some()
    }
}

/// Point-in-time copy of the profile's weights, taken before and after a
/// rebalance.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AllocationSnapshot {
    pub weights: Vec<(AssetId, f64)>,
}

impl AllocationSnapshot {
    pub fn pct(&self, asset: &AssetId) -> Option<f64> {
        self.weights
            .iter()
            .find(|(id, _)| id == asset)
            .map(|(_, pct)| *pct)
    }

    pub fn total(&self) -> f64 {
        self.weights.iter().map(|(_, pct)| pct).sum()
    }
}

/// Terminal status of a rebalancing event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Committed,
    /// Some assets were excluded (unreachable bounds, trimmed trades).
    PartiallyCommitted,
    Aborted,
    /// Projected costs exceeded the budget and nothing survived trimming.
    CostBudgetExceeded,
}

/// Post-hoc execution quality, each component on a 0–100 scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityScores {
    pub price_impact: f64,
    pub timing: f64,
    pub cost_efficiency: f64,
    pub risk_management: f64,
    pub benchmark_comparison: f64,
    pub overall: f64,
}

impl QualityScores {
    pub fn new(
        price_impact: f64,
        timing: f64,
        cost_efficiency: f64,
        risk_management: f64,
        benchmark_comparison: f64,
    ) -> Self {
        let overall = (price_impact + timing + cost_efficiency + risk_management
            + benchmark_comparison)
            / 5.0;
        Self {
            price_impact,
            timing,
            cost_efficiency,
            risk_management,
            benchmark_comparison,
            overall,
        }
    }
}

impl Default for QualityScores {
    fn default() -> Self {
        Self::new(0.0, 0.0, 0.0, 0.0, 0.0)
    }
}

/// Immutable record of one rebalance. Created once at commit time and
/// appended to the profile history; never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RebalancingEvent {
    pub id: EventId,
    pub timestamp: DateTime<Utc>,
    pub reason: TriggerReason,
    pub status: EventStatus,
    pub pre_allocation: AllocationSnapshot,
    pub post_allocation: AllocationSnapshot,
    pub trades: Vec<RebalancingTrade>,
    pub total_cost: Decimal,
    pub portfolio_value: Decimal,
    pub quality: QualityScores,
    /// Local recoveries (gating deferrals, cost trimming) recorded here.
    pub notes: Vec<String>,
}

impl RebalancingEvent {
    pub fn new(
        timestamp: DateTime<Utc>,
        reason: TriggerReason,
        status: EventStatus,
        pre_allocation: AllocationSnapshot,
        post_allocation: AllocationSnapshot,
        trades: Vec<RebalancingTrade>,
        portfolio_value: Decimal,
    ) -> Self {
        let total_cost = trades.iter().map(|t| t.transaction_cost).sum();
        Self {
            id: Uuid::new_v4(),
            timestamp,
            reason,
            status,
            pre_allocation,
            post_allocation,
            trades,
            total_cost,
            portfolio_value,
            quality: QualityScores::default(),
            notes: Vec::new(),
        }
    }

    pub fn with_quality(mut self, quality: QualityScores) -> Self {
        self.quality = quality;
        self
    }

    pub fn with_notes(mut self, notes: Vec<String>) -> Self {
        self.notes = notes;
        self
    }

    pub fn executed_trades(&self) -> impl Iterator<Item = &RebalancingTrade> {
        self.trades.iter().filter(|t| t.is_executed())
    }
}
