use chrono::{DateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::allocation::{AssetAllocation, WEIGHT_EPSILON};
use crate::asset::AssetId;
use crate::errors::{BallastError, BallastResult};
use crate::event::RebalancingEvent;
use crate::strategy::{RebalancingStrategy, TriggerReason};

/// Unique profile identifier.
pub type ProfileId = Uuid;

/// How committed trades are spread over time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ExecutionMode {
    /// All trades fire at the same timestamp.
    Immediate,
    /// Trades split into `tranches` slices across scheduler ticks.
    Gradual { tranches: u32 },
    /// Wait for gates to clear, up to `deadline_hours` after planning.
    Opportunistic { deadline_hours: i64 },
}

/// Daily window during which no trades may fire (e.g. market open/close).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlackoutWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl BlackoutWindow {
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        let t = at.time();
        if self.start <= self.end {
            t >= self.start && t < self.end
        } else {
            // Window wraps midnight.
            t >= self.start || t < self.end
        }
    }
}

/// Operator-configured execution constraints for one profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RebalancingRules {
    /// Trades below this notional are dropped.
    pub min_trade_size: Decimal,
    /// Trades above this notional are clamped.
    pub max_trade_size: Decimal,
    pub max_trades_per_rebalance: usize,
    pub allow_partial_rebalancing: bool,
    /// Hard cap on total transaction costs for one rebalance.
    pub max_transaction_costs: Decimal,
    /// Soft cap: fraction of portfolio value spendable on costs.
    pub cost_budget_pct: f64,
    /// Execution suspends while market volatility is above this.
    pub volatility_threshold: f64,
    /// Execution suspends while liquidity score is below this.
    pub liquidity_threshold: f64,
    pub blackout_windows: Vec<BlackoutWindow>,
    /// Cash sleeve may never fall below this percentage.
    pub cash_reserve_pct: f64,
    pub execution_mode: ExecutionMode,
}

impl Default for RebalancingRules {
    fn default() -> Self {
        Self {
            min_trade_size: Decimal::from(100),
            max_trade_size: Decimal::from(1_000_000),
            max_trades_per_rebalance: 20,
            allow_partial_rebalancing: true,
            max_transaction_costs: Decimal::from(500),
            cost_budget_pct: 0.005,
            volatility_threshold: 0.40,
            liquidity_threshold: 0.20,
            blackout_windows: Vec::new(),
            cash_reserve_pct: 0.0,
            execution_mode: ExecutionMode::Immediate,
        }
    }
}

/// Per-profile risk alert thresholds consumed by the risk monitor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskParameters {
    /// Annualized portfolio volatility ceiling (fraction).
    pub max_volatility: f64,
    /// Peak-to-trough drawdown ceiling (fraction).
    pub max_drawdown: f64,
    /// Single-asset weight ceiling (percentage points).
    pub max_concentration_pct: f64,
    /// 1-day 95% VaR ceiling (fraction of portfolio value).
    pub max_var_95: f64,
    /// Fraction of a limit at which a warning fires (e.g. 0.80).
    pub warning_ratio: f64,
}

impl Default for RiskParameters {
    fn default() -> Self {
        Self {
            max_volatility: 0.25,
            max_drawdown: 0.20,
            max_concentration_pct: 40.0,
            max_var_95: 0.05,
            warning_ratio: 0.80,
        }
    }
}

/// Lifecycle state of a profile's rebalancing pipeline.
///
/// `Idle → Evaluating → Planning → Executing → Committed|Aborted → Idle`.
/// At most one rebalance is in flight per profile; triggers arriving while
/// `Executing` are queued on the profile, not restarted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ProfileState {
    Idle,
    Evaluating,
    Planning,
    Executing { tranche: u32, total: u32 },
    Committed,
    Aborted,
}

impl ProfileState {
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            ProfileState::Evaluating | ProfileState::Planning | ProfileState::Executing { .. }
        )
    }
}

/// Aggregate root: one rebalancing mandate over a set of assets.
///
/// Allocation percentages mutate only through committed events or external
/// price-drift updates; history is append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RebalancingProfile {
    pub id: ProfileId,
    pub name: String,
    pub strategy: RebalancingStrategy,
    pub allocations: Vec<AssetAllocation>,
    pub rules: RebalancingRules,
    pub risk: RiskParameters,
    pub portfolio_value: Decimal,
    pub state: ProfileState,
    /// Latest trigger that arrived while a rebalance was in flight.
    pub pending_trigger: Option<TriggerReason>,
    pub history: Vec<RebalancingEvent>,
    pub active: bool,
    /// One-off operator-scheduled rebalance date.
    pub next_scheduled: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RebalancingProfile {
    pub fn new(
        name: impl Into<String>,
        strategy: RebalancingStrategy,
        allocations: Vec<AssetAllocation>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            strategy,
            allocations,
            rules: RebalancingRules::default(),
            risk: RiskParameters::default(),
            portfolio_value: Decimal::from(100_000),
            state: ProfileState::Idle,
            pending_trigger: None,
            history: Vec::new(),
            active: true,
            next_scheduled: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Structural validation: non-empty, per-asset checks, targets summing to
    /// 100 within tolerance, no duplicate assets.
    pub fn validate(&self) -> BallastResult<()> {
        if self.allocations.is_empty() {
            return Err(BallastError::Validation(
                "profile has no allocations".to_string(),
            ));
        }
        for alloc in &self.allocations {
            alloc.validate()?;
        }
        let mut seen = std::collections::HashSet::new();
        for alloc in &self.allocations {
            if !seen.insert(&alloc.asset_id) {
                return Err(BallastError::Validation(format!(
                    "duplicate allocation for {}",
                    alloc.asset_id
                )));
            }
        }
        let total = self.total_target_pct();
        if (total - 100.0).abs() > WEIGHT_EPSILON {
            return Err(BallastError::Validation(format!(
                "target percentages sum to {:.4}, expected 100",
                total
            )));
        }
        Ok(())
    }

    pub fn total_target_pct(&self) -> f64 {
        self.allocations.iter().map(|a| a.target_pct).sum()
    }

    pub fn total_current_pct(&self) -> f64 {
        self.allocations.iter().map(|a| a.current_pct).sum()
    }

    pub fn asset_ids(&self) -> Vec<AssetId> {
        self.allocations.iter().map(|a| a.asset_id.clone()).collect()
    }

    pub fn allocation(&self, asset: &AssetId) -> Option<&AssetAllocation> {
        self.allocations.iter().find(|a| &a.asset_id == asset)
    }

    pub fn allocation_mut(&mut self, asset: &AssetId) -> Option<&mut AssetAllocation> {
        self.allocations.iter_mut().find(|a| &a.asset_id == asset)
    }

    /// Largest drift across all assets, in percentage points.
    pub fn max_drift(&self) -> f64 {
        self.allocations
            .iter()
            .map(|a| a.drift())
            .fold(0.0, f64::max)
    }

    /// Append one immutable event to the history.
    pub fn record_event(&mut self, event: RebalancingEvent, now: DateTime<Utc>) {
        self.history.push(event);
        self.updated_at = now;
    }

    pub fn last_event(&self) -> Option<&RebalancingEvent> {
        self.history.last()
    }

    /// Queue a trigger that arrived while a rebalance was in flight. A newer
    /// trigger overwrites an older queued one.
    pub fn queue_trigger(&mut self, reason: TriggerReason) {
        self.pending_trigger = Some(reason);
    }
}
