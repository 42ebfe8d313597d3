//! Turns weight deltas into gated, cost-bounded trades and commits the
//! resulting [`bl_types::RebalancingEvent`] onto the profile.

pub mod executor;
pub mod gates;
pub mod planner;

pub use executor::{TradeExecutor, TrancheOutcome};
pub use gates::{check_gates, gate_error, projected_cash_pct, GateViolation};
pub use planner::{allocation_snapshot, plan_trades, PlannedRebalance};
