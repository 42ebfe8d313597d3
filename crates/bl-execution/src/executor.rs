//! Trade execution: plan, gate, trim to the cost budget, fill at the
//! venue and commit the resulting event onto the profile.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::{info, warn};

use bl_market::{CostModel, ExecutionVenue, MarketSnapshot};
use bl_types::{
    AllocationSnapshot, BallastResult, EventStatus, QualityScores, RebalancingEvent,
    RebalancingProfile, RebalancingTrade, TradeSide, TriggerReason,
};

use crate::gates::{check_gates, gate_error, projected_cash_pct};
use crate::planner::{allocation_snapshot, plan_trades};

/// Result of one slice of a gradual rebalance. The scheduler accumulates
/// these and commits a single event when the last tranche lands.
#[derive(Debug, Clone)]
pub struct TrancheOutcome {
    pub tranche: u32,
    pub total: u32,
    pub trades: Vec<RebalancingTrade>,
    pub notes: Vec<String>,
    /// True when cost trimming removed every trade of this tranche.
    pub budget_exhausted: bool,
}

impl TrancheOutcome {
    pub fn is_final(&self) -> bool {
        self.tranche >= self.total
    }
}

pub struct TradeExecutor<V: ExecutionVenue, C: CostModel> {
    venue: V,
    cost_model: C,
}

impl<V: ExecutionVenue, C: CostModel> TradeExecutor<V, C> {
    pub fn new(venue: V, cost_model: C) -> Self {
        Self { venue, cost_model }
    }

    /// Effective cost budget: the hard cap or the portfolio-value fraction,
    /// whichever is tighter.
    pub fn cost_budget(&self, profile: &RebalancingProfile) -> Decimal {
        let soft = profile.portfolio_value
            * Decimal::from_f64_retain(profile.rules.cost_budget_pct).unwrap_or_default();
        profile.rules.max_transaction_costs.min(soft)
    }

    /// Run a full rebalance in one shot. Gating surfaces as
    /// [`bl_types::BallastError::ExecutionGated`]; a blown cost budget is
    /// recorded on the event instead of failing the call.
    pub fn execute_immediate(
        &mut self,
        profile: &mut RebalancingProfile,
        reason: TriggerReason,
        snapshot: &MarketSnapshot,
        now: DateTime<Utc>,
    ) -> BallastResult<RebalancingEvent> {
        let pre = allocation_snapshot(profile);
        let plan = plan_trades(profile, snapshot, &self.cost_model, 1.0)?;
        if plan.trades.is_empty() && plan.excluded.is_empty() {
            // Already balanced; nothing to commit, nothing to record.
            return Ok(RebalancingEvent::new(
                now,
                reason,
                EventStatus::Committed,
                pre.clone(),
                pre,
                Vec::new(),
                profile.portfolio_value,
            )
            .with_notes(vec!["no trades required".to_string()]));
        }

        let projected = projected_cash_pct(profile, &plan.trades);
        let violations = check_gates(&profile.rules, snapshot, projected, now);
        if !violations.is_empty() {
            warn!(profile = %profile.name, "execution gated");
            return Err(gate_error(&violations));
        }

        let partial_plan = plan.is_partial();
        let mut notes = plan.notes;
        let budget = self.cost_budget(profile);
        let (trades, trimmed, aborted) = Self::trim_to_budget(plan.trades, budget, &mut notes);
        if aborted {
            let event = RebalancingEvent::new(
                now,
                reason,
                EventStatus::CostBudgetExceeded,
                pre.clone(),
                pre,
                Vec::new(),
                profile.portfolio_value,
            )
            .with_notes(notes);
            profile.record_event(event.clone(), now);
            return Ok(event);
        }

        let trades = self.fill(trades, snapshot, now)?;
        Self::apply_weights(profile, &trades);

        let status = if partial_plan || trimmed {
            EventStatus::PartiallyCommitted
        } else {
            EventStatus::Committed
        };
        let quality = Self::quality(profile, &trades, budget);
        let event = RebalancingEvent::new(
            now,
            reason,
            status,
            pre,
            allocation_snapshot(profile),
            trades,
            profile.portfolio_value,
        )
        .with_notes(notes)
        .with_quality(quality);
        info!(
            profile = %profile.name,
            trades = event.trades.len(),
            %event.total_cost,
            "rebalance committed"
        );
        profile.record_event(event.clone(), now);
        Ok(event)
    }

    /// Execute one slice of a gradual rebalance, closing an equal share of
    /// whatever drift remains. Weights are re-read from the profile, so
    /// external price drift between ticks is picked up automatically.
    pub fn execute_tranche(
        &mut self,
        profile: &mut RebalancingProfile,
        tranche: u32,
        total: u32,
        snapshot: &MarketSnapshot,
        remaining_budget: Decimal,
        now: DateTime<Utc>,
    ) -> BallastResult<TrancheOutcome> {
        let remaining = total.saturating_sub(tranche) + 1;
        let scale = 1.0 / remaining as f64;
        let plan = plan_trades(profile, snapshot, &self.cost_model, scale)?;

        let projected = projected_cash_pct(profile, &plan.trades);
        let violations = check_gates(&profile.rules, snapshot, projected, now);
        if !violations.is_empty() {
            return Err(gate_error(&violations));
        }

        let mut notes = plan.notes;
        let (trades, _, aborted) = Self::trim_to_budget(plan.trades, remaining_budget, &mut notes);
        if aborted {
            return Ok(TrancheOutcome {
                tranche,
                total,
                trades: Vec::new(),
                notes,
                budget_exhausted: true,
            });
        }

        let trades = self.fill(trades, snapshot, now)?;
        Self::apply_weights(profile, &trades);
        info!(profile = %profile.name, tranche, total, trades = trades.len(), "tranche executed");
        Ok(TrancheOutcome {
            tranche,
            total,
            trades,
            notes,
            budget_exhausted: false,
        })
    }

    /// Assemble and append the event for a finished gradual rebalance from
    /// the trades its tranches accumulated.
    pub fn commit_accumulated(
        &self,
        profile: &mut RebalancingProfile,
        reason: TriggerReason,
        pre: AllocationSnapshot,
        trades: Vec<RebalancingTrade>,
        status: EventStatus,
        notes: Vec<String>,
        now: DateTime<Utc>,
    ) -> RebalancingEvent {
        let quality = Self::quality(profile, &trades, self.cost_budget(profile));
        let event = RebalancingEvent::new(
            now,
            reason,
            status,
            pre,
            allocation_snapshot(profile),
            trades,
            profile.portfolio_value,
        )
        .with_notes(notes)
        .with_quality(quality);
        profile.record_event(event.clone(), now);
        event
    }

    /// Drop the lowest-priority, smallest trades until projected costs fit
    /// the budget. Returns (kept, anything_trimmed, everything_trimmed).
    fn trim_to_budget(
        mut trades: Vec<RebalancingTrade>,
        budget: Decimal,
        notes: &mut Vec<String>,
    ) -> (Vec<RebalancingTrade>, bool, bool) {
        let mut total: Decimal = trades.iter().map(|t| t.transaction_cost).sum();
        if total <= budget {
            return (trades, false, false);
        }
        // Reverse retention order: last = first to go.
        trades.sort_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then(b.weight_delta_pct.total_cmp(&a.weight_delta_pct))
        });
        let mut trimmed = false;
        while total > budget {
            match trades.pop() {
                Some(trade) => {
                    total -= trade.transaction_cost;
                    notes.push(format!("{}: trimmed to fit cost budget", trade.asset_id));
                    trimmed = true;
                }
                None => break,
            }
        }
        let aborted = trades.is_empty();
        if aborted {
            notes.push(format!("cost budget {budget} left no executable trades"));
        }
        (trades, trimmed, aborted)
    }

    fn fill(
        &mut self,
        trades: Vec<RebalancingTrade>,
        snapshot: &MarketSnapshot,
        now: DateTime<Utc>,
    ) -> BallastResult<Vec<RebalancingTrade>> {
        let mut filled = Vec::with_capacity(trades.len());
        for mut trade in trades {
            let fill = self.venue.submit(&trade, snapshot, now)?;
            trade.executed_price = Some(fill.executed_price);
            trade.slippage_bps = fill.slippage_bps;
            trade.transaction_cost = fill.transaction_cost;
            filled.push(trade);
        }
        Ok(filled)
    }

    /// Write executed deltas back into current weights; cash absorbs the
    /// net of buys and sells so the profile keeps summing to 100.
    fn apply_weights(profile: &mut RebalancingProfile, trades: &[RebalancingTrade]) {
        let mut net_buys = 0.0;
        for trade in trades {
            if !trade.is_executed() {
                continue;
            }
            let signed = match trade.side {
                TradeSide::Buy => trade.weight_delta_pct,
                TradeSide::Sell => -trade.weight_delta_pct,
            };
            if let Some(alloc) = profile.allocation_mut(&trade.asset_id) {
                alloc.current_pct += signed;
            }
            net_buys += signed;
        }
        if let Some(cash) = profile.allocations.iter_mut().find(|a| a.asset_id.is_cash()) {
            cash.current_pct -= net_buys;
        }
    }

    fn quality(
        profile: &RebalancingProfile,
        trades: &[RebalancingTrade],
        budget: Decimal,
    ) -> QualityScores {
        let executed: Vec<&RebalancingTrade> =
            trades.iter().filter(|t| t.is_executed()).collect();
        let avg_slippage = if executed.is_empty() {
            0.0
        } else {
            executed
                .iter()
                .map(|t| t.slippage_bps.to_f64().unwrap_or(0.0))
                .sum::<f64>()
                / executed.len() as f64
        };
        let total_cost: Decimal = executed.iter().map(|t| t.transaction_cost).sum();
        let cost_ratio = if budget > Decimal::ZERO {
            (total_cost / budget).to_f64().unwrap_or(1.0)
        } else {
            1.0
        };
        let cost_drag_bps = if profile.portfolio_value > Decimal::ZERO {
            (total_cost / profile.portfolio_value * Decimal::from(10_000))
                .to_f64()
                .unwrap_or(0.0)
        } else {
            0.0
        };
        let within = profile
            .allocations
            .iter()
            .filter(|a| a.is_within_bounds())
            .count();

        QualityScores::new(
            (100.0 - avg_slippage).clamp(0.0, 100.0),
            (100.0 - profile.max_drift() * 10.0).clamp(0.0, 100.0),
            (100.0 * (1.0 - cost_ratio)).clamp(0.0, 100.0),
            100.0 * within as f64 / profile.allocations.len().max(1) as f64,
            (100.0 - cost_drag_bps).clamp(0.0, 100.0),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bl_market::{FlatBpsCost, SimulatedVenue};
    use bl_types::{AssetAllocation, AssetId, BallastError, RebalancingStrategy};
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    type SimExecutor = TradeExecutor<SimulatedVenue<FlatBpsCost>, FlatBpsCost>;

    fn executor(seed: u64) -> SimExecutor {
        TradeExecutor::new(
            SimulatedVenue::new(FlatBpsCost::default(), seed),
            FlatBpsCost::default(),
        )
    }

    fn snapshot() -> MarketSnapshot {
        let mut prices = HashMap::new();
        for asset in ["A", "B", "C"] {
            prices.insert(AssetId::new(asset), dec!(100));
        }
        MarketSnapshot {
            timestamp: Utc::now(),
            prices,
            realized_volatility: 0.10,
            liquidity_score: 1.0,
        }
    }

    fn drifted_profile() -> RebalancingProfile {
        RebalancingProfile::new(
            "balanced",
            RebalancingStrategy::Threshold { threshold_pct: 5.0 },
            vec![
                AssetAllocation::new("A", 40.0).with_current(46.0),
                AssetAllocation::new("B", 30.0).with_current(28.0),
                AssetAllocation::new("C", 20.0).with_current(19.0),
                AssetAllocation::new("cash", 10.0).with_current(7.0),
            ],
            Utc::now(),
        )
    }

    #[test]
    fn immediate_commit_lands_on_targets() {
        let mut profile = drifted_profile();
        let event = executor(42)
            .execute_immediate(&mut profile, TriggerReason::Manual, &snapshot(), Utc::now())
            .unwrap();
        assert_eq!(event.status, EventStatus::Committed);
        assert_eq!(event.trades.len(), 3);
        for alloc in &profile.allocations {
            assert!(
                (alloc.current_pct - alloc.target_pct).abs() < 0.01,
                "{} off target",
                alloc.asset_id
            );
        }
        assert!((profile.total_current_pct() - 100.0).abs() < 0.01);
        assert_eq!(profile.history.len(), 1);
    }

    #[test]
    fn committed_costs_stay_under_budget() {
        let mut profile = drifted_profile();
        let event = executor(42)
            .execute_immediate(&mut profile, TriggerReason::Manual, &snapshot(), Utc::now())
            .unwrap();
        assert!(event.total_cost <= profile.rules.max_transaction_costs);
    }

    #[test]
    fn balanced_profile_is_a_no_op() {
        let mut profile = drifted_profile();
        for alloc in &mut profile.allocations {
            alloc.current_pct = alloc.target_pct;
        }
        let event = executor(42)
            .execute_immediate(&mut profile, TriggerReason::Manual, &snapshot(), Utc::now())
            .unwrap();
        assert!(event.trades.is_empty());
        assert!(profile.history.is_empty());
    }

    #[test]
    fn high_volatility_defers_execution() {
        let mut profile = drifted_profile();
        let mut market = snapshot();
        market.realized_volatility = 0.60;
        let err = executor(42)
            .execute_immediate(&mut profile, TriggerReason::Manual, &market, Utc::now())
            .unwrap_err();
        assert!(matches!(err, BallastError::ExecutionGated { .. }));
        assert!(err.is_recoverable());
        // Weights untouched while gated.
        assert!((profile.allocation(&AssetId::new("A")).unwrap().current_pct - 46.0).abs() < 1e-9);
    }

    #[test]
    fn trimming_keeps_largest_drift_within_budget() {
        let mut profile = drifted_profile();
        // Projected: A 6 + B 2 + C 1 = 9 at 10 bps. Budget of 7 drops C, then B.
        profile.rules.max_transaction_costs = dec!(7);
        let event = executor(42)
            .execute_immediate(&mut profile, TriggerReason::Manual, &snapshot(), Utc::now())
            .unwrap();
        assert_eq!(event.status, EventStatus::PartiallyCommitted);
        assert_eq!(event.trades.len(), 1);
        assert_eq!(event.trades[0].asset_id, AssetId::new("A"));
        assert!(event.total_cost <= dec!(7));
        assert!(!event.notes.is_empty());
    }

    #[test]
    fn exhausted_budget_aborts_with_event() {
        let mut profile = drifted_profile();
        profile.rules.max_transaction_costs = dec!(0.5);
        let event = executor(42)
            .execute_immediate(&mut profile, TriggerReason::Manual, &snapshot(), Utc::now())
            .unwrap();
        assert_eq!(event.status, EventStatus::CostBudgetExceeded);
        assert!(event.trades.is_empty());
        assert_eq!(profile.history.len(), 1);
        // Nothing moved.
        assert!((profile.allocation(&AssetId::new("A")).unwrap().current_pct - 46.0).abs() < 1e-9);
    }

    #[test]
    fn tranches_converge_on_targets() {
        let mut profile = drifted_profile();
        let mut exec = executor(42);
        let pre = allocation_snapshot(&profile);
        let mut all_trades = Vec::new();
        let budget = exec.cost_budget(&profile);
        let mut spent = Decimal::ZERO;
        for tranche in 1..=3 {
            let outcome = exec
                .execute_tranche(&mut profile, tranche, 3, &snapshot(), budget - spent, Utc::now())
                .unwrap();
            spent += outcome.trades.iter().map(|t| t.transaction_cost).sum::<Decimal>();
            all_trades.extend(outcome.trades);
        }
        exec.commit_accumulated(
            &mut profile,
            TriggerReason::Manual,
            pre,
            all_trades,
            EventStatus::Committed,
            Vec::new(),
            Utc::now(),
        );
        for alloc in &profile.allocations {
            assert!(
                (alloc.current_pct - alloc.target_pct).abs() < 0.05,
                "{} off target after tranches",
                alloc.asset_id
            );
        }
        assert_eq!(profile.history.len(), 1);
    }

    #[test]
    fn tranche_rereads_current_weights() {
        let mut profile = drifted_profile();
        let mut exec = executor(42);
        let budget = exec.cost_budget(&profile);
        exec.execute_tranche(&mut profile, 1, 2, &snapshot(), budget, Utc::now())
            .unwrap();
        // External drift between tranches.
        profile
            .allocation_mut(&AssetId::new("A"))
            .unwrap()
            .current_pct += 1.0;
        let outcome = exec
            .execute_tranche(&mut profile, 2, 2, &snapshot(), budget, Utc::now())
            .unwrap();
        let a = outcome
            .trades
            .iter()
            .find(|t| t.asset_id.as_str() == "A")
            .unwrap();
        // Final tranche closes the whole remaining (drifted) gap: 44 -> 40.
        assert!((a.weight_delta_pct - 4.0).abs() < 1e-6);
    }

    #[test]
    fn quality_scores_populated_on_commit() {
        let mut profile = drifted_profile();
        let event = executor(42)
            .execute_immediate(&mut profile, TriggerReason::Manual, &snapshot(), Utc::now())
            .unwrap();
        assert!(event.quality.overall > 0.0);
        assert!(event.quality.cost_efficiency > 90.0);
        assert!((event.quality.risk_management - 100.0).abs() < 1e-9);
    }
}
