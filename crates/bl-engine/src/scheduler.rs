//! Clock-driven scheduler: one `tick(now)` evaluates every active profile
//! sequentially, so no profile's rebalance ever races itself.
//!
//! Each profile walks the state machine
//! `Idle → Evaluating → Planning → Executing → Committed|Aborted → Idle`.
//! Triggers arriving while a rebalance is executing are queued on the
//! profile and picked up on the next idle tick. Risk monitoring runs every
//! tick regardless of triggering, and a critical alert cancels the
//! remaining tranches of an in-flight rebalance.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::{info, warn};

use bl_execution::{allocation_snapshot, TradeExecutor};
use bl_market::{CostModel, ExecutionVenue, MarketDataFeed, MarketSnapshot};
use bl_optimizer::Optimizer;
use bl_risk::{RiskCalculator, RiskMonitor};
use bl_triggers::TriggerEngine;
use bl_types::{
    AllocationSnapshot, AssetId, BallastResult, EventStatus, ExecutionMode, ProfileId,
    ProfileState, RebalancingEvent, RebalancingProfile, RebalancingTrade, TriggerReason,
};

use crate::repository::{PerformanceStore, ProfileRepository};
use crate::retarget::retarget;

/// One rebalance being executed across ticks.
struct InFlight {
    reason: TriggerReason,
    pre: AllocationSnapshot,
    trades: Vec<RebalancingTrade>,
    notes: Vec<String>,
    total: u32,
    next_tranche: u32,
    spent: Decimal,
    deadline: Option<DateTime<Utc>>,
}

impl InFlight {
    fn new(
        reason: TriggerReason,
        pre: AllocationSnapshot,
        total: u32,
        deadline: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            reason,
            pre,
            trades: Vec::new(),
            notes: Vec::new(),
            total: total.max(1),
            next_tranche: 1,
            spent: Decimal::ZERO,
            deadline,
        }
    }
}

/// What one tick did, for logging and tests.
#[derive(Debug, Default)]
pub struct TickReport {
    pub events: Vec<RebalancingEvent>,
    pub deferred: Vec<(ProfileId, String)>,
    pub errors: Vec<(ProfileId, String)>,
    pub alerts_raised: usize,
}

pub struct Scheduler<R, F, V, C>
where
    R: ProfileRepository,
    F: MarketDataFeed,
    V: ExecutionVenue,
    C: CostModel,
{
    repo: Arc<R>,
    feed: Arc<F>,
    performance: Arc<PerformanceStore>,
    monitor: Arc<Mutex<RiskMonitor>>,
    executor: TradeExecutor<V, C>,
    optimizer: Optimizer,
    in_flight: HashMap<ProfileId, InFlight>,
}

impl<R, F, V, C> Scheduler<R, F, V, C>
where
    R: ProfileRepository,
    F: MarketDataFeed,
    V: ExecutionVenue,
    C: CostModel,
{
    pub fn new(
        repo: Arc<R>,
        feed: Arc<F>,
        performance: Arc<PerformanceStore>,
        monitor: Arc<Mutex<RiskMonitor>>,
        executor: TradeExecutor<V, C>,
    ) -> Self {
        Self {
            repo,
            feed,
            performance,
            monitor,
            executor,
            optimizer: Optimizer::default(),
            in_flight: HashMap::new(),
        }
    }

    /// Evaluate every active profile once. Failures are per-profile; one
    /// broken profile never blocks the others.
    pub fn tick(&mut self, now: DateTime<Utc>) -> TickReport {
        let mut report = TickReport::default();
        for profile in self.repo.list() {
            if !profile.active {
                continue;
            }
            let id = profile.id;
            if let Err(err) = self.tick_profile(profile, now, &mut report) {
                warn!(profile_id = %id, %err, "profile tick failed");
                report.errors.push((id, err.to_string()));
            }
        }
        report
    }

    fn tick_profile(
        &mut self,
        mut profile: RebalancingProfile,
        now: DateTime<Utc>,
        report: &mut TickReport,
    ) -> BallastResult<()> {
        let assets = profile.asset_ids();
        let risky: Vec<AssetId> = assets.iter().filter(|a| !a.is_cash()).cloned().collect();
        let covariance = self.feed.covariance(&assets)?;
        let snapshot = self.feed.snapshot(&risky, now)?;

        self.performance.record(
            profile.id,
            now,
            profile.portfolio_value.to_f64().unwrap_or(0.0),
        );
        let history = self.performance.series(profile.id);

        // Alert monitoring runs every tick, rebalancing or not.
        let assessment = RiskCalculator::assess(&profile.allocations, &covariance, &history, now);
        let raised = self.monitor.lock().evaluate(&profile, &assessment, now);
        report.alerts_raised += raised.len();

        if let Some(flight) = self.in_flight.remove(&profile.id) {
            // Triggers firing mid-execution are queued, never restarted; the
            // queued reason is consumed on the first idle tick after settle.
            let decision = TriggerEngine::evaluate(&profile, &covariance, &history, now);
            if decision.triggered {
                if let Some(reason) = decision.reason {
                    profile.queue_trigger(reason);
                }
            }
            self.progress_flight(&mut profile, flight, &snapshot, now, report)?;
            return self.repo.put(profile);
        }

        let reason = match profile.pending_trigger.take() {
            Some(queued) => Some(queued),
            None => {
                let decision = TriggerEngine::evaluate(&profile, &covariance, &history, now);
                if decision.triggered {
                    decision.reason
                } else {
                    None
                }
            }
        };
        let Some(reason) = reason else {
            return self.repo.put(profile);
        };

        profile.state = ProfileState::Evaluating;
        // Clear a one-off schedule once it fires.
        if matches!(reason, TriggerReason::Scheduled { .. }) {
            profile.next_scheduled = None;
        }
        if profile.strategy.requires_optimization() {
            if let Err(err) = retarget(&mut profile, &covariance, &self.optimizer) {
                warn!(profile = %profile.name, %err, "re-optimization failed, keeping targets");
                profile.state = ProfileState::Idle;
                report.errors.push((profile.id, err.to_string()));
                return self.repo.put(profile);
            }
        }
        profile.state = ProfileState::Planning;

        match profile.rules.execution_mode {
            ExecutionMode::Immediate => {
                match self
                    .executor
                    .execute_immediate(&mut profile, reason.clone(), &snapshot, now)
                {
                    Ok(event) => {
                        profile.state = ProfileState::Idle;
                        report.events.push(event);
                    }
                    Err(err) if err.is_recoverable() => {
                        // Deferred: retry from the queued trigger next tick.
                        profile.queue_trigger(reason);
                        profile.state = ProfileState::Idle;
                        report.deferred.push((profile.id, err.to_string()));
                    }
                    Err(err) => {
                        profile.state = ProfileState::Idle;
                        self.repo.put(profile)?;
                        return Err(err);
                    }
                }
            }
            ExecutionMode::Gradual { tranches } => {
                let flight =
                    InFlight::new(reason, allocation_snapshot(&profile), tranches, None);
                self.progress_flight(&mut profile, flight, &snapshot, now, report)?;
            }
            ExecutionMode::Opportunistic { deadline_hours } => {
                let flight = InFlight::new(
                    reason,
                    allocation_snapshot(&profile),
                    1,
                    Some(now + Duration::hours(deadline_hours)),
                );
                self.progress_flight(&mut profile, flight, &snapshot, now, report)?;
            }
        }
        self.repo.put(profile)
    }

    /// Run (or cancel) the next tranche of an in-flight rebalance.
    fn progress_flight(
        &mut self,
        profile: &mut RebalancingProfile,
        mut flight: InFlight,
        snapshot: &MarketSnapshot,
        now: DateTime<Utc>,
        report: &mut TickReport,
    ) -> BallastResult<()> {
        if self.monitor.lock().has_critical(profile.id) {
            flight
                .notes
                .push("remaining tranches cancelled by critical risk alert".to_string());
            self.finish_flight(profile, flight, EventStatus::Aborted, now, report);
            return Ok(());
        }
        if let Some(deadline) = flight.deadline {
            if now > deadline {
                flight
                    .notes
                    .push("execution window expired before gates cleared".to_string());
                self.finish_flight(profile, flight, EventStatus::Aborted, now, report);
                return Ok(());
            }
        }

        profile.state = ProfileState::Executing {
            tranche: flight.next_tranche,
            total: flight.total,
        };
        let budget = self.executor.cost_budget(profile) - flight.spent;
        match self.executor.execute_tranche(
            profile,
            flight.next_tranche,
            flight.total,
            snapshot,
            budget,
            now,
        ) {
            Ok(outcome) => {
                flight.spent += outcome
                    .trades
                    .iter()
                    .map(|t| t.transaction_cost)
                    .sum::<Decimal>();
                let is_final = outcome.is_final();
                let exhausted = outcome.budget_exhausted;
                flight.notes.extend(outcome.notes);
                flight.trades.extend(outcome.trades);

                if exhausted {
                    let status = if flight.trades.is_empty() {
                        EventStatus::CostBudgetExceeded
                    } else {
                        EventStatus::PartiallyCommitted
                    };
                    self.finish_flight(profile, flight, status, now, report);
                } else if is_final {
                    let status = if flight.notes.is_empty() {
                        EventStatus::Committed
                    } else {
                        EventStatus::PartiallyCommitted
                    };
                    self.finish_flight(profile, flight, status, now, report);
                } else {
                    flight.next_tranche += 1;
                    profile.state = ProfileState::Executing {
                        tranche: flight.next_tranche,
                        total: flight.total,
                    };
                    self.in_flight.insert(profile.id, flight);
                }
            }
            Err(err) if err.is_recoverable() => {
                report.deferred.push((profile.id, err.to_string()));
                self.in_flight.insert(profile.id, flight);
            }
            Err(err) => {
                flight.notes.push(err.to_string());
                self.finish_flight(profile, flight, EventStatus::Aborted, now, report);
                return Err(err);
            }
        }
        Ok(())
    }

    fn finish_flight(
        &mut self,
        profile: &mut RebalancingProfile,
        flight: InFlight,
        status: EventStatus,
        now: DateTime<Utc>,
        report: &mut TickReport,
    ) {
        let event = self.executor.commit_accumulated(
            profile,
            flight.reason,
            flight.pre,
            flight.trades,
            status,
            flight.notes,
            now,
        );
        info!(profile = %profile.name, status = ?event.status, "rebalance finished");
        profile.state = ProfileState::Idle;
        report.events.push(event);
    }
}
