//! Operation boundary for embedders and the daemon.
//!
//! [`RebalancingService`] wraps the repository, market feed, executor and
//! analytics behind one API: profile CRUD, manual and trigger-driven
//! rebalancing, optimization, risk assessment, stress testing, backtesting
//! and performance reporting. Long-running analyses (optimization,
//! backtests) run on the blocking pool and report failure through
//! [`AnalysisOutcome`] rather than an error, so a bad input never poisons
//! the calling task.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use bl_analytics::{
    compare_strategies, generate_report, PerformanceMetrics, PerformanceReport,
    PerformanceTracker, StrategyComparison,
};
use bl_execution::TradeExecutor;
use bl_market::{Clock, CostModel, ExecutionVenue, MarketDataFeed};
use bl_optimizer::{OptimizationKind, OptimizationResult, Optimizer, OptimizerInputs};
use bl_risk::{RiskAlert, RiskAssessment, RiskCalculator, RiskMonitor, StressResult, StressScenario};
use bl_triggers::{TriggerDecision, TriggerEngine};
use bl_types::{
    internal_error, validation_error, AssetId, BallastError, BallastResult, PriceSeries,
    ProfileId, ProfileState, RebalancingEvent, RebalancingProfile, TriggerReason,
};

use crate::backtest::{BacktestResult, Backtester};
use crate::repository::{PerformanceStore, ProfileRepository};
use crate::retarget::retarget;

/// Result of an analysis that may fail without that being the caller's
/// fault (infeasible constraints, insufficient history, ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AnalysisOutcome<T> {
    Completed { result: T },
    Failed { reason: String },
}

impl<T> AnalysisOutcome<T> {
    pub fn is_completed(&self) -> bool {
        matches!(self, AnalysisOutcome::Completed { .. })
    }

    fn from_result(result: BallastResult<T>) -> Self {
        match result {
            Ok(result) => AnalysisOutcome::Completed { result },
            Err(err) => AnalysisOutcome::Failed {
                reason: err.to_string(),
            },
        }
    }
}

pub struct RebalancingService<R, F, V, C>
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
    clock: Arc<dyn Clock>,
    executor: Mutex<TradeExecutor<V, C>>,
    optimizer: Optimizer,
    tracker: PerformanceTracker,
    backtester: Backtester,
    price_history: RwLock<Option<PriceSeries>>,
}

impl<R, F, V, C> RebalancingService<R, F, V, C>
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
        clock: Arc<dyn Clock>,
        executor: TradeExecutor<V, C>,
    ) -> Self {
        Self {
            repo,
            feed,
            performance,
            monitor,
            clock,
            executor: Mutex::new(executor),
            optimizer: Optimizer::default(),
            tracker: PerformanceTracker::default(),
            backtester: Backtester::default(),
            price_history: RwLock::new(None),
        }
    }

    /// Price history used by [`Self::backtest_strategy`].
    pub fn load_price_history(&self, series: PriceSeries) {
        *self.price_history.write() = Some(series);
    }

    // ---- profile lifecycle -------------------------------------------------

    pub fn create_profile(&self, mut profile: RebalancingProfile) -> BallastResult<ProfileId> {
        profile.validate()?;
        profile.history.clear();
        profile.pending_trigger = None;
        profile.state = ProfileState::Idle;
        let id = profile.id;
        info!(profile = %profile.name, %id, "profile created");
        self.repo.put(profile)?;
        Ok(id)
    }

    pub fn get_profile(&self, id: ProfileId) -> BallastResult<RebalancingProfile> {
        self.repo.get(id)
    }

    pub fn list_profiles(&self) -> Vec<RebalancingProfile> {
        self.repo.list()
    }

    /// Replace an existing profile's configuration; history and lifecycle
    /// state carry over from the stored copy.
    pub fn update_profile(&self, profile: RebalancingProfile) -> BallastResult<()> {
        profile.validate()?;
        let existing = self.repo.get(profile.id)?;
        if existing.state.is_in_flight() {
            return Err(BallastError::ConcurrentRebalanceInProgress {
                profile_id: profile.id,
            });
        }
        let mut updated = profile;
        updated.history = existing.history;
        updated.state = existing.state;
        updated.updated_at = self.clock.now();
        self.repo.put(updated)
    }

    pub fn delete_profile(&self, id: ProfileId) -> BallastResult<RebalancingProfile> {
        let profile = self.repo.remove(id)?;
        self.performance.remove(id);
        info!(%id, "profile deleted");
        Ok(profile)
    }

    // ---- rebalancing -------------------------------------------------------

    /// Rebalance now, outside the trigger pipeline.
    pub fn execute_rebalancing(&self, id: ProfileId) -> BallastResult<RebalancingEvent> {
        self.rebalance(id, Some(TriggerReason::Manual))
            .transpose()
            .unwrap_or_else(|| Err(internal_error!("manual rebalance produced no event")))
    }

    /// Rebalance only if the profile's own triggers fire; calling this
    /// repeatedly on a balanced profile is a no-op.
    pub fn execute_if_triggered(&self, id: ProfileId) -> BallastResult<Option<RebalancingEvent>> {
        self.rebalance(id, None)
    }

    #[instrument(skip(self), fields(profile_id = %id))]
    fn rebalance(
        &self,
        id: ProfileId,
        forced: Option<TriggerReason>,
    ) -> BallastResult<Option<RebalancingEvent>> {
        let mut profile = self.repo.get(id)?;
        if profile.state.is_in_flight() {
            return Err(BallastError::ConcurrentRebalanceInProgress { profile_id: id });
        }
        let now = self.clock.now();
        let assets = profile.asset_ids();
        let covariance = self.feed.covariance(&assets)?;

        let reason = match forced {
            Some(reason) => reason,
            None => {
                let history = self.performance.series(id);
                let decision = TriggerEngine::evaluate(&profile, &covariance, &history, now);
                if !decision.triggered {
                    return Ok(None);
                }
                match decision.reason {
                    Some(reason) => reason,
                    None => return Ok(None),
                }
            }
        };

        if profile.strategy.requires_optimization() {
            retarget(&mut profile, &covariance, &self.optimizer)?;
        }
        let risky: Vec<AssetId> = assets.iter().filter(|a| !a.is_cash()).cloned().collect();
        let snapshot = self.feed.snapshot(&risky, now)?;
        let event = self
            .executor
            .lock()
            .execute_immediate(&mut profile, reason, &snapshot, now)?;
        profile.state = ProfileState::Idle;
        self.repo.put(profile)?;
        Ok(Some(event))
    }

    /// What the trigger pipeline would decide right now, without executing.
    pub fn get_recommendations(&self, id: ProfileId) -> BallastResult<TriggerDecision> {
        let profile = self.repo.get(id)?;
        let covariance = self.feed.covariance(&profile.asset_ids())?;
        let history = self.performance.series(id);
        Ok(TriggerEngine::evaluate(
            &profile,
            &covariance,
            &history,
            self.clock.now(),
        ))
    }

    /// Book a one-off rebalance; the scheduler fires it on the first tick at
    /// or after `when`.
    pub fn schedule_rebalancing(&self, id: ProfileId, when: DateTime<Utc>) -> BallastResult<()> {
        let mut profile = self.repo.get(id)?;
        profile.next_scheduled = Some(when);
        profile.updated_at = self.clock.now();
        self.repo.put(profile)
    }

    // ---- analysis ----------------------------------------------------------

    pub async fn optimize_portfolio(
        &self,
        id: ProfileId,
        kind: OptimizationKind,
    ) -> BallastResult<AnalysisOutcome<OptimizationResult>> {
        let profile = self.repo.get(id)?;
        let covariance = self.feed.covariance(&profile.asset_ids())?;
        let optimizer = self.optimizer.clone();
        let outcome = tokio::task::spawn_blocking(move || {
            let inputs = OptimizerInputs::from_profile(&profile, &covariance);
            AnalysisOutcome::from_result(optimizer.optimize(kind, &inputs))
        })
        .await
        .map_err(|err| internal_error!("optimization task panicked: {err}"))?;
        Ok(outcome)
    }

    pub async fn backtest_strategy(
        &self,
        id: ProfileId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> BallastResult<AnalysisOutcome<BacktestResult>> {
        let profile = self.repo.get(id)?;
        let Some(series) = self.price_history.read().clone() else {
            return Ok(AnalysisOutcome::Failed {
                reason: "no price history loaded".to_string(),
            });
        };
        let backtester = self.backtester.clone();
        let outcome = tokio::task::spawn_blocking(move || {
            AnalysisOutcome::from_result(backtester.run(&profile, &series, start, end))
        })
        .await
        .map_err(|err| internal_error!("backtest task panicked: {err}"))?;
        Ok(outcome)
    }

    // ---- risk --------------------------------------------------------------

    pub fn assess_portfolio_risk(&self, id: ProfileId) -> BallastResult<RiskAssessment> {
        let profile = self.repo.get(id)?;
        let covariance = self.feed.covariance(&profile.asset_ids())?;
        let history = self.performance.series(id);
        Ok(RiskCalculator::assess(
            &profile.allocations,
            &covariance,
            &history,
            self.clock.now(),
        ))
    }

    pub fn run_stress_test(&self, id: ProfileId, scenario_id: &str) -> BallastResult<StressResult> {
        let profile = self.repo.get(id)?;
        let scenarios = StressScenario::standard_library();
        let scenario = scenarios
            .iter()
            .find(|s| s.id == scenario_id)
            .ok_or_else(|| validation_error!("unknown stress scenario '{scenario_id}'"))?;
        Ok(StressResult::run(
            &profile.allocations,
            profile.portfolio_value,
            scenario,
        ))
    }

    pub fn stress_scenarios(&self) -> Vec<StressScenario> {
        StressScenario::standard_library()
    }

    /// Re-evaluate alert thresholds and return the currently active alerts.
    pub fn monitor_risk_alerts(&self, id: ProfileId) -> BallastResult<Vec<RiskAlert>> {
        let profile = self.repo.get(id)?;
        let assessment = self.assess_portfolio_risk(id)?;
        let mut monitor = self.monitor.lock();
        monitor.evaluate(&profile, &assessment, self.clock.now());
        Ok(monitor.active_alerts(id))
    }

    // ---- performance -------------------------------------------------------

    pub fn calculate_performance_metrics(&self, id: ProfileId) -> BallastResult<PerformanceMetrics> {
        self.repo.get(id)?;
        Ok(self.tracker.metrics(&self.performance.series(id)))
    }

    pub fn generate_performance_report(
        &self,
        id: ProfileId,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
    ) -> BallastResult<PerformanceReport> {
        let profile = self.repo.get(id)?;
        let series = self.performance.series(id);
        Ok(generate_report(
            &profile,
            &series,
            period_start,
            period_end,
            &self.tracker,
            None,
            self.clock.now(),
        ))
    }

    pub fn compare_profiles(&self, ids: &[ProfileId]) -> BallastResult<StrategyComparison> {
        let profiles: Vec<RebalancingProfile> =
            ids.iter().map(|id| self.repo.get(*id)).collect::<BallastResult<_>>()?;
        let series: Vec<_> = ids.iter().map(|id| self.performance.series(*id)).collect();
        let pairs: Vec<_> = profiles.iter().zip(series.iter()).collect();
        let refs: Vec<(&RebalancingProfile, &bl_types::PerformanceSeries)> =
            pairs.iter().map(|(p, s)| (*p, *s)).collect();
        Ok(compare_strategies(&refs, &self.tracker))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::InMemoryProfileRepository;
    use bl_market::{FixedClock, FlatBpsCost, SimulatedVenue, StaticFeed};
    use bl_types::{AssetAllocation, CovarianceMatrix, EventStatus, RebalancingStrategy};
    use chrono::TimeZone;
    use crossbeam_channel::unbounded;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    type TestService = RebalancingService<
        InMemoryProfileRepository,
        StaticFeed,
        SimulatedVenue<FlatBpsCost>,
        FlatBpsCost,
    >;

    fn service() -> TestService {
        let mut prices = HashMap::new();
        for asset in ["A", "B"] {
            prices.insert(AssetId::new(asset), dec!(50));
        }
        let assets = vec![AssetId::new("A"), AssetId::new("B"), AssetId::cash()];
        let mut values = vec![0.0; 9];
        values[0] = 0.02;
        values[4] = 0.02;
        let feed = StaticFeed::new(prices, CovarianceMatrix::new(assets, values));
        let (tx, _rx) = unbounded();
        RebalancingService::new(
            Arc::new(InMemoryProfileRepository::new()),
            Arc::new(feed),
            Arc::new(PerformanceStore::new()),
            Arc::new(Mutex::new(RiskMonitor::new(tx))),
            Arc::new(FixedClock::new(
                Utc.with_ymd_and_hms(2024, 6, 3, 12, 0, 0).unwrap(),
            )),
            TradeExecutor::new(
                SimulatedVenue::new(FlatBpsCost::default(), 42),
                FlatBpsCost::default(),
            ),
        )
    }

    fn drifted() -> RebalancingProfile {
        RebalancingProfile::new(
            "svc",
            RebalancingStrategy::Threshold { threshold_pct: 5.0 },
            vec![
                AssetAllocation::new("A", 50.0).with_current(58.0),
                AssetAllocation::new("B", 40.0).with_current(34.0),
                AssetAllocation::new("cash", 10.0).with_current(8.0),
            ],
            Utc::now(),
        )
    }

    #[test]
    fn create_validates_and_stores() {
        let svc = service();
        let id = svc.create_profile(drifted()).unwrap();
        assert_eq!(svc.get_profile(id).unwrap().name, "svc");

        let mut bad = drifted();
        bad.allocations[0].target_pct = 80.0;
        assert!(matches!(
            svc.create_profile(bad),
            Err(BallastError::Validation(_))
        ));
    }

    #[test]
    fn stored_profile_round_trips_unchanged() {
        let svc = service();
        let submitted = drifted();
        let id = svc.create_profile(submitted.clone()).unwrap();
        let stored = svc.get_profile(id).unwrap();
        assert_eq!(stored, submitted);

        let json = serde_json::to_string(&stored).unwrap();
        let back: RebalancingProfile = serde_json::from_str(&json).unwrap();
        assert_eq!(back, stored);
    }

    #[test]
    fn manual_rebalance_commits() {
        let svc = service();
        let id = svc.create_profile(drifted()).unwrap();
        let event = svc.execute_rebalancing(id).unwrap();
        assert_eq!(event.status, EventStatus::Committed);
        assert_eq!(event.reason, TriggerReason::Manual);
        let profile = svc.get_profile(id).unwrap();
        assert!((profile.allocation(&AssetId::new("A")).unwrap().current_pct - 50.0).abs() < 0.01);
    }

    #[test]
    fn triggered_rebalance_is_idempotent() {
        let svc = service();
        let id = svc.create_profile(drifted()).unwrap();
        let first = svc.execute_if_triggered(id).unwrap();
        assert!(first.is_some());
        // Balanced now; a second call does nothing.
        let second = svc.execute_if_triggered(id).unwrap();
        assert!(second.is_none());
        assert_eq!(svc.get_profile(id).unwrap().history.len(), 1);
    }

    #[test]
    fn in_flight_profile_rejects_concurrent_rebalance() {
        let svc = service();
        let id = svc.create_profile(drifted()).unwrap();
        let mut profile = svc.get_profile(id).unwrap();
        profile.state = ProfileState::Executing { tranche: 1, total: 3 };
        svc.repo.put(profile).unwrap();
        assert!(matches!(
            svc.execute_rebalancing(id),
            Err(BallastError::ConcurrentRebalanceInProgress { .. })
        ));
    }

    #[test]
    fn recommendations_reflect_drift() {
        let svc = service();
        let id = svc.create_profile(drifted()).unwrap();
        let decision = svc.get_recommendations(id).unwrap();
        assert!(decision.triggered);
        assert_eq!(
            decision.drifting_assets.first().map(|d| d.asset_id.clone()),
            Some(AssetId::new("A"))
        );
    }

    #[test]
    fn stress_test_runs_known_scenarios_only() {
        let svc = service();
        let id = svc.create_profile(drifted()).unwrap();
        assert!(svc.run_stress_test(id, "equity_crash").is_ok());
        assert!(matches!(
            svc.run_stress_test(id, "meteor_strike"),
            Err(BallastError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn optimization_reports_infeasibility_as_outcome() {
        let svc = service();
        let mut profile = drifted();
        for alloc in &mut profile.allocations {
            alloc.min_pct = 0.0;
            alloc.max_pct = 20.0;
        }
        let id = svc.create_profile(profile).unwrap();
        let outcome = svc
            .optimize_portfolio(id, OptimizationKind::MeanVariance)
            .await
            .unwrap();
        assert!(!outcome.is_completed());
    }

    #[tokio::test]
    async fn backtest_without_history_fails_softly() {
        let svc = service();
        let id = svc.create_profile(drifted()).unwrap();
        let outcome = svc
            .backtest_strategy(id, Utc::now(), Utc::now())
            .await
            .unwrap();
        assert!(matches!(outcome, AnalysisOutcome::Failed { .. }));
    }

    #[test]
    fn delete_clears_performance_history() {
        let svc = service();
        let id = svc.create_profile(drifted()).unwrap();
        svc.performance.record(id, Utc::now(), 100_000.0);
        svc.delete_profile(id).unwrap();
        assert!(svc.get_profile(id).is_err());
        assert!(svc.performance.series(id).is_empty());
    }
}
