use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use bl_types::{PerformanceSeries, ProfileId, RebalancingProfile};

use crate::attribution::Attribution;
use crate::metrics::{PerformanceMetrics, PerformanceTracker};

/// One profile's performance over a period, ready for display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceReport {
    pub profile_id: ProfileId,
    pub profile_name: String,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub metrics: PerformanceMetrics,
    pub attribution: Option<Attribution>,
    pub rebalance_count: usize,
    pub total_rebalancing_cost: Decimal,
    pub generated_at: DateTime<Utc>,
}

pub fn generate_report(
    profile: &RebalancingProfile,
    series: &PerformanceSeries,
    period_start: DateTime<Utc>,
    period_end: DateTime<Utc>,
    tracker: &PerformanceTracker,
    attribution: Option<Attribution>,
    now: DateTime<Utc>,
) -> PerformanceReport {
    let window = series.slice(period_start, period_end);
    let metrics = tracker.metrics(&window);
    let in_period: Vec<_> = profile
        .history
        .iter()
        .filter(|e| e.timestamp >= period_start && e.timestamp <= period_end)
        .collect();
    let total_rebalancing_cost = in_period.iter().map(|e| e.total_cost).sum();
    debug!(profile = %profile.name, events = in_period.len(), "report generated");

    PerformanceReport {
        profile_id: profile.id,
        profile_name: profile.name.clone(),
        period_start,
        period_end,
        metrics,
        attribution,
        rebalance_count: in_period.len(),
        total_rebalancing_cost,
        generated_at: now,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonEntry {
    pub profile_id: ProfileId,
    pub profile_name: String,
    pub strategy: String,
    pub metrics: PerformanceMetrics,
}

/// Side-by-side strategy comparison across profiles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyComparison {
    pub entries: Vec<ComparisonEntry>,
    pub best_total_return: Option<ProfileId>,
    pub best_sharpe: Option<ProfileId>,
}

pub fn compare_strategies(
    profiles: &[(&RebalancingProfile, &PerformanceSeries)],
    tracker: &PerformanceTracker,
) -> StrategyComparison {
    let entries: Vec<ComparisonEntry> = profiles
        .iter()
        .map(|(profile, series)| ComparisonEntry {
            profile_id: profile.id,
            profile_name: profile.name.clone(),
            strategy: profile.strategy.name().to_string(),
            metrics: tracker.metrics(series),
        })
        .collect();

    let best_by = |key: fn(&PerformanceMetrics) -> f64| -> Option<ProfileId> {
        entries
            .iter()
            .max_by(|a, b| key(&a.metrics).total_cmp(&key(&b.metrics)))
            .map(|e| e.profile_id)
    };

    StrategyComparison {
        best_total_return: best_by(|m| m.total_return),
        best_sharpe: best_by(|m| m.sharpe_ratio),
        entries,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bl_types::{
        AllocationSnapshot, AssetAllocation, EventStatus, RebalancingEvent, RebalancingStrategy,
        TriggerReason,
    };
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn profile(name: &str) -> RebalancingProfile {
        RebalancingProfile::new(
            name,
            RebalancingStrategy::Threshold { threshold_pct: 5.0 },
            vec![
                AssetAllocation::new("A", 60.0),
                AssetAllocation::new("B", 40.0),
            ],
            Utc::now(),
        )
    }

    fn series(values: &[f64], start: DateTime<Utc>) -> PerformanceSeries {
        let mut s = PerformanceSeries::new();
        for (i, v) in values.iter().enumerate() {
            s.record(start + Duration::days(i as i64), *v);
        }
        s
    }

    #[test]
    fn report_counts_events_in_period_only() {
        let start = Utc::now();
        let mut p = profile("growth");
        let event = RebalancingEvent::new(
            start + Duration::days(1),
            TriggerReason::Manual,
            EventStatus::Committed,
            AllocationSnapshot::default(),
            AllocationSnapshot::default(),
            Vec::new(),
            dec!(100_000),
        );
        p.record_event(event, start + Duration::days(1));
        let stale = RebalancingEvent::new(
            start - Duration::days(30),
            TriggerReason::Manual,
            EventStatus::Committed,
            AllocationSnapshot::default(),
            AllocationSnapshot::default(),
            Vec::new(),
            dec!(100_000),
        );
        p.record_event(stale, start);

        let report = generate_report(
            &p,
            &series(&[100.0, 101.0, 102.0], start),
            start,
            start + Duration::days(10),
            &PerformanceTracker::default(),
            None,
            Utc::now(),
        );
        assert_eq!(report.rebalance_count, 1);
        assert!(report.metrics.total_return > 0.0);
    }

    #[test]
    fn comparison_picks_the_stronger_profile() {
        let start = Utc::now();
        let winner = profile("winner");
        let laggard = profile("laggard");
        let tracker = PerformanceTracker::default();
        let comparison = compare_strategies(
            &[
                (&winner, &series(&[100.0, 103.0, 106.0], start)),
                (&laggard, &series(&[100.0, 100.5, 100.2], start)),
            ],
            &tracker,
        );
        assert_eq!(comparison.entries.len(), 2);
        assert_eq!(comparison.best_total_return, Some(winner.id));
        assert_eq!(comparison.best_sharpe, Some(winner.id));
    }
}
