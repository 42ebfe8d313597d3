//! Risk monitor — threshold checks with alert emission.
//!
//! [`RiskMonitor`] compares each tracked metric of a [`RiskAssessment`]
//! against the profile's configured limits and emits [`RiskAlert`]s via a
//! channel. A new breach of a metric replaces the existing active alert for
//! that metric; clearing below the warning band removes it.

use chrono::{DateTime, Utc};
use crossbeam_channel::Sender;
use std::collections::HashMap;
use tracing::{info, warn};

use bl_types::{ProfileId, RebalancingProfile, RiskParameters};

use crate::alerts::{AlertLevel, RecommendedAction, RiskAlert, RiskMetricKind};
use crate::metrics::RiskAssessment;

pub struct RiskMonitor {
    alert_tx: Sender<RiskAlert>,
    active: HashMap<(ProfileId, RiskMetricKind), RiskAlert>,
}

impl RiskMonitor {
    pub fn new(alert_tx: Sender<RiskAlert>) -> Self {
        Self {
            alert_tx,
            active: HashMap::new(),
        }
    }

    /// Check every tracked metric; emit and record alerts for breaches.
    /// Returns the alerts raised by this evaluation.
    pub fn evaluate(
        &mut self,
        profile: &RebalancingProfile,
        assessment: &RiskAssessment,
        now: DateTime<Utc>,
    ) -> Vec<RiskAlert> {
        let limits = &profile.risk;
        let checks = [
            (RiskMetricKind::Volatility, assessment.volatility, limits.max_volatility),
            (RiskMetricKind::Drawdown, assessment.current_drawdown, limits.max_drawdown),
            (
                RiskMetricKind::Concentration,
                assessment.max_weight_pct,
                limits.max_concentration_pct,
            ),
            (RiskMetricKind::Var95, assessment.var_95, limits.max_var_95),
        ];

        let mut raised = Vec::new();
        for (metric, value, limit) in checks {
            match Self::breach_level(value, limit, limits.warning_ratio) {
                Some(level) => {
                    let alert = RiskAlert::new(
                        profile.id,
                        metric,
                        level,
                        value,
                        limit,
                        Self::action_for(metric, level),
                        format!(
                            "{:?} at {:.4} against limit {:.4} for profile '{}'",
                            metric, value, limit, profile.name
                        ),
                        now,
                    );
                    self.emit(&alert);
                    // Replace, never duplicate.
                    self.active.insert((profile.id, metric), alert.clone());
                    raised.push(alert);
                }
                None => {
                    self.active.remove(&(profile.id, metric));
                }
            }
        }
        raised
    }

    /// Currently active (unresolved) alerts for a profile.
    pub fn active_alerts(&self, profile_id: ProfileId) -> Vec<RiskAlert> {
        let mut alerts: Vec<RiskAlert> = self
            .active
            .iter()
            .filter(|((pid, _), _)| *pid == profile_id)
            .map(|(_, alert)| alert.clone())
            .collect();
        alerts.sort_by(|a, b| b.level.cmp(&a.level));
        alerts
    }

    /// Whether the profile currently has a critical breach. Used by the
    /// scheduler to cancel remaining tranches of an in-flight rebalance.
    pub fn has_critical(&self, profile_id: ProfileId) -> bool {
        self.active
            .iter()
            .any(|((pid, _), alert)| *pid == profile_id && alert.level == AlertLevel::Critical)
    }

    fn breach_level(value: f64, limit: f64, warning_ratio: f64) -> Option<AlertLevel> {
        if limit <= 0.0 {
            return None;
        }
        if value >= limit {
            Some(AlertLevel::Critical)
        } else if value >= limit * warning_ratio {
            Some(AlertLevel::Warning)
        } else {
            None
        }
    }

    fn action_for(metric: RiskMetricKind, level: AlertLevel) -> RecommendedAction {
        if level == AlertLevel::Warning {
            return RecommendedAction::Monitor;
        }
        match metric {
            RiskMetricKind::Volatility => RecommendedAction::ReduceRisk,
            RiskMetricKind::Drawdown => RecommendedAction::Hedge,
            RiskMetricKind::Concentration => RecommendedAction::Rebalance,
            RiskMetricKind::Var95 => RecommendedAction::Hedge,
        }
    }

    fn emit(&self, alert: &RiskAlert) {
        match alert.level {
            AlertLevel::Critical => warn!(%alert.message, "RISK CRITICAL"),
            AlertLevel::Warning => warn!(%alert.message, "RISK WARNING"),
            AlertLevel::Info => info!(%alert.message, "RISK INFO"),
        }
        // Best-effort send; a dropped receiver only costs us the fan-out.
        let _ = self.alert_tx.try_send(alert.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::RiskCalculator;
    use bl_types::{AssetAllocation, AssetId, CovarianceMatrix, PerformanceSeries, RebalancingStrategy};
    use crossbeam_channel::unbounded;

    fn profile_with_weights(weights: &[(&str, f64)]) -> RebalancingProfile {
        RebalancingProfile::new(
            "test",
            RebalancingStrategy::Threshold { threshold_pct: 5.0 },
            weights
                .iter()
                .map(|(id, pct)| AssetAllocation::new(*id, *pct))
                .collect(),
            Utc::now(),
        )
    }

    fn assess(profile: &RebalancingProfile, vol_var: f64) -> RiskAssessment {
        let n = profile.allocations.len();
        let assets: Vec<AssetId> = profile.asset_ids();
        let mut values = vec![0.0; n * n];
        for i in 0..n {
            values[i * n + i] = vol_var;
        }
        let cov = CovarianceMatrix::new(assets, values);
        RiskCalculator::assess(
            &profile.allocations,
            &cov,
            &PerformanceSeries::new(),
            Utc::now(),
        )
    }

    #[test]
    fn no_alerts_inside_limits() {
        let (tx, rx) = unbounded();
        let mut monitor = RiskMonitor::new(tx);
        let profile = profile_with_weights(&[("A", 50.0), ("B", 50.0)]);
        let assessment = assess(&profile, 0.0001);
        let raised = monitor.evaluate(&profile, &assessment, Utc::now());
        assert!(raised.is_empty());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn concentration_breach_fires_rebalance_action() {
        let (tx, rx) = unbounded();
        let mut monitor = RiskMonitor::new(tx);
        let mut profile = profile_with_weights(&[("A", 50.0), ("B", 50.0)]);
        profile.allocations[0].current_pct = 45.0;
        profile.risk.max_concentration_pct = 40.0;
        let assessment = assess(&profile, 0.0001);

        let raised = monitor.evaluate(&profile, &assessment, Utc::now());
        assert_eq!(raised.len(), 1);
        assert_eq!(raised[0].metric, RiskMetricKind::Concentration);
        assert_eq!(raised[0].level, AlertLevel::Critical);
        assert_eq!(raised[0].action, RecommendedAction::Rebalance);
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn new_breach_replaces_not_duplicates() {
        let (tx, _rx) = unbounded();
        let mut monitor = RiskMonitor::new(tx);
        let mut profile = profile_with_weights(&[("A", 50.0), ("B", 50.0)]);
        profile.risk.max_concentration_pct = 40.0;
        profile.allocations[0].current_pct = 45.0;

        let assessment = assess(&profile, 0.0001);
        monitor.evaluate(&profile, &assessment, Utc::now());

        profile.allocations[0].current_pct = 48.0;
        let assessment = assess(&profile, 0.0001);
        monitor.evaluate(&profile, &assessment, Utc::now());

        let active = monitor.active_alerts(profile.id);
        assert_eq!(active.len(), 1);
        assert!((active[0].value - 48.0).abs() < 1e-9);
    }

    #[test]
    fn alert_clears_when_metric_recovers() {
        let (tx, _rx) = unbounded();
        let mut monitor = RiskMonitor::new(tx);
        let mut profile = profile_with_weights(&[("A", 50.0), ("B", 50.0)]);
        profile.risk.max_concentration_pct = 40.0;
        profile.allocations[0].current_pct = 45.0;

        let assessment = assess(&profile, 0.0001);
        monitor.evaluate(&profile, &assessment, Utc::now());
        assert!(monitor.has_critical(profile.id));

        profile.allocations[0].current_pct = 25.0;
        profile.allocations[1].current_pct = 25.0;
        let assessment = assess(&profile, 0.0001);
        monitor.evaluate(&profile, &assessment, Utc::now());
        assert!(!monitor.has_critical(profile.id));
        assert!(monitor.active_alerts(profile.id).is_empty());
    }

    #[test]
    fn warning_band_recommends_monitoring() {
        let (tx, _rx) = unbounded();
        let mut monitor = RiskMonitor::new(tx);
        let mut profile = profile_with_weights(&[("A", 50.0), ("B", 50.0)]);
        profile.risk.max_concentration_pct = 60.0;
        profile.risk.warning_ratio = 0.80;
        // 50 / 60 ≈ 83% of limit → warning.
        let assessment = assess(&profile, 0.0001);
        let raised = monitor.evaluate(&profile, &assessment, Utc::now());
        let conc = raised
            .iter()
            .find(|a| a.metric == RiskMetricKind::Concentration)
            .unwrap();
        assert_eq!(conc.level, AlertLevel::Warning);
        assert_eq!(conc.action, RecommendedAction::Monitor);
    }
}
