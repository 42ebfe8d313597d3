//! Risk alert types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use bl_types::ProfileId;

/// Which tracked metric an alert refers to. Alerts are keyed by this: a new
/// breach of the same metric replaces the existing alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskMetricKind {
    Volatility,
    Drawdown,
    Concentration,
    Var95,
}

/// Severity of a risk alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertLevel {
    Info,
    Warning,
    Critical,
}

/// What the operator should do about a breach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendedAction {
    Monitor,
    Rebalance,
    Hedge,
    ReduceRisk,
}

/// A single advisory emitted by the monitor. Alerts never block evaluation
/// of other metrics or profiles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAlert {
    pub id: Uuid,
    pub profile_id: ProfileId,
    pub timestamp: DateTime<Utc>,
    pub metric: RiskMetricKind,
    pub level: AlertLevel,
    /// Observed metric value (same unit as the threshold).
    pub value: f64,
    pub threshold: f64,
    pub action: RecommendedAction,
    pub message: String,
}

impl RiskAlert {
    pub fn new(
        profile_id: ProfileId,
        metric: RiskMetricKind,
        level: AlertLevel,
        value: f64,
        threshold: f64,
        action: RecommendedAction,
        message: String,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            profile_id,
            timestamp: now,
            metric,
            level,
            value,
            threshold,
            action,
            message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_ordering() {
        assert!(AlertLevel::Info < AlertLevel::Warning);
        assert!(AlertLevel::Warning < AlertLevel::Critical);
    }

    #[test]
    fn alert_serialization_roundtrip() {
        let alert = RiskAlert::new(
            Uuid::new_v4(),
            RiskMetricKind::Drawdown,
            AlertLevel::Critical,
            0.25,
            0.20,
            RecommendedAction::ReduceRisk,
            "drawdown 25% exceeds 20% limit".into(),
            Utc::now(),
        );
        let json = serde_json::to_string(&alert).unwrap();
        let back: RiskAlert = serde_json::from_str(&json).unwrap();
        assert_eq!(alert, back);
    }
}
