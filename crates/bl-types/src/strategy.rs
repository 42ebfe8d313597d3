use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::asset::AssetId;

/// How often a calendar-driven profile rebalances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RebalanceFrequency {
    Weekly,
    Monthly,
    Quarterly,
    Annually,
}

impl RebalanceFrequency {
    /// Next rebalance date strictly after `after`, anchored to `anchor_day`
    /// (day-of-month for monthly and coarser, day-of-week 0–6 for weekly).
    /// Deterministic: same inputs always produce the same date.
    pub fn next_after(&self, after: DateTime<Utc>, anchor_day: u32) -> DateTime<Utc> {
        match self {
            RebalanceFrequency::Weekly => {
                let target = anchor_day.min(6);
                let current = after.weekday().num_days_from_monday();
                let mut ahead = (7 + target as i64 - current as i64) % 7;
                if ahead == 0 {
                    ahead = 7;
                }
                (after + Duration::days(ahead))
                    .date_naive()
                    .and_hms_opt(0, 0, 0)
                    .map(|dt| Utc.from_utc_datetime(&dt))
                    .unwrap_or(after)
            }
            RebalanceFrequency::Monthly => Self::month_anchor(after, 1, anchor_day),
            RebalanceFrequency::Quarterly => Self::month_anchor(after, 3, anchor_day),
            RebalanceFrequency::Annually => Self::month_anchor(after, 12, anchor_day),
        }
    }

    fn month_anchor(after: DateTime<Utc>, months_ahead: u32, anchor_day: u32) -> DateTime<Utc> {
        let day = anchor_day.clamp(1, 28);
        let mut year = after.year();
        let mut month = after.month() + months_ahead;
        while month > 12 {
            month -= 12;
            year += 1;
        }
        Utc.with_ymd_and_hms(year, month, day, 0, 0, 0)
            .single()
            .unwrap_or(after + Duration::days(30 * months_ahead as i64))
    }
}

/// Rebalancing strategy — one variant per strategy type, carrying only the
/// parameters that type needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RebalancingStrategy {
    /// Trigger when any asset drifts at least `threshold_pct` points from
    /// target.
    Threshold { threshold_pct: f64 },
    /// Trigger on a fixed calendar schedule.
    Calendar {
        frequency: RebalanceFrequency,
        anchor_day: u32,
        next_rebalance: DateTime<Utc>,
    },
    /// Trigger when realized portfolio volatility drifts from the target.
    VolatilityTarget { target_vol: f64, tolerance: f64 },
    /// Trigger when per-asset risk contributions drift from their target
    /// shares. Empty `target_contributions` means equal risk contribution.
    RiskParity {
        tolerance: f64,
        target_contributions: HashMap<AssetId, f64>,
    },
    /// Trigger on a lookback-window return breakout.
    Momentum {
        lookback_days: usize,
        signal_threshold: f64,
    },
    /// Trigger on a lookback-window return stretch implying snap-back.
    MeanReversion {
        lookback_days: usize,
        signal_threshold: f64,
    },
}

impl RebalancingStrategy {
    /// Whether a triggered rebalance recomputes target weights, or simply
    /// trades back to the existing targets.
    pub fn requires_optimization(&self) -> bool {
        matches!(
            self,
            RebalancingStrategy::VolatilityTarget { .. } | RebalancingStrategy::RiskParity { .. }
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            RebalancingStrategy::Threshold { .. } => "threshold",
            RebalancingStrategy::Calendar { .. } => "calendar",
            RebalancingStrategy::VolatilityTarget { .. } => "volatility_target",
            RebalancingStrategy::RiskParity { .. } => "risk_parity",
            RebalancingStrategy::Momentum { .. } => "momentum",
            RebalancingStrategy::MeanReversion { .. } => "mean_reversion",
        }
    }
}

/// Why a rebalance was triggered. Recorded on the resulting event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TriggerReason {
    ThresholdBreach { asset_id: AssetId, drift_pct: f64 },
    CalendarDue { scheduled: DateTime<Utc> },
    VolatilityDeviation { realized: f64, target: f64 },
    RiskContributionDrift { asset_id: AssetId, deviation: f64 },
    MomentumSignal { signal: f64 },
    MeanReversionSignal { signal: f64 },
    Manual,
    Scheduled { requested_for: DateTime<Utc> },
}

impl TriggerReason {
    pub fn summary(&self) -> String {
        match self {
            TriggerReason::ThresholdBreach { asset_id, drift_pct } => {
                format!("threshold breach: {} drifted {:.2}pp", asset_id, drift_pct)
            }
            TriggerReason::CalendarDue { scheduled } => {
                format!("calendar rebalance due {}", scheduled.date_naive())
            }
            TriggerReason::VolatilityDeviation { realized, target } => format!(
                "realized vol {:.2}% vs target {:.2}%",
                realized * 100.0,
                target * 100.0
            ),
            TriggerReason::RiskContributionDrift { asset_id, deviation } => format!(
                "risk contribution of {} off target by {:.2}pp",
                asset_id,
                deviation * 100.0
            ),
            TriggerReason::MomentumSignal { signal } => {
                format!("momentum signal {:.4}", signal)
            }
            TriggerReason::MeanReversionSignal { signal } => {
                format!("mean-reversion signal {:.4}", signal)
            }
            TriggerReason::Manual => "manual request".to_string(),
            TriggerReason::Scheduled { requested_for } => {
                format!("operator-scheduled for {}", requested_for.date_naive())
            }
        }
    }
}
