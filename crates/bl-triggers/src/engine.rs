//! Per-strategy trigger evaluation.
//!
//! [`TriggerEngine::evaluate`] inspects a profile against current market
//! state and return history and reports whether a rebalance is due, why, and
//! which assets drifted. Evaluation never mutates the profile.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use bl_risk::RiskCalculator;
use bl_types::{
    AssetId, CovarianceMatrix, PerformanceSeries, RebalancingProfile, RebalancingStrategy,
    TriggerReason,
};

/// Trading days per year for annualizing realized volatility.
const TRADING_DAYS: f64 = 252.0;
/// Drift below this many percentage points is considered noise.
const DRIFT_FLOOR: f64 = 0.01;

/// One drifting asset in a trigger decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetDrift {
    pub asset_id: AssetId,
    pub drift_pct: f64,
    pub priority: u8,
}

/// Outcome of one trigger evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerDecision {
    pub triggered: bool,
    pub reason: Option<TriggerReason>,
    /// Drifting assets ordered by priority, then drift magnitude descending.
    pub drifting_assets: Vec<AssetDrift>,
}

impl TriggerDecision {
    fn quiet(drifting_assets: Vec<AssetDrift>) -> Self {
        Self {
            triggered: false,
            reason: None,
            drifting_assets,
        }
    }

    fn fired(reason: TriggerReason, drifting_assets: Vec<AssetDrift>) -> Self {
        Self {
            triggered: true,
            reason: Some(reason),
            drifting_assets,
        }
    }
}

/// Stateless trigger evaluator.
pub struct TriggerEngine;

impl TriggerEngine {
    /// Evaluate whether `profile` is due for a rebalance at `now`.
    ///
    /// `covariance` must be aligned with the profile's allocation order;
    /// `history` is the profile's performance series (daily points).
    pub fn evaluate(
        profile: &RebalancingProfile,
        covariance: &CovarianceMatrix,
        history: &PerformanceSeries,
        now: DateTime<Utc>,
    ) -> TriggerDecision {
        let drifting = Self::drifting_assets(profile);

        // Operator-scheduled one-off rebalances take precedence over the
        // strategy's own cadence.
        if let Some(scheduled) = profile.next_scheduled {
            if now >= scheduled {
                return TriggerDecision::fired(
                    TriggerReason::Scheduled {
                        requested_for: scheduled,
                    },
                    drifting,
                );
            }
        }

        let decision = match &profile.strategy {
            RebalancingStrategy::Threshold { threshold_pct } => {
                Self::threshold(profile, *threshold_pct, drifting)
            }
            RebalancingStrategy::Calendar { next_rebalance, .. } => {
                if now >= *next_rebalance {
                    TriggerDecision::fired(
                        TriggerReason::CalendarDue {
                            scheduled: *next_rebalance,
                        },
                        drifting,
                    )
                } else {
                    TriggerDecision::quiet(drifting)
                }
            }
            RebalancingStrategy::VolatilityTarget { target_vol, tolerance } => {
                Self::volatility_target(history, *target_vol, *tolerance, drifting)
            }
            RebalancingStrategy::RiskParity {
                tolerance,
                target_contributions,
            } => Self::risk_parity(profile, covariance, *tolerance, target_contributions, drifting),
            RebalancingStrategy::Momentum {
                lookback_days,
                signal_threshold,
            } => Self::window_signal(history, *lookback_days, *signal_threshold, false, drifting),
            RebalancingStrategy::MeanReversion {
                lookback_days,
                signal_threshold,
            } => Self::window_signal(history, *lookback_days, *signal_threshold, true, drifting),
        };

        if decision.triggered {
            debug!(
                profile = %profile.name,
                strategy = profile.strategy.name(),
                "rebalance triggered"
            );
        }
        decision
    }

    /// All assets with non-trivial drift, ordered by priority then drift
    /// magnitude descending.
    fn drifting_assets(profile: &RebalancingProfile) -> Vec<AssetDrift> {
        let mut drifting: Vec<AssetDrift> = profile
            .allocations
            .iter()
            .filter(|a| a.drift() > DRIFT_FLOOR)
            .map(|a| AssetDrift {
                asset_id: a.asset_id.clone(),
                drift_pct: a.drift(),
                priority: a.priority,
            })
            .collect();
        drifting.sort_by(|a, b| {
            a.priority.cmp(&b.priority).then(
                b.drift_pct
                    .partial_cmp(&a.drift_pct)
                    .unwrap_or(std::cmp::Ordering::Equal),
            )
        });
        drifting
    }

    fn threshold(
        profile: &RebalancingProfile,
        threshold_pct: f64,
        drifting: Vec<AssetDrift>,
    ) -> TriggerDecision {
        let worst = profile
            .allocations
            .iter()
            .max_by(|a, b| {
                a.drift()
                    .partial_cmp(&b.drift())
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
        match worst {
            Some(asset) if asset.drift() >= threshold_pct => TriggerDecision::fired(
                TriggerReason::ThresholdBreach {
                    asset_id: asset.asset_id.clone(),
                    drift_pct: asset.drift(),
                },
                drifting,
            ),
            _ => TriggerDecision::quiet(drifting),
        }
    }

    fn volatility_target(
        history: &PerformanceSeries,
        target_vol: f64,
        tolerance: f64,
        drifting: Vec<AssetDrift>,
    ) -> TriggerDecision {
        let realized = match Self::realized_volatility(history) {
            Some(vol) => vol,
            None => return TriggerDecision::quiet(drifting),
        };
        if (realized - target_vol).abs() > tolerance {
            TriggerDecision::fired(
                TriggerReason::VolatilityDeviation {
                    realized,
                    target: target_vol,
                },
                drifting,
            )
        } else {
            TriggerDecision::quiet(drifting)
        }
    }

    fn risk_parity(
        profile: &RebalancingProfile,
        covariance: &CovarianceMatrix,
        tolerance: f64,
        targets: &std::collections::HashMap<AssetId, f64>,
        drifting: Vec<AssetDrift>,
    ) -> TriggerDecision {
        let weights: Vec<f64> = profile
            .allocations
            .iter()
            .map(|a| a.current_pct / 100.0)
            .collect();
        let contributions =
            RiskCalculator::risk_contributions(&profile.allocations, &weights, covariance);
        let equal_share = 1.0 / profile.allocations.len().max(1) as f64;

        let mut worst: Option<(AssetId, f64)> = None;
        for contrib in &contributions {
            let target = targets
                .get(&contrib.asset_id)
                .copied()
                .unwrap_or(equal_share);
            let deviation = (contrib.contribution - target).abs();
            if worst.as_ref().map(|(_, d)| deviation > *d).unwrap_or(true) {
                worst = Some((contrib.asset_id.clone(), deviation));
            }
        }
        match worst {
            Some((asset_id, deviation)) if deviation > tolerance => TriggerDecision::fired(
                TriggerReason::RiskContributionDrift { asset_id, deviation },
                drifting,
            ),
            _ => TriggerDecision::quiet(drifting),
        }
    }

    fn window_signal(
        history: &PerformanceSeries,
        lookback_days: usize,
        signal_threshold: f64,
        mean_reversion: bool,
        drifting: Vec<AssetDrift>,
    ) -> TriggerDecision {
        let returns = history.returns();
        if returns.len() < lookback_days || lookback_days == 0 {
            return TriggerDecision::quiet(drifting);
        }
        // Cumulative return over the lookback window.
        let signal = returns[returns.len() - lookback_days..]
            .iter()
            .fold(1.0, |acc, r| acc * (1.0 + r))
            - 1.0;
        if signal.abs() >= signal_threshold {
            let reason = if mean_reversion {
                TriggerReason::MeanReversionSignal { signal }
            } else {
                TriggerReason::MomentumSignal { signal }
            };
            TriggerDecision::fired(reason, drifting)
        } else {
            TriggerDecision::quiet(drifting)
        }
    }

    /// Annualized stdev of periodic returns; `None` with fewer than 2
    /// observations.
    pub fn realized_volatility(history: &PerformanceSeries) -> Option<f64> {
        let returns = history.returns();
        if returns.len() < 2 {
            return None;
        }
        let mean = returns.iter().sum::<f64>() / returns.len() as f64;
        let var = returns.iter().map(|r| (r - mean) * (r - mean)).sum::<f64>()
            / (returns.len() - 1) as f64;
        Some((var * TRADING_DAYS).sqrt())
    }
}
