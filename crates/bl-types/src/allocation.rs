use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::asset::AssetId;
use crate::errors::{BallastError, BallastResult};

/// Tolerance (in percentage points) for allocation-sum checks.
pub const WEIGHT_EPSILON: f64 = 0.01;

/// Target and current weight of one asset within a rebalancing profile.
///
/// All percentage fields are on a 0–100 scale. `expected_return` and
/// `volatility` are annualized fractions (0.07 = 7%).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetAllocation {
    pub asset_id: AssetId,
    pub target_pct: f64,
    pub current_pct: f64,
    pub min_pct: f64,
    pub max_pct: f64,
    /// Rebalancing priority: lower value = rebalanced first, kept last when
    /// trades must be dropped.
    pub priority: u8,
    pub expected_return: f64,
    pub volatility: f64,
    /// Pairwise correlations against other assets in the profile.
    pub correlations: HashMap<AssetId, f64>,
}

impl AssetAllocation {
    pub fn new(asset_id: impl Into<AssetId>, target_pct: f64) -> Self {
        Self {
            asset_id: asset_id.into(),
            target_pct,
            current_pct: target_pct,
            min_pct: 0.0,
            max_pct: 100.0,
            priority: 5,
            expected_return: 0.0,
            volatility: 0.0,
            correlations: HashMap::new(),
        }
    }

    pub fn with_bounds(mut self, min_pct: f64, max_pct: f64) -> Self {
        self.min_pct = min_pct;
        self.max_pct = max_pct;
        self
    }

    pub fn with_current(mut self, current_pct: f64) -> Self {
        self.current_pct = current_pct;
        self
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_return_profile(mut self, expected_return: f64, volatility: f64) -> Self {
        self.expected_return = expected_return;
        self.volatility = volatility;
        self
    }

    /// Absolute distance between current and target weight, in percentage
    /// points.
    pub fn drift(&self) -> f64 {
        (self.current_pct - self.target_pct).abs()
    }

    /// Signed delta the executor must trade away: positive = underweight
    /// (buy), negative = overweight (sell).
    pub fn weight_delta(&self) -> f64 {
        self.target_pct - self.current_pct
    }

    pub fn is_within_bounds(&self) -> bool {
        self.current_pct >= self.min_pct - WEIGHT_EPSILON
            && self.current_pct <= self.max_pct + WEIGHT_EPSILON
    }

    /// Whether the target itself can be reached given the bounds.
    pub fn target_reachable(&self) -> bool {
        self.target_pct >= self.min_pct - WEIGHT_EPSILON
            && self.target_pct <= self.max_pct + WEIGHT_EPSILON
    }

    pub fn validate(&self) -> BallastResult<()> {
        if self.min_pct > self.max_pct {
            return Err(BallastError::Validation(format!(
                "asset {}: min {} exceeds max {}",
                self.asset_id, self.min_pct, self.max_pct
            )));
        }
        for (label, value) in [
            ("target", self.target_pct),
            ("current", self.current_pct),
            ("min", self.min_pct),
            ("max", self.max_pct),
        ] {
            if !(0.0..=100.0).contains(&value) || !value.is_finite() {
                return Err(BallastError::Validation(format!(
                    "asset {}: {} percentage {} outside 0..=100",
                    self.asset_id, label, value
                )));
            }
        }
        if self.volatility < 0.0 {
            return Err(BallastError::Validation(format!(
                "asset {}: negative volatility",
                self.asset_id
            )));
        }
        Ok(())
    }
}

/// Ordered weight vectors extracted from a slice of allocations, as 0–1
/// fractions aligned with the returned asset list.
pub fn weight_vectors(allocations: &[AssetAllocation]) -> (Vec<AssetId>, Vec<f64>, Vec<f64>) {
    let assets: Vec<AssetId> = allocations.iter().map(|a| a.asset_id.clone()).collect();
    let current: Vec<f64> = allocations.iter().map(|a| a.current_pct / 100.0).collect();
    let target: Vec<f64> = allocations.iter().map(|a| a.target_pct / 100.0).collect();
    (assets, current, target)
}
