use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use bl_types::AssetId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizationKind {
    MeanVariance,
    RiskParity,
    BlackLitterman,
    FactorBased,
}

impl OptimizationKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::MeanVariance => "mean_variance",
            Self::RiskParity => "risk_parity",
            Self::BlackLitterman => "black_litterman",
            Self::FactorBased => "factor_based",
        }
    }
}

/// Terminal solver state. `MaxIterations` still carries the best weights
/// found; callers decide whether that is good enough for them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OptimizationStatus {
    Converged,
    MaxIterations { limit: usize },
}

impl OptimizationStatus {
    pub fn is_converged(&self) -> bool {
        matches!(self, Self::Converged)
    }
}

/// How much the solution moves when one asset's expected return is bumped.
/// Large shifts flag weights that hang on fragile return estimates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensitivityEntry {
    pub asset_id: AssetId,
    pub return_bump: f64,
    /// L1 distance between the base and bumped weight vectors.
    pub weight_shift: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RobustnessStats {
    pub paths: usize,
    pub seed: u64,
    pub mean_return: f64,
    pub worst_return: f64,
    pub best_return: f64,
    pub probability_of_loss: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub id: Uuid,
    pub kind: OptimizationKind,
    pub status: OptimizationStatus,
    /// Solved weights as fractions, aligned with the input asset order.
    pub weights: Vec<(AssetId, f64)>,
    pub expected_return: f64,
    pub volatility: f64,
    pub sharpe_ratio: f64,
    pub iterations: usize,
    pub sensitivity: Vec<SensitivityEntry>,
    pub robustness: Option<RobustnessStats>,
    pub completed_at: DateTime<Utc>,
}

impl OptimizationResult {
    /// Weights as percentages, ready to write back into allocation targets.
    pub fn weights_pct(&self) -> Vec<(AssetId, f64)> {
        self.weights
            .iter()
            .map(|(id, w)| (id.clone(), w * 100.0))
            .collect()
    }

    pub fn weight_of(&self, asset_id: &AssetId) -> Option<f64> {
        self.weights
            .iter()
            .find(|(id, _)| id == asset_id)
            .map(|(_, w)| *w)
    }
}
