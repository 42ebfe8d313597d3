//! Constrained portfolio weight optimization.
//!
//! Four solvers share one entry point, [`Optimizer::optimize`]:
//! mean-variance (projected gradient), risk parity (proportional
//! scaling), Black-Litterman (posterior returns fed into mean-variance)
//! and factor-based (optimize in factor space, map back to assets).
//! Every result carries per-asset sensitivity and a seeded Monte-Carlo
//! robustness check, so runs are reproducible.

pub mod black_litterman;
pub mod factor;
pub mod inputs;
pub mod optimizer;
pub mod result;
pub mod risk_parity;
pub mod robustness;
pub mod solver;

pub use black_litterman::posterior_returns;
pub use factor::{covariance_from_factors, FactorModel};
pub use inputs::{MarketView, OptimizerInputs};
pub use optimizer::{Optimizer, OptimizerConfig};
pub use result::{
    OptimizationKind, OptimizationResult, OptimizationStatus, RobustnessStats, SensitivityEntry,
};
pub use solver::project_box_simplex;
