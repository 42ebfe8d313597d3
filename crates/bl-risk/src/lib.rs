//! Risk assessment pipeline for Ballast.
//!
//! Provides:
//! - Portfolio-level risk metrics (volatility, drawdown, concentration,
//!   risk contributions, VaR / Expected Shortfall)
//! - Scenario stress testing with shock propagation
//! - Threshold monitoring with replace-not-duplicate alert semantics

pub mod alerts;
pub mod metrics;
pub mod monitor;
pub mod stress;

pub use alerts::{AlertLevel, RecommendedAction, RiskAlert, RiskMetricKind};
pub use metrics::{RiskAssessment, RiskCalculator, RiskContribution};
pub use monitor::RiskMonitor;
pub use stress::{StressResult, StressScenario};
