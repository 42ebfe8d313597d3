//! Performance analytics: return and risk-adjusted metrics over a
//! profile's value history, return attribution against a buy-and-hold
//! baseline, and report generation.

pub mod attribution;
pub mod metrics;
pub mod report;

pub use attribution::{attribute, AssetPeriod, Attribution, AttributionEntry};
pub use metrics::{PerformanceMetrics, PerformanceTracker};
pub use report::{
    compare_strategies, generate_report, ComparisonEntry, PerformanceReport, StrategyComparison,
};
