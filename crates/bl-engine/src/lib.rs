//! Orchestration layer for Ballast.
//!
//! Ties the pipeline crates together: profile storage behind
//! [`ProfileRepository`], the tick-driven [`Scheduler`], the deterministic
//! [`Backtester`], and the embedder-facing [`RebalancingService`].

pub mod backtest;
pub mod repository;
mod retarget;
pub mod scheduler;
pub mod service;

pub use backtest::{BacktestConfig, BacktestResult, Backtester};
pub use repository::{InMemoryProfileRepository, PerformanceStore, ProfileRepository};
pub use scheduler::{Scheduler, TickReport};
pub use service::{AnalysisOutcome, RebalancingService};
