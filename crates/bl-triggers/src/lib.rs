//! Trigger detection: decides if and why a profile is due for a rebalance.

pub mod engine;

pub use engine::{AssetDrift, TriggerDecision, TriggerEngine};
