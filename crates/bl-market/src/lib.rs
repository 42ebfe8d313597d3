//! External collaborator boundaries for Ballast.
//!
//! Everything the engine consumes from the outside world comes through the
//! traits here: market data ([`MarketDataFeed`]), trade execution
//! ([`ExecutionVenue`]), transaction costs ([`CostModel`]), and time
//! ([`Clock`]). Tests and backtests inject deterministic implementations.

pub mod clock;
pub mod cost;
pub mod feed;
pub mod venue;

pub use clock::{Clock, FixedClock, SystemClock};
pub use cost::{CostModel, FlatBpsCost, TieredCost};
pub use feed::{HistoricalFeed, MarketDataFeed, MarketSnapshot, Quote, StaticFeed};
pub use venue::{ExecutionVenue, SimulatedVenue, VenueFill};
