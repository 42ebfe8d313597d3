pub mod allocation;
pub mod asset;
pub mod errors;
pub mod event;
pub mod performance;
pub mod profile;
pub mod strategy;

pub use allocation::*;
pub use asset::*;
pub use errors::*;
pub use event::*;
pub use performance::*;
pub use profile::*;
pub use strategy::*;
