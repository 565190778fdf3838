//! duo-queue - Anonymous two-party matchmaking
//!
//! This crate provides a thread-safe waiting queue that pairs participants
//! oldest-first, suppresses re-offers to the same participant for a cooldown
//! window, and a small service layer that drives it on a cadence.

pub mod config;
pub mod delivery;
pub mod error;
pub mod metrics;
pub mod queue;
pub mod service;
pub mod types;
pub mod utils;

// Re-export commonly used types and traits
pub use error::{MatchmakingError, Result};
pub use types::*;

// Re-export key components
pub use delivery::PairingSink;
pub use queue::MatchQueue;
pub use service::Matchmaker;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
