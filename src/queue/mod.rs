//! Anonymous two-party matchmaking queue
//!
//! This module holds waiting participants, pairs the longest-waiting eligible
//! ones, and suppresses re-offering a participant during the cooldown window.

pub mod clock;
pub mod match_queue;
pub mod policy;
pub mod store;

// Re-export commonly used types
pub use clock::{Clock, ManualClock, SystemClock};
pub use match_queue::MatchQueue;
pub use policy::{MatchPolicy, OldestEligiblePolicy, DEFAULT_COOLDOWN_MS};
pub use store::{EntryStore, InMemoryEntryStore};
