//! Queue configuration

use crate::queue::policy::DEFAULT_COOLDOWN_MS;
use serde::{Deserialize, Serialize};

/// Settings consumed directly by `MatchQueue`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Re-offer suppression window in milliseconds
    pub cooldown_ms: i64,
    /// Upper bound on waiting participants
    pub max_entries: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            cooldown_ms: DEFAULT_COOLDOWN_MS,
            max_entries: 10_000,
        }
    }
}
