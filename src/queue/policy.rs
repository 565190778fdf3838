//! Pair selection policies
//!
//! A policy only chooses; it never mutates entries. The queue applies the
//! match-attempt stamps by key after a selection is made.

use crate::types::Entry;
use chrono::{DateTime, Duration, Utc};

/// Default re-offer suppression window in milliseconds
pub const DEFAULT_COOLDOWN_MS: i64 = 30_000;

/// Trait for pair selection algorithms
pub trait MatchPolicy: Send + Sync {
    /// Pick two entries from `ordered`, which is sorted oldest-first
    fn select<'a>(&self, ordered: &'a [Entry], now: DateTime<Utc>)
        -> Option<(&'a Entry, &'a Entry)>;

    /// Whether `entry` may be offered in a pass at `now`
    fn is_eligible(&self, entry: &Entry, now: DateTime<Utc>) -> bool;

    /// Short name used in logs
    fn name(&self) -> &'static str;
}

/// Pairs the two longest-waiting entries that are not cooling down.
///
/// Preference tags are not compared; any two eligible entries can be paired.
#[derive(Debug, Clone)]
pub struct OldestEligiblePolicy {
    cooldown: Duration,
}

impl OldestEligiblePolicy {
    pub fn new(cooldown: Duration) -> Self {
        Self { cooldown }
    }

    pub fn from_millis(cooldown_ms: i64) -> Self {
        Self::new(Duration::milliseconds(cooldown_ms))
    }
}

impl Default for OldestEligiblePolicy {
    fn default() -> Self {
        Self::from_millis(DEFAULT_COOLDOWN_MS)
    }
}

impl MatchPolicy for OldestEligiblePolicy {
    fn select<'a>(
        &self,
        ordered: &'a [Entry],
        now: DateTime<Utc>,
    ) -> Option<(&'a Entry, &'a Entry)> {
        let mut candidates = ordered.iter().filter(|entry| self.is_eligible(entry, now));
        let first = candidates.next()?;
        let second = candidates.next()?;
        Some((first, second))
    }

    fn is_eligible(&self, entry: &Entry, now: DateTime<Utc>) -> bool {
        match entry.last_match_attempt_at {
            None => true,
            Some(offered_at) => now.signed_duration_since(offered_at) > self.cooldown,
        }
    }

    fn name(&self) -> &'static str {
        "oldest-eligible"
    }
}
