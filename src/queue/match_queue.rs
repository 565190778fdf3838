//! The two-party match queue
//!
//! Every public operation is a total function: storage faults are caught at
//! the operation boundary, logged, counted, and reported as `false`/`None`
//! with the queue left as it was before the call.

use crate::config::QueueConfig;
use crate::error::{MatchmakingError, Result};
use crate::metrics::MetricsCollector;
use crate::queue::clock::{Clock, SystemClock};
use crate::queue::policy::{MatchPolicy, OldestEligiblePolicy};
use crate::queue::store::{EntryStore, InMemoryEntryStore};
use crate::types::{Entry, Pairing, QueueStats};
use crate::utils::{combine_tags, resolve_preference_tag};
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// State guarded by the queue lock
struct QueueState {
    store: Box<dyn EntryStore>,
    next_arrival_seq: u64,
    stats: QueueStats,
}

/// Outcome of a successful enroll, used for logging and metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EnrollOutcome {
    Inserted,
    Refreshed,
}

/// Queue of participants waiting to be paired
pub struct MatchQueue {
    state: Mutex<QueueState>,
    clock: Arc<dyn Clock>,
    policy: Box<dyn MatchPolicy>,
    metrics_collector: Option<Arc<MetricsCollector>>,
    internal_faults: AtomicU64,
}

impl MatchQueue {
    /// Create a queue with in-memory storage, the system clock, and the
    /// oldest-eligible policy using the configured cooldown
    pub fn new(config: QueueConfig) -> Self {
        Self {
            state: Mutex::new(QueueState {
                store: Box::new(InMemoryEntryStore::new(config.max_entries)),
                next_arrival_seq: 0,
                stats: QueueStats::default(),
            }),
            clock: Arc::new(SystemClock::new()),
            policy: Box::new(OldestEligiblePolicy::from_millis(config.cooldown_ms)),
            metrics_collector: None,
            internal_faults: AtomicU64::new(0),
        }
    }

    /// Replace the time source
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the entry storage. Entries, counters, and arrival order start
    /// over with the new store
    pub fn with_store(mut self, store: Box<dyn EntryStore>) -> Self {
        self.state = Mutex::new(QueueState {
            store,
            next_arrival_seq: 0,
            stats: QueueStats::default(),
        });
        self.internal_faults = AtomicU64::new(0);
        self
    }

    /// Replace the selection policy
    pub fn with_policy(mut self, policy: Box<dyn MatchPolicy>) -> Self {
        self.policy = policy;
        self
    }

    /// Attach a metrics collector
    pub fn with_metrics(mut self, metrics_collector: Arc<MetricsCollector>) -> Self {
        self.metrics_collector = Some(metrics_collector);
        self
    }

    /// Add a participant, or refresh their entry if already queued.
    ///
    /// A missing tag becomes `"any"`; a supplied tag is stored as given.
    /// Returns `false` only on an internal fault; the caller may retry.
    pub fn enroll(&self, participant_id: &str, preference_tag: Option<&str>) -> bool {
        let start_time = Instant::now();
        let tag = resolve_preference_tag(preference_tag);

        let result = {
            let mut state = self.lock_state("enroll");
            let now = self.clock.now();
            Self::try_enroll(&mut state, participant_id, tag.clone(), now)
        };

        self.record_duration("enroll", start_time);

        match result {
            Ok(EnrollOutcome::Inserted) => {
                info!(
                    "Participant '{}' enrolled - tag: '{}'",
                    participant_id, tag
                );
                if let Some(metrics) = &self.metrics_collector {
                    metrics.record_enrollment(false);
                }
                self.publish_size();
                true
            }
            Ok(EnrollOutcome::Refreshed) => {
                info!(
                    "Participant '{}' re-enrolled - tag: '{}', position refreshed",
                    participant_id, tag
                );
                if let Some(metrics) = &self.metrics_collector {
                    metrics.record_enrollment(true);
                }
                true
            }
            Err(e) => {
                self.record_fault("enroll", &e);
                false
            }
        }
    }

    /// Offer the two longest-waiting eligible participants to each other.
    ///
    /// Both entries stay queued and are stamped so they are not re-offered
    /// until the cooldown has passed. Removal is the caller's job once the
    /// pairing is confirmed.
    pub fn attempt_match(&self) -> Option<Pairing> {
        let start_time = Instant::now();

        let result = {
            let mut state = self.lock_state("attempt_match");
            let now = self.clock.now();
            self.try_attempt_match(&mut state, now)
        };

        self.record_duration("attempt_match", start_time);

        match result {
            Ok(Some(pairing)) => {
                info!(
                    "Pairing offered - '{}' <-> '{}', tags: {}, policy: {}",
                    pairing.id_a,
                    pairing.id_b,
                    pairing.combined_tag,
                    self.policy.name()
                );
                if let Some(metrics) = &self.metrics_collector {
                    metrics.record_pairing_offered();
                }
                Some(pairing)
            }
            Ok(None) => None,
            Err(e) => {
                self.record_fault("attempt_match", &e);
                None
            }
        }
    }

    /// Remove a participant. Returns whether an entry was removed.
    pub fn withdraw(&self, participant_id: &str) -> bool {
        let start_time = Instant::now();

        let result = {
            let mut state = self.lock_state("withdraw");
            Self::try_withdraw(&mut state, participant_id)
        };

        self.record_duration("withdraw", start_time);

        match result {
            Ok(Some(entry)) => {
                info!(
                    "Participant '{}' withdrawn after {}ms in queue",
                    participant_id,
                    entry.waited(self.clock.now()).num_milliseconds()
                );
                if let Some(metrics) = &self.metrics_collector {
                    metrics.record_withdrawal();
                }
                self.publish_size();
                true
            }
            Ok(None) => {
                debug!("Withdraw ignored - '{}' is not queued", participant_id);
                false
            }
            Err(e) => {
                self.record_fault("withdraw", &e);
                false
            }
        }
    }

    /// Bump the reconnection counter of a queued participant.
    ///
    /// Returns the new count, or `None` if the participant is not queued.
    pub fn record_reconnection_attempt(&self, participant_id: &str) -> Option<u32> {
        let result = {
            let mut state = self.lock_state("record_reconnection_attempt");
            Self::try_record_reconnection(&mut state, participant_id)
        };

        match result {
            Ok(attempts) => {
                debug!(
                    "Reconnection attempt {} recorded for '{}'",
                    attempts, participant_id
                );
                Some(attempts)
            }
            Err(e) => match e.downcast_ref::<MatchmakingError>() {
                Some(MatchmakingError::ParticipantNotFound { .. }) => None,
                _ => {
                    self.record_fault("record_reconnection_attempt", &e);
                    None
                }
            },
        }
    }

    /// Number of queued participants (0 if storage is unavailable)
    pub fn len(&self) -> usize {
        let result = {
            let state = self.lock_state("len");
            state.store.len()
        };
        match result {
            Ok(len) => len,
            Err(e) => {
                self.record_fault("len", &e);
                0
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, participant_id: &str) -> bool {
        self.entry(participant_id).is_some()
    }

    /// Copy of one participant's entry
    pub fn entry(&self, participant_id: &str) -> Option<Entry> {
        let result = {
            let state = self.lock_state("entry");
            state.store.get(participant_id)
        };
        match result {
            Ok(entry) => entry,
            Err(e) => {
                self.record_fault("entry", &e);
                None
            }
        }
    }

    /// All entries in fairness order (oldest first)
    pub fn snapshot(&self) -> Vec<Entry> {
        let result = {
            let state = self.lock_state("snapshot");
            state.store.all()
        };
        match result {
            Ok(mut entries) => {
                entries.sort_by_key(Entry::fairness_key);
                entries
            }
            Err(e) => {
                self.record_fault("snapshot", &e);
                Vec::new()
            }
        }
    }

    /// Counters accumulated since the queue was created
    pub fn stats(&self) -> QueueStats {
        let mut stats = {
            let state = self.lock_state("stats");
            let mut stats = state.stats.clone();
            stats.participants_waiting = state.store.len().unwrap_or(0);
            stats
        };
        stats.internal_faults = self.internal_faults.load(Ordering::Relaxed);
        stats
    }

    /// Current time according to the queue's clock
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Name of the active selection policy
    pub fn policy_name(&self) -> &'static str {
        self.policy.name()
    }

    fn try_enroll(
        state: &mut QueueState,
        participant_id: &str,
        tag: String,
        now: DateTime<Utc>,
    ) -> Result<EnrollOutcome> {
        let arrival_seq = state.next_arrival_seq;
        let outcome = match state.store.get(participant_id)? {
            Some(mut existing) => {
                existing.preference_tag = tag;
                existing.enrolled_at = now;
                existing.arrival_seq = arrival_seq;
                existing.reconnection_attempts = 0;
                state.store.upsert(existing)?;
                EnrollOutcome::Refreshed
            }
            None => {
                let entry = Entry::new(participant_id.to_string(), tag, now, arrival_seq);
                state.store.upsert(entry)?;
                EnrollOutcome::Inserted
            }
        };

        // Only advance counters once the store accepted the write
        state.next_arrival_seq += 1;
        match outcome {
            EnrollOutcome::Inserted => state.stats.enrollments += 1,
            EnrollOutcome::Refreshed => state.stats.re_enrollments += 1,
        }

        Ok(outcome)
    }

    fn try_attempt_match(
        &self,
        state: &mut QueueState,
        now: DateTime<Utc>,
    ) -> Result<Option<Pairing>> {
        let mut ordered = state.store.all()?;
        if ordered.len() < 2 {
            return Ok(None);
        }

        ordered.sort_by_key(Entry::fairness_key);

        let (first, second) = match self.policy.select(&ordered, now) {
            Some((first, second)) => (first.clone(), second.clone()),
            None => {
                debug!(
                    "No pairing - {} queued, fewer than 2 eligible",
                    ordered.len()
                );
                return Ok(None);
            }
        };

        Self::stamp_pair(state.store.as_mut(), &first, &second, now)?;
        state.stats.pairings_offered += 1;

        Ok(Some(Pairing {
            combined_tag: combine_tags(&first.preference_tag, &second.preference_tag),
            id_a: first.participant_id,
            id_b: second.participant_id,
        }))
    }

    /// Stamp both entries or neither
    fn stamp_pair(
        store: &mut dyn EntryStore,
        first: &Entry,
        second: &Entry,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut stamped_first = first.clone();
        stamped_first.last_match_attempt_at = Some(now);
        store.upsert(stamped_first)?;

        let mut stamped_second = second.clone();
        stamped_second.last_match_attempt_at = Some(now);
        if let Err(e) = store.upsert(stamped_second) {
            if let Err(rollback_err) = store.upsert(first.clone()) {
                error!(
                    "Failed to roll back match stamp for '{}': {}",
                    first.participant_id, rollback_err
                );
            }
            return Err(e);
        }

        Ok(())
    }

    fn try_withdraw(state: &mut QueueState, participant_id: &str) -> Result<Option<Entry>> {
        let removed = state.store.remove(participant_id)?;
        if removed.is_some() {
            state.stats.withdrawals += 1;
        }
        Ok(removed)
    }

    fn try_record_reconnection(state: &mut QueueState, participant_id: &str) -> Result<u32> {
        let mut entry = state.store.get(participant_id)?.ok_or_else(|| {
            MatchmakingError::ParticipantNotFound {
                participant_id: participant_id.to_string(),
            }
        })?;

        entry.reconnection_attempts = entry.reconnection_attempts.saturating_add(1);
        let attempts = entry.reconnection_attempts;
        state.store.upsert(entry)?;
        Ok(attempts)
    }

    /// Acquire the queue lock, recovering from poisoning.
    ///
    /// Operations only write to the store after every fallible read has
    /// succeeded, so a panic mid-operation cannot leave a half-applied change.
    fn lock_state(&self, operation: &str) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|poisoned| {
            warn!("Queue lock was poisoned, recovering in {}", operation);
            self.state.clear_poison();
            poisoned.into_inner()
        })
    }

    fn record_fault(&self, operation: &str, error: &anyhow::Error) {
        self.internal_faults.fetch_add(1, Ordering::Relaxed);
        error!("Queue operation '{}' failed: {:#}", operation, error);
        if let Some(metrics) = &self.metrics_collector {
            metrics.record_internal_fault(operation);
        }
    }

    fn record_duration(&self, operation: &str, start_time: Instant) {
        if let Some(metrics) = &self.metrics_collector {
            metrics.record_queue_operation(operation, start_time.elapsed());
        }
    }

    fn publish_size(&self) {
        if let Some(metrics) = &self.metrics_collector {
            metrics.set_queue_size(self.len());
        }
    }
}

impl Default for MatchQueue {
    fn default() -> Self {
        Self::new(QueueConfig::default())
    }
}

impl std::fmt::Debug for MatchQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatchQueue")
            .field("policy", &self.policy.name())
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::clock::ManualClock;

    fn create_test_queue() -> (MatchQueue, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::at_millis(0));
        let queue = MatchQueue::new(QueueConfig::default()).with_clock(clock.clone());
        (queue, clock)
    }

    /// Store that fails on demand, wrapping the in-memory store
    struct FlakyStore {
        inner: InMemoryEntryStore,
        fail_reads: bool,
        /// Number of successful writes allowed before writes start failing
        writes_before_failure: Option<usize>,
    }

    impl FlakyStore {
        fn new() -> Self {
            Self {
                inner: InMemoryEntryStore::new(100),
                fail_reads: false,
                writes_before_failure: None,
            }
        }

        fn write_allowed(&mut self) -> Result<()> {
            match self.writes_before_failure.as_mut() {
                Some(0) => Err(MatchmakingError::StorageUnavailable {
                    message: "injected write failure".to_string(),
                }
                .into()),
                Some(remaining) => {
                    *remaining -= 1;
                    Ok(())
                }
                None => Ok(()),
            }
        }

        fn read_allowed(&self) -> Result<()> {
            if self.fail_reads {
                return Err(MatchmakingError::StorageUnavailable {
                    message: "injected read failure".to_string(),
                }
                .into());
            }
            Ok(())
        }
    }

    impl EntryStore for FlakyStore {
        fn get(&self, participant_id: &str) -> Result<Option<Entry>> {
            self.read_allowed()?;
            self.inner.get(participant_id)
        }

        fn upsert(&mut self, entry: Entry) -> Result<Option<Entry>> {
            self.write_allowed()?;
            self.inner.upsert(entry)
        }

        fn remove(&mut self, participant_id: &str) -> Result<Option<Entry>> {
            self.write_allowed()?;
            self.inner.remove(participant_id)
        }

        fn all(&self) -> Result<Vec<Entry>> {
            self.read_allowed()?;
            self.inner.all()
        }

        fn len(&self) -> Result<usize> {
            self.inner.len()
        }
    }

    #[test]
    fn test_enroll_new_participant() {
        let (queue, _clock) = create_test_queue();

        assert!(queue.enroll("alice", None));

        let entry = queue.entry("alice").unwrap();
        assert_eq!(entry.preference_tag, "any");
        assert_eq!(entry.reconnection_attempts, 0);
        assert!(entry.last_match_attempt_at.is_none());
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_re_enroll_updates_in_place() {
        let (queue, clock) = create_test_queue();

        assert!(queue.enroll("alice", Some("music")));
        queue.record_reconnection_attempt("alice");
        queue.record_reconnection_attempt("alice");
        clock.advance_millis(500);

        assert!(queue.enroll("alice", Some("sports")));

        assert_eq!(queue.len(), 1);
        let entry = queue.entry("alice").unwrap();
        assert_eq!(entry.preference_tag, "sports");
        assert_eq!(entry.enrolled_at.timestamp_millis(), 500);
        assert_eq!(entry.reconnection_attempts, 0);
    }

    #[test]
    fn test_re_enroll_moves_to_back_of_queue() {
        let (queue, clock) = create_test_queue();

        queue.enroll("alice", None);
        clock.advance_millis(10);
        queue.enroll("bob", None);
        clock.advance_millis(10);
        queue.enroll("carol", None);
        clock.advance_millis(10);
        queue.enroll("alice", None);

        let pairing = queue.attempt_match().unwrap();
        assert_eq!(pairing.id_a, "bob");
        assert_eq!(pairing.id_b, "carol");
    }

    #[test]
    fn test_re_enroll_keeps_match_stamp() {
        let (queue, clock) = create_test_queue();

        queue.enroll("alice", None);
        queue.enroll("bob", None);
        assert!(queue.attempt_match().is_some());

        clock.advance_millis(100);
        queue.enroll("alice", Some("chill"));

        let entry = queue.entry("alice").unwrap();
        assert_eq!(entry.last_match_attempt_at.unwrap().timestamp_millis(), 0);
        assert!(queue.attempt_match().is_none());
    }

    #[test]
    fn test_empty_id_is_an_ordinary_id() {
        let (queue, _clock) = create_test_queue();

        assert!(queue.enroll("", Some("any")));
        assert!(queue.contains(""));
        assert_eq!(queue.len(), 1);
        assert!(queue.withdraw(""));
        assert!(queue.is_empty());
        assert_eq!(queue.stats().internal_faults, 0);
    }

    #[test]
    fn test_supplied_tags_are_stored_verbatim() {
        let (queue, clock) = create_test_queue();

        queue.enroll("a", Some(" music "));
        clock.advance_millis(1);
        queue.enroll("b", Some(""));

        assert_eq!(queue.entry("a").unwrap().preference_tag, " music ");
        assert_eq!(queue.entry("b").unwrap().preference_tag, "");
        let pairing = queue.attempt_match().unwrap();
        assert_eq!(pairing.combined_tag, " music /");
    }

    #[test]
    fn test_with_store_starts_counters_over() {
        let clock = Arc::new(ManualClock::at_millis(0));
        let queue = MatchQueue::default().with_clock(clock);
        assert!(queue.enroll("alice", None));
        assert!(queue.enroll("bob", None));
        assert!(queue.attempt_match().is_some());

        let queue = queue.with_store(Box::new(InMemoryEntryStore::new(10)));

        assert!(queue.is_empty());
        assert_eq!(queue.stats(), QueueStats::default());
        assert!(queue.enroll("carol", None));
        assert_eq!(queue.entry("carol").unwrap().arrival_seq, 0);
        assert_eq!(queue.stats().enrollments, 1);
    }

    #[test]
    fn test_attempt_match_needs_two_participants() {
        let (queue, _clock) = create_test_queue();

        assert!(queue.attempt_match().is_none());

        queue.enroll("alice", None);
        assert!(queue.attempt_match().is_none());
        assert!(queue.entry("alice").unwrap().last_match_attempt_at.is_none());
    }

    #[test]
    fn test_oldest_two_are_paired() {
        let (queue, clock) = create_test_queue();

        queue.enroll("a", Some("music"));
        clock.advance_millis(10);
        queue.enroll("b", Some("sports"));
        clock.advance_millis(10);
        queue.enroll("c", None);

        let pairing = queue.attempt_match().unwrap();
        assert_eq!(pairing.id_a, "a");
        assert_eq!(pairing.id_b, "b");
        assert_eq!(pairing.combined_tag, "music/sports");

        // Both sides stay queued until the caller withdraws them
        assert_eq!(queue.len(), 3);
        assert!(queue.entry("a").unwrap().last_match_attempt_at.is_some());
        assert!(queue.entry("b").unwrap().last_match_attempt_at.is_some());
        assert!(queue.entry("c").unwrap().last_match_attempt_at.is_none());
    }

    #[test]
    fn test_same_timestamp_uses_arrival_order() {
        let (queue, _clock) = create_test_queue();

        queue.enroll("first", None);
        queue.enroll("second", None);
        queue.enroll("third", None);

        let pairing = queue.attempt_match().unwrap();
        assert_eq!(pairing.id_a, "first");
        assert_eq!(pairing.id_b, "second");
    }

    #[test]
    fn test_cooldown_suppresses_re_offer() {
        let (queue, clock) = create_test_queue();

        queue.enroll("a", None);
        queue.enroll("b", None);
        assert!(queue.attempt_match().is_some());

        clock.advance_millis(1_000);
        assert!(queue.attempt_match().is_none());

        clock.advance_millis(29_000);
        assert!(queue.attempt_match().is_none(), "boundary is exclusive");

        clock.advance_millis(1);
        let pairing = queue.attempt_match().unwrap();
        assert_eq!((pairing.id_a.as_str(), pairing.id_b.as_str()), ("a", "b"));
    }

    #[test]
    fn test_third_participant_waits_for_cooldown() {
        let (queue, clock) = create_test_queue();

        queue.enroll("a", None);
        clock.advance_millis(10);
        queue.enroll("b", None);
        assert!(queue.attempt_match().is_some());

        clock.advance_millis(10);
        queue.enroll("c", None);
        assert!(queue.attempt_match().is_none());

        // After expiry the withdrawn side is gone; the survivor pairs with c
        queue.withdraw("a");
        clock.advance_millis(30_001);
        let pairing = queue.attempt_match().unwrap();
        assert_eq!(pairing.id_a, "b");
        assert_eq!(pairing.id_b, "c");
    }

    #[test]
    fn test_withdraw_offered_participant() {
        let (queue, clock) = create_test_queue();

        queue.enroll("a", None);
        queue.enroll("b", None);
        queue.enroll("c", None);
        queue.attempt_match().unwrap();

        assert!(queue.withdraw("a"));
        assert!(!queue.contains("a"));

        clock.advance_millis(30_001);
        let pairing = queue.attempt_match().unwrap();
        assert!(!pairing.contains("a"));
    }

    #[test]
    fn test_withdraw_unknown_participant() {
        let (queue, _clock) = create_test_queue();
        queue.enroll("alice", None);

        assert!(!queue.withdraw("nobody"));
        assert_eq!(queue.len(), 1);
        assert!(queue.withdraw("alice"));
        assert!(!queue.withdraw("alice"));
    }

    #[test]
    fn test_reconnection_counter() {
        let (queue, _clock) = create_test_queue();

        assert_eq!(queue.record_reconnection_attempt("ghost"), None);

        queue.enroll("alice", None);
        assert_eq!(queue.record_reconnection_attempt("alice"), Some(1));
        assert_eq!(queue.record_reconnection_attempt("alice"), Some(2));

        // Matching and withdrawing do not touch the counter
        queue.enroll("bob", None);
        queue.attempt_match();
        assert_eq!(queue.entry("alice").unwrap().reconnection_attempts, 2);
        assert_eq!(queue.stats().internal_faults, 0);
    }

    #[test]
    fn test_snapshot_is_fairness_ordered() {
        let (queue, clock) = create_test_queue();

        queue.enroll("c", None);
        clock.advance_millis(5);
        queue.enroll("a", None);
        clock.advance_millis(5);
        queue.enroll("b", None);

        let ids: Vec<_> = queue
            .snapshot()
            .into_iter()
            .map(|e| e.participant_id)
            .collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }

    #[test]
    fn test_stats_track_operations() {
        let (queue, _clock) = create_test_queue();

        queue.enroll("a", None);
        queue.enroll("b", None);
        queue.enroll("a", None);
        queue.attempt_match();
        queue.withdraw("a");
        queue.withdraw("missing");

        let stats = queue.stats();
        assert_eq!(stats.enrollments, 2);
        assert_eq!(stats.re_enrollments, 1);
        assert_eq!(stats.pairings_offered, 1);
        assert_eq!(stats.withdrawals, 1);
        assert_eq!(stats.participants_waiting, 1);
        assert_eq!(stats.internal_faults, 0);
    }

    #[test]
    fn test_enroll_at_capacity_fails_cleanly() {
        let clock = Arc::new(ManualClock::at_millis(0));
        let queue = MatchQueue::new(QueueConfig {
            max_entries: 2,
            ..QueueConfig::default()
        })
        .with_clock(clock);

        assert!(queue.enroll("a", None));
        assert!(queue.enroll("b", None));
        assert!(!queue.enroll("c", None));

        assert_eq!(queue.len(), 2);
        assert!(!queue.contains("c"));
        assert_eq!(queue.stats().internal_faults, 1);

        // Still usable; re-enrolling an existing participant works at capacity
        assert!(queue.enroll("a", Some("chill")));
        assert!(queue.withdraw("b"));
        assert!(queue.enroll("c", None));
    }

    #[test]
    fn test_read_fault_reports_none() {
        let clock = Arc::new(ManualClock::at_millis(0));
        let mut store = FlakyStore::new();
        store.fail_reads = true;
        let queue = MatchQueue::default()
            .with_clock(clock)
            .with_store(Box::new(store));

        assert!(queue.attempt_match().is_none());
        assert!(!queue.enroll("alice", None));
        assert!(queue.snapshot().is_empty());
        assert_eq!(queue.stats().internal_faults, 3);
    }

    #[test]
    fn test_stamp_fault_reports_none() {
        let clock = Arc::new(ManualClock::at_millis(0));
        let mut store = FlakyStore::new();
        // Two enrolls and the first stamp succeed, every later write fails
        store.writes_before_failure = Some(3);
        let queue = MatchQueue::default()
            .with_clock(clock)
            .with_store(Box::new(store));

        assert!(queue.enroll("a", None));
        assert!(queue.enroll("b", None));

        assert!(queue.attempt_match().is_none());
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.stats().pairings_offered, 0);
        assert_eq!(queue.stats().internal_faults, 1);
    }

    /// Fails only the writes for one participant
    struct FailOneStore {
        inner: InMemoryEntryStore,
        failing_id: &'static str,
    }

    impl EntryStore for FailOneStore {
        fn get(&self, id: &str) -> Result<Option<Entry>> {
            self.inner.get(id)
        }

        fn upsert(&mut self, entry: Entry) -> Result<Option<Entry>> {
            if entry.participant_id == self.failing_id {
                return Err(anyhow::anyhow!("injected write failure"));
            }
            self.inner.upsert(entry)
        }

        fn remove(&mut self, id: &str) -> Result<Option<Entry>> {
            self.inner.remove(id)
        }

        fn all(&self) -> Result<Vec<Entry>> {
            self.inner.all()
        }

        fn len(&self) -> Result<usize> {
            self.inner.len()
        }
    }

    #[test]
    fn test_failed_second_stamp_rolls_back_first() {
        let clock = Arc::new(ManualClock::at_millis(0));
        let mut inner = InMemoryEntryStore::new(10);
        let now = clock.now();
        inner
            .upsert(Entry::new("a".to_string(), "any".to_string(), now, 0))
            .unwrap();
        inner
            .upsert(Entry::new("b".to_string(), "any".to_string(), now, 1))
            .unwrap();

        let queue = MatchQueue::default()
            .with_clock(clock)
            .with_store(Box::new(FailOneStore {
                inner,
                failing_id: "b",
            }));

        assert!(queue.attempt_match().is_none());
        assert!(queue.entry("a").unwrap().last_match_attempt_at.is_none());
        assert!(queue.entry("b").unwrap().last_match_attempt_at.is_none());
        assert_eq!(queue.stats().internal_faults, 1);
    }

    #[test]
    fn test_withdraw_fault_leaves_entry() {
        let clock = Arc::new(ManualClock::at_millis(0));
        let mut store = FlakyStore::new();
        store.writes_before_failure = Some(1);
        let queue = MatchQueue::default()
            .with_clock(clock)
            .with_store(Box::new(store));

        assert!(queue.enroll("alice", None));
        assert!(!queue.withdraw("alice"));
        assert!(queue.contains("alice"));
        assert_eq!(queue.stats().withdrawals, 0);
    }

    #[test]
    fn test_metrics_are_recorded() {
        let metrics = Arc::new(MetricsCollector::new().unwrap());
        let queue = MatchQueue::default().with_metrics(metrics.clone());

        queue.enroll("a", None);
        queue.enroll("b", None);
        queue.attempt_match();
        queue.withdraw("a");

        assert_eq!(metrics.queue().participants_waiting.get(), 1);
        assert_eq!(metrics.queue().pairings_offered_total.get(), 1);
        assert_eq!(
            metrics
                .queue()
                .enrollments_total
                .with_label_values(&["new"])
                .get(),
            2
        );
    }
}
