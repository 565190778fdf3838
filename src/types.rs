//! Common types used throughout the matchmaking queue

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque identifier of a connected participant
pub type ParticipantId = String;

/// Unique identifier for an offered pairing
pub type PairingId = Uuid;

/// Preference tag used when the caller does not supply one
pub const DEFAULT_PREFERENCE_TAG: &str = "any";

/// Separator used when joining two preference tags into a label
pub const COMBINED_TAG_SEPARATOR: &str = "/";

/// One waiting participant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub participant_id: ParticipantId,
    pub preference_tag: String,
    pub enrolled_at: DateTime<Utc>,
    /// Tie-breaker for entries enrolled within the same clock tick
    pub arrival_seq: u64,
    pub reconnection_attempts: u32,
    pub last_match_attempt_at: Option<DateTime<Utc>>,
}

impl Entry {
    pub fn new(
        participant_id: ParticipantId,
        preference_tag: String,
        enrolled_at: DateTime<Utc>,
        arrival_seq: u64,
    ) -> Self {
        Self {
            participant_id,
            preference_tag,
            enrolled_at,
            arrival_seq,
            reconnection_attempts: 0,
            last_match_attempt_at: None,
        }
    }

    /// Fairness key: oldest enrollment first, then arrival order
    pub fn fairness_key(&self) -> (DateTime<Utc>, u64) {
        (self.enrolled_at, self.arrival_seq)
    }

    /// How long this entry has been waiting as of `now`
    pub fn waited(&self, now: DateTime<Utc>) -> chrono::Duration {
        now.signed_duration_since(self.enrolled_at)
    }
}

/// Two participants selected to be connected with each other
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pairing {
    pub id_a: ParticipantId,
    pub id_b: ParticipantId,
    /// `tag_a + "/" + tag_b`, informational only
    pub combined_tag: String,
}

impl Pairing {
    pub fn contains(&self, participant_id: &str) -> bool {
        self.id_a == participant_id || self.id_b == participant_id
    }
}

/// Event handed to the transport layer when a pairing is offered
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairingNotification {
    pub pairing_id: PairingId,
    pub pairing: Pairing,
    pub timestamp: DateTime<Utc>,
}

/// Running counters for the queue
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub participants_waiting: usize,
    pub enrollments: u64,
    pub re_enrollments: u64,
    pub withdrawals: u64,
    pub pairings_offered: u64,
    pub internal_faults: u64,
}
