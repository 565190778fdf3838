//! Utility functions for the matchmaking queue

use crate::types::{PairingId, COMBINED_TAG_SEPARATOR, DEFAULT_PREFERENCE_TAG};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Generate a new unique pairing ID
pub fn generate_pairing_id() -> PairingId {
    Uuid::new_v4()
}

/// Generate an anonymous participant ID (used by the tester and fixtures)
pub fn generate_participant_id() -> String {
    format!("anon-{}", Uuid::new_v4().simple())
}

/// Get the current UTC timestamp
pub fn current_timestamp() -> DateTime<Utc> {
    Utc::now()
}

/// Resolve an optional caller-supplied tag; only a missing tag becomes the
/// default, a supplied one is kept as given
pub fn resolve_preference_tag(tag: Option<&str>) -> String {
    tag.unwrap_or(DEFAULT_PREFERENCE_TAG).to_string()
}

/// Join two preference tags into the pairing label
pub fn combine_tags(tag_a: &str, tag_b: &str) -> String {
    format!("{}{}{}", tag_a, COMBINED_TAG_SEPARATOR, tag_b)
}
