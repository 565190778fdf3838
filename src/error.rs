//! Error types for the matchmaking queue
//!
//! Internal plumbing uses anyhow for propagation; the queue boundary
//! downgrades every error to a `false`/`None` outcome.

/// Result type alias for convenience
pub type Result<T> = anyhow::Result<T>;

/// Custom error types for specific matchmaking scenarios
#[derive(Debug, thiserror::Error)]
pub enum MatchmakingError {
    #[error("Entry storage unavailable: {message}")]
    StorageUnavailable { message: String },

    #[error("Participant not found: {participant_id}")]
    ParticipantNotFound { participant_id: String },

    #[error("Pairing delivery failed: {message}")]
    DeliveryFailed { message: String },

    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },
}
