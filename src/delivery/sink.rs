//! Pairing sinks for outbound notifications

use crate::error::{MatchmakingError, Result};
use crate::types::PairingNotification;
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

/// Trait for delivering pairing notifications to both participants
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PairingSink: Send + Sync {
    /// Deliver a notification.
    ///
    /// `Ok(true)` confirms both participants were notified, `Ok(false)` means
    /// delivery could not be confirmed yet, and `Err` is a delivery failure.
    async fn deliver(&self, notification: &PairingNotification) -> Result<bool>;
}

/// Sink that pushes notifications into a bounded channel consumed by the
/// transport layer
#[derive(Debug, Clone)]
pub struct ChannelPairingSink {
    sender: mpsc::Sender<PairingNotification>,
    send_timeout: Duration,
}

impl ChannelPairingSink {
    /// Create a sink and the stream the transport reads from
    pub fn channel(
        buffer_size: usize,
        send_timeout: Duration,
    ) -> (Self, ReceiverStream<PairingNotification>) {
        let (sender, receiver) = mpsc::channel(buffer_size.max(1));
        (
            Self {
                sender,
                send_timeout,
            },
            ReceiverStream::new(receiver),
        )
    }

    /// Whether the consuming side has gone away
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

#[async_trait]
impl PairingSink for ChannelPairingSink {
    async fn deliver(&self, notification: &PairingNotification) -> Result<bool> {
        match self
            .sender
            .send_timeout(notification.clone(), self.send_timeout)
            .await
        {
            Ok(()) => {
                debug!(
                    "Pairing {} queued for transport",
                    notification.pairing_id
                );
                Ok(true)
            }
            Err(mpsc::error::SendTimeoutError::Timeout(_)) => {
                warn!(
                    "Pairing {} not delivered within {:?} - transport backlog full",
                    notification.pairing_id, self.send_timeout
                );
                Ok(false)
            }
            Err(mpsc::error::SendTimeoutError::Closed(_)) => {
                Err(MatchmakingError::DeliveryFailed {
                    message: format!(
                        "transport channel closed, pairing {} dropped",
                        notification.pairing_id
                    ),
                }
                .into())
            }
        }
    }
}

/// Sink that only logs pairings; used when no transport is attached
#[derive(Debug, Clone, Default)]
pub struct LoggingPairingSink;

#[async_trait]
impl PairingSink for LoggingPairingSink {
    async fn deliver(&self, notification: &PairingNotification) -> Result<bool> {
        info!(
            "Pairing {} - '{}' <-> '{}' ({})",
            notification.pairing_id,
            notification.pairing.id_a,
            notification.pairing.id_b,
            notification.pairing.combined_tag
        );
        Ok(true)
    }
}
