//! Test fixtures and mock implementations for integration testing

#![allow(dead_code)]

use async_trait::async_trait;
use duo_queue::config::QueueConfig;
use duo_queue::delivery::PairingSink;
use duo_queue::error::{MatchmakingError, Result};
use duo_queue::queue::{ManualClock, MatchQueue};
use duo_queue::types::PairingNotification;
use std::sync::{Arc, Mutex};

/// How the recording sink answers delivery attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryBehavior {
    Confirm,
    Unconfirmed,
    Fail,
}

/// Pairing sink that captures delivered notifications for testing
#[derive(Debug)]
pub struct RecordingPairingSink {
    delivered: Mutex<Vec<PairingNotification>>,
    behavior: Mutex<DeliveryBehavior>,
}

impl RecordingPairingSink {
    pub fn new() -> Self {
        Self::with_behavior(DeliveryBehavior::Confirm)
    }

    pub fn with_behavior(behavior: DeliveryBehavior) -> Self {
        Self {
            delivered: Mutex::new(Vec::new()),
            behavior: Mutex::new(behavior),
        }
    }

    pub fn set_behavior(&self, behavior: DeliveryBehavior) {
        if let Ok(mut current) = self.behavior.lock() {
            *current = behavior;
        }
    }

    /// Get all notifications handed to the sink (for testing)
    pub fn delivered(&self) -> Vec<PairingNotification> {
        self.delivered
            .lock()
            .map(|delivered| delivered.clone())
            .unwrap_or_default()
    }

    /// Count notifications naming a participant
    pub fn count_for(&self, participant_id: &str) -> usize {
        self.delivered()
            .iter()
            .filter(|n| n.pairing.contains(participant_id))
            .count()
    }
}

impl Default for RecordingPairingSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PairingSink for RecordingPairingSink {
    async fn deliver(&self, notification: &PairingNotification) -> Result<bool> {
        if let Ok(mut delivered) = self.delivered.lock() {
            delivered.push(notification.clone());
        }

        let behavior = self
            .behavior
            .lock()
            .map(|b| *b)
            .unwrap_or(DeliveryBehavior::Confirm);
        match behavior {
            DeliveryBehavior::Confirm => Ok(true),
            DeliveryBehavior::Unconfirmed => Ok(false),
            DeliveryBehavior::Fail => Err(MatchmakingError::DeliveryFailed {
                message: "transport offline".to_string(),
            }
            .into()),
        }
    }
}

/// Queue with the default 30s cooldown on a manual clock starting at 0ms
pub fn create_test_queue() -> (Arc<ManualClock>, Arc<MatchQueue>) {
    create_test_queue_with(QueueConfig::default())
}

pub fn create_test_queue_with(config: QueueConfig) -> (Arc<ManualClock>, Arc<MatchQueue>) {
    let clock = Arc::new(ManualClock::at_millis(0));
    let queue = Arc::new(MatchQueue::new(config).with_clock(clock.clone()));
    (clock, queue)
}

/// Enroll participants one millisecond apart, in order
pub fn enroll_in_order(clock: &ManualClock, queue: &MatchQueue, ids: &[&str]) {
    for id in ids {
        assert!(queue.enroll(id, None), "enroll of '{}' should succeed", id);
        clock.advance_millis(1);
    }
}
