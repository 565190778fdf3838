//! Matchmaking driver
//!
//! `Matchmaker` performs the caller duties around `MatchQueue`: it enrolls on
//! connect, withdraws on disconnect, runs matchmaking passes on a cadence,
//! hands pairings to a `PairingSink`, and withdraws both participants once
//! delivery is confirmed.

use crate::delivery::PairingSink;
use crate::metrics::MetricsCollector;
use crate::queue::MatchQueue;
use crate::types::{Pairing, PairingNotification, DEFAULT_PREFERENCE_TAG};
use crate::utils::generate_pairing_id;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Configuration for the matchmaking driver
#[derive(Debug, Clone)]
pub struct MatchmakerConfig {
    /// Tag used when a participant connects without a preference
    pub default_preference_tag: String,
    /// Withdraw both participants once delivery is confirmed
    pub withdraw_on_delivery: bool,
}

impl Default for MatchmakerConfig {
    fn default() -> Self {
        Self {
            default_preference_tag: DEFAULT_PREFERENCE_TAG.to_string(),
            withdraw_on_delivery: true,
        }
    }
}

/// Result of one matchmaking tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// A previous tick was still running
    Skipped,
    /// Fewer than two eligible participants
    NoMatch,
    /// Pairing delivered and confirmed
    Delivered(Pairing),
    /// Pairing handed off but not confirmed; both stay queued under cooldown
    Unconfirmed(Pairing),
    /// Delivery failed; both stay queued under cooldown
    Failed(Pairing),
}

/// Counters for the driver
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MatchmakerStats {
    pub ticks_run: u64,
    pub ticks_skipped: u64,
    pub pairings_delivered: u64,
    pub deliveries_unconfirmed: u64,
    pub deliveries_failed: u64,
}

#[derive(Debug, Default)]
struct AtomicStats {
    ticks_run: AtomicU64,
    ticks_skipped: AtomicU64,
    pairings_delivered: AtomicU64,
    deliveries_unconfirmed: AtomicU64,
    deliveries_failed: AtomicU64,
}

/// Clears the in-progress flag when a tick finishes, including on panic
struct TickGuard<'a>(&'a AtomicBool);

impl Drop for TickGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Drives a `MatchQueue` on behalf of the transport layer
pub struct Matchmaker {
    queue: Arc<MatchQueue>,
    sink: Arc<dyn PairingSink>,
    config: MatchmakerConfig,
    metrics_collector: Option<Arc<MetricsCollector>>,
    tick_in_progress: AtomicBool,
    stats: AtomicStats,
}

impl Matchmaker {
    pub fn new(
        queue: Arc<MatchQueue>,
        sink: Arc<dyn PairingSink>,
        config: MatchmakerConfig,
    ) -> Self {
        Self {
            queue,
            sink,
            config,
            metrics_collector: None,
            tick_in_progress: AtomicBool::new(false),
            stats: AtomicStats::default(),
        }
    }

    /// Attach a metrics collector
    pub fn with_metrics(mut self, metrics_collector: Arc<MetricsCollector>) -> Self {
        self.metrics_collector = Some(metrics_collector);
        self
    }

    /// The queue being driven
    pub fn queue(&self) -> Arc<MatchQueue> {
        self.queue.clone()
    }

    /// A participant connected and wants a partner
    pub fn on_connect(&self, participant_id: &str, preference_tag: Option<&str>) -> bool {
        if participant_id.is_empty() {
            warn!("Connect ignored - transport supplied an empty participant id");
            return false;
        }
        let tag = preference_tag
            .map(str::trim)
            .filter(|tag| !tag.is_empty())
            .unwrap_or(&self.config.default_preference_tag);
        self.queue.enroll(participant_id, Some(tag))
    }

    /// A participant disconnected
    pub fn on_disconnect(&self, participant_id: &str) -> bool {
        self.queue.withdraw(participant_id)
    }

    /// The transport is retrying a participant's connection
    pub fn on_reconnect_attempt(&self, participant_id: &str) -> Option<u32> {
        self.queue.record_reconnection_attempt(participant_id)
    }

    /// Run one matchmaking pass and deliver its pairing, if any.
    ///
    /// Overlapping calls are skipped rather than queued.
    pub async fn tick(&self) -> TickOutcome {
        if self
            .tick_in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Matchmaking tick skipped - previous tick still running");
            self.stats.ticks_skipped.fetch_add(1, Ordering::Relaxed);
            if let Some(metrics) = &self.metrics_collector {
                metrics.record_tick(true, Duration::ZERO);
            }
            return TickOutcome::Skipped;
        }
        let _guard = TickGuard(&self.tick_in_progress);

        let timer = self.metrics_collector.as_ref().map(|m| m.start_timer());
        self.stats.ticks_run.fetch_add(1, Ordering::Relaxed);
        let outcome = self.run_pass().await;

        if let (Some(metrics), Some(timer)) = (&self.metrics_collector, timer) {
            metrics.record_tick(false, timer.stop());
        }
        outcome
    }

    async fn run_pass(&self) -> TickOutcome {
        let pairing = match self.queue.attempt_match() {
            Some(pairing) => pairing,
            None => return TickOutcome::NoMatch,
        };

        let now = self.queue.now();
        let wait_times: Vec<Duration> = [&pairing.id_a, &pairing.id_b]
            .into_iter()
            .filter_map(|id| self.queue.entry(id))
            .filter_map(|entry| entry.waited(now).to_std().ok())
            .collect();

        let notification = PairingNotification {
            pairing_id: generate_pairing_id(),
            pairing: pairing.clone(),
            timestamp: now,
        };

        // The queue lock is not held here; delivery may take a while
        match self.sink.deliver(&notification).await {
            Ok(true) => {
                if self.config.withdraw_on_delivery {
                    self.queue.withdraw(&pairing.id_a);
                    self.queue.withdraw(&pairing.id_b);
                }
                info!(
                    "Pairing {} delivered - '{}' <-> '{}'",
                    notification.pairing_id, pairing.id_a, pairing.id_b
                );
                self.stats.pairings_delivered.fetch_add(1, Ordering::Relaxed);
                if let Some(metrics) = &self.metrics_collector {
                    metrics.record_delivery("delivered");
                    for waited in wait_times {
                        metrics.record_wait_time(waited);
                    }
                }
                TickOutcome::Delivered(pairing)
            }
            Ok(false) => {
                warn!(
                    "Pairing {} unconfirmed - '{}' and '{}' stay queued until cooldown expires",
                    notification.pairing_id, pairing.id_a, pairing.id_b
                );
                self.stats
                    .deliveries_unconfirmed
                    .fetch_add(1, Ordering::Relaxed);
                if let Some(metrics) = &self.metrics_collector {
                    metrics.record_delivery("unconfirmed");
                }
                TickOutcome::Unconfirmed(pairing)
            }
            Err(e) => {
                warn!(
                    "Pairing {} delivery failed for '{}' <-> '{}': {}",
                    notification.pairing_id, pairing.id_a, pairing.id_b, e
                );
                self.stats.deliveries_failed.fetch_add(1, Ordering::Relaxed);
                if let Some(metrics) = &self.metrics_collector {
                    metrics.record_delivery("failed");
                }
                TickOutcome::Failed(pairing)
            }
        }
    }

    /// Tick on a fixed interval until `is_running` turns false
    pub async fn run(self: Arc<Self>, period: Duration, is_running: Arc<RwLock<bool>>) {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!("Matchmaking ticker started ({:?} interval)", period);

        while *is_running.read().await {
            interval.tick().await;

            match self.tick().await {
                TickOutcome::Delivered(pairing) => {
                    debug!("Tick paired '{}' with '{}'", pairing.id_a, pairing.id_b)
                }
                TickOutcome::NoMatch => debug!(
                    "Tick found no pairing - {} participants waiting",
                    self.queue.len()
                ),
                other => debug!("Tick finished: {:?}", other),
            }
        }

        info!("Matchmaking ticker stopped");
    }

    /// Snapshot of the driver counters
    pub fn stats(&self) -> MatchmakerStats {
        MatchmakerStats {
            ticks_run: self.stats.ticks_run.load(Ordering::Relaxed),
            ticks_skipped: self.stats.ticks_skipped.load(Ordering::Relaxed),
            pairings_delivered: self.stats.pairings_delivered.load(Ordering::Relaxed),
            deliveries_unconfirmed: self.stats.deliveries_unconfirmed.load(Ordering::Relaxed),
            deliveries_failed: self.stats.deliveries_failed.load(Ordering::Relaxed),
        }
    }
}
