//! Main application state and service coordination
//!
//! This module contains the production AppState that wires the queue, the
//! matchmaking driver, metrics, and background tasks together.

use crate::config::{validate_config, AppConfig};
use crate::delivery::ChannelPairingSink;
use crate::metrics::{HealthServer, HealthServerConfig, MetricsCollector, MetricsService};
use crate::queue::MatchQueue;
use crate::service::health::{HealthCheck, ServiceStatus};
use crate::service::matchmaker::{Matchmaker, MatchmakerConfig};
use crate::types::PairingNotification;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tracing::{debug, error, info, warn};

/// How long a tick waits for room in the pairing channel
const DELIVERY_TIMEOUT: Duration = Duration::from_millis(500);

/// Interval of the health metrics refresh task
const HEALTH_METRICS_INTERVAL: Duration = Duration::from_secs(30);

/// Service-level errors
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Service initialization error: {message}")]
    Initialization { message: String },
}

/// Main application state containing all service components
pub struct AppState {
    /// Application configuration
    config: AppConfig,

    /// Matchmaking driver, which owns the queue handle
    matchmaker: Arc<Matchmaker>,

    /// Metrics service for monitoring and health checks
    metrics_service: Arc<MetricsService>,

    /// Consumer side of the pairing channel until a transport takes it
    pairing_stream: Option<ReceiverStream<PairingNotification>>,

    /// Background task handles
    background_tasks: Vec<JoinHandle<()>>,

    /// Service status
    is_running: Arc<RwLock<bool>>,

    started_at: Instant,
}

impl AppState {
    /// Initialize the application with all dependencies
    pub async fn new(config: AppConfig) -> Result<Self, ServiceError> {
        info!("Initializing duo-queue matchmaking service");

        validate_config(&config).map_err(|e| ServiceError::Configuration {
            message: e.to_string(),
        })?;

        let metrics_collector =
            Arc::new(
                MetricsCollector::new().map_err(|e| ServiceError::Initialization {
                    message: format!("Failed to create metrics collector: {}", e),
                })?,
            );

        let queue_config = config.queue_config();
        info!(
            "Queue configuration - cooldown: {}ms, max size: {}, tick: {}ms",
            queue_config.cooldown_ms, queue_config.max_entries, config.matchmaking.tick_interval_ms
        );
        let queue = Arc::new(MatchQueue::new(queue_config).with_metrics(metrics_collector.clone()));

        let (sink, pairing_stream) =
            ChannelPairingSink::channel(config.matchmaking.pairing_buffer_size, DELIVERY_TIMEOUT);

        let matchmaker_config = MatchmakerConfig {
            default_preference_tag: config.matchmaking.default_preference_tag.clone(),
            withdraw_on_delivery: config.matchmaking.withdraw_on_delivery,
        };
        let matchmaker = Arc::new(
            Matchmaker::new(queue, Arc::new(sink), matchmaker_config)
                .with_metrics(metrics_collector.clone()),
        );

        let is_running = Arc::new(RwLock::new(false));
        let started_at = Instant::now();

        let status = ServiceStatus {
            service_name: config.service.name.clone(),
            matchmaker: matchmaker.clone(),
            is_running: is_running.clone(),
            max_queue_size: config.matchmaking.max_queue_size,
            started_at,
        };

        let health_config = HealthServerConfig {
            port: config.service.health_port,
            host: "0.0.0.0".to_string(),
        };
        let health_server = Arc::new(
            HealthServer::new(health_config, metrics_collector.clone()).with_status(status),
        );
        let metrics_service = Arc::new(MetricsService::new(metrics_collector, health_server));

        Ok(Self {
            config,
            matchmaker,
            metrics_service,
            pairing_stream: Some(pairing_stream),
            background_tasks: Vec::new(),
            is_running,
            started_at,
        })
    }

    /// Start all background services
    pub async fn start(&mut self) -> Result<(), ServiceError> {
        info!("Starting duo-queue matchmaking service");

        *self.is_running.write().await = true;

        self.start_metrics_service().await;
        self.start_pairing_drain();
        self.start_background_tasks();

        info!("✅ duo-queue matchmaking service started successfully");
        Ok(())
    }

    /// Perform graceful shutdown
    pub async fn shutdown(&mut self) -> Result<(), ServiceError> {
        info!("Starting graceful shutdown of duo-queue service");

        *self.is_running.write().await = false;

        self.stop_background_tasks().await;

        info!("Stopping metrics service...");
        if let Err(e) = self.metrics_service.stop().await {
            warn!("Failed to stop metrics service: {}", e);
        } else {
            info!("✅ Metrics service stopped");
        }

        let final_stats = self.matchmaker.queue().stats();
        info!(
            "Final queue statistics: {:?}, delivery: {:?}",
            final_stats,
            self.matchmaker.stats()
        );
        info!("✅ duo-queue service shutdown completed");

        Ok(())
    }

    /// Get service configuration
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Check if service is running
    pub async fn is_running(&self) -> bool {
        *self.is_running.read().await
    }

    /// Get the matchmaking driver used for connect/disconnect events
    pub fn matchmaker(&self) -> Arc<Matchmaker> {
        self.matchmaker.clone()
    }

    /// Get the match queue
    pub fn queue(&self) -> Arc<MatchQueue> {
        self.matchmaker.queue()
    }

    /// Get metrics service
    pub fn metrics_service(&self) -> Arc<MetricsService> {
        self.metrics_service.clone()
    }

    /// Handles for health reporting
    pub fn status(&self) -> ServiceStatus {
        ServiceStatus {
            service_name: self.config.service.name.clone(),
            matchmaker: self.matchmaker.clone(),
            is_running: self.is_running.clone(),
            max_queue_size: self.config.matchmaking.max_queue_size,
            started_at: self.started_at,
        }
    }

    /// Take the stream of offered pairings for a transport to deliver.
    ///
    /// Must be called before `start`; otherwise pairings are drained to the log.
    pub fn take_pairing_stream(&mut self) -> Option<ReceiverStream<PairingNotification>> {
        self.pairing_stream.take()
    }

    /// Start metrics service
    async fn start_metrics_service(&mut self) {
        info!("Starting metrics and health endpoints");

        let metrics_service = self.metrics_service.clone();
        let port = self.config.service.health_port;

        let metrics_handle = tokio::spawn(async move {
            if let Err(e) = metrics_service.start().await {
                error!("Metrics service failed: {}", e);
            } else {
                info!("Metrics service task completed");
            }
        });

        self.background_tasks.push(metrics_handle);

        // Give the server a moment to start up
        tokio::time::sleep(Duration::from_millis(100)).await;

        info!("✅ Metrics service started on port {}", port);
    }

    /// Without a transport, log every pairing so the channel never backs up
    fn start_pairing_drain(&mut self) {
        let Some(mut stream) = self.pairing_stream.take() else {
            debug!("Pairing stream owned by transport - no drain task");
            return;
        };

        warn!("No transport attached - pairings will only be logged");
        let drain_task = tokio::spawn(async move {
            while let Some(notification) = stream.next().await {
                match serde_json::to_string(&notification) {
                    Ok(json) => info!("Pairing notification: {}", json),
                    Err(e) => warn!("Failed to serialize pairing notification: {}", e),
                }
            }
            debug!("Pairing drain task stopped");
        });

        self.background_tasks.push(drain_task);
    }

    /// Start background maintenance tasks
    fn start_background_tasks(&mut self) {
        info!(
            "Starting matchmaking ticker ({}ms interval)...",
            self.config.matchmaking.tick_interval_ms
        );
        let ticker_task = {
            let matchmaker = self.matchmaker.clone();
            let is_running = self.is_running.clone();
            let period = self.config.tick_interval();

            tokio::spawn(async move {
                matchmaker.run(period, is_running).await;
            })
        };

        info!(
            "Starting health metrics task ({}s interval)...",
            HEALTH_METRICS_INTERVAL.as_secs()
        );
        let health_metrics_task = {
            let metrics_collector = self.metrics_service.collector();
            let status = self.status();

            tokio::spawn(async move {
                let mut interval = tokio::time::interval(HEALTH_METRICS_INTERVAL);
                info!("Health metrics task started");

                while status.is_running().await {
                    interval.tick().await;

                    metrics_collector
                        .service()
                        .uptime_seconds
                        .set(status.started_at.elapsed().as_secs() as i64);
                    metrics_collector.set_queue_size(status.matchmaker.queue().len());

                    match HealthCheck::check(&status).await {
                        Ok(health) => {
                            metrics_collector.update_health_status(health.status.as_gauge());
                            for check in &health.checks {
                                metrics_collector.update_component_health(
                                    &check.name,
                                    check.status != crate::service::HealthStatus::Unhealthy,
                                );
                            }
                            debug!(
                                "Health metrics updated - status: {}, waiting: {}",
                                health.status, health.stats.participants_waiting
                            );
                        }
                        Err(e) => warn!("Health check failed: {}", e),
                    }
                }

                info!("Health metrics task stopped");
            })
        };

        self.background_tasks.push(ticker_task);
        self.background_tasks.push(health_metrics_task);

        info!("2 background tasks started successfully");
    }

    /// Stop all background tasks
    async fn stop_background_tasks(&mut self) {
        let task_count = self.background_tasks.len();
        if task_count == 0 {
            info!("No background tasks to stop");
            return;
        }

        info!("Stopping {} background tasks...", task_count);

        for (i, task) in self.background_tasks.drain(..).enumerate() {
            debug!("Aborting background task {}/{}", i + 1, task_count);
            task.abort();
        }

        info!("✅ All {} background tasks stopped", task_count);
    }
}
