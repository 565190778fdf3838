//! Metrics collection using Prometheus
//!
//! This module provides metrics collection for the duo-queue service using
//! Prometheus metrics.

use anyhow::Result;
use prometheus::{
    Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec,
    Opts, Registry,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Main metrics collector for the matchmaking service
#[derive(Clone)]
pub struct MetricsCollector {
    /// Prometheus registry
    registry: Arc<Registry>,

    /// Service-level metrics
    service_metrics: ServiceMetrics,

    /// Queue metrics
    queue_metrics: QueueMetrics,

    /// Delivery metrics
    delivery_metrics: DeliveryMetrics,
}

/// Service-level metrics
#[derive(Clone)]
pub struct ServiceMetrics {
    /// Service uptime in seconds
    pub uptime_seconds: IntGauge,

    /// Health check status (0=unhealthy, 1=degraded, 2=healthy)
    pub health_status: IntGauge,

    /// Component health status
    pub component_health: IntGaugeVec,
}

/// Queue metrics
#[derive(Clone)]
pub struct QueueMetrics {
    /// Participants currently waiting
    pub participants_waiting: IntGauge,

    /// Enrollments, labelled "new" or "refresh"
    pub enrollments_total: IntCounterVec,

    /// Participants removed from the queue
    pub withdrawals_total: IntCounter,

    /// Pairings offered by matchmaking passes
    pub pairings_offered_total: IntCounter,

    /// Faults caught at the queue boundary, by operation
    pub internal_faults_total: IntCounterVec,

    /// Duration of queue operations
    pub operation_duration: HistogramVec,
}

/// Pairing delivery metrics
#[derive(Clone)]
pub struct DeliveryMetrics {
    /// Delivery outcomes (delivered, unconfirmed, failed)
    pub deliveries_total: IntCounterVec,

    /// Matchmaking ticks, labelled "ran" or "skipped"
    pub ticks_total: IntCounterVec,

    /// Full tick duration including delivery
    pub tick_duration: Histogram,

    /// How long participants waited before a confirmed pairing
    pub wait_time_seconds: Histogram,
}

impl MetricsCollector {
    /// Create a new metrics collector with default registry
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());
        Self::with_registry(registry)
    }

    /// Create a new metrics collector with custom registry
    pub fn with_registry(registry: Arc<Registry>) -> Result<Self> {
        let service_metrics = ServiceMetrics::new(&registry)?;
        let queue_metrics = QueueMetrics::new(&registry)?;
        let delivery_metrics = DeliveryMetrics::new(&registry)?;

        Ok(Self {
            registry,
            service_metrics,
            queue_metrics,
            delivery_metrics,
        })
    }

    /// Get the Prometheus registry
    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    /// Get service metrics
    pub fn service(&self) -> &ServiceMetrics {
        &self.service_metrics
    }

    /// Get queue metrics
    pub fn queue(&self) -> &QueueMetrics {
        &self.queue_metrics
    }

    /// Get delivery metrics
    pub fn delivery(&self) -> &DeliveryMetrics {
        &self.delivery_metrics
    }

    /// Record a successful enroll
    pub fn record_enrollment(&self, refreshed: bool) {
        let kind = if refreshed { "refresh" } else { "new" };
        self.queue_metrics
            .enrollments_total
            .with_label_values(&[kind])
            .inc();
    }

    /// Record a participant leaving the queue
    pub fn record_withdrawal(&self) {
        self.queue_metrics.withdrawals_total.inc();
    }

    /// Record a pairing being offered
    pub fn record_pairing_offered(&self) {
        self.queue_metrics.pairings_offered_total.inc();
    }

    /// Record a fault caught at the queue boundary
    pub fn record_internal_fault(&self, operation: &str) {
        self.queue_metrics
            .internal_faults_total
            .with_label_values(&[operation])
            .inc();
    }

    /// Record queue operation duration
    pub fn record_queue_operation(&self, operation: &str, duration: Duration) {
        self.queue_metrics
            .operation_duration
            .with_label_values(&[operation])
            .observe(duration.as_secs_f64());
    }

    /// Update the waiting participants gauge
    pub fn set_queue_size(&self, size: usize) {
        self.queue_metrics.participants_waiting.set(size as i64);
    }

    /// Record the outcome of handing a pairing to the transport
    pub fn record_delivery(&self, outcome: &str) {
        self.delivery_metrics
            .deliveries_total
            .with_label_values(&[outcome])
            .inc();
    }

    /// Record a matchmaking tick
    pub fn record_tick(&self, skipped: bool, duration: Duration) {
        let status = if skipped { "skipped" } else { "ran" };
        self.delivery_metrics
            .ticks_total
            .with_label_values(&[status])
            .inc();
        if !skipped {
            self.delivery_metrics
                .tick_duration
                .observe(duration.as_secs_f64());
        }
    }

    /// Record how long a participant waited before being paired
    pub fn record_wait_time(&self, waited: Duration) {
        self.delivery_metrics
            .wait_time_seconds
            .observe(waited.as_secs_f64());
    }

    /// Update health status
    pub fn update_health_status(&self, status: u8) {
        self.service_metrics.health_status.set(status as i64);
    }

    /// Update component health
    pub fn update_component_health(&self, component: &str, healthy: bool) {
        let status = if healthy { 1 } else { 0 };
        self.service_metrics
            .component_health
            .with_label_values(&[component])
            .set(status);
    }

    /// Create a timer for measuring operation duration
    pub fn start_timer(&self) -> MetricsTimer {
        MetricsTimer::new()
    }
}

/// Timer for measuring operation durations
pub struct MetricsTimer {
    start: Instant,
}

impl MetricsTimer {
    fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get the elapsed duration
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Stop the timer and return the duration
    pub fn stop(self) -> Duration {
        self.elapsed()
    }
}

impl ServiceMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let uptime_seconds =
            IntGauge::new("duo_queue_uptime_seconds", "Service uptime in seconds")?;
        registry.register(Box::new(uptime_seconds.clone()))?;

        let health_status = IntGauge::new(
            "duo_queue_health_status",
            "Health status (0=unhealthy, 1=degraded, 2=healthy)",
        )?;
        registry.register(Box::new(health_status.clone()))?;

        let component_health = IntGaugeVec::new(
            Opts::new("duo_queue_component_health", "Component health status"),
            &["component"],
        )?;
        registry.register(Box::new(component_health.clone()))?;

        Ok(Self {
            uptime_seconds,
            health_status,
            component_health,
        })
    }
}

impl QueueMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let participants_waiting = IntGauge::new(
            "duo_queue_participants_waiting",
            "Participants currently waiting in queue",
        )?;
        registry.register(Box::new(participants_waiting.clone()))?;

        let enrollments_total = IntCounterVec::new(
            Opts::new("duo_queue_enrollments_total", "Total enrollments"),
            &["kind"],
        )?;
        registry.register(Box::new(enrollments_total.clone()))?;

        let withdrawals_total =
            IntCounter::new("duo_queue_withdrawals_total", "Total withdrawals")?;
        registry.register(Box::new(withdrawals_total.clone()))?;

        let pairings_offered_total = IntCounter::new(
            "duo_queue_pairings_offered_total",
            "Total pairings offered",
        )?;
        registry.register(Box::new(pairings_offered_total.clone()))?;

        let internal_faults_total = IntCounterVec::new(
            Opts::new(
                "duo_queue_internal_faults_total",
                "Faults caught at the queue boundary",
            ),
            &["operation"],
        )?;
        registry.register(Box::new(internal_faults_total.clone()))?;

        let operation_duration = HistogramVec::new(
            HistogramOpts::new(
                "duo_queue_operation_duration_seconds",
                "Queue operation duration",
            )
            .buckets(vec![0.00001, 0.0001, 0.001, 0.005, 0.01, 0.05, 0.1]),
            &["operation"],
        )?;
        registry.register(Box::new(operation_duration.clone()))?;

        Ok(Self {
            participants_waiting,
            enrollments_total,
            withdrawals_total,
            pairings_offered_total,
            internal_faults_total,
            operation_duration,
        })
    }
}

impl DeliveryMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let deliveries_total = IntCounterVec::new(
            Opts::new("duo_queue_deliveries_total", "Pairing delivery outcomes"),
            &["outcome"],
        )?;
        registry.register(Box::new(deliveries_total.clone()))?;

        let ticks_total = IntCounterVec::new(
            Opts::new("duo_queue_ticks_total", "Matchmaking ticks"),
            &["status"],
        )?;
        registry.register(Box::new(ticks_total.clone()))?;

        let tick_duration = Histogram::with_opts(
            HistogramOpts::new(
                "duo_queue_tick_duration_seconds",
                "Matchmaking tick duration",
            )
            .buckets(vec![0.0001, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]),
        )?;
        registry.register(Box::new(tick_duration.clone()))?;

        let wait_time_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "duo_queue_wait_time_seconds",
                "Time waited before a confirmed pairing",
            )
            .buckets(vec![1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0]),
        )?;
        registry.register(Box::new(wait_time_seconds.clone()))?;

        Ok(Self {
            deliveries_total,
            ticks_total,
            tick_duration,
            wait_time_seconds,
        })
    }
}
