//! Health check reporting
//!
//! This module provides health check functionality for the duo-queue service,
//! including readiness and liveness checks.

use crate::service::matchmaker::Matchmaker;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;

/// Fraction of queue capacity at which the queue reports as degraded
const QUEUE_PRESSURE_THRESHOLD: f64 = 0.9;

/// Health check status
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    /// Numeric form used by the health status gauge
    pub fn as_gauge(&self) -> u8 {
        match self {
            HealthStatus::Healthy => 2,
            HealthStatus::Degraded => 1,
            HealthStatus::Unhealthy => 0,
        }
    }

    /// Combine with another component status, keeping the worse one
    fn worst(self, other: &HealthStatus) -> HealthStatus {
        match (&self, other) {
            (HealthStatus::Unhealthy, _) | (_, HealthStatus::Unhealthy) => HealthStatus::Unhealthy,
            (HealthStatus::Degraded, _) | (_, HealthStatus::Degraded) => HealthStatus::Degraded,
            _ => HealthStatus::Healthy,
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "✅ healthy"),
            HealthStatus::Degraded => write!(f, "⚠️  degraded"),
            HealthStatus::Unhealthy => write!(f, "❌ unhealthy"),
        }
    }
}

/// Handles needed to assess service health
#[derive(Clone)]
pub struct ServiceStatus {
    pub service_name: String,
    pub matchmaker: Arc<Matchmaker>,
    pub is_running: Arc<RwLock<bool>>,
    pub max_queue_size: usize,
    pub started_at: Instant,
}

impl ServiceStatus {
    pub async fn is_running(&self) -> bool {
        *self.is_running.read().await
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheck {
    /// Overall service status
    pub status: HealthStatus,
    /// Service name
    pub service: String,
    /// Service version
    pub version: String,
    /// Current timestamp
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// Detailed component checks
    pub checks: Vec<ComponentCheck>,
    /// Service statistics
    pub stats: ServiceStats,
}

/// Individual component health check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentCheck {
    /// Component name
    pub name: String,
    /// Component status
    pub status: HealthStatus,
    /// Optional error message if not healthy
    pub message: Option<String>,
    /// Check duration in milliseconds
    pub duration_ms: u64,
}

/// Service statistics for health reporting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceStats {
    /// Participants currently waiting
    pub participants_waiting: usize,
    /// Pairings offered since service start
    pub pairings_offered: u64,
    /// Pairings delivered and confirmed since service start
    pub pairings_delivered: u64,
    /// Faults caught at the queue boundary
    pub internal_faults: u64,
    /// Service uptime in seconds
    pub uptime_seconds: u64,
}

impl HealthCheck {
    /// Perform a full health check of the service
    pub async fn check(status: &ServiceStatus) -> Result<Self> {
        let mut checks = Vec::new();
        let mut overall_status = HealthStatus::Healthy;

        let service_check = Self::check_service_running(status).await;
        overall_status = overall_status.worst(&service_check.status);
        checks.push(service_check);

        let queue_check = Self::check_match_queue(status);
        overall_status = overall_status.worst(&queue_check.status);
        checks.push(queue_check);

        let delivery_check = Self::check_delivery(status);
        overall_status = overall_status.worst(&delivery_check.status);
        checks.push(delivery_check);

        Ok(HealthCheck {
            status: overall_status,
            service: status.service_name.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: chrono::Utc::now(),
            checks,
            stats: Self::gather_service_stats(status),
        })
    }

    /// Simple liveness check - just verify service is running
    pub async fn liveness_check(status: &ServiceStatus) -> Result<HealthStatus> {
        if status.is_running().await {
            Ok(HealthStatus::Healthy)
        } else {
            Ok(HealthStatus::Unhealthy)
        }
    }

    /// Readiness check - verify service can accept participants
    pub async fn readiness_check(status: &ServiceStatus) -> Result<HealthStatus> {
        if !status.is_running().await {
            return Ok(HealthStatus::Unhealthy);
        }

        Ok(Self::check_match_queue(status).status)
    }

    async fn check_service_running(status: &ServiceStatus) -> ComponentCheck {
        let start = Instant::now();

        let (health, message) = if status.is_running().await {
            (HealthStatus::Healthy, None)
        } else {
            (
                HealthStatus::Unhealthy,
                Some("Service is not running".to_string()),
            )
        };

        ComponentCheck {
            name: "service_running".to_string(),
            status: health,
            message,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    /// Queue is degraded when close to capacity
    fn check_match_queue(status: &ServiceStatus) -> ComponentCheck {
        let start = Instant::now();
        let waiting = status.matchmaker.queue().len();
        let limit = (status.max_queue_size as f64 * QUEUE_PRESSURE_THRESHOLD) as usize;

        let (health, message) = if waiting >= status.max_queue_size {
            (
                HealthStatus::Unhealthy,
                Some(format!("Queue full ({} participants)", waiting)),
            )
        } else if waiting >= limit {
            (
                HealthStatus::Degraded,
                Some(format!(
                    "Queue near capacity ({}/{})",
                    waiting, status.max_queue_size
                )),
            )
        } else {
            (HealthStatus::Healthy, None)
        };

        ComponentCheck {
            name: "match_queue".to_string(),
            status: health,
            message,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    /// Delivery is degraded when more pairings failed than went through
    fn check_delivery(status: &ServiceStatus) -> ComponentCheck {
        let start = Instant::now();
        let stats = status.matchmaker.stats();

        let (health, message) = if stats.deliveries_failed > stats.pairings_delivered {
            (
                HealthStatus::Degraded,
                Some(format!(
                    "{} failed deliveries vs {} delivered",
                    stats.deliveries_failed, stats.pairings_delivered
                )),
            )
        } else {
            (HealthStatus::Healthy, None)
        };

        ComponentCheck {
            name: "pairing_delivery".to_string(),
            status: health,
            message,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    fn gather_service_stats(status: &ServiceStatus) -> ServiceStats {
        let queue_stats = status.matchmaker.queue().stats();
        let matchmaker_stats = status.matchmaker.stats();

        ServiceStats {
            participants_waiting: queue_stats.participants_waiting,
            pairings_offered: queue_stats.pairings_offered,
            pairings_delivered: matchmaker_stats.pairings_delivered,
            internal_faults: queue_stats.internal_faults,
            uptime_seconds: status.started_at.elapsed().as_secs(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| anyhow::anyhow!("Failed to serialize health check: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QueueConfig;
    use crate::delivery::LoggingPairingSink;
    use crate::queue::MatchQueue;
    use crate::service::matchmaker::MatchmakerConfig;

    fn create_status(max_queue_size: usize, running: bool) -> ServiceStatus {
        let queue = Arc::new(MatchQueue::new(QueueConfig {
            max_entries: max_queue_size,
            ..QueueConfig::default()
        }));
        let matchmaker = Arc::new(Matchmaker::new(
            queue,
            Arc::new(LoggingPairingSink),
            MatchmakerConfig::default(),
        ));
        ServiceStatus {
            service_name: "duo-queue-test".to_string(),
            matchmaker,
            is_running: Arc::new(RwLock::new(running)),
            max_queue_size,
            started_at: Instant::now(),
        }
    }

    #[tokio::test]
    async fn test_healthy_when_running() {
        let status = create_status(100, true);
        status.matchmaker.on_connect("alice", None);

        let health = HealthCheck::check(&status).await.unwrap();
        assert_eq!(health.status, HealthStatus::Healthy);
        assert_eq!(health.checks.len(), 3);
        assert_eq!(health.stats.participants_waiting, 1);
        assert!(health.to_json().unwrap().contains("match_queue"));
    }

    #[tokio::test]
    async fn test_unhealthy_when_stopped() {
        let status = create_status(100, false);

        let health = HealthCheck::check(&status).await.unwrap();
        assert_eq!(health.status, HealthStatus::Unhealthy);
        assert_eq!(
            HealthCheck::liveness_check(&status).await.unwrap(),
            HealthStatus::Unhealthy
        );
        assert_eq!(
            HealthCheck::readiness_check(&status).await.unwrap(),
            HealthStatus::Unhealthy
        );
    }

    #[tokio::test]
    async fn test_degraded_near_capacity() {
        let status = create_status(10, true);
        for i in 0..9 {
            status.matchmaker.on_connect(&format!("p{}", i), None);
        }

        assert_eq!(
            HealthCheck::readiness_check(&status).await.unwrap(),
            HealthStatus::Degraded
        );

        status.matchmaker.on_connect("p9", None);
        assert_eq!(
            HealthCheck::readiness_check(&status).await.unwrap(),
            HealthStatus::Unhealthy
        );
    }

    #[test]
    fn test_status_gauge_values() {
        assert_eq!(HealthStatus::Healthy.as_gauge(), 2);
        assert_eq!(HealthStatus::Degraded.as_gauge(), 1);
        assert_eq!(HealthStatus::Unhealthy.as_gauge(), 0);
        assert_eq!(
            HealthStatus::Healthy.worst(&HealthStatus::Degraded),
            HealthStatus::Degraded
        );
    }
}
