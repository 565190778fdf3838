//! Service layer for the duo-queue matchmaking service
//!
//! This module contains the matchmaking driver, the application state, and
//! background task management for the production service.

pub mod app;
pub mod health;
pub mod matchmaker;

pub use app::{AppState, ServiceError};
pub use health::{HealthCheck, HealthStatus, ServiceStatus};
pub use matchmaker::{Matchmaker, MatchmakerConfig, MatchmakerStats, TickOutcome};
