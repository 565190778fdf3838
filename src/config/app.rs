//! Main application configuration
//!
//! This module defines the primary configuration structures for the duo-queue
//! service, including environment variable loading, TOML files and validation.

use crate::config::queue::QueueConfig;
use crate::error::MatchmakingError;
use crate::types::DEFAULT_PREFERENCE_TAG;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub service: ServiceSettings,
    pub matchmaking: MatchmakingSettings,
}

/// Service-level settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    /// Service name for logging and metrics
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Port for health check and metrics endpoint
    pub health_port: u16,
    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_seconds: u64,
}

/// Matchmaking-specific settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchmakingSettings {
    /// Interval between matchmaking passes in milliseconds
    pub tick_interval_ms: u64,
    /// Re-offer suppression window in milliseconds
    pub cooldown_ms: i64,
    /// Tag used when a participant does not state a preference
    pub default_preference_tag: String,
    /// Maximum number of waiting participants
    pub max_queue_size: usize,
    /// Capacity of the outbound pairing channel
    pub pairing_buffer_size: usize,
    /// Withdraw both participants once a pairing has been delivered
    pub withdraw_on_delivery: bool,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            name: "duo-queue".to_string(),
            log_level: "info".to_string(),
            health_port: 8080,
            shutdown_timeout_seconds: 30,
        }
    }
}

impl Default for MatchmakingSettings {
    fn default() -> Self {
        let queue = QueueConfig::default();
        Self {
            tick_interval_ms: 1_500,
            cooldown_ms: queue.cooldown_ms,
            default_preference_tag: DEFAULT_PREFERENCE_TAG.to_string(),
            max_queue_size: queue.max_entries,
            pairing_buffer_size: 256,
            withdraw_on_delivery: true,
        }
    }
}

/// Read and parse an environment variable if it is set
fn parse_env<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| anyhow!("Invalid {} value: {}", name, raw)),
        Err(_) => Ok(None),
    }
}

impl AppConfig {
    /// Load configuration from environment variables with fallback to defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        validate_config(&config)?;
        Ok(config)
    }

    /// Load configuration from a TOML file; environment variables still
    /// override file values
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config = Self::from_toml_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.apply_env()?;
        validate_config(&config)?;
        Ok(config)
    }

    /// Parse configuration from TOML text without validation
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    fn apply_env(&mut self) -> Result<()> {
        // Service settings
        if let Ok(name) = env::var("SERVICE_NAME") {
            self.service.name = name;
        }
        if let Ok(log_level) = env::var("LOG_LEVEL") {
            self.service.log_level = log_level;
        }
        if let Some(port) = parse_env("HEALTH_PORT")? {
            self.service.health_port = port;
        }
        if let Some(timeout) = parse_env("SHUTDOWN_TIMEOUT_SECONDS")? {
            self.service.shutdown_timeout_seconds = timeout;
        }

        // Matchmaking settings
        if let Some(interval) = parse_env("MATCH_TICK_INTERVAL_MS")? {
            self.matchmaking.tick_interval_ms = interval;
        }
        if let Some(cooldown) = parse_env("MATCH_COOLDOWN_MS")? {
            self.matchmaking.cooldown_ms = cooldown;
        }
        if let Ok(tag) = env::var("DEFAULT_PREFERENCE_TAG") {
            self.matchmaking.default_preference_tag = tag;
        }
        if let Some(size) = parse_env("MAX_QUEUE_SIZE")? {
            self.matchmaking.max_queue_size = size;
        }
        if let Some(size) = parse_env("PAIRING_BUFFER_SIZE")? {
            self.matchmaking.pairing_buffer_size = size;
        }
        if let Some(withdraw) = parse_env("WITHDRAW_ON_DELIVERY")? {
            self.matchmaking.withdraw_on_delivery = withdraw;
        }

        Ok(())
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.service.shutdown_timeout_seconds)
    }

    /// Get matchmaking tick interval as Duration
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.matchmaking.tick_interval_ms)
    }

    /// Settings for the queue itself
    pub fn queue_config(&self) -> QueueConfig {
        QueueConfig {
            cooldown_ms: self.matchmaking.cooldown_ms,
            max_entries: self.matchmaking.max_queue_size,
        }
    }
}

/// Validate configuration values
pub fn validate_config(config: &AppConfig) -> Result<()> {
    let invalid = |message: &str| -> anyhow::Error {
        MatchmakingError::ConfigurationError {
            message: message.to_string(),
        }
        .into()
    };

    match config.service.log_level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => {}
        _ => {
            return Err(invalid(&format!(
                "Invalid log level: {}",
                config.service.log_level
            )))
        }
    }

    if config.service.health_port == 0 {
        return Err(invalid("Health port cannot be 0"));
    }
    if config.service.shutdown_timeout_seconds == 0 {
        return Err(invalid("Shutdown timeout must be greater than 0"));
    }

    if config.matchmaking.tick_interval_ms == 0 {
        return Err(invalid("Tick interval must be greater than 0"));
    }
    if config.matchmaking.cooldown_ms < 0 {
        return Err(invalid("Cooldown cannot be negative"));
    }
    if config.matchmaking.default_preference_tag.trim().is_empty() {
        return Err(invalid("Default preference tag cannot be empty"));
    }
    if config.matchmaking.max_queue_size < 2 {
        return Err(invalid("Max queue size must allow at least 2 participants"));
    }
    if config.matchmaking.pairing_buffer_size == 0 {
        return Err(invalid("Pairing buffer size must be greater than 0"));
    }

    Ok(())
}
