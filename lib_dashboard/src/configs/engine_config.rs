//! # Engine Configuration
//!
//! Millisecond fields are stored as plain integers so the JSON stays readable;
//! each section exposes `Duration` helpers for the code that consumes them.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;

/// Well-known credential used when nothing has been stored yet.
pub const FALLBACK_TOKEN: &str = "TRAFFIC_AI_TOKEN";

/// Top-level engine settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Outbound HTTP behavior.
    pub http: HttpSettings,
    /// Credential handling.
    pub auth: AuthSettings,
    /// Push channel and poll fallback.
    pub connection: ConnectionSettings,
    /// Signal phase durations.
    pub signal: CycleTimings,
    /// Demo violation synthesis.
    pub demo: DemoSettings,
    /// Signal clock period.
    pub tick_ms: u64,
    /// AI status older than this is reported stale.
    pub ai_stale_after_ms: u64,
    /// Number of backend log lines kept in memory.
    pub log_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            http: HttpSettings::default(),
            auth: AuthSettings::default(),
            connection: ConnectionSettings::default(),
            signal: CycleTimings::default(),
            demo: DemoSettings::default(),
            tick_ms: 1000,
            ai_stale_after_ms: 15_000,
            log_capacity: 200,
        }
    }
}

impl EngineConfig {
    /// Reads a JSON config file. Missing fields take their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&raw)?;
        Ok(config)
    }

    /// Signal clock period.
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms.max(1))
    }

    /// AI staleness threshold.
    pub fn ai_stale_after(&self) -> Duration {
        Duration::from_millis(self.ai_stale_after_ms)
    }
}

/// Outbound HTTP settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HttpSettings {
    /// Absolute base URL every endpoint is joined onto.
    pub base_url: String,
    /// Per-attempt timeout covering send and body read. A 401 retry gets a fresh budget.
    pub timeout_ms: u64,
    /// Transport-level retries for transient failures (connection resets, 5xx).
    pub transient_retries: u32,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:5000/".to_string(),
            timeout_ms: 8000,
            transient_retries: 0,
        }
    }
}

impl HttpSettings {
    /// Per-attempt timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Credential settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthSettings {
    /// Endpoint that issues credentials; calls to it carry no bearer header.
    pub login_endpoint: String,
    /// Value seeded into the store when it is empty.
    pub fallback_token: String,
    /// Where the token persists between runs. `None` keeps it in memory only.
    pub token_path: Option<String>,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            login_endpoint: "/api/login".to_string(),
            fallback_token: FALLBACK_TOKEN.to_string(),
            token_path: None,
        }
    }
}

/// Push channel and poll fallback settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectionSettings {
    /// Socket.IO WebSocket-transport endpoint for the push channel.
    pub push_url: String,
    /// Aggregate status endpoint polled while the push channel is down.
    pub status_endpoint: String,
    /// Poll period while in fallback.
    pub poll_interval_ms: u64,
    /// Push connection attempts before staying in fallback until retriggered.
    pub reconnect_attempts: u32,
    /// Fixed pause between push attempts.
    pub reconnect_delay_ms: u64,
    /// A connected channel silent for this long is treated as dropped.
    pub silent_failure_timeout_ms: u64,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            push_url: "ws://127.0.0.1:5000/socket.io/?EIO=4&transport=websocket".to_string(),
            status_endpoint: "/api/ai/status".to_string(),
            poll_interval_ms: 5000,
            reconnect_attempts: 10,
            reconnect_delay_ms: 2000,
            silent_failure_timeout_ms: 30_000,
        }
    }
}

impl ConnectionSettings {
    /// Poll period.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    /// Pause between push attempts.
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    /// Push inactivity watchdog.
    pub fn silent_failure_timeout(&self) -> Duration {
        Duration::from_millis(self.silent_failure_timeout_ms)
    }
}

/// Nominal phase durations, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleTimings {
    /// Green phase length.
    #[serde(alias = "greenDuration", alias = "green_duration")]
    pub green: u32,
    /// Yellow phase length.
    #[serde(alias = "yellowDuration", alias = "yellow_duration")]
    pub yellow: u32,
    /// Red phase length.
    #[serde(alias = "redDuration", alias = "red_duration")]
    pub red: u32,
}

impl Default for CycleTimings {
    fn default() -> Self {
        Self { green: 30, yellow: 5, red: 30 }
    }
}

impl CycleTimings {
    /// Smallest accepted green phase.
    pub const MIN_GREEN: u32 = 5;
    /// Smallest accepted yellow phase.
    pub const MIN_YELLOW: u32 = 3;
    /// Smallest accepted red phase.
    pub const MIN_RED: u32 = 5;

    /// Raises each duration to its minimum.
    pub fn clamped(self) -> Self {
        Self {
            green: self.green.max(Self::MIN_GREEN),
            yellow: self.yellow.max(Self::MIN_YELLOW),
            red: self.red.max(Self::MIN_RED),
        }
    }

    /// Length of one full ring.
    pub fn total(&self) -> u32 {
        self.green + self.yellow + self.red
    }
}

/// Demo synthesis settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DemoSettings {
    /// Lower bound of the jitter before a red-triggered spawn.
    pub min_delay_ms: u64,
    /// Upper bound of the jitter before a red-triggered spawn.
    pub max_delay_ms: u64,
    /// Chance that entering red schedules a spawn at all.
    pub red_spawn_probability: f64,
    /// Period of the ambient spawner.
    pub ambient_interval_ms: u64,
    /// Chance per ambient period of a spawn.
    pub ambient_probability: f64,
    /// Fixed seed for reproducible runs.
    pub seed: Option<u64>,
}

impl Default for DemoSettings {
    fn default() -> Self {
        Self {
            min_delay_ms: 3000,
            max_delay_ms: 12_000,
            red_spawn_probability: 1.0,
            ambient_interval_ms: 12_000,
            ambient_probability: 0.18,
            seed: None,
        }
    }
}

impl DemoSettings {
    /// Ambient spawner period.
    pub fn ambient_interval(&self) -> Duration {
        Duration::from_millis(self.ambient_interval_ms.max(1))
    }
}
