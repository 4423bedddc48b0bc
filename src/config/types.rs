//! Configuration types

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Backend endpoints
    #[serde(default)]
    pub backend: BackendConfig,
    /// Session and threshold settings
    #[serde(default)]
    pub monitoring: MonitoringConfig,
    /// General application settings
    #[serde(default)]
    pub settings: AppSettings,
}

/// Backend REST and push endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base URL of the REST API (the `/monitoring/...` paths are appended)
    #[serde(default = "default_rest_url")]
    pub rest_url: String,
    /// Push channel URL
    #[serde(default = "default_websocket_url")]
    pub websocket_url: String,
    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            rest_url: default_rest_url(),
            websocket_url: default_websocket_url(),
            request_timeout_seconds: default_request_timeout(),
        }
    }
}

impl BackendConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

fn default_rest_url() -> String {
    "http://localhost:8000/api".to_string()
}

fn default_websocket_url() -> String {
    "ws://localhost:8000/ws".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

/// Monitoring session settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    /// Polling interval while the push channel is down, in milliseconds.
    /// Tripled while it is connected.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    /// Lowest threshold accepted by manual adjustment, in percent
    #[serde(default = "default_min_threshold")]
    pub min_threshold: Decimal,
    /// Highest threshold accepted by manual adjustment, in percent
    #[serde(default = "default_max_threshold")]
    pub max_threshold: Decimal,
    /// Threshold used for watch-list entries that do not specify one
    #[serde(default = "default_buy_threshold")]
    pub default_buy_threshold: Decimal,
    /// Passed to the backend's start call
    #[serde(default = "default_auto_start")]
    pub auto_start: bool,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            min_threshold: default_min_threshold(),
            max_threshold: default_max_threshold(),
            default_buy_threshold: default_buy_threshold(),
            auto_start: default_auto_start(),
        }
    }
}

impl MonitoringConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

fn default_poll_interval() -> u64 {
    5000
}

fn default_min_threshold() -> Decimal {
    Decimal::new(5, 1)
}

fn default_max_threshold() -> Decimal {
    Decimal::new(50, 1)
}

fn default_buy_threshold() -> Decimal {
    Decimal::new(20, 1)
}

fn default_auto_start() -> bool {
    true
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSettings {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Log output format (`text` or `json`)
    #[serde(default = "default_log_format")]
    pub log_format: String,
    /// Initial delay between reconnection attempts in milliseconds
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_ms: u64,
    /// Upper bound of the reconnection backoff in milliseconds
    #[serde(default = "default_max_reconnect_delay")]
    pub max_reconnect_delay_ms: u64,
    /// Maximum reconnection attempts (0 = infinite)
    #[serde(default)]
    pub max_reconnect_attempts: u32,
    /// Application heartbeat interval in seconds
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_seconds: u64,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
            reconnect_delay_ms: default_reconnect_delay(),
            max_reconnect_delay_ms: default_max_reconnect_delay(),
            max_reconnect_attempts: 0,
            heartbeat_interval_seconds: default_heartbeat_interval(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_reconnect_delay() -> u64 {
    1000
}

fn default_max_reconnect_delay() -> u64 {
    30000
}

fn default_heartbeat_interval() -> u64 {
    30
}

/// Reconnection and heartbeat settings for the push transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// `None` retries forever
    pub max_attempts: Option<u32>,
    pub heartbeat_interval: Duration,
}

impl ReconnectPolicy {
    /// Backoff before the given (1-based) reconnection attempt
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.initial_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        (&AppSettings::default()).into()
    }
}

impl From<&AppSettings> for ReconnectPolicy {
    fn from(settings: &AppSettings) -> Self {
        Self {
            initial_delay: Duration::from_millis(settings.reconnect_delay_ms),
            max_delay: Duration::from_millis(settings.max_reconnect_delay_ms),
            max_attempts: match settings.max_reconnect_attempts {
                0 => None,
                n => Some(n),
            },
            heartbeat_interval: Duration::from_secs(settings.heartbeat_interval_seconds.max(1)),
        }
    }
}
