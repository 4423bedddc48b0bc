//! Configuration loader

use config::{Config, Environment, File};
use std::path::Path;
use url::Url;

use super::types::{AppConfig, BackendConfig, MonitoringConfig};
use crate::common::errors::{MonitorError, Result};

/// Load configuration from file and environment variables
///
/// Priority (highest to lowest):
/// 1. Environment variables (prefixed with APP__, e.g. `APP__BACKEND__REST_URL`)
/// 2. Configuration file (TOML format)
/// 3. Default values
pub fn load_config(config_path: Option<&str>) -> Result<AppConfig> {
    let mut builder = Config::builder();

    if let Some(path) = config_path {
        if Path::new(path).exists() {
            builder = builder.add_source(File::with_name(path).required(false));
        }
    }

    builder = builder.add_source(
        Environment::with_prefix("APP")
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder
        .build()
        .map_err(|e| MonitorError::Configuration(e.to_string()))?;

    let app_config: AppConfig = config
        .try_deserialize()
        .map_err(|e| MonitorError::Configuration(e.to_string()))?;

    validate(&app_config)?;
    Ok(app_config)
}

/// Load configuration from environment variables only
///
/// Reads `.env` first. Recognises `MONITOR_REST_URL`, `MONITOR_WS_URL` and
/// `MONITOR_POLL_INTERVAL_MS`; everything else keeps its default.
pub fn load_from_env() -> Result<AppConfig> {
    dotenvy::dotenv().ok();

    let defaults = BackendConfig::default();
    let backend = BackendConfig {
        rest_url: std::env::var("MONITOR_REST_URL").unwrap_or(defaults.rest_url),
        websocket_url: std::env::var("MONITOR_WS_URL").unwrap_or(defaults.websocket_url),
        request_timeout_seconds: defaults.request_timeout_seconds,
    };

    let mut monitoring = MonitoringConfig::default();
    if let Ok(raw) = std::env::var("MONITOR_POLL_INTERVAL_MS") {
        monitoring.poll_interval_ms = raw.trim().parse().map_err(|_| {
            MonitorError::Configuration(format!("invalid MONITOR_POLL_INTERVAL_MS: {}", raw))
        })?;
    }

    let app_config = AppConfig {
        backend,
        monitoring,
        settings: Default::default(),
    };

    validate(&app_config)?;
    Ok(app_config)
}

/// Reject configurations the coordinator cannot run with
pub fn validate(config: &AppConfig) -> Result<()> {
    let rest = Url::parse(&config.backend.rest_url)
        .map_err(|e| MonitorError::Configuration(format!("invalid rest_url: {}", e)))?;
    if !matches!(rest.scheme(), "http" | "https") {
        return Err(MonitorError::Configuration(format!(
            "rest_url must use http or https, got {}",
            rest.scheme()
        )));
    }

    let ws = Url::parse(&config.backend.websocket_url)
        .map_err(|e| MonitorError::Configuration(format!("invalid websocket_url: {}", e)))?;
    if !matches!(ws.scheme(), "ws" | "wss") {
        return Err(MonitorError::Configuration(format!(
            "websocket_url must use ws or wss, got {}",
            ws.scheme()
        )));
    }

    let monitoring = &config.monitoring;
    if monitoring.poll_interval_ms == 0 {
        return Err(MonitorError::Configuration(
            "poll_interval_ms must be greater than zero".to_string(),
        ));
    }
    if monitoring.min_threshold <= rust_decimal::Decimal::ZERO
        || monitoring.min_threshold > monitoring.max_threshold
    {
        return Err(MonitorError::Configuration(format!(
            "invalid threshold bounds [{}, {}]",
            monitoring.min_threshold, monitoring.max_threshold
        )));
    }
    if monitoring.default_buy_threshold < monitoring.min_threshold
        || monitoring.default_buy_threshold > monitoring.max_threshold
    {
        return Err(MonitorError::Configuration(format!(
            "default_buy_threshold {} is outside [{}, {}]",
            monitoring.default_buy_threshold, monitoring.min_threshold, monitoring.max_threshold
        )));
    }

    Ok(())
}
