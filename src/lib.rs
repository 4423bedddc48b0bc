//! AfterhoursMonitor Library
//!
//! Client-side coordinator for an after-hours stock monitoring session.
//! Merges WebSocket push updates and REST polling into one canonical
//! session view, drives the session lifecycle against the backend, and
//! computes threshold adjustments for the phased after-hours schedule.

pub mod api;
pub mod common;
pub mod config;
pub mod session;
pub mod strategy;
pub mod transport;

// Re-export commonly used types
pub use api::MonitoringRestClient;
pub use common::errors::{MonitorError, Result, ValidationError};
pub use common::traits::{MonitoringApi, PushTransport};
pub use common::types::{
    AdjustmentStrategy, AutoAdjustOutcome, MarketCondition, MonitoringSession, MonitoringTarget,
    PerformanceStats, Phase, SessionStats, SessionView, ThresholdPreview, TransportStatus,
    WatchTarget,
};
pub use config::types::AppConfig;
pub use session::{MonitoringCoordinator, Notification, NotificationBus, PhaseChange};
pub use strategy::{PhaseSchedule, ThresholdAdjuster};
pub use transport::WebSocketTransport;
