//! Monitoring session state and lifecycle
//!
//! This module provides:
//! - Pure reconciliation of push and poll data (`reconciler`)
//! - Adaptive status polling (`poller`)
//! - Change notifications (`notifications`)
//! - The session coordinator actor (`coordinator`)

pub mod coordinator;
pub mod notifications;
pub mod poller;
pub mod reconciler;

pub use coordinator::MonitoringCoordinator;
pub use notifications::{ChangeDetector, Notification, NotificationBus, PhaseChange};
pub use poller::PollingScheduler;
pub use reconciler::Snapshot;
