//! Trait definitions for the coordinator's external collaborators

use async_trait::async_trait;
use rust_decimal::Decimal;

use super::errors::Result;
use super::types::{
    AdjustmentStrategy, AutoAdjustOutcome, ConnectOutcome, MonitoringSession, MonitoringTarget,
    PerformanceStats, SessionHistory, StrategySuggestions, SubscriptionToken, ThresholdPreview,
    TransportStatus, WatchTarget,
};
use crate::transport::messages::{KindFilter, OutboundMessage, PushMessage};

/// Real-time push channel
///
/// `connect` only starts the connection; failures and reconnect attempts are
/// reported through `on_status_change`, never returned. Implementations must
/// deliver handler callbacks from their own task and must not block on them.
pub trait PushTransport: Send + Sync {
    /// Start connecting. Idempotent while connected or connecting.
    fn connect(&self) -> ConnectOutcome;

    /// Close the connection and stop reconnecting
    fn disconnect(&self);

    /// Send a message to the server
    ///
    /// Messages published while disconnected are dropped, except the last
    /// `subscribe`, which is re-sent after every successful (re)connect.
    fn publish(&self, message: &OutboundMessage) -> Result<()>;

    /// Register a handler for one message kind, or all of them
    fn subscribe(
        &self,
        filter: KindFilter,
        handler: Box<dyn Fn(&PushMessage) + Send + Sync>,
    ) -> SubscriptionToken;

    /// Remove a message or status handler
    fn unsubscribe(&self, token: SubscriptionToken) -> bool;

    /// Register a handler for connection status changes
    fn on_status_change(
        &self,
        handler: Box<dyn Fn(&TransportStatus) + Send + Sync>,
    ) -> SubscriptionToken;

    /// Current connection status
    fn status(&self) -> TransportStatus;
}

/// Backend monitoring API
///
/// Arguments are owned so implementations (and test doubles) can move them
/// into request futures.
#[async_trait]
pub trait MonitoringApi: Send + Sync {
    /// Start a session with the given watch-list. Returns the backend's message.
    async fn start_monitoring(&self, targets: Vec<WatchTarget>, auto_start: bool)
        -> Result<String>;

    /// Stop the running session
    async fn stop_monitoring(&self) -> Result<String>;

    /// Full status snapshot
    async fn get_status(&self) -> Result<MonitoringSession>;

    async fn get_targets(&self) -> Result<Vec<MonitoringTarget>>;

    /// Set one target's threshold (always sent as the manual strategy)
    async fn adjust_threshold(&self, symbol: String, new_threshold: Decimal) -> Result<String>;

    /// Recompute thresholds with a strategy. `target_symbols` is omitted when `None`.
    async fn auto_adjust_thresholds(
        &self,
        strategy: AdjustmentStrategy,
        apply_all: bool,
        target_symbols: Option<Vec<String>>,
    ) -> Result<AutoAdjustOutcome>;

    async fn get_suggested_strategies(&self) -> Result<StrategySuggestions>;

    async fn get_threshold_preview(
        &self,
        strategy: AdjustmentStrategy,
        symbol: Option<String>,
    ) -> Result<ThresholdPreview>;

    async fn get_session_history(&self) -> Result<SessionHistory>;

    async fn get_performance_stats(&self) -> Result<PerformanceStats>;
}
