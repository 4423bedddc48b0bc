//! Monitoring session coordinator
//!
//! One actor task owns the canonical [`MonitoringSession`]. Push messages,
//! poll results and user commands all reach it through a single queue and
//! are applied in arrival order. Network calls run on the caller's task; only
//! their results are sent to the actor, tagged with the session generation
//! they were issued under. The actor drops results from older generations,
//! so nothing that was in flight when `stop` completed can touch the state
//! of the next session.

use chrono::{Local, NaiveTime};
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use super::notifications::{ChangeDetector, NotificationBus};
use super::poller::PollingScheduler;
use super::reconciler::{self, Snapshot};
use crate::api::MonitoringRestClient;
use crate::common::channels::{create_command_channel, create_state_channel, StateReceiver};
use crate::common::errors::{MonitorError, Result, ValidationError};
use crate::common::traits::{MonitoringApi, PushTransport};
use crate::common::types::{
    AdjustmentStrategy, AutoAdjustOutcome, MarketCondition, MonitoringSession, MonitoringTarget,
    PerformanceStats, SessionHistory, SessionStats, SessionView, StrategySuggestions,
    SubscriptionToken, ThresholdPreview, TransportStatus, WatchTarget,
};
use crate::config::types::{AppConfig, MonitoringConfig};
use crate::strategy::ThresholdAdjuster;
use crate::transport::messages::{KindFilter, OutboundMessage, PushMessage, PushPayload};
use crate::transport::websocket::WebSocketTransport;

/// Messages processed by the session actor
enum Command {
    /// Begin tracking a session the backend just started
    Activate {
        issued: u64,
        symbols: Vec<String>,
        reply: oneshot::Sender<Result<u64>>,
    },
    /// Stop tracking and reset to idle
    Deactivate { reply: oneshot::Sender<u64> },
    Snapshot {
        generation: u64,
        snapshot: Snapshot,
        reply: Option<oneshot::Sender<Result<MonitoringSession>>>,
    },
    Push {
        generation: u64,
        message: PushMessage,
    },
    TransportStatus(TransportStatus),
    Shutdown { reply: oneshot::Sender<()> },
}

/// Coordinates the monitoring session across REST, push and polling
pub struct MonitoringCoordinator {
    api: Arc<dyn MonitoringApi>,
    commands: mpsc::UnboundedSender<Command>,
    state: StateReceiver,
    bus: Arc<NotificationBus>,
    adjuster: ThresholdAdjuster,
    config: MonitoringConfig,
    actor: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl MonitoringCoordinator {
    /// Create a coordinator and spawn its actor. Must be called inside a Tokio runtime.
    ///
    /// Without a transport the coordinator runs on polling alone.
    pub fn new(
        api: Arc<dyn MonitoringApi>,
        transport: Option<Arc<dyn PushTransport>>,
        config: MonitoringConfig,
    ) -> Self {
        let (commands, receiver) = create_command_channel();
        let (state_tx, state) = create_state_channel();
        let bus = Arc::new(NotificationBus::new());

        let status_token = transport.as_ref().map(|transport| {
            let tx = commands.clone();
            transport.on_status_change(Box::new(move |status: &TransportStatus| {
                let _ = tx.send(Command::TransportStatus(status.clone()));
            }))
        });

        let actor = SessionActor {
            api: api.clone(),
            transport_status: transport
                .as_ref()
                .map(|t| t.status())
                .unwrap_or_default(),
            transport,
            bus: bus.clone(),
            commands: commands.clone(),
            state: state_tx,
            poll_interval: config.poll_interval(),
            session: MonitoringSession::idle(),
            generation: 0,
            last_error: None,
            active: false,
            detector: ChangeDetector::new(),
            poller: PollingScheduler::new(),
            push_token: None,
            status_token,
        };
        let handle = tokio::spawn(actor.run(receiver));

        Self {
            api,
            commands,
            state,
            bus,
            adjuster: ThresholdAdjuster::from_config(&config),
            config,
            actor: parking_lot::Mutex::new(Some(handle)),
        }
    }

    /// Build the REST client and, unless `push_enabled` is false, the WebSocket transport
    pub fn from_config(config: &AppConfig, push_enabled: bool) -> Result<Self> {
        let api: Arc<dyn MonitoringApi> = Arc::new(MonitoringRestClient::from_config(&config.backend)?);
        let transport: Option<Arc<dyn PushTransport>> = if push_enabled {
            Some(Arc::new(WebSocketTransport::from_config(config)))
        } else {
            None
        };
        Ok(Self::new(api, transport, config.monitoring.clone()))
    }

    // ========================================================================
    // Session lifecycle
    // ========================================================================

    /// Start a session for the watch-list
    ///
    /// The list is validated before any network call. On success the push
    /// channel is connected (best effort), polling begins and the session is
    /// refreshed from the backend. Returns the backend's message.
    #[instrument(skip(self, targets), fields(count = targets.len()))]
    pub async fn start(&self, targets: Vec<WatchTarget>) -> Result<String> {
        validate_watch_list(&targets, &self.config)?;

        let issued = self.generation();
        let symbols: Vec<String> = targets.iter().map(|t| t.symbol.clone()).collect();
        let message = self
            .api
            .start_monitoring(targets, self.config.auto_start)
            .await?;
        info!("Backend started monitoring: {}", message);

        let (reply, rx) = oneshot::channel();
        self.send(Command::Activate {
            issued,
            symbols,
            reply,
        })?;
        let generation = Self::receive(rx).await??;

        if let Err(e) = self.refresh_at(generation).await {
            warn!("Initial status refresh failed: {}", e);
        }
        Ok(message)
    }

    /// Stop the session. Skips the backend call when nothing is active.
    ///
    /// When this returns `Ok`, push handling and polling for the stopped
    /// session have been torn down and the state is idle. The generation is
    /// advanced in either case, so a `start` still waiting on the backend
    /// cannot activate afterwards.
    #[instrument(skip(self))]
    pub async fn stop(&self) -> Result<()> {
        let view = self.view();
        if !view.active && !view.session.is_running {
            debug!("Stop requested with no active session");
        } else {
            let message = self.api.stop_monitoring().await?;
            info!("Backend stopped monitoring: {}", message);
        }

        let (reply, rx) = oneshot::channel();
        self.send(Command::Deactivate { reply })?;
        let generation = Self::receive(rx).await?;
        debug!(generation, "Session deactivated");
        Ok(())
    }

    /// Fetch the status and make it canonical
    ///
    /// A failed fetch resets the session to idle and returns `DegradedState`.
    #[instrument(skip(self))]
    pub async fn refresh_status(&self) -> Result<MonitoringSession> {
        self.refresh_at(self.generation()).await
    }

    // ========================================================================
    // Thresholds
    // ========================================================================

    /// Set one target's threshold on the backend, then refresh
    #[instrument(skip(self))]
    pub async fn adjust_threshold(&self, symbol: &str, new_threshold: Decimal) -> Result<String> {
        if symbol.trim().is_empty() {
            return Err(ValidationError::EmptySymbol.into());
        }
        check_threshold(new_threshold, &self.config)?;

        let issued = self.generation();
        let message = self
            .api
            .adjust_threshold(symbol.to_string(), new_threshold)
            .await?;
        self.refresh_after_command(issued).await;
        Ok(message)
    }

    /// Recompute thresholds on the backend with a strategy, then refresh
    ///
    /// With `apply_all` the symbol list is not sent. Without it an explicit,
    /// non-empty symbol list is required.
    #[instrument(skip(self))]
    pub async fn auto_adjust(
        &self,
        strategy: AdjustmentStrategy,
        apply_all: bool,
        symbols: Option<Vec<String>>,
    ) -> Result<AutoAdjustOutcome> {
        if !strategy.is_computed() {
            return Err(ValidationError::ManualStrategyNotAllowed.into());
        }
        let target_symbols = if apply_all {
            None
        } else {
            match symbols {
                Some(symbols) if !symbols.is_empty() => Some(symbols),
                _ => return Err(ValidationError::AmbiguousTargets.into()),
            }
        };

        let issued = self.generation();
        let outcome = self
            .api
            .auto_adjust_thresholds(strategy, apply_all, target_symbols)
            .await?;
        info!(
            adjusted = outcome.adjustments.len(),
            "Auto-adjusted thresholds with {} strategy", strategy
        );
        self.refresh_after_command(issued).await;
        Ok(outcome)
    }

    /// Backend preview of a strategy; read-only
    #[instrument(skip(self))]
    pub async fn preview(
        &self,
        strategy: AdjustmentStrategy,
        symbol: Option<&str>,
    ) -> Result<ThresholdPreview> {
        if !strategy.is_computed() {
            return Err(ValidationError::ManualStrategyNotAllowed.into());
        }
        self.api
            .get_threshold_preview(strategy, symbol.map(str::to_string))
            .await
    }

    /// Preview computed locally from the canonical targets
    pub fn local_preview(
        &self,
        strategy: AdjustmentStrategy,
        market: &MarketCondition,
        symbol: Option<&str>,
        at: NaiveTime,
    ) -> Result<ThresholdPreview> {
        let session = self.session();
        self.adjuster
            .preview(strategy, market, &session.targets, symbol, at)
    }

    // ========================================================================
    // Read-only passthroughs
    // ========================================================================

    pub async fn get_performance_stats(&self) -> Result<PerformanceStats> {
        self.api.get_performance_stats().await
    }

    pub async fn get_suggested_strategies(&self) -> Result<StrategySuggestions> {
        self.api.get_suggested_strategies().await
    }

    pub async fn get_targets(&self) -> Result<Vec<MonitoringTarget>> {
        self.api.get_targets().await
    }

    pub async fn get_session_history(&self) -> Result<SessionHistory> {
        self.api.get_session_history().await
    }

    // ========================================================================
    // Observation
    // ========================================================================

    /// Current canonical session
    pub fn session(&self) -> MonitoringSession {
        self.state.borrow().session.clone()
    }

    pub fn view(&self) -> SessionView {
        self.state.borrow().clone()
    }

    /// Watch channel carrying every new view
    pub fn subscribe_state(&self) -> StateReceiver {
        self.state.clone()
    }

    pub fn notifications(&self) -> &NotificationBus {
        &self.bus
    }

    pub fn session_stats(&self) -> SessionStats {
        self.state.borrow().session.stats()
    }

    pub fn generation(&self) -> u64 {
        self.state.borrow().generation
    }

    /// Tear everything down and stop the actor. The backend session is left as is.
    pub async fn shutdown(&self) {
        let (reply, rx) = oneshot::channel();
        if self.commands.send(Command::Shutdown { reply }).is_ok() {
            let _ = rx.await;
        }
        let handle = self.actor.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    // ========================================================================
    // Internals
    // ========================================================================

    async fn refresh_at(&self, generation: u64) -> Result<MonitoringSession> {
        let snapshot = match self.api.get_status().await {
            Ok(session) => Snapshot::Fetched(session),
            Err(e) => Snapshot::Failed(e.to_string()),
        };

        let (reply, rx) = oneshot::channel();
        self.send(Command::Snapshot {
            generation,
            snapshot,
            reply: Some(reply),
        })?;
        Self::receive(rx).await?
    }

    /// Refresh after a successful command; the command's own result stands either way
    async fn refresh_after_command(&self, issued: u64) {
        if let Err(e) = self.refresh_at(issued).await {
            warn!("Status refresh after command failed: {}", e);
        }
    }

    fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| MonitorError::ChannelSend("session actor is not running".to_string()))
    }

    async fn receive<T>(rx: oneshot::Receiver<T>) -> Result<T> {
        rx.await
            .map_err(|e| MonitorError::ChannelReceive(e.to_string()))
    }
}

impl Drop for MonitoringCoordinator {
    fn drop(&mut self) {
        let (reply, _) = oneshot::channel();
        let _ = self.commands.send(Command::Shutdown { reply });
    }
}

/// Reject watch-lists the backend must never see
pub fn validate_watch_list(
    targets: &[WatchTarget],
    config: &MonitoringConfig,
) -> std::result::Result<(), ValidationError> {
    if targets.is_empty() {
        return Err(ValidationError::NoTargets);
    }

    let mut seen = HashSet::with_capacity(targets.len());
    for target in targets {
        if target.symbol.trim().is_empty() {
            return Err(ValidationError::EmptySymbol);
        }
        if !seen.insert(target.symbol.as_str()) {
            return Err(ValidationError::DuplicateSymbol(target.symbol.clone()));
        }
        if target.entry_price <= Decimal::ZERO {
            return Err(ValidationError::InvalidEntryPrice {
                symbol: target.symbol.clone(),
                entry_price: target.entry_price,
            });
        }
        check_threshold(target.buy_threshold, config)?;
    }
    Ok(())
}

fn check_threshold(
    value: Decimal,
    config: &MonitoringConfig,
) -> std::result::Result<(), ValidationError> {
    if value < config.min_threshold || value > config.max_threshold {
        return Err(ValidationError::ThresholdOutOfRange {
            value,
            min: config.min_threshold,
            max: config.max_threshold,
        });
    }
    Ok(())
}

/// Owner of the canonical session
struct SessionActor {
    api: Arc<dyn MonitoringApi>,
    transport: Option<Arc<dyn PushTransport>>,
    bus: Arc<NotificationBus>,
    /// Handed to push handlers and poll tasks
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Sender<SessionView>,
    poll_interval: Duration,
    session: MonitoringSession,
    generation: u64,
    last_error: Option<String>,
    transport_status: TransportStatus,
    active: bool,
    detector: ChangeDetector,
    poller: PollingScheduler,
    push_token: Option<SubscriptionToken>,
    status_token: Option<SubscriptionToken>,
}

impl SessionActor {
    async fn run(mut self, mut receiver: mpsc::UnboundedReceiver<Command>) {
        debug!("Session actor started");

        while let Some(command) = receiver.recv().await {
            match command {
                Command::Activate {
                    issued,
                    symbols,
                    reply,
                } => {
                    let _ = reply.send(self.activate(issued, symbols));
                }
                Command::Deactivate { reply } => {
                    self.deactivate();
                    let _ = reply.send(self.generation);
                }
                Command::Snapshot {
                    generation,
                    snapshot,
                    reply,
                } => {
                    let result = self.apply_snapshot(generation, snapshot);
                    if let Some(reply) = reply {
                        let _ = reply.send(result);
                    }
                }
                Command::Push {
                    generation,
                    message,
                } => self.apply_push(generation, message),
                Command::TransportStatus(status) => {
                    self.poller.set_connection_quality(status.connected);
                    self.transport_status = status;
                    self.publish();
                }
                Command::Shutdown { reply } => {
                    self.teardown();
                    if let (Some(transport), Some(token)) =
                        (self.transport.as_ref(), self.status_token.take())
                    {
                        transport.unsubscribe(token);
                    }
                    let _ = reply.send(());
                    break;
                }
            }
        }

        debug!("Session actor stopped");
    }

    fn activate(&mut self, issued: u64, symbols: Vec<String>) -> Result<u64> {
        if issued != self.generation {
            return Err(MonitorError::Superseded {
                issued,
                current: self.generation,
            });
        }

        self.teardown();
        self.generation += 1;
        self.session = MonitoringSession::idle();
        self.last_error = None;
        self.detector.reset();
        self.active = true;
        let generation = self.generation;

        if let Some(transport) = self.transport.clone() {
            let outcome = transport.connect();
            debug!(?outcome, "Push transport connect");

            let tx = self.commands.clone();
            self.push_token = Some(transport.subscribe(
                KindFilter::All,
                Box::new(move |message: &PushMessage| {
                    let _ = tx.send(Command::Push {
                        generation,
                        message: message.clone(),
                    });
                }),
            ));

            if let Err(e) = transport.publish(&OutboundMessage::Subscribe { symbols }) {
                warn!("Failed to publish subscription: {}", e);
            }
            self.poller
                .set_connection_quality(transport.status().connected);
        }

        let api = self.api.clone();
        let tx = self.commands.clone();
        self.poller.start(
            move || {
                let api = api.clone();
                let tx = tx.clone();
                async move {
                    let snapshot = match api.get_status().await {
                        Ok(session) => Snapshot::Fetched(session),
                        Err(e) => Snapshot::Failed(e.to_string()),
                    };
                    let _ = tx.send(Command::Snapshot {
                        generation,
                        snapshot,
                        reply: None,
                    });
                }
            },
            self.poll_interval,
        );

        info!(generation, "Monitoring session activated");
        self.publish();
        Ok(generation)
    }

    fn deactivate(&mut self) {
        self.teardown();
        if let Some(transport) = &self.transport {
            transport.disconnect();
        }
        self.generation += 1;
        self.session = MonitoringSession::idle();
        self.last_error = None;
        info!(generation = self.generation, "Monitoring session deactivated");
        self.publish();
    }

    /// Unsubscribe from push and halt polling for the current activation
    fn teardown(&mut self) {
        if let (Some(transport), Some(token)) = (self.transport.as_ref(), self.push_token.take()) {
            transport.unsubscribe(token);
        }
        self.poller.stop();
        self.active = false;
    }

    fn apply_snapshot(
        &mut self,
        generation: u64,
        snapshot: Snapshot,
    ) -> Result<MonitoringSession> {
        if generation < self.generation {
            debug!(generation, current = self.generation, "Discarding stale snapshot");
            return Err(MonitorError::Superseded {
                issued: generation,
                current: self.generation,
            });
        }

        let failure = match &snapshot {
            Snapshot::Failed(message) => Some(message.clone()),
            Snapshot::Fetched(_) => None,
        };
        let previous = std::mem::take(&mut self.session);
        let next = reconciler::apply_snapshot(previous.clone(), snapshot);
        self.last_error = failure.clone();
        self.commit(previous, next);

        match failure {
            Some(message) => Err(MonitorError::DegradedState(message)),
            None => Ok(self.session.clone()),
        }
    }

    fn apply_push(&mut self, generation: u64, message: PushMessage) {
        if generation < self.generation || !self.active {
            debug!(generation, kind = %message.kind(), "Discarding stale push message");
            return;
        }

        match &message.payload {
            PushPayload::Error { message } => warn!("Push channel reported error: {}", message),
            PushPayload::Unrecognized { kind } => {
                debug!(kind = %kind, "Ignoring unrecognized push message")
            }
            _ => {}
        }

        let previous = std::mem::take(&mut self.session);
        let next = reconciler::apply_push(previous.clone(), &message, Local::now().naive_local());
        self.commit(previous, next);
    }

    /// Install a reconciled session, raise notifications and publish the view
    fn commit(&mut self, previous: MonitoringSession, next: MonitoringSession) {
        self.session = next;

        if self.active {
            for notification in self.detector.diff(&previous, &self.session) {
                self.bus.emit(&notification);
            }

            if self.session.is_terminal() {
                info!("Session completed, releasing push and polling");
                self.teardown();
                if let Some(transport) = &self.transport {
                    transport.disconnect();
                }
            }
        }

        self.publish();
    }

    fn publish(&self) {
        self.state.send_replace(SessionView {
            session: self.session.clone(),
            generation: self.generation,
            active: self.active,
            last_error: self.last_error.clone(),
            transport: self.transport_status.clone(),
        });
    }
}

impl Drop for SessionActor {
    fn drop(&mut self) {
        if self.active {
            debug!("Session actor dropped while a session was active");
        }
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn watch(symbol: &str, entry: Decimal, threshold: Decimal) -> WatchTarget {
        WatchTarget::new(symbol, format!("{} Corp", symbol), entry, threshold)
    }

    #[test]
    fn test_validate_watch_list() {
        let config = MonitoringConfig::default();

        assert_eq!(
            validate_watch_list(&[], &config),
            Err(ValidationError::NoTargets)
        );
        assert_eq!(
            validate_watch_list(&[watch("A", dec!(0), dec!(2.0))], &config),
            Err(ValidationError::InvalidEntryPrice {
                symbol: "A".into(),
                entry_price: dec!(0)
            })
        );
        assert_eq!(
            validate_watch_list(&[watch(" ", dec!(10), dec!(2.0))], &config),
            Err(ValidationError::EmptySymbol)
        );
        assert_eq!(
            validate_watch_list(
                &[watch("A", dec!(10), dec!(2.0)), watch("A", dec!(11), dec!(2.0))],
                &config
            ),
            Err(ValidationError::DuplicateSymbol("A".into()))
        );
        assert!(matches!(
            validate_watch_list(&[watch("A", dec!(10), dec!(9.0))], &config),
            Err(ValidationError::ThresholdOutOfRange { .. })
        ));
        assert!(validate_watch_list(&[watch("A", dec!(71500), dec!(2.0))], &config).is_ok());
    }
}
