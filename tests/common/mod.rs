//! Common test utilities and fixtures
#![allow(dead_code)]

use afterhours_monitor::common::errors::{MonitorError, Result};
use afterhours_monitor::common::registry::Registry;
use afterhours_monitor::common::traits::{MonitoringApi, PushTransport};
use afterhours_monitor::common::types::{
    AdjustmentStrategy, AutoAdjustOutcome, ConnectOutcome, MonitoringSession, MonitoringTarget,
    PerformanceStats, Phase, SessionHistory, SessionView, StrategySuggestions, SubscriptionToken,
    ThresholdPreview, TransportStatus, WatchTarget,
};
use afterhours_monitor::common::channels::StateReceiver;
use afterhours_monitor::transport::{KindFilter, OutboundMessage, PushMessage};
use async_trait::async_trait;
use mockall::mock;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

// ============================================================================
// Fixtures
// ============================================================================

/// Single-target watch-list used by the walkthrough scenarios
pub fn samsung() -> WatchTarget {
    WatchTarget::new("005930", "Samsung", dec!(71500), dec!(2.0))
}

pub fn watch_list() -> Vec<WatchTarget> {
    vec![
        samsung(),
        WatchTarget::new("000660", "SK hynix", dec!(120000), dec!(2.5)),
    ]
}

/// Target as the backend reports it
pub fn target(symbol: &str, entry: Decimal, triggered: bool) -> MonitoringTarget {
    MonitoringTarget {
        symbol: symbol.to_string(),
        stock_name: format!("{} Corp", symbol),
        entry_price: entry,
        current_price: entry,
        change_percent: Decimal::ZERO,
        volume: 0,
        buy_threshold: dec!(2.0),
        is_triggered: triggered,
        trigger_time: None,
    }
}

/// Normalised session in the given phase
pub fn session(phase: Phase, running: bool, targets: Vec<MonitoringTarget>) -> MonitoringSession {
    MonitoringSession {
        is_running: running,
        current_phase: phase,
        targets,
        ..MonitoringSession::idle()
    }
    .normalized()
}

/// Backend's running session for [`samsung`]
pub fn samsung_running(phase: Phase) -> MonitoringSession {
    session(phase, true, vec![target("005930", dec!(71500), false)])
}

/// Body of `GET /monitoring/status`
pub fn status_body(phase: &str, running: bool, targets: Value) -> Value {
    let total = targets.as_array().map_or(0, Vec::len);
    json!({
        "success": true,
        "status": {
            "is_running": running,
            "current_phase": phase,
            "phase_start_time": "2024-01-02T16:30:00.000000",
            "next_phase_time": "17:00",
            "remaining_time_seconds": 1200,
            "monitoring_targets": targets,
            "total_targets": total,
            "triggered_count": 0
        }
    })
}

pub fn samsung_target_json(triggered: bool) -> Value {
    json!({
        "symbol": "005930",
        "stock_name": "Samsung",
        "entry_price": 71500.0,
        "current_price": 71500.0,
        "change_percent": 0.0,
        "volume": 0,
        "buy_threshold": 2.0,
        "is_triggered": triggered,
        "trigger_time": null
    })
}

pub fn market_condition_json() -> Value {
    json!({
        "total_rise_count": 7,
        "total_stock_count": 10,
        "average_change": 1.2,
        "volatility_index": 1.8,
        "volume_ratio": 1.1
    })
}

/// Push frames as the server sends them
pub mod ws_messages {
    pub const PRICE_UPDATE: &str = r#"{
        "type": "price_update",
        "timestamp": "2024-01-02T16:35:10.120000",
        "data": {"symbol": "005930", "price": 73000.0, "changePercent": 2.1, "volume": 15000}
    }"#;

    pub const BUY_SIGNAL: &str = r#"{
        "type": "buy_signal",
        "timestamp": "2024-01-02T16:36:00.000000",
        "data": {"symbol": "005930", "price": 73000.0, "quantity": 10, "reason": "threshold reached"}
    }"#;

    pub const HEARTBEAT: &str = r#"{"type": "heartbeat", "timestamp": "2024-01-02T16:36:30.000000"}"#;

    pub const UNKNOWN: &str = r#"{"type": "market_news", "data": {"headline": "x"}}"#;
}

pub fn push(frame: &str) -> PushMessage {
    PushMessage::parse(frame).expect("fixture frame parses")
}

/// Wait until the published view satisfies `predicate`
pub async fn wait_for<F>(rx: &mut StateReceiver, predicate: F) -> SessionView
where
    F: Fn(&SessionView) -> bool,
{
    let waited = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            {
                let view = rx.borrow_and_update();
                if predicate(&view) {
                    return view.clone();
                }
            }
            rx.changed().await.expect("coordinator alive");
        }
    })
    .await;
    waited.expect("state never satisfied the predicate")
}

// ============================================================================
// Monitoring API doubles
// ============================================================================

mock! {
    pub Api {}

    #[async_trait]
    impl MonitoringApi for Api {
        async fn start_monitoring(&self, targets: Vec<WatchTarget>, auto_start: bool) -> Result<String>;
        async fn stop_monitoring(&self) -> Result<String>;
        async fn get_status(&self) -> Result<MonitoringSession>;
        async fn get_targets(&self) -> Result<Vec<MonitoringTarget>>;
        async fn adjust_threshold(&self, symbol: String, new_threshold: Decimal) -> Result<String>;
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
}

/// Status replies served in order; the last one repeats
///
/// `Err` entries become `MonitorError::Request` with that message.
pub struct ScriptedApi {
    statuses: Mutex<VecDeque<std::result::Result<MonitoringSession, String>>>,
    last: Mutex<std::result::Result<MonitoringSession, String>>,
    /// When set, `get_status` waits for a permit before answering
    gate: Mutex<Option<Arc<Notify>>>,
    /// When set, `start_monitoring` waits for a permit before answering
    start_gate: Mutex<Option<Arc<Notify>>>,
    stop_error: Mutex<Option<String>>,
    pub status_calls: AtomicUsize,
    pub start_calls: AtomicUsize,
    pub stop_calls: AtomicUsize,
}

impl ScriptedApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            statuses: Mutex::new(VecDeque::new()),
            last: Mutex::new(Ok(MonitoringSession::idle())),
            gate: Mutex::new(None),
            start_gate: Mutex::new(None),
            stop_error: Mutex::new(None),
            status_calls: AtomicUsize::new(0),
            start_calls: AtomicUsize::new(0),
            stop_calls: AtomicUsize::new(0),
        })
    }

    pub fn push_status(&self, session: MonitoringSession) {
        self.statuses.lock().push_back(Ok(session));
    }

    pub fn push_failure(&self, message: &str) {
        self.statuses.lock().push_back(Err(message.to_string()));
    }

    pub fn gate(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.gate.lock() = Some(gate.clone());
        gate
    }

    pub fn gate_start(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.start_gate.lock() = Some(gate.clone());
        gate
    }

    pub fn fail_stop(&self, message: &str) {
        *self.stop_error.lock() = Some(message.to_string());
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MonitoringApi for ScriptedApi {
    async fn start_monitoring(&self, targets: Vec<WatchTarget>, _auto_start: bool) -> Result<String> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.start_gate.lock().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        Ok(format!("Monitoring started for {} targets", targets.len()))
    }

    async fn stop_monitoring(&self) -> Result<String> {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        match self.stop_error.lock().clone() {
            Some(message) => Err(MonitorError::Request(message)),
            None => Ok("Monitoring stopped".to_string()),
        }
    }

    async fn get_status(&self) -> Result<MonitoringSession> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.gate.lock().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let reply = {
            let mut statuses = self.statuses.lock();
            match statuses.pop_front() {
                Some(reply) => {
                    *self.last.lock() = reply.clone();
                    reply
                }
                None => self.last.lock().clone(),
            }
        };
        reply.map_err(MonitorError::Request)
    }

    async fn get_targets(&self) -> Result<Vec<MonitoringTarget>> {
        Ok(self.last.lock().clone().map(|s| s.targets).unwrap_or_default())
    }

    async fn adjust_threshold(&self, symbol: String, new_threshold: Decimal) -> Result<String> {
        Ok(format!("{} threshold set to {}%", symbol, new_threshold))
    }

    async fn auto_adjust_thresholds(
        &self,
        _strategy: AdjustmentStrategy,
        _apply_all: bool,
        _target_symbols: Option<Vec<String>>,
    ) -> Result<AutoAdjustOutcome> {
        Err(MonitorError::Internal("not scripted".to_string()))
    }

    async fn get_suggested_strategies(&self) -> Result<StrategySuggestions> {
        Err(MonitorError::Internal("not scripted".to_string()))
    }

    async fn get_threshold_preview(
        &self,
        _strategy: AdjustmentStrategy,
        _symbol: Option<String>,
    ) -> Result<ThresholdPreview> {
        Err(MonitorError::Internal("not scripted".to_string()))
    }

    async fn get_session_history(&self) -> Result<SessionHistory> {
        Err(MonitorError::Internal("not scripted".to_string()))
    }

    async fn get_performance_stats(&self) -> Result<PerformanceStats> {
        Err(MonitorError::Internal("not scripted".to_string()))
    }
}

// ============================================================================
// Push transport double
// ============================================================================

/// In-memory transport; tests inject push messages directly
pub struct FakeTransport {
    messages: Registry<PushMessage>,
    statuses: Registry<TransportStatus>,
    status: Mutex<TransportStatus>,
    pub published: Mutex<Vec<OutboundMessage>>,
    pub connects: AtomicUsize,
    pub disconnects: AtomicUsize,
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        let messages = Registry::new();
        let statuses = Registry::sharing_ids_with(&messages);
        Arc::new(Self {
            messages,
            statuses,
            status: Mutex::new(TransportStatus::default()),
            published: Mutex::new(Vec::new()),
            connects: AtomicUsize::new(0),
            disconnects: AtomicUsize::new(0),
        })
    }

    pub fn inject(&self, message: PushMessage) {
        self.messages.emit(&message);
    }

    pub fn handler_count(&self) -> usize {
        self.messages.len()
    }

    pub fn set_connected(&self, connected: bool) {
        let status = {
            let mut status = self.status.lock();
            status.connected = connected;
            status.clone()
        };
        self.statuses.emit(&status);
    }
}

impl PushTransport for FakeTransport {
    fn connect(&self) -> ConnectOutcome {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.status.lock().connected {
            return ConnectOutcome::AlreadyActive;
        }
        self.set_connected(true);
        ConnectOutcome::Started
    }

    fn disconnect(&self) {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        self.set_connected(false);
    }

    fn publish(&self, message: &OutboundMessage) -> Result<()> {
        self.published.lock().push(message.clone());
        Ok(())
    }

    fn subscribe(
        &self,
        filter: KindFilter,
        handler: Box<dyn Fn(&PushMessage) + Send + Sync>,
    ) -> SubscriptionToken {
        self.messages.subscribe(move |message: &PushMessage| {
            if filter.matches(message.kind()) {
                handler(message);
            }
        })
    }

    fn unsubscribe(&self, token: SubscriptionToken) -> bool {
        self.messages.unsubscribe(token) || self.statuses.unsubscribe(token)
    }

    fn on_status_change(
        &self,
        handler: Box<dyn Fn(&TransportStatus) + Send + Sync>,
    ) -> SubscriptionToken {
        self.statuses.subscribe(move |status: &TransportStatus| handler(status))
    }

    fn status(&self) -> TransportStatus {
        self.status.lock().clone()
    }
}
