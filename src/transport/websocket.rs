//! WebSocket push transport
//!
//! A background task owns the socket. It reconnects with exponential backoff,
//! sends an application heartbeat, re-announces the last `subscribe` message
//! after every connect, and dispatches decoded frames to registered handlers.

use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tokio_tungstenite::{
    connect_async, tungstenite::protocol::Message, MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, error, info, instrument, warn};

use super::messages::{KindFilter, OutboundMessage, PushMessage, PushPayload};
use crate::common::errors::{MonitorError, Result};
use crate::common::registry::Registry;
use crate::common::traits::PushTransport;
use crate::common::types::{ConnectOutcome, SubscriptionToken, TransportStatus};
use crate::config::types::{AppConfig, ReconnectPolicy};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Push transport over a single WebSocket connection
pub struct WebSocketTransport {
    inner: Arc<Inner>,
}

struct Inner {
    /// WebSocket URL
    url: String,
    /// Backoff and heartbeat settings
    policy: ReconnectPolicy,
    status: RwLock<TransportStatus>,
    message_handlers: Registry<PushMessage>,
    status_handlers: Registry<TransportStatus>,
    /// Writer for the live connection, `None` while disconnected
    outbound: Mutex<Option<mpsc::UnboundedSender<Message>>>,
    /// Re-sent after every (re)connect
    last_subscribe: Mutex<Option<OutboundMessage>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl WebSocketTransport {
    pub fn new(url: &str, policy: ReconnectPolicy) -> Self {
        let message_handlers = Registry::new();
        let status_handlers = Registry::sharing_ids_with(&message_handlers);
        Self {
            inner: Arc::new(Inner {
                url: url.to_string(),
                policy,
                status: RwLock::new(TransportStatus::default()),
                message_handlers,
                status_handlers,
                outbound: Mutex::new(None),
                last_subscribe: Mutex::new(None),
                task: Mutex::new(None),
            }),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            &config.backend.websocket_url,
            ReconnectPolicy::from(&config.settings),
        )
    }

    pub fn url(&self) -> &str {
        &self.inner.url
    }
}

impl PushTransport for WebSocketTransport {
    fn connect(&self) -> ConnectOutcome {
        let mut task = self.inner.task.lock();
        if let Some(handle) = task.as_ref() {
            if !handle.is_finished() {
                debug!("Connect requested while already active");
                return ConnectOutcome::AlreadyActive;
            }
        }

        let inner = self.inner.clone();
        *task = Some(tokio::spawn(async move { inner.run().await }));
        ConnectOutcome::Started
    }

    fn disconnect(&self) {
        if let Some(handle) = self.inner.task.lock().take() {
            handle.abort();
            info!("Push transport disconnected");
        }
        self.inner.outbound.lock().take();
        self.inner.last_subscribe.lock().take();
        self.inner.update_status(|status| {
            status.connected = false;
            status.reconnecting = false;
        });
    }

    fn publish(&self, message: &OutboundMessage) -> Result<()> {
        match message {
            OutboundMessage::Subscribe { .. } => {
                *self.inner.last_subscribe.lock() = Some(message.clone());
            }
            OutboundMessage::Unsubscribe { .. } => {
                self.inner.last_subscribe.lock().take();
            }
            OutboundMessage::Heartbeat => {}
        }

        let sender = self.inner.outbound.lock().clone();
        match sender {
            Some(sender) => {
                let json = message.to_json()?;
                debug!("Publishing message: {}", json);
                sender
                    .send(Message::Text(json))
                    .map_err(|e| MonitorError::ChannelSend(e.to_string()))
            }
            // Queued: re-announced once the connection is up
            None if matches!(message, OutboundMessage::Subscribe { .. }) => Ok(()),
            None => Err(MonitorError::Transport("push channel not connected".to_string())),
        }
    }

    fn subscribe(
        &self,
        filter: KindFilter,
        handler: Box<dyn Fn(&PushMessage) + Send + Sync>,
    ) -> SubscriptionToken {
        self.inner.message_handlers.subscribe(move |message: &PushMessage| {
            if filter.matches(message.kind()) {
                handler(message);
            }
        })
    }

    fn unsubscribe(&self, token: SubscriptionToken) -> bool {
        self.inner.message_handlers.unsubscribe(token)
            || self.inner.status_handlers.unsubscribe(token)
    }

    fn on_status_change(
        &self,
        handler: Box<dyn Fn(&TransportStatus) + Send + Sync>,
    ) -> SubscriptionToken {
        self.inner.status_handlers.subscribe(move |status: &TransportStatus| handler(status))
    }

    fn status(&self) -> TransportStatus {
        self.inner.status.read().clone()
    }
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        if let Some(handle) = self.inner.task.lock().take() {
            handle.abort();
        }
    }
}

impl Inner {
    /// Connection loop: connect, pump until the socket closes, back off, repeat
    #[instrument(skip(self), fields(url = %self.url))]
    async fn run(self: Arc<Self>) {
        let mut attempt = 0u32;

        loop {
            info!("Connecting to push channel");
            match connect_async(&self.url).await {
                Ok((stream, _response)) => {
                    attempt = 0;
                    info!("Push channel connected");
                    self.update_status(|status| {
                        status.connected = true;
                        status.reconnecting = false;
                    });

                    let result = self.run_connection(stream).await;
                    self.outbound.lock().take();

                    match result {
                        Ok(()) => info!("Push channel closed"),
                        Err(e) => {
                            error!("Push channel error: {}", e);
                            self.update_status(|status| status.error_count += 1);
                        }
                    }
                    self.update_status(|status| status.connected = false);
                }
                Err(e) => {
                    warn!("Push channel connect failed: {}", e);
                    self.update_status(|status| {
                        status.connected = false;
                        status.error_count += 1;
                    });
                }
            }

            attempt += 1;
            if let Some(max) = self.policy.max_attempts {
                if attempt > max {
                    error!(attempt, "Max reconnection attempts reached");
                    self.update_status(|status| status.reconnecting = false);
                    return;
                }
            }

            let delay = self.policy.delay_for_attempt(attempt);
            warn!(attempt, delay_ms = delay.as_millis() as u64, "Reconnecting");
            self.update_status(|status| status.reconnecting = true);
            tokio::time::sleep(delay).await;
        }
    }

    async fn run_connection(&self, stream: WsStream) -> Result<()> {
        let (mut write, mut read) = stream.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
        *self.outbound.lock() = Some(tx);

        let resubscribe = self.last_subscribe.lock().clone();
        if let Some(subscribe) = resubscribe {
            let json = subscribe.to_json()?;
            debug!("Re-announcing subscription: {}", json);
            write.send(Message::Text(json)).await?;
        }

        let period = self.policy.heartbeat_interval;
        let mut heartbeat = interval_at(Instant::now() + period, period);

        loop {
            tokio::select! {
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => self.dispatch(&text),
                        Some(Ok(Message::Ping(data))) => {
                            debug!("Received Ping, sending Pong");
                            write.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Pong(_))) => {
                            debug!("Received Pong");
                        }
                        Some(Ok(Message::Close(frame))) => {
                            info!("WebSocket closed: {:?}", frame);
                            return Ok(());
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => return Err(e.into()),
                        None => {
                            info!("WebSocket stream ended");
                            return Ok(());
                        }
                    }
                }
                Some(outbound) = rx.recv() => {
                    write.send(outbound).await?;
                }
                _ = heartbeat.tick() => {
                    write.send(Message::Text(OutboundMessage::Heartbeat.to_json()?)).await?;
                }
            }
        }
    }

    fn dispatch(&self, text: &str) {
        match PushMessage::parse(text) {
            Ok(message) => {
                if matches!(message.payload, PushPayload::Heartbeat) {
                    self.update_status(|status| status.last_heartbeat = Some(Utc::now()));
                }
                self.message_handlers.emit(&message);
            }
            Err(e) => warn!("Failed to parse message: {} - {}", e, text),
        }
    }

    /// Apply a change and notify status handlers outside the lock
    fn update_status<F: FnOnce(&mut TransportStatus)>(&self, change: F) {
        let snapshot = {
            let mut status = self.status.write();
            let before = status.clone();
            change(&mut status);
            if *status == before {
                return;
            }
            status.clone()
        };
        self.status_handlers.emit(&snapshot);
    }
}
