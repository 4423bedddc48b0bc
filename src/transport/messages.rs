//! Push channel message types
//!
//! Inbound frames are `{type, timestamp, data}` envelopes. The `type` field
//! selects a variant of [`PushPayload`]; unknown types decode to
//! [`PushPayload::Unrecognized`] so new server messages never break the client.

use chrono::{NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use tracing::debug;

use crate::common::errors::{MonitorError, Result};
use crate::common::types::{wire_time, MonitoringTarget, Phase};

/// `day` tag on session status frames that belong to the monitoring session
const MONITORING_DAY: &str = "monitoring";

/// Discriminant of a push message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    PriceUpdate,
    BuySignal,
    SellSignal,
    SessionStatus,
    PortfolioUpdate,
    Heartbeat,
    Error,
    Unrecognized,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::PriceUpdate => "price_update",
            MessageKind::BuySignal => "buy_signal",
            MessageKind::SellSignal => "sell_signal",
            MessageKind::SessionStatus => "session_status",
            MessageKind::PortfolioUpdate => "portfolio_update",
            MessageKind::Heartbeat => "heartbeat",
            MessageKind::Error => "error",
            MessageKind::Unrecognized => "unrecognized",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which messages a transport handler receives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KindFilter {
    All,
    Kind(MessageKind),
}

impl KindFilter {
    pub fn matches(&self, kind: MessageKind) -> bool {
        match self {
            KindFilter::All => true,
            KindFilter::Kind(expected) => *expected == kind,
        }
    }
}

impl From<MessageKind> for KindFilter {
    fn from(kind: MessageKind) -> Self {
        KindFilter::Kind(kind)
    }
}

/// Real-time price tick for one symbol
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PriceUpdate {
    pub symbol: String,
    pub price: Decimal,
    #[serde(default)]
    pub change: Option<Decimal>,
    #[serde(alias = "changePercent")]
    pub change_percent: Decimal,
    /// Absent on some feeds; the last known volume stands
    #[serde(default)]
    pub volume: Option<u64>,
}

/// Buy or sell signal raised by the trading engine
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TradeSignal {
    pub symbol: String,
    pub price: Decimal,
    #[serde(default)]
    pub quantity: u64,
    #[serde(default)]
    pub reason: String,
    #[serde(default, alias = "orderId")]
    pub order_id: Option<String>,
}

/// Field-level session patch carried by `session_status`
///
/// Every field is optional; absent fields leave the session untouched.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SessionStatusUpdate {
    pub is_running: Option<bool>,
    pub current_phase: Option<Phase>,
    pub next_phase_time: Option<NaiveTime>,
    pub remaining_time_seconds: Option<u64>,
    pub targets: Option<Vec<MonitoringTarget>>,
}

impl SessionStatusUpdate {
    /// Decode either the full status shape or the compact `{phase, status, nextActionTime}` form
    ///
    /// Compact frames tagged with a `day` other than `monitoring` describe the
    /// regular trading schedule and decode to an empty patch.
    fn from_value(data: &Value) -> Result<Self> {
        if let Some(day) = data.get("day").and_then(Value::as_str) {
            if day != MONITORING_DAY {
                debug!(day, "Ignoring session status for another schedule");
                return Ok(Self::default());
            }
        }

        let is_running = data
            .get("is_running")
            .and_then(Value::as_bool)
            .or_else(|| match data.get("status").and_then(Value::as_str) {
                Some("active") => Some(true),
                Some("inactive") => Some(false),
                _ => None,
            });

        let current_phase = data
            .get("current_phase")
            .or_else(|| data.get("phase"))
            .and_then(Value::as_str)
            .and_then(|raw| raw.parse::<Phase>().ok());

        let next_phase_time = ["next_phase_time", "nextActionTime", "next_action_time"]
            .iter()
            .find_map(|key| data.get(*key).and_then(Value::as_str))
            .and_then(wire_time::parse_time_of_day);

        let remaining_time_seconds = data.get("remaining_time_seconds").and_then(Value::as_u64);

        let targets = match data.get("monitoring_targets").or_else(|| data.get("targets")) {
            Some(raw) if !raw.is_null() => Some(serde_json::from_value(raw.clone())?),
            _ => None,
        };

        Ok(Self {
            is_running,
            current_phase,
            next_phase_time,
            remaining_time_seconds,
            targets,
        })
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Decoded message body
#[derive(Debug, Clone, PartialEq)]
pub enum PushPayload {
    PriceUpdate(PriceUpdate),
    BuySignal(TradeSignal),
    SellSignal(TradeSignal),
    SessionStatus(SessionStatusUpdate),
    /// Portfolio data is not part of the session; kept raw
    PortfolioUpdate(Value),
    Heartbeat,
    Error { message: String },
    Unrecognized { kind: String },
}

/// One inbound push message
#[derive(Debug, Clone, PartialEq)]
pub struct PushMessage {
    /// Server timestamp, if present and parseable
    pub timestamp: Option<NaiveDateTime>,
    pub payload: PushPayload,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(default)]
    data: Value,
}

impl PushMessage {
    pub fn new(payload: PushPayload) -> Self {
        Self {
            timestamp: None,
            payload,
        }
    }

    pub fn at(mut self, timestamp: NaiveDateTime) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Parse a text frame
    ///
    /// Fails only when the frame is not a JSON envelope or a known type
    /// carries malformed data.
    pub fn parse(text: &str) -> Result<Self> {
        let envelope: Envelope = serde_json::from_str(text)?;
        let timestamp = envelope
            .timestamp
            .as_deref()
            .and_then(wire_time::parse_timestamp);

        let payload = match envelope.kind.as_str() {
            "price_update" => PushPayload::PriceUpdate(serde_json::from_value(envelope.data)?),
            "buy_signal" => PushPayload::BuySignal(serde_json::from_value(envelope.data)?),
            "sell_signal" => PushPayload::SellSignal(serde_json::from_value(envelope.data)?),
            "session_status" | "monitoring_status_update" => {
                PushPayload::SessionStatus(SessionStatusUpdate::from_value(&envelope.data)?)
            }
            "portfolio_update" => PushPayload::PortfolioUpdate(envelope.data),
            "heartbeat" => PushPayload::Heartbeat,
            "error" => {
                let message = envelope
                    .data
                    .get("message")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .ok_or_else(|| {
                        MonitorError::InvalidResponse("error message without text".to_string())
                    })?;
                PushPayload::Error { message }
            }
            other => PushPayload::Unrecognized {
                kind: other.to_string(),
            },
        };

        Ok(Self { timestamp, payload })
    }

    pub fn kind(&self) -> MessageKind {
        match &self.payload {
            PushPayload::PriceUpdate(_) => MessageKind::PriceUpdate,
            PushPayload::BuySignal(_) => MessageKind::BuySignal,
            PushPayload::SellSignal(_) => MessageKind::SellSignal,
            PushPayload::SessionStatus(_) => MessageKind::SessionStatus,
            PushPayload::PortfolioUpdate(_) => MessageKind::PortfolioUpdate,
            PushPayload::Heartbeat => MessageKind::Heartbeat,
            PushPayload::Error { .. } => MessageKind::Error,
            PushPayload::Unrecognized { .. } => MessageKind::Unrecognized,
        }
    }
}

/// Messages the client sends to the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum OutboundMessage {
    Subscribe { symbols: Vec<String> },
    Unsubscribe { symbols: Vec<String> },
    Heartbeat,
}

impl OutboundMessage {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_price_update_camel_case() {
        let text = r#"{
            "type": "price_update",
            "timestamp": "2024-01-02T16:35:10.120000",
            "data": {"symbol": "005930", "price": 73000.0, "change": 1500.0, "changePercent": 2.1, "volume": 12000}
        }"#;

        let msg = PushMessage::parse(text).unwrap();
        assert_eq!(msg.kind(), MessageKind::PriceUpdate);
        assert!(msg.timestamp.is_some());
        match msg.payload {
            PushPayload::PriceUpdate(update) => {
                assert_eq!(update.symbol, "005930");
                assert_eq!(update.price, dec!(73000));
                assert_eq!(update.change_percent, dec!(2.1));
                assert_eq!(update.volume, Some(12000));
            }
            other => panic!("unexpected payload: {:?}", other),
        }
    }

    #[test]
    fn test_parse_price_update_snake_case() {
        let text = r#"{"type":"price_update","data":{"symbol":"A","price":10,"change_percent":-1.5,"volume":0}}"#;
        let msg = PushMessage::parse(text).unwrap();
        assert!(msg.timestamp.is_none());
        assert!(matches!(
            msg.payload,
            PushPayload::PriceUpdate(PriceUpdate { change_percent, .. }) if change_percent == dec!(-1.5)
        ));
    }

    #[test]
    fn test_parse_buy_signal_order_id() {
        let text = r#"{"type":"buy_signal","timestamp":"2024-01-02T16:41:00","data":{"symbol":"A","price":10.5,"quantity":3,"reason":"threshold","orderId":"ord-1"}}"#;
        let msg = PushMessage::parse(text).unwrap();
        match msg.payload {
            PushPayload::BuySignal(signal) => {
                assert_eq!(signal.order_id.as_deref(), Some("ord-1"));
                assert_eq!(signal.quantity, 3);
            }
            other => panic!("unexpected payload: {:?}", other),
        }
    }

    #[test]
    fn test_parse_compact_session_status() {
        let text = r#"{"type":"session_status","timestamp":"2024-01-02T16:30:00","data":{"day":"monitoring","phase":"phase_2","status":"active","nextAction":"monitoring_active","nextActionTime":"17:00"}}"#;
        let msg = PushMessage::parse(text).unwrap();
        match msg.payload {
            PushPayload::SessionStatus(update) => {
                assert_eq!(update.current_phase, Some(Phase::Phase2));
                assert_eq!(update.is_running, Some(true));
                assert_eq!(update.next_phase_time, NaiveTime::from_hms_opt(17, 0, 0));
                assert!(update.targets.is_none());
            }
            other => panic!("unexpected payload: {:?}", other),
        }
    }

    #[test]
    fn test_other_schedule_status_is_empty_patch() {
        for day in ["day1", "day2", "waiting"] {
            let text = format!(
                r#"{{"type":"session_status","data":{{"day":"{}","phase":"after_hours_monitoring","status":"monitoring","nextActionTime":"17:40"}}}}"#,
                day
            );
            let msg = PushMessage::parse(&text).unwrap();
            assert_eq!(msg.kind(), MessageKind::SessionStatus);
            match msg.payload {
                PushPayload::SessionStatus(update) => assert!(update.is_empty(), "day {}", day),
                other => panic!("unexpected payload: {:?}", other),
            }
        }
    }

    #[test]
    fn test_parse_price_update_without_volume() {
        let text = r#"{"type":"price_update","data":{"symbol":"005930","price":73000,"changePercent":2.1}}"#;
        match PushMessage::parse(text).unwrap().payload {
            PushPayload::PriceUpdate(update) => {
                assert_eq!(update.price, dec!(73000));
                assert_eq!(update.change_percent, dec!(2.1));
                assert_eq!(update.volume, None);
            }
            other => panic!("unexpected payload: {:?}", other),
        }
    }

    #[test]
    fn test_parse_monitoring_status_update_full_form() {
        let text = r#"{"type":"monitoring_status_update","data":{
            "is_running": false,
            "current_phase": "completed",
            "monitoring_targets": [{"symbol":"A","entry_price":10.0,"buy_threshold":2.0,"is_triggered":true}],
            "remaining_time_seconds": 0
        }}"#;
        let msg = PushMessage::parse(text).unwrap();
        assert_eq!(msg.kind(), MessageKind::SessionStatus);
        match msg.payload {
            PushPayload::SessionStatus(update) => {
                assert_eq!(update.current_phase, Some(Phase::Completed));
                assert_eq!(update.is_running, Some(false));
                assert_eq!(update.targets.map(|t| t.len()), Some(1));
            }
            other => panic!("unexpected payload: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_type_is_unrecognized() {
        let text = r#"{"type":"subscription_confirmed","data":{"symbols":["A"],"status":"subscribed"}}"#;
        let msg = PushMessage::parse(text).unwrap();
        assert_eq!(
            msg.payload,
            PushPayload::Unrecognized {
                kind: "subscription_confirmed".to_string()
            }
        );
        assert!(KindFilter::All.matches(msg.kind()));
        assert!(!KindFilter::Kind(MessageKind::PriceUpdate).matches(msg.kind()));
    }

    #[test]
    fn test_malformed_frames_fail() {
        assert!(PushMessage::parse("PONG").is_err());
        assert!(PushMessage::parse(r#"{"type":"price_update","data":{"symbol":"A"}}"#).is_err());
    }

    #[test]
    fn test_outbound_wire_format() {
        let subscribe = OutboundMessage::Subscribe {
            symbols: vec!["A".to_string(), "B".to_string()],
        };
        assert_eq!(
            subscribe.to_json().unwrap(),
            r#"{"type":"subscribe","data":{"symbols":["A","B"]}}"#
        );
        assert_eq!(
            OutboundMessage::Heartbeat.to_json().unwrap(),
            r#"{"type":"heartbeat"}"#
        );
    }
}
