//! Real-time push channel
//!
//! This module provides:
//! - Push message types and their wire decoding (`messages`)
//! - A reconnecting WebSocket implementation of `PushTransport` (`websocket`)

pub mod messages;
pub mod websocket;

pub use messages::{KindFilter, MessageKind, OutboundMessage, PushMessage, PushPayload};
pub use websocket::WebSocketTransport;
