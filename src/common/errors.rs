//! Error types for the monitoring coordinator

use rust_decimal::Decimal;
use thiserror::Error;

/// Result type alias using our MonitorError
pub type Result<T> = std::result::Result<T, MonitorError>;

/// Input rejected before any network call was made
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// `start` was called with an empty watch-list
    #[error("no monitoring targets provided")]
    NoTargets,

    #[error("entry price for {symbol} must be positive, got {entry_price}")]
    InvalidEntryPrice { symbol: String, entry_price: Decimal },

    #[error("target symbol must not be empty")]
    EmptySymbol,

    #[error("symbol {0} appears more than once in the watch-list")]
    DuplicateSymbol(String),

    #[error("threshold {value}% is outside the allowed range [{min}%, {max}%]")]
    ThresholdOutOfRange {
        value: Decimal,
        min: Decimal,
        max: Decimal,
    },

    /// Bulk adjustment and preview only accept computed strategies
    #[error("the manual strategy is only valid for single-symbol adjustment")]
    ManualStrategyNotAllowed,

    /// `auto_adjust` without `apply_all` needs an explicit symbol set
    #[error("no target symbols specified and apply_all is false")]
    AmbiguousTargets,
}

/// Main error type for coordinator and client operations
#[derive(Error, Debug)]
pub enum MonitorError {
    /// Push channel connection failures (reported through the status observable)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Backend rejected the request or returned a non-success envelope
    #[error("Request failed: {0}")]
    Request(String),

    /// HTTP request errors
    #[error("HTTP request error: {0}")]
    HttpRequest(#[from] reqwest::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON parsing error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// Invalid API response
    #[error("Invalid API response: {0}")]
    InvalidResponse(String),

    /// Input validation failed before dispatch
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Status fetch failed; the session was reset to its idle default
    #[error("Session state degraded: {0}")]
    DegradedState(String),

    /// Result arrived after a newer session generation replaced the one it belonged to
    #[error("Result from generation {issued} superseded by generation {current}")]
    Superseded { issued: u64, current: u64 },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Channel send errors
    #[error("Channel send error: {0}")]
    ChannelSend(String),

    /// Channel receive errors
    #[error("Channel receive error: {0}")]
    ChannelReceive(String),

    /// Generic internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl MonitorError {
    /// True for failures that came back from (or on the way to) the backend
    pub fn is_request_failure(&self) -> bool {
        matches!(
            self,
            MonitorError::Request(_)
                | MonitorError::HttpRequest(_)
                | MonitorError::JsonParse(_)
                | MonitorError::InvalidResponse(_)
        )
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, MonitorError::Validation(_))
    }

    /// The validation reason, if this is a validation failure
    pub fn validation(&self) -> Option<&ValidationError> {
        match self {
            MonitorError::Validation(reason) => Some(reason),
            _ => None,
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for MonitorError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        MonitorError::Transport(err.to_string())
    }
}
