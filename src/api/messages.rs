//! Request and response bodies of the monitoring REST API

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::common::types::{
    AdjustmentStrategy, AppliedAdjustment, MarketCondition, MonitoringSession, MonitoringTarget,
    PerformanceStats, PreviewEntry, SessionSummary, SuggestedStrategy, WatchTarget,
};

// ============================================================================
// Requests
// ============================================================================

/// POST /monitoring/start
#[derive(Debug, Clone, Serialize)]
pub struct StartMonitoringRequest<'a> {
    pub targets: &'a [WatchTarget],
    pub auto_start: bool,
}

/// POST /monitoring/adjust-threshold
#[derive(Debug, Clone, Serialize)]
pub struct AdjustThresholdRequest<'a> {
    pub symbol: &'a str,
    #[serde(with = "rust_decimal::serde::float")]
    pub new_threshold: Decimal,
    pub strategy: AdjustmentStrategy,
}

/// POST /monitoring/auto-adjust-thresholds
#[derive(Debug, Clone, Serialize)]
pub struct AutoAdjustRequest<'a> {
    pub strategy: AdjustmentStrategy,
    pub apply_all: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_symbols: Option<&'a [String]>,
}

// ============================================================================
// Responses
// ============================================================================

/// Bodies that only carry a human-readable message (start, stop, adjust)
#[derive(Debug, Clone, Deserialize)]
pub struct MessageResponse {
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusResponse {
    pub status: MonitoringSession,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TargetsResponse {
    #[serde(default)]
    pub targets: Vec<MonitoringTarget>,
    #[serde(default)]
    pub count: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AutoAdjustResponse {
    #[serde(default)]
    pub message: String,
    pub strategy: AdjustmentStrategy,
    pub market_condition: MarketCondition,
    #[serde(default)]
    pub adjustments: Vec<AppliedAdjustment>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SuggestedStrategiesResponse {
    pub market_condition: MarketCondition,
    #[serde(default)]
    pub suggested_strategies: Vec<SuggestedStrategy>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PreviewResponse {
    pub strategy: AdjustmentStrategy,
    pub market_condition: MarketCondition,
    #[serde(default)]
    pub previews: Vec<PreviewEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionHistoryResponse {
    pub current_session: SessionSummary,
    #[serde(default)]
    pub history: Vec<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PerformanceStatsResponse {
    pub stats: PerformanceStats,
}

/// Error body returned with non-2xx statuses
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorResponse {
    pub detail: Value,
}

impl ErrorResponse {
    /// Human-readable failure message
    ///
    /// `detail` is a string for handled errors and a list of
    /// `{loc, msg, type}` objects for request validation failures.
    pub fn message(&self) -> String {
        match &self.detail {
            Value::String(text) => text.clone(),
            Value::Array(items) => items
                .iter()
                .map(|item| match item.get("msg").and_then(Value::as_str) {
                    Some(msg) => match item.get("loc").and_then(Value::as_array) {
                        Some(loc) => format!(
                            "{}: {}",
                            loc.iter()
                                .map(|part| match part {
                                    Value::String(s) => s.clone(),
                                    other => other.to_string(),
                                })
                                .collect::<Vec<_>>()
                                .join("."),
                            msg
                        ),
                        None => msg.to_string(),
                    },
                    None => item.to_string(),
                })
                .collect::<Vec<_>>()
                .join("; "),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_auto_adjust_request_omits_symbols() {
        let body = AutoAdjustRequest {
            strategy: AdjustmentStrategy::Balanced,
            apply_all: true,
            target_symbols: None,
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            serde_json::json!({"strategy": "balanced", "apply_all": true})
        );
    }

    #[test]
    fn test_adjust_request_sends_number() {
        let body = AdjustThresholdRequest {
            symbol: "005930",
            new_threshold: dec!(2.5),
            strategy: AdjustmentStrategy::Manual,
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            serde_json::json!({"symbol": "005930", "new_threshold": 2.5, "strategy": "manual"})
        );
    }

    #[test]
    fn test_error_detail_string_and_list() {
        let plain: ErrorResponse =
            serde_json::from_str(r#"{"detail":"Target not found: 005930"}"#).unwrap();
        assert_eq!(plain.message(), "Target not found: 005930");

        let validation: ErrorResponse = serde_json::from_str(
            r#"{"detail":[{"loc":["body","new_threshold"],"msg":"Input should be less than or equal to 10","type":"less_than_equal"}]}"#,
        )
        .unwrap();
        assert_eq!(
            validation.message(),
            "body.new_threshold: Input should be less than or equal to 10"
        );
    }

    #[test]
    fn test_preview_without_volume_ratio() {
        let body = r#"{
            "success": true,
            "strategy": "aggressive",
            "market_condition": {"total_rise_count": 40, "total_stock_count": 50, "average_change": 1.2, "volatility_index": 0.8},
            "previews": [{"symbol":"A","stock_name":"Alpha","current_threshold":2.0,"recommended_threshold":1.6,"adjustment_reason":"lowered","confidence_score":0.7}]
        }"#;
        let preview: PreviewResponse = serde_json::from_str(body).unwrap();
        assert_eq!(preview.market_condition.volume_ratio, 1.0);
        assert_eq!(preview.previews[0].recommended_threshold, dec!(1.6));
    }
}
