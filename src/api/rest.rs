//! REST client for the backend monitoring API

use async_trait::async_trait;
use reqwest::{Client, Response};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use super::messages::*;
use crate::common::errors::{MonitorError, Result, ValidationError};
use crate::common::traits::MonitoringApi;
use crate::common::types::{
    AdjustmentStrategy, AutoAdjustOutcome, MonitoringSession, MonitoringTarget, PerformanceStats,
    SessionHistory, StrategySuggestions, ThresholdPreview, WatchTarget,
};
use crate::config::types::BackendConfig;

/// REST client for the monitoring endpoints
#[derive(Debug, Clone)]
pub struct MonitoringRestClient {
    /// HTTP client
    client: Client,
    /// Base URL, e.g. `http://localhost:8000/api`
    base_url: String,
}

impl MonitoringRestClient {
    /// Create a new REST client
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_timeout(base_url, Duration::from_secs(30))
    }

    /// Create a new REST client with custom timeout
    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MonitorError::Internal(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &BackendConfig) -> Result<Self> {
        Self::with_timeout(&config.rest_url, config.request_timeout())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        debug!("Fetching {} from: {}", path, url);

        let response = self.client.get(&url).query(query).send().await?;
        Self::parse_response(response).await
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: Option<&B>,
    ) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        debug!("Posting to: {}", url);

        let request = self.client.post(&url);
        let request = match body {
            Some(body) => request.json(body),
            None => request,
        };
        let response = request.send().await?;
        Self::parse_response(response).await
    }

    /// Map the response to `T`, surfacing `detail` on errors and rejecting `success: false`
    async fn parse_response<T: DeserializeOwned>(response: Response) -> Result<T> {
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(match serde_json::from_str::<ErrorResponse>(&body) {
                Ok(error) => {
                    warn!("Request rejected with status {}: {}", status, error.message());
                    MonitorError::Request(error.message())
                }
                Err(_) => MonitorError::InvalidResponse(format!(
                    "Server returned status {}: {}",
                    status, body
                )),
            });
        }

        let value: Value = serde_json::from_str(&body)?;
        if value.get("success").and_then(Value::as_bool) == Some(false) {
            let message = value
                .get("message")
                .or_else(|| value.get("detail"))
                .and_then(Value::as_str)
                .unwrap_or("request reported failure");
            return Err(MonitorError::Request(message.to_string()));
        }

        Ok(serde_json::from_value(value)?)
    }
}

fn require_computed(strategy: AdjustmentStrategy) -> Result<()> {
    if strategy.is_computed() {
        Ok(())
    } else {
        Err(ValidationError::ManualStrategyNotAllowed.into())
    }
}

#[async_trait]
impl MonitoringApi for MonitoringRestClient {
    #[instrument(skip(self, targets), fields(count = targets.len()))]
    async fn start_monitoring(&self, targets: Vec<WatchTarget>, auto_start: bool) -> Result<String> {
        let body = StartMonitoringRequest {
            targets: &targets,
            auto_start,
        };
        let response: MessageResponse = self.post("/monitoring/start", Some(&body)).await?;
        Ok(response.message)
    }

    #[instrument(skip(self))]
    async fn stop_monitoring(&self) -> Result<String> {
        let response: MessageResponse = self.post::<(), _>("/monitoring/stop", None).await?;
        Ok(response.message)
    }

    #[instrument(skip(self))]
    async fn get_status(&self) -> Result<MonitoringSession> {
        let response: StatusResponse = self.get("/monitoring/status", &[]).await?;
        Ok(response.status)
    }

    #[instrument(skip(self))]
    async fn get_targets(&self) -> Result<Vec<MonitoringTarget>> {
        let response: TargetsResponse = self.get("/monitoring/targets", &[]).await?;
        if response.count != response.targets.len() {
            debug!(
                count = response.count,
                listed = response.targets.len(),
                "Target count disagrees with list"
            );
        }
        Ok(response.targets)
    }

    #[instrument(skip(self))]
    async fn adjust_threshold(&self, symbol: String, new_threshold: Decimal) -> Result<String> {
        let body = AdjustThresholdRequest {
            symbol: &symbol,
            new_threshold,
            strategy: AdjustmentStrategy::Manual,
        };
        let response: MessageResponse =
            self.post("/monitoring/adjust-threshold", Some(&body)).await?;
        Ok(response.message)
    }

    #[instrument(skip(self))]
    async fn auto_adjust_thresholds(
        &self,
        strategy: AdjustmentStrategy,
        apply_all: bool,
        target_symbols: Option<Vec<String>>,
    ) -> Result<AutoAdjustOutcome> {
        require_computed(strategy)?;

        let body = AutoAdjustRequest {
            strategy,
            apply_all,
            target_symbols: target_symbols.as_deref(),
        };
        let response: AutoAdjustResponse = self
            .post("/monitoring/auto-adjust-thresholds", Some(&body))
            .await?;

        Ok(AutoAdjustOutcome {
            message: response.message,
            strategy: response.strategy,
            market_condition: response.market_condition,
            adjustments: response.adjustments,
        })
    }

    #[instrument(skip(self))]
    async fn get_suggested_strategies(&self) -> Result<StrategySuggestions> {
        let response: SuggestedStrategiesResponse =
            self.get("/monitoring/suggested-strategies", &[]).await?;
        Ok(StrategySuggestions {
            market_condition: response.market_condition,
            suggested_strategies: response.suggested_strategies,
        })
    }

    #[instrument(skip(self))]
    async fn get_threshold_preview(
        &self,
        strategy: AdjustmentStrategy,
        symbol: Option<String>,
    ) -> Result<ThresholdPreview> {
        require_computed(strategy)?;

        let mut query = vec![("strategy", strategy.as_str())];
        if let Some(symbol) = symbol.as_deref() {
            query.push(("symbol", symbol));
        }

        let response: PreviewResponse = self.get("/monitoring/threshold-preview", &query).await?;
        Ok(ThresholdPreview {
            strategy: response.strategy,
            market_condition: response.market_condition,
            previews: response.previews,
        })
    }

    #[instrument(skip(self))]
    async fn get_session_history(&self) -> Result<SessionHistory> {
        let response: SessionHistoryResponse =
            self.get("/monitoring/session-history", &[]).await?;
        Ok(SessionHistory {
            current_session: response.current_session,
            history: response.history,
        })
    }

    #[instrument(skip(self))]
    async fn get_performance_stats(&self) -> Result<PerformanceStats> {
        let response: PerformanceStatsResponse =
            self.get("/monitoring/performance-stats", &[]).await?;
        Ok(response.stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash() {
        let client = MonitoringRestClient::new("http://localhost:8000/api/").unwrap();
        assert_eq!(client.base_url(), "http://localhost:8000/api");
    }

    #[tokio::test]
    async fn test_manual_rejected_before_dispatch() {
        // Nothing listens on this port; the call must fail without reaching it
        let client = MonitoringRestClient::new("http://127.0.0.1:9").unwrap();

        let result = client
            .get_threshold_preview(AdjustmentStrategy::Manual, None)
            .await;
        assert!(matches!(
            result.unwrap_err().validation(),
            Some(ValidationError::ManualStrategyNotAllowed)
        ));

        let result = client
            .auto_adjust_thresholds(AdjustmentStrategy::Manual, true, None)
            .await;
        assert!(result.unwrap_err().is_validation());
    }
}
