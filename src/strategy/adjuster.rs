//! Threshold adjustment strategies
//!
//! Computes recommended buy thresholds from a market read and the time of
//! day. The backend runs the same rules for its preview and auto-adjust
//! endpoints; this engine lets callers compute a preview without a round trip.

use chrono::NaiveTime;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::debug;

use super::schedule::PhaseSchedule;
use crate::common::errors::{Result, ValidationError};
use crate::common::types::{
    AdjustmentStrategy, MarketCondition, MonitoringTarget, PreviewEntry, SuggestedStrategy,
    ThresholdPreview,
};
use crate::config::types::MonitoringConfig;

/// One recommendation for one threshold
#[derive(Debug, Clone, PartialEq)]
pub struct AdjustmentRecommendation {
    pub current_threshold: Decimal,
    pub recommended_threshold: Decimal,
    pub adjustment_reason: String,
    /// Within [0, 1]
    pub confidence_score: f64,
    pub strategy: AdjustmentStrategy,
}

/// One instrument's move, input to [`ThresholdAdjuster::analyze_market`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarketSample {
    pub change_percent: f64,
    pub volume: u64,
}

impl From<&MonitoringTarget> for MarketSample {
    fn from(target: &MonitoringTarget) -> Self {
        Self {
            change_percent: target.change_percent.to_f64().unwrap_or(0.0),
            volume: target.volume,
        }
    }
}

/// Strategy engine with threshold bounds and a phase schedule
#[derive(Debug, Clone)]
pub struct ThresholdAdjuster {
    schedule: PhaseSchedule,
    min_threshold: Decimal,
    max_threshold: Decimal,
}

impl Default for ThresholdAdjuster {
    fn default() -> Self {
        Self::new(PhaseSchedule::default(), dec!(0.5), dec!(5.0))
    }
}

impl ThresholdAdjuster {
    pub fn new(schedule: PhaseSchedule, min_threshold: Decimal, max_threshold: Decimal) -> Self {
        Self {
            schedule,
            min_threshold,
            max_threshold,
        }
    }

    pub fn from_config(config: &MonitoringConfig) -> Self {
        Self::new(
            PhaseSchedule::default(),
            config.min_threshold,
            config.max_threshold,
        )
    }

    pub fn schedule(&self) -> &PhaseSchedule {
        &self.schedule
    }

    /// Recommend a new threshold. `Manual` leaves the value unchanged apart from clamping.
    pub fn calculate_adjustment(
        &self,
        current_threshold: Decimal,
        market: &MarketCondition,
        at: NaiveTime,
        strategy: AdjustmentStrategy,
    ) -> AdjustmentRecommendation {
        let raw = match strategy {
            AdjustmentStrategy::TimeBased => self.time_based(current_threshold, at),
            AdjustmentStrategy::Conservative => conservative(current_threshold, market),
            AdjustmentStrategy::Aggressive => aggressive(current_threshold, market),
            AdjustmentStrategy::Balanced => {
                self.time_based(current_threshold, at) * breadth_factor(market)
            }
            AdjustmentStrategy::Manual => current_threshold,
        };

        let recommended = raw
            .max(self.min_threshold)
            .min(self.max_threshold)
            .round_dp(2);

        debug!(
            %strategy,
            current = %current_threshold,
            recommended = %recommended,
            "Calculated threshold adjustment"
        );

        AdjustmentRecommendation {
            current_threshold,
            recommended_threshold: recommended,
            adjustment_reason: reason(current_threshold, recommended, market, strategy),
            confidence_score: confidence(market, strategy),
            strategy,
        }
    }

    /// Preview recommendations for the given targets, optionally a single symbol
    ///
    /// An unknown `symbol` yields an empty preview list.
    pub fn preview(
        &self,
        strategy: AdjustmentStrategy,
        market: &MarketCondition,
        targets: &[MonitoringTarget],
        symbol: Option<&str>,
        at: NaiveTime,
    ) -> Result<ThresholdPreview> {
        if !strategy.is_computed() {
            return Err(ValidationError::ManualStrategyNotAllowed.into());
        }

        let previews = targets
            .iter()
            .filter(|target| symbol.map_or(true, |s| target.symbol == s))
            .map(|target| {
                let rec = self.calculate_adjustment(target.buy_threshold, market, at, strategy);
                PreviewEntry {
                    symbol: target.symbol.clone(),
                    stock_name: target.stock_name.clone(),
                    current_threshold: rec.current_threshold,
                    recommended_threshold: rec.recommended_threshold,
                    adjustment_reason: rec.adjustment_reason,
                    confidence_score: rec.confidence_score,
                }
            })
            .collect();

        Ok(ThresholdPreview {
            strategy,
            market_condition: market.clone(),
            previews,
        })
    }

    fn time_based(&self, threshold: Decimal, at: NaiveTime) -> Decimal {
        threshold * self.schedule.threshold_factor_at(at)
    }

    /// Aggregate a market read from individual moves
    pub fn analyze_market(samples: &[MarketSample]) -> MarketCondition {
        if samples.is_empty() {
            return MarketCondition {
                total_rise_count: 0,
                total_stock_count: 0,
                average_change: 0.0,
                volatility_index: 0.0,
                volume_ratio: 1.0,
            };
        }

        let count = samples.len() as f64;
        let rises = samples.iter().filter(|s| s.change_percent > 0.0).count();
        let mean = samples.iter().map(|s| s.change_percent).sum::<f64>() / count;

        let volatility = if samples.len() > 1 {
            let variance = samples
                .iter()
                .map(|s| (s.change_percent - mean).powi(2))
                .sum::<f64>()
                / count;
            variance.sqrt()
        } else {
            0.0
        };

        let total_volume: u64 = samples.iter().map(|s| s.volume).sum();
        let volume_ratio = (total_volume as f64 / count / 1_000_000.0).clamp(0.5, 2.0);

        MarketCondition {
            total_rise_count: rises as u32,
            total_stock_count: samples.len() as u32,
            average_change: round2(mean),
            volatility_index: round2(volatility),
            volume_ratio: round2(volume_ratio),
        }
    }

    /// Up to three strategies suited to the market read
    pub fn suggested_strategies(market: &MarketCondition) -> Vec<SuggestedStrategy> {
        let mut suggestions = Vec::new();
        let mut suggest = |strategy, description: &str| {
            suggestions.push(SuggestedStrategy {
                strategy,
                description: description.to_string(),
            })
        };

        let rise_ratio = market.rise_ratio();
        if rise_ratio > 0.7 {
            suggest(
                AdjustmentStrategy::Aggressive,
                "Most stocks are rising - enter aggressively",
            );
        } else if rise_ratio > 0.5 {
            suggest(AdjustmentStrategy::Balanced, "Market trending up - balanced approach");
        } else if rise_ratio < 0.3 {
            suggest(AdjustmentStrategy::Conservative, "Weak market - conservative approach");
        }

        if market.volatility_index > 3.0 {
            suggest(AdjustmentStrategy::Conservative, "High volatility - proceed with caution");
        } else if market.volatility_index > 1.5 {
            suggest(AdjustmentStrategy::Balanced, "Moderate volatility - balanced approach");
        }

        suggest(
            AdjustmentStrategy::TimeBased,
            "Adjust automatically as the session progresses",
        );

        suggestions.truncate(3);
        suggestions
    }
}

fn conservative(threshold: Decimal, market: &MarketCondition) -> Decimal {
    let mut factor = dec!(1.2);
    if market.volatility_index > 2.0 {
        factor += dec!(0.1);
    }
    if market.rise_ratio() < 0.3 {
        factor += dec!(0.1);
    }
    threshold * factor
}

fn aggressive(threshold: Decimal, market: &MarketCondition) -> Decimal {
    let mut factor = dec!(0.8);
    if market.rise_ratio() > 0.7 {
        factor -= dec!(0.1);
    }
    if market.average_change > 2.0 {
        factor -= dec!(0.1);
    }
    threshold * factor.max(dec!(0.5))
}

fn breadth_factor(market: &MarketCondition) -> Decimal {
    let rise_ratio = market.rise_ratio();
    if rise_ratio > 0.6 {
        dec!(0.9)
    } else if rise_ratio < 0.4 {
        dec!(1.1)
    } else {
        Decimal::ONE
    }
}

fn reason(
    current: Decimal,
    new: Decimal,
    market: &MarketCondition,
    strategy: AdjustmentStrategy,
) -> String {
    let change_percent = if current > Decimal::ZERO {
        (new - current) / current * dec!(100)
    } else {
        Decimal::ZERO
    };

    let mut parts = Vec::with_capacity(3);
    if change_percent.abs() < Decimal::ONE {
        parts.push("threshold maintained".to_string());
    } else if change_percent > Decimal::ZERO {
        parts.push(format!("threshold raised by {:.1}%", change_percent));
    } else {
        parts.push(format!("threshold lowered by {:.1}%", change_percent.abs()));
    }

    match strategy {
        AdjustmentStrategy::TimeBased => {
            parts.push("automatic adjustment as the session progresses".to_string())
        }
        AdjustmentStrategy::Conservative => {
            parts.push("conservative approach to reduce risk".to_string())
        }
        AdjustmentStrategy::Aggressive => {
            parts.push("aggressive approach to widen opportunities".to_string())
        }
        AdjustmentStrategy::Balanced | AdjustmentStrategy::Manual => {}
    }

    let rise_ratio = market.rise_ratio();
    if rise_ratio > 0.7 {
        parts.push("bull market response".to_string());
    } else if rise_ratio < 0.3 {
        parts.push("bear market response".to_string());
    }

    parts.join(" - ")
}

fn confidence(market: &MarketCondition, strategy: AdjustmentStrategy) -> f64 {
    let mut score: f64 = 0.7;

    if market.total_stock_count > 100 {
        score += 0.1;
    } else if market.total_stock_count < 50 {
        score -= 0.1;
    }

    if market.volatility_index > 3.0 {
        score -= 0.1;
    } else if market.volatility_index < 1.0 {
        score += 0.1;
    }

    match strategy {
        AdjustmentStrategy::TimeBased => score += 0.1,
        AdjustmentStrategy::Balanced => score += 0.05,
        _ => {}
    }

    round2(score.clamp(0.0, 1.0))
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
