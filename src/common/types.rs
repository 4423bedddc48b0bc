//! Domain types shared by the transport, API client and session coordinator

use chrono::{DateTime, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Phase of the after-hours monitoring window
///
/// Variants are declared in wall-clock order so `Ord` matches the session timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub enum Phase {
    #[default]
    #[serde(rename = "waiting")]
    Waiting,
    #[serde(rename = "phase_1")]
    Phase1,
    #[serde(rename = "phase_2")]
    Phase2,
    #[serde(rename = "phase_3")]
    Phase3,
    #[serde(rename = "phase_4")]
    Phase4,
    #[serde(rename = "completed")]
    Completed,
}

impl Phase {
    pub const ALL: [Phase; 6] = [
        Phase::Waiting,
        Phase::Phase1,
        Phase::Phase2,
        Phase::Phase3,
        Phase::Phase4,
        Phase::Completed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Waiting => "waiting",
            Phase::Phase1 => "phase_1",
            Phase::Phase2 => "phase_2",
            Phase::Phase3 => "phase_3",
            Phase::Phase4 => "phase_4",
            Phase::Completed => "completed",
        }
    }

    /// True for the four phases in which targets are actively watched
    pub fn is_monitoring(&self) -> bool {
        matches!(
            self,
            Phase::Phase1 | Phase::Phase2 | Phase::Phase3 | Phase::Phase4
        )
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Phase::ALL
            .into_iter()
            .find(|phase| phase.as_str() == s)
            .ok_or_else(|| format!("unknown phase: {}", s))
    }
}

/// Named policy for computing recommended thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentStrategy {
    Conservative,
    Balanced,
    Aggressive,
    TimeBased,
    Manual,
}

impl AdjustmentStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdjustmentStrategy::Conservative => "conservative",
            AdjustmentStrategy::Balanced => "balanced",
            AdjustmentStrategy::Aggressive => "aggressive",
            AdjustmentStrategy::TimeBased => "time_based",
            AdjustmentStrategy::Manual => "manual",
        }
    }

    /// Whether bulk operations (auto-adjust, preview) accept this strategy
    pub fn is_computed(&self) -> bool {
        !matches!(self, AdjustmentStrategy::Manual)
    }

    /// Nearest strategy a bulk operation accepts
    pub fn bulk_equivalent(self) -> AdjustmentStrategy {
        match self {
            AdjustmentStrategy::Manual => AdjustmentStrategy::Balanced,
            other => other,
        }
    }
}

impl fmt::Display for AdjustmentStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AdjustmentStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "conservative" => Ok(AdjustmentStrategy::Conservative),
            "balanced" => Ok(AdjustmentStrategy::Balanced),
            "aggressive" => Ok(AdjustmentStrategy::Aggressive),
            "time_based" | "time-based" => Ok(AdjustmentStrategy::TimeBased),
            "manual" => Ok(AdjustmentStrategy::Manual),
            other => Err(format!("unknown strategy: {}", other)),
        }
    }
}

/// One entry of the watch-list submitted to `start`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchTarget {
    pub symbol: String,
    pub stock_name: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub entry_price: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub buy_threshold: Decimal,
}

impl WatchTarget {
    pub fn new(
        symbol: impl Into<String>,
        stock_name: impl Into<String>,
        entry_price: Decimal,
        buy_threshold: Decimal,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            stock_name: stock_name.into(),
            entry_price,
            buy_threshold,
        }
    }
}

/// One watched instrument
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoringTarget {
    /// Stable identifier, primary key within a session
    pub symbol: String,
    #[serde(default)]
    pub stock_name: String,
    pub entry_price: Decimal,
    #[serde(default)]
    pub current_price: Decimal,
    #[serde(default)]
    pub change_percent: Decimal,
    #[serde(default)]
    pub volume: u64,
    /// Buy-alert threshold in percent
    pub buy_threshold: Decimal,
    #[serde(default)]
    pub is_triggered: bool,
    #[serde(default, with = "wire_time::timestamp_opt")]
    pub trigger_time: Option<NaiveDateTime>,
}

impl MonitoringTarget {
    /// Fresh, untriggered target priced at its entry price
    pub fn from_watch(target: &WatchTarget) -> Self {
        Self {
            symbol: target.symbol.clone(),
            stock_name: target.stock_name.clone(),
            entry_price: target.entry_price,
            current_price: target.entry_price,
            change_percent: Decimal::ZERO,
            volume: 0,
            buy_threshold: target.buy_threshold,
            is_triggered: false,
            trigger_time: None,
        }
    }
}

/// Canonical state of the monitoring session
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MonitoringSession {
    #[serde(default)]
    pub is_running: bool,
    #[serde(default)]
    pub current_phase: Phase,
    #[serde(default, with = "wire_time::timestamp_opt")]
    pub phase_start_time: Option<NaiveDateTime>,
    #[serde(default, with = "wire_time::time_of_day_opt")]
    pub next_phase_time: Option<NaiveTime>,
    #[serde(default)]
    pub remaining_time_seconds: u64,
    /// Watch-list order, stable
    #[serde(default, rename = "monitoring_targets", alias = "targets")]
    pub targets: Vec<MonitoringTarget>,
    #[serde(default)]
    pub total_targets: usize,
    #[serde(default)]
    pub triggered_count: usize,
}

impl MonitoringSession {
    /// The "waiting, empty" value used at startup, after stop and after a failed fetch
    pub fn idle() -> Self {
        Self::default()
    }

    pub fn target(&self, symbol: &str) -> Option<&MonitoringTarget> {
        self.targets.iter().find(|t| t.symbol == symbol)
    }

    pub fn target_mut(&mut self, symbol: &str) -> Option<&mut MonitoringTarget> {
        self.targets.iter_mut().find(|t| t.symbol == symbol)
    }

    /// Number of targets currently flagged as triggered
    pub fn count_triggered(&self) -> usize {
        self.targets.iter().filter(|t| t.is_triggered).count()
    }

    /// Re-derive the aggregate counters from the target list
    pub fn normalized(mut self) -> Self {
        self.triggered_count = self.count_triggered();
        self.total_targets = self.targets.len();
        self
    }

    /// True once the window has ended and the backend stopped the session
    pub fn is_terminal(&self) -> bool {
        self.current_phase == Phase::Completed && !self.is_running
    }

    pub fn symbols(&self) -> Vec<String> {
        self.targets.iter().map(|t| t.symbol.clone()).collect()
    }

    /// Aggregate statistics of the current target list
    pub fn stats(&self) -> SessionStats {
        let total_targets = self.targets.len();
        let triggered_count = self.count_triggered();

        if total_targets == 0 {
            return SessionStats {
                total_targets,
                triggered_count,
                success_rate: Decimal::ZERO,
                average_change_percent: Decimal::ZERO,
            };
        }

        let total = Decimal::from(total_targets as u64);
        let change_sum: Decimal = self.targets.iter().map(|t| t.change_percent).sum();

        SessionStats {
            total_targets,
            triggered_count,
            success_rate: (Decimal::from(triggered_count as u64) / total).round_dp(4),
            average_change_percent: (change_sum / total).round_dp(2),
        }
    }
}

/// Aggregate statistics carried by the session-complete notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionStats {
    pub total_targets: usize,
    pub triggered_count: usize,
    /// Fraction of targets that triggered, 0 when there are no targets
    pub success_rate: Decimal,
    /// Mean change percent across all targets, 0 when there are no targets
    pub average_change_percent: Decimal,
}

/// Aggregate market state used as strategy input
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MarketCondition {
    pub total_rise_count: u32,
    #[serde(default)]
    pub total_stock_count: u32,
    pub average_change: f64,
    pub volatility_index: f64,
    #[serde(default = "default_volume_ratio")]
    pub volume_ratio: f64,
}

fn default_volume_ratio() -> f64 {
    1.0
}

impl MarketCondition {
    /// Share of rising stocks, 0 when nothing was sampled
    pub fn rise_ratio(&self) -> f64 {
        if self.total_stock_count == 0 {
            0.0
        } else {
            self.total_rise_count as f64 / self.total_stock_count as f64
        }
    }
}

/// Per-symbol recommendation inside a preview
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreviewEntry {
    pub symbol: String,
    #[serde(default)]
    pub stock_name: String,
    pub current_threshold: Decimal,
    pub recommended_threshold: Decimal,
    #[serde(default)]
    pub adjustment_reason: String,
    pub confidence_score: f64,
}

/// Result of a preview call; never stored in the session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdPreview {
    pub strategy: AdjustmentStrategy,
    pub market_condition: MarketCondition,
    pub previews: Vec<PreviewEntry>,
}

impl ThresholdPreview {
    pub fn entry(&self, symbol: &str) -> Option<&PreviewEntry> {
        self.previews.iter().find(|p| p.symbol == symbol)
    }
}

/// A strategy suggested for the current market
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestedStrategy {
    pub strategy: AdjustmentStrategy,
    pub description: String,
}

/// Suggested strategies together with the market read they were derived from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategySuggestions {
    pub market_condition: MarketCondition,
    pub suggested_strategies: Vec<SuggestedStrategy>,
}

/// One applied adjustment reported by auto-adjust
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedAdjustment {
    pub symbol: String,
    pub old_threshold: Decimal,
    pub new_threshold: Decimal,
    #[serde(default)]
    pub adjustment_reason: String,
    #[serde(default)]
    pub confidence_score: f64,
    pub strategy: AdjustmentStrategy,
}

/// Outcome of a bulk auto-adjust
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoAdjustOutcome {
    pub message: String,
    pub strategy: AdjustmentStrategy,
    pub market_condition: MarketCondition,
    pub adjustments: Vec<AppliedAdjustment>,
}

/// Backend-computed performance statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceStats {
    pub total_targets: usize,
    pub triggered_count: usize,
    /// Percent (0-100)
    pub success_rate: Decimal,
    pub average_change_percent: Decimal,
    #[serde(default)]
    pub session_duration_minutes: i64,
    #[serde(default)]
    pub current_phase: Phase,
}

/// Summary of the session the backend currently holds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub phase: Phase,
    #[serde(default, with = "wire_time::timestamp_opt")]
    pub start_time: Option<NaiveDateTime>,
    pub total_targets: usize,
    pub triggered_count: usize,
    pub is_running: bool,
}

/// Current session plus past sessions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionHistory {
    pub current_session: SessionSummary,
    #[serde(default)]
    pub history: Vec<serde_json::Value>,
}

/// Connection state of the push channel
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TransportStatus {
    pub connected: bool,
    pub reconnecting: bool,
    pub error_count: u32,
    pub last_heartbeat: Option<DateTime<Utc>>,
}

/// Result of asking the transport to connect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// A connection task was started
    Started,
    /// Already connected or connecting; nothing was done
    AlreadyActive,
}

/// Handle returned by every registry; pass it back to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionToken(pub(crate) u64);

impl fmt::Display for SubscriptionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// What observers of the canonical state receive
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SessionView {
    pub session: MonitoringSession,
    /// Current session generation; bumped by every activation and stop
    pub generation: u64,
    /// A session started by this coordinator is being tracked (polling, push)
    pub active: bool,
    /// Message of the last failed status fetch, cleared by the next good one
    pub last_error: Option<String>,
    pub transport: TransportStatus,
}

/// Lenient (de)serializers for the backend's timestamp formats
///
/// The backend emits naive ISO-8601 timestamps (`2024-01-02T16:30:00.123456`) and
/// `HH:MM` times of day. Unparseable values deserialize to `None`.
pub mod wire_time {
    use chrono::{DateTime, NaiveDateTime, NaiveTime};

    const TIMESTAMP_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

    pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
        let raw = raw.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(dt.naive_local());
        }
        TIMESTAMP_FORMATS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
    }

    pub fn parse_time_of_day(raw: &str) -> Option<NaiveTime> {
        let raw = raw.trim();
        NaiveTime::parse_from_str(raw, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
            .ok()
            .or_else(|| parse_timestamp(raw).map(|dt| dt.time()))
    }

    pub mod timestamp_opt {
        use chrono::NaiveDateTime;
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            value: &Option<NaiveDateTime>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(dt) => serializer.serialize_str(&dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string()),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<NaiveDateTime>, D::Error> {
            let raw = Option::<String>::deserialize(deserializer)?;
            Ok(raw.as_deref().and_then(super::parse_timestamp))
        }
    }

    pub mod time_of_day_opt {
        use chrono::NaiveTime;
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            value: &Option<NaiveTime>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(t) => serializer.serialize_str(&t.format("%H:%M").to_string()),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<NaiveTime>, D::Error> {
            let raw = Option::<String>::deserialize(deserializer)?;
            Ok(raw.as_deref().and_then(super::parse_time_of_day))
        }
    }
}
