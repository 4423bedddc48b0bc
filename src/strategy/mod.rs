//! Threshold strategy for the after-hours session
//!
//! This module provides the time schedule and the threshold adjustment rules.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  PhaseSchedule                                              │
//! │    16:00 ─ phase_1 ─ 16:30 ─ phase_2 ─ 17:00 ─ phase_3 ─    │
//! │    17:30 ─ phase_4 ─ 17:40 ─ completed                      │
//! │    - Maps wall-clock time to a phase and a threshold factor │
//! └─────────────────────────────────────────────────────────────┘
//!
//! ┌─────────────────────────────────────────────────────────────┐
//! │  ThresholdAdjuster                                          │
//! │    current threshold                                        │
//! │       │                                                     │
//! │       ▼                                                     │
//! │    market condition + time factor + strategy                │
//! │       │                                                     │
//! │       ▼                                                     │
//! │    clamp to [min, max], round to 2 dp → recommendation      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Components
//!
//! - [`PhaseSchedule`]: Phase boundaries and time factors
//! - [`ThresholdAdjuster`]: Computes recommendations and previews
//! - [`AdjustmentRecommendation`]: One recommended threshold with its reason
//! - [`MarketSample`]: Input to [`ThresholdAdjuster::analyze_market`]

mod adjuster;
mod schedule;

pub use adjuster::{AdjustmentRecommendation, MarketSample, ThresholdAdjuster};
pub use schedule::PhaseSchedule;
