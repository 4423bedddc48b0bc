//! Wall-clock layout of the after-hours monitoring window

use chrono::{NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::common::errors::{MonitorError, Result};
use crate::common::types::Phase;

/// Start times of phase 1 through 4 and of completion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseSchedule {
    /// Strictly increasing: phase_1, phase_2, phase_3, phase_4, completed
    boundaries: [NaiveTime; 5],
}

const SCHEDULED: [Phase; 5] = [
    Phase::Phase1,
    Phase::Phase2,
    Phase::Phase3,
    Phase::Phase4,
    Phase::Completed,
];

impl Default for PhaseSchedule {
    /// 16:00 / 16:30 / 17:00 / 17:30, complete at 17:40
    fn default() -> Self {
        let hm = |h, m| NaiveTime::from_hms_opt(h, m, 0).unwrap_or(NaiveTime::MIN);
        Self {
            boundaries: [hm(16, 0), hm(16, 30), hm(17, 0), hm(17, 30), hm(17, 40)],
        }
    }
}

impl PhaseSchedule {
    pub fn new(boundaries: [NaiveTime; 5]) -> Result<Self> {
        if boundaries.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err(MonitorError::Configuration(format!(
                "phase boundaries must be strictly increasing: {:?}",
                boundaries
            )));
        }
        Ok(Self { boundaries })
    }

    /// Phase in effect at a time of day
    pub fn phase_at(&self, time: NaiveTime) -> Phase {
        match self.boundaries.iter().rposition(|start| time >= *start) {
            Some(index) => SCHEDULED[index],
            None => Phase::Waiting,
        }
    }

    /// Next boundary strictly after `time`, `None` once the window is over
    pub fn next_boundary(&self, time: NaiveTime) -> Option<NaiveTime> {
        self.boundaries.iter().copied().find(|start| time < *start)
    }

    /// Seconds until the next boundary on the same day, 0 after completion
    pub fn remaining_seconds(&self, at: NaiveDateTime) -> u64 {
        match self.next_boundary(at.time()) {
            Some(next) => (next - at.time()).num_seconds().max(0) as u64,
            None => 0,
        }
    }

    /// Start of a phase. `Waiting` reports the start of phase 1.
    pub fn phase_start(&self, phase: Phase) -> NaiveTime {
        match phase {
            Phase::Waiting | Phase::Phase1 => self.boundaries[0],
            Phase::Phase2 => self.boundaries[1],
            Phase::Phase3 => self.boundaries[2],
            Phase::Phase4 => self.boundaries[3],
            Phase::Completed => self.boundaries[4],
        }
    }

    /// Multiplier applied to buy thresholds as the window progresses
    pub fn threshold_factor(phase: Phase) -> Decimal {
        match phase {
            Phase::Waiting | Phase::Phase1 => Decimal::ONE,
            Phase::Phase2 => dec!(0.9),
            Phase::Phase3 => dec!(0.8),
            Phase::Phase4 | Phase::Completed => dec!(0.7),
        }
    }

    pub fn threshold_factor_at(&self, time: NaiveTime) -> Decimal {
        Self::threshold_factor(self.phase_at(time))
    }

    /// What the backend announces as the next step of a phase
    pub fn next_action(phase: Phase) -> &'static str {
        match phase {
            Phase::Waiting => "monitoring_start",
            Phase::Phase1 => "phase_2_monitoring",
            Phase::Phase2 => "phase_3_monitoring",
            Phase::Phase3 => "phase_4_monitoring",
            Phase::Phase4 => "session_complete",
            Phase::Completed => "session_ended",
        }
    }
}
