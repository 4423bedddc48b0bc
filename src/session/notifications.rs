//! Change notifications derived from canonical state transitions

use std::collections::HashSet;
use tracing::info;

use crate::common::registry::Registry;
use crate::common::types::{MonitoringSession, MonitoringTarget, Phase, SessionStats, SubscriptionToken};

/// A forward phase transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseChange {
    pub previous: Phase,
    pub next: Phase,
}

/// Everything the bus can deliver
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    PhaseChanged(PhaseChange),
    /// Target snapshot at the time it triggered
    TargetTriggered(MonitoringTarget),
    SessionCompleted(SessionStats),
}

/// Registries for the three notification kinds
///
/// Tokens are unique across all three registries, so `unsubscribe` accepts
/// any of them.
#[derive(Debug)]
pub struct NotificationBus {
    phase_changes: Registry<PhaseChange>,
    triggers: Registry<MonitoringTarget>,
    completions: Registry<SessionStats>,
}

impl Default for NotificationBus {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationBus {
    pub fn new() -> Self {
        let phase_changes = Registry::new();
        let triggers = Registry::sharing_ids_with(&phase_changes);
        let completions = Registry::sharing_ids_with(&phase_changes);
        Self {
            phase_changes,
            triggers,
            completions,
        }
    }

    pub fn on_phase_change<F>(&self, handler: F) -> SubscriptionToken
    where
        F: Fn(&PhaseChange) + Send + Sync + 'static,
    {
        self.phase_changes.subscribe(handler)
    }

    pub fn on_target_triggered<F>(&self, handler: F) -> SubscriptionToken
    where
        F: Fn(&MonitoringTarget) + Send + Sync + 'static,
    {
        self.triggers.subscribe(handler)
    }

    pub fn on_session_complete<F>(&self, handler: F) -> SubscriptionToken
    where
        F: Fn(&SessionStats) + Send + Sync + 'static,
    {
        self.completions.subscribe(handler)
    }

    pub fn unsubscribe(&self, token: SubscriptionToken) -> bool {
        self.phase_changes.unsubscribe(token)
            || self.triggers.unsubscribe(token)
            || self.completions.unsubscribe(token)
    }

    pub fn emit(&self, notification: &Notification) {
        match notification {
            Notification::PhaseChanged(change) => {
                info!(previous = %change.previous, next = %change.next, "Phase changed");
                self.phase_changes.emit(change);
            }
            Notification::TargetTriggered(target) => {
                info!(symbol = %target.symbol, price = %target.current_price, "Target triggered");
                self.triggers.emit(target);
            }
            Notification::SessionCompleted(stats) => {
                info!(
                    total = stats.total_targets,
                    triggered = stats.triggered_count,
                    "Monitoring session complete"
                );
                self.completions.emit(stats);
            }
        }
    }
}

/// Diffs consecutive session states against last-seen markers
///
/// Each transition is reported at most once, whether it arrived by push or
/// by poll. Markers survive degraded snapshots and are reset only by
/// [`ChangeDetector::reset`], which the coordinator calls on activation.
#[derive(Debug, Clone, Default)]
pub struct ChangeDetector {
    last_phase: Phase,
    notified: HashSet<String>,
    /// Completion not yet reported for the current activation
    armed: bool,
}

impl ChangeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a fresh session
    pub fn reset(&mut self) {
        self.last_phase = Phase::Waiting;
        self.notified.clear();
        self.armed = true;
    }

    pub fn diff(
        &mut self,
        previous: &MonitoringSession,
        next: &MonitoringSession,
    ) -> Vec<Notification> {
        let mut notifications = Vec::new();

        if (previous.is_running || next.is_running) && next.current_phase > self.last_phase {
            notifications.push(Notification::PhaseChanged(PhaseChange {
                previous: self.last_phase,
                next: next.current_phase,
            }));
            self.last_phase = next.current_phase;
        }

        for target in next.targets.iter().filter(|t| t.is_triggered) {
            if self.notified.insert(target.symbol.clone()) {
                notifications.push(Notification::TargetTriggered(target.clone()));
            }
        }

        if self.armed && next.is_terminal() {
            self.armed = false;
            notifications.push(Notification::SessionCompleted(next.stats()));
        }

        notifications
    }
}
