//! Folding push messages and status snapshots into the canonical session
//!
//! Every function takes the current session by value and returns the merged
//! one. They are total: unknown symbols and unrecognised messages leave the
//! session as it was. Counters are always re-derived from the target list.

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::common::types::{MonitoringSession, MonitoringTarget};
use crate::transport::messages::{PushMessage, PushPayload, SessionStatusUpdate};

/// Outcome of a status fetch
#[derive(Debug, Clone, PartialEq)]
pub enum Snapshot {
    Fetched(MonitoringSession),
    /// The fetch failed with this message
    Failed(String),
}

/// Replace the session with a fetched snapshot, or fall back to the idle default
///
/// Targets that were already triggered stay triggered with their original
/// trigger time, even if the snapshot lags behind a buy signal.
pub fn apply_snapshot(session: MonitoringSession, snapshot: Snapshot) -> MonitoringSession {
    match snapshot {
        Snapshot::Fetched(mut next) => {
            next.targets = merge_targets(&session.targets, next.targets);
            next.normalized()
        }
        Snapshot::Failed(message) => {
            warn!("Status fetch failed, resetting session: {}", message);
            MonitoringSession::idle()
        }
    }
}

/// Update one target's market fields. Unknown symbols are ignored.
///
/// A tick without a volume keeps the last known one.
pub fn apply_price_update(
    mut session: MonitoringSession,
    symbol: &str,
    price: Decimal,
    change_percent: Decimal,
    volume: Option<u64>,
) -> MonitoringSession {
    match session.target_mut(symbol) {
        Some(target) => {
            target.current_price = price;
            target.change_percent = change_percent;
            if let Some(volume) = volume {
                target.volume = volume;
            }
        }
        None => debug!(symbol, "Price update for unwatched symbol"),
    }
    session.normalized()
}

/// Mark a target as triggered. Only the first trigger for a symbol has any effect.
pub fn apply_trigger(
    mut session: MonitoringSession,
    symbol: &str,
    trigger_time: NaiveDateTime,
) -> MonitoringSession {
    match session.target_mut(symbol) {
        Some(target) if !target.is_triggered => {
            target.is_triggered = true;
            target.trigger_time = Some(trigger_time);
        }
        Some(_) => {}
        None => debug!(symbol, "Trigger for unwatched symbol"),
    }
    session.normalized()
}

/// Patch the fields a `session_status` message carries
///
/// While the session runs, a patch that keeps it running but names an earlier
/// phase than the current one is late and its phase is ignored.
pub fn apply_status_patch(
    mut session: MonitoringSession,
    update: &SessionStatusUpdate,
) -> MonitoringSession {
    let stays_running = session.is_running && update.is_running.unwrap_or(true);
    if let Some(phase) = update.current_phase {
        if stays_running && phase < session.current_phase {
            debug!(
                current = %session.current_phase,
                reported = %phase,
                "Ignoring phase regression from push"
            );
        } else {
            session.current_phase = phase;
        }
    }
    if let Some(is_running) = update.is_running {
        session.is_running = is_running;
    }
    if let Some(next) = update.next_phase_time {
        session.next_phase_time = Some(next);
    }
    if let Some(remaining) = update.remaining_time_seconds {
        session.remaining_time_seconds = remaining;
    }
    if let Some(targets) = &update.targets {
        session.targets = merge_targets(&session.targets, targets.clone());
    }
    session.normalized()
}

/// Fold one push message into the session
///
/// Buy signals trigger at the message timestamp, or at `received_at` when the
/// message has none. Messages that carry no session state are no-ops.
pub fn apply_push(
    session: MonitoringSession,
    message: &PushMessage,
    received_at: NaiveDateTime,
) -> MonitoringSession {
    match &message.payload {
        PushPayload::PriceUpdate(update) => apply_price_update(
            session,
            &update.symbol,
            update.price,
            update.change_percent,
            update.volume,
        ),
        PushPayload::BuySignal(signal) => apply_trigger(
            session,
            &signal.symbol,
            message.timestamp.unwrap_or(received_at),
        ),
        PushPayload::SessionStatus(update) => apply_status_patch(session, update),
        PushPayload::SellSignal(_)
        | PushPayload::PortfolioUpdate(_)
        | PushPayload::Heartbeat
        | PushPayload::Error { .. }
        | PushPayload::Unrecognized { .. } => session,
    }
}

fn merge_targets(
    previous: &[MonitoringTarget],
    mut next: Vec<MonitoringTarget>,
) -> Vec<MonitoringTarget> {
    for target in next.iter_mut() {
        let Some(before) = previous.iter().find(|p| p.symbol == target.symbol) else {
            continue;
        };
        if before.is_triggered {
            target.is_triggered = true;
            target.trigger_time = before.trigger_time.or(target.trigger_time);
        }
    }
    next
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::types::Phase;
    use crate::transport::messages::{PriceUpdate, TradeSignal};
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    fn target(symbol: &str) -> MonitoringTarget {
        MonitoringTarget {
            symbol: symbol.to_string(),
            stock_name: format!("{} Corp", symbol),
            entry_price: dec!(71500),
            current_price: dec!(71500),
            change_percent: Decimal::ZERO,
            volume: 0,
            buy_threshold: dec!(2.0),
            is_triggered: false,
            trigger_time: None,
        }
    }

    fn running(symbols: &[&str]) -> MonitoringSession {
        MonitoringSession {
            is_running: true,
            current_phase: Phase::Phase1,
            targets: symbols.iter().map(|s| target(s)).collect(),
            ..MonitoringSession::idle()
        }
        .normalized()
    }

    #[test]
    fn test_snapshot_is_idempotent() {
        let session = apply_trigger(running(&["A", "B"]), "A", at(16, 5, 0));
        let again = apply_snapshot(session.clone(), Snapshot::Fetched(session.clone()));
        assert_eq!(again, session);
    }

    #[test]
    fn test_snapshot_rederives_counts() {
        let mut fetched = running(&["A", "B"]);
        fetched.targets[1].is_triggered = true;
        fetched.triggered_count = 0;
        fetched.total_targets = 7;

        let session = apply_snapshot(MonitoringSession::idle(), Snapshot::Fetched(fetched));
        assert_eq!(session.triggered_count, 1);
        assert_eq!(session.total_targets, 2);
    }

    #[test]
    fn test_failed_snapshot_degrades_to_idle() {
        let session = apply_snapshot(running(&["A"]), Snapshot::Failed("timeout".into()));
        assert_eq!(session, MonitoringSession::idle());
        assert!(!session.is_running);
        assert_eq!(session.current_phase, Phase::Waiting);
    }

    #[test]
    fn test_snapshot_never_untriggers() {
        let session = apply_trigger(running(&["A"]), "A", at(16, 5, 0));
        let lagging = running(&["A"]);

        let merged = apply_snapshot(session, Snapshot::Fetched(lagging));
        assert!(merged.targets[0].is_triggered);
        assert_eq!(merged.targets[0].trigger_time, Some(at(16, 5, 0)));
        assert_eq!(merged.triggered_count, 1);
    }

    #[test]
    fn test_price_update_unknown_symbol_is_noop() {
        let session = running(&["A"]);
        let updated = apply_price_update(session.clone(), "UNKNOWN", dec!(1), dec!(1), Some(1));
        assert_eq!(updated, session);
    }

    #[test]
    fn test_price_update_keeps_count() {
        let session = apply_trigger(running(&["A", "B"]), "B", at(16, 1, 0));
        let updated = apply_price_update(session, "A", dec!(73000), dec!(2.1), Some(500));
        assert_eq!(updated.targets[0].current_price, dec!(73000));
        assert_eq!(updated.targets[0].change_percent, dec!(2.1));
        assert_eq!(updated.targets[0].volume, 500);
        assert_eq!(updated.triggered_count, 1);
    }

    #[test]
    fn test_price_update_without_volume_keeps_volume() {
        let mut session = running(&["A"]);
        session.targets[0].volume = 15000;
        let updated = apply_price_update(session, "A", dec!(73000), dec!(2.1), None);
        assert_eq!(updated.targets[0].current_price, dec!(73000));
        assert_eq!(updated.targets[0].volume, 15000);
    }

    #[test]
    fn test_trigger_is_monotonic() {
        let first = apply_trigger(running(&["A"]), "A", at(16, 10, 0));
        let second = apply_trigger(first.clone(), "A", at(16, 20, 0));
        assert_eq!(first, second);
        assert_eq!(second.triggered_count, 1);
        assert_eq!(second.targets[0].trigger_time, Some(at(16, 10, 0)));
    }

    #[test]
    fn test_trigger_and_price_commute() {
        let base = running(&["A"]);
        let a = apply_price_update(
            apply_trigger(base.clone(), "A", at(16, 10, 0)),
            "A",
            dec!(73000),
            dec!(2.1),
            Some(10),
        );
        let b = apply_trigger(
            apply_price_update(base, "A", dec!(73000), dec!(2.1), Some(10)),
            "A",
            at(16, 10, 0),
        );
        assert_eq!(a, b);
    }

    #[test]
    fn test_status_patch_touches_given_fields_only() {
        let session = running(&["A"]);
        let update = SessionStatusUpdate {
            current_phase: Some(Phase::Phase2),
            ..Default::default()
        };
        let patched = apply_status_patch(session.clone(), &update);
        assert_eq!(patched.current_phase, Phase::Phase2);
        assert_eq!(patched.is_running, session.is_running);
        assert_eq!(patched.targets, session.targets);
    }

    #[test]
    fn test_status_patch_never_regresses_running_phase() {
        let mut session = running(&["A"]);
        session.current_phase = Phase::Phase3;
        let late = SessionStatusUpdate {
            current_phase: Some(Phase::Phase2),
            remaining_time_seconds: Some(300),
            ..Default::default()
        };
        let patched = apply_status_patch(session, &late);
        assert_eq!(patched.current_phase, Phase::Phase3);
        assert_eq!(patched.remaining_time_seconds, 300);

        let completed = SessionStatusUpdate {
            is_running: Some(false),
            current_phase: Some(Phase::Completed),
            ..Default::default()
        };
        let patched = apply_status_patch(patched, &completed);
        assert_eq!(patched.current_phase, Phase::Completed);
        assert!(!patched.is_running);

        let reset = SessionStatusUpdate {
            is_running: Some(false),
            current_phase: Some(Phase::Waiting),
            ..Default::default()
        };
        let mut session = running(&["A"]);
        session.current_phase = Phase::Phase4;
        assert_eq!(apply_status_patch(session, &reset).current_phase, Phase::Waiting);
    }

    #[test]
    fn test_push_dispatch() {
        let session = running(&["005930"]);

        let price = PushMessage::new(PushPayload::PriceUpdate(PriceUpdate {
            symbol: "005930".into(),
            price: dec!(73000),
            change: None,
            change_percent: dec!(2.1),
            volume: Some(100),
        }));
        let session = apply_push(session, &price, at(16, 2, 0));
        assert_eq!(session.triggered_count, 0);

        let signal = PushMessage::new(PushPayload::BuySignal(TradeSignal {
            symbol: "005930".into(),
            price: dec!(73000),
            quantity: 1,
            reason: "threshold".into(),
            order_id: None,
        }))
        .at(at(16, 3, 0));
        let session = apply_push(session, &signal, at(16, 4, 0));
        assert_eq!(session.triggered_count, 1);
        assert_eq!(session.targets[0].trigger_time, Some(at(16, 3, 0)));

        let unknown = PushMessage::new(PushPayload::Unrecognized {
            kind: "subscription_confirmed".into(),
        });
        assert_eq!(apply_push(session.clone(), &unknown, at(16, 5, 0)), session);
    }
}
