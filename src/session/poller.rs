//! Adaptive status polling
//!
//! Polls at the base interval while the push channel is down and at three
//! times the base interval while it is up. A tick that finds the previous
//! poll still running is skipped, never queued.

use parking_lot::Mutex;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Interval multiplier applied while push delivery is healthy
pub const CONNECTED_BACKOFF: u32 = 3;

/// In-flight poll of one schedule
///
/// Launch and cancel both run under the slot lock, so once `cancel` returns
/// no poll of that schedule can start.
#[derive(Debug, Default)]
struct PollSlot {
    cancelled: AtomicBool,
    busy: AtomicBool,
    in_flight: Mutex<Option<JoinHandle<()>>>,
}

impl PollSlot {
    /// Spawn `poll` unless the schedule was cancelled; returns whether it was spawned
    fn launch<Fut>(self: &Arc<Self>, poll: Fut) -> bool
    where
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut in_flight = self.in_flight.lock();
        if self.cancelled.load(Ordering::SeqCst) {
            return false;
        }
        let slot = self.clone();
        *in_flight = Some(tokio::spawn(async move {
            poll.await;
            slot.busy.store(false, Ordering::SeqCst);
        }));
        true
    }

    fn cancel(&self) {
        let mut in_flight = self.in_flight.lock();
        self.cancelled.store(true, Ordering::SeqCst);
        if let Some(poll) = in_flight.take() {
            poll.abort();
        }
    }
}

/// Periodic driver for a poll function
#[derive(Debug)]
pub struct PollingScheduler {
    base_interval: Duration,
    connected: Arc<AtomicBool>,
    ticker: Option<JoinHandle<()>>,
    slot: Option<Arc<PollSlot>>,
}

impl Default for PollingScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl PollingScheduler {
    pub fn new() -> Self {
        Self {
            base_interval: Duration::from_secs(5),
            connected: Arc::new(AtomicBool::new(false)),
            ticker: None,
            slot: None,
        }
    }

    /// Start polling. A running schedule is stopped first.
    ///
    /// The first poll happens one interval after the call.
    pub fn start<F, Fut>(&mut self, poll_fn: F, base_interval: Duration)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.stop();
        self.base_interval = base_interval;
        info!(base_ms = base_interval.as_millis() as u64, "Polling started");

        let connected = self.connected.clone();
        let slot = Arc::new(PollSlot::default());
        self.slot = Some(slot.clone());

        self.ticker = Some(tokio::spawn(async move {
            loop {
                let interval = effective(base_interval, connected.load(Ordering::SeqCst));
                tokio::time::sleep(interval).await;

                if slot.busy.swap(true, Ordering::SeqCst) {
                    debug!("Previous poll still in flight, skipping tick");
                    continue;
                }
                if !slot.launch(poll_fn()) {
                    break;
                }
            }
        }));
    }

    /// Halt polling. Any poll still in flight is cancelled.
    pub fn stop(&mut self) {
        if let Some(slot) = self.slot.take() {
            slot.cancel();
        }
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
            debug!("Polling stopped");
        }
    }

    /// Report push channel health; takes effect from the next tick
    pub fn set_connection_quality(&self, connected: bool) {
        let previous = self.connected.swap(connected, Ordering::SeqCst);
        if previous != connected {
            debug!(connected, "Polling cadence changed");
        }
    }

    pub fn effective_interval(&self) -> Duration {
        effective(self.base_interval, self.connected.load(Ordering::SeqCst))
    }

    pub fn is_running(&self) -> bool {
        self.ticker.as_ref().map_or(false, |t| !t.is_finished())
    }
}

impl Drop for PollingScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

fn effective(base: Duration, connected: bool) -> Duration {
    if connected {
        base * CONNECTED_BACKOFF
    } else {
        base
    }
}
