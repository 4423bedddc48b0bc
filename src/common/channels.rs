//! Channel type definitions for inter-task communication

use tokio::sync::{mpsc, watch};

use super::types::SessionView;

/// Receiver side of the canonical state observable
pub type StateReceiver = watch::Receiver<SessionView>;

/// Create the canonical state observable, seeded with the idle view
pub fn create_state_channel() -> (watch::Sender<SessionView>, StateReceiver) {
    watch::channel(SessionView::default())
}

/// Create the coordinator's command queue
///
/// Unbounded so push handlers, which run on the transport's task, never wait
/// on the actor.
pub fn create_command_channel<T>() -> (mpsc::UnboundedSender<T>, mpsc::UnboundedReceiver<T>) {
    mpsc::unbounded_channel()
}
