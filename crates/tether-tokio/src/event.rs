//! Events fed back into the driver loop by spawned tasks

use tether_core::{ConnectResult, ConnectionId, Endpoint, TimerId};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

/// Completion of work started on behalf of the manager
#[derive(Debug)]
pub enum LoopEvent {
    /// A retry timer expired
    TimerFired { id: TimerId, endpoint: Endpoint },

    /// A connection attempt finished (either way)
    ConnectFinished {
        id: ConnectionId,
        endpoint: Endpoint,
        result: ConnectResult<TcpStream>,
    },
}

/// Sending half used by the timer service and connector
///
/// Unbounded: a lost event would leave its endpoint stuck.
pub type EventSender = mpsc::UnboundedSender<LoopEvent>;

/// Receiving half owned by the driver
pub type EventReceiver = mpsc::UnboundedReceiver<LoopEvent>;

pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}
