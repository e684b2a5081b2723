//! Non-blocking TCP connects on spawned tasks

use crate::event::{EventSender, LoopEvent};
use std::collections::HashMap;
use std::time::Duration;
use tether_core::{ConnectError, ConnectResult, ConnectionId, Endpoint, TcpConnector};
use tokio::net::TcpStream;
use tokio::task::AbortHandle;
use tracing::debug;

/// [`TcpConnector`] backed by `tokio::net::TcpStream::connect`
///
/// Each attempt runs under `tokio::time::timeout` on its own task and posts
/// [`LoopEvent::ConnectFinished`] exactly once unless cancelled. Cancelling
/// aborts the task, which closes a half-open socket.
pub struct TokioConnector {
    events: EventSender,
    next_id: u64,
    in_flight: HashMap<ConnectionId, AbortHandle>,
}

impl TokioConnector {
    pub fn new(events: EventSender) -> Self {
        Self {
            events,
            next_id: 0,
            in_flight: HashMap::new(),
        }
    }
}

/// Connect with an upper bound on how long it may take
pub async fn connect_with_timeout(
    endpoint: Endpoint,
    timeout: Duration,
) -> ConnectResult<TcpStream> {
    match tokio::time::timeout(timeout, TcpStream::connect(endpoint.socket_addr())).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(e)) => Err(ConnectError::Io(e)),
        Err(_) => Err(ConnectError::TimedOut(timeout)),
    }
}

impl TcpConnector for TokioConnector {
    type Socket = TcpStream;

    fn connect(&mut self, endpoint: Endpoint, timeout: Duration) -> ConnectionId {
        self.in_flight.retain(|_, handle| !handle.is_finished());

        self.next_id += 1;
        let id = ConnectionId(self.next_id);
        let events = self.events.clone();

        let task = tokio::spawn(async move {
            let result = connect_with_timeout(endpoint, timeout).await;
            if events
                .send(LoopEvent::ConnectFinished {
                    id,
                    endpoint,
                    result,
                })
                .is_err()
            {
                debug!(%endpoint, connection = %id, "Driver gone, dropping connect result");
            }
        });

        self.in_flight.insert(id, task.abort_handle());
        id
    }

    fn cancel(&mut self, id: ConnectionId) -> bool {
        match self.in_flight.remove(&id) {
            Some(handle) if !handle.is_finished() => {
                handle.abort();
                true
            }
            _ => false,
        }
    }
}

impl Drop for TokioConnector {
    fn drop(&mut self) {
        for handle in self.in_flight.values() {
            handle.abort();
        }
    }
}
