//! Per-endpoint bookkeeping

use crate::backoff::{BackoffGenerator, BoxedBackoffPolicy};
use crate::traits::{ConnectionId, TimerId};
use std::fmt;

/// Connection state of a managed endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Not connected; a retry timer or an attempt may be pending
    Disconnected,
    /// Not connected and not trying until resumed
    Paused,
    /// Connected; the socket belongs to the caller
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Paused => "paused",
            ConnectionState::Connected => "connected",
        };
        f.write_str(name)
    }
}

/// Snapshot returned by `ConnectionManager::endpoint_state`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointState {
    pub state: ConnectionState,
    pub failed_attempts: u32,
}

/// Everything the manager tracks for one endpoint
///
/// Invariants:
/// - `Paused`: no `retry_timer`, no `connection_id`
/// - `Disconnected`: at most one of `retry_timer` / `connection_id`
/// - `Connected`: neither
#[derive(Debug)]
pub(crate) struct EndpointRecord {
    pub(crate) state: ConnectionState,
    pub(crate) failed_attempts: u32,
    pub(crate) retry_timer: Option<TimerId>,
    pub(crate) connection_id: Option<ConnectionId>,
    pub(crate) backoff: BackoffGenerator,
}

impl EndpointRecord {
    pub(crate) fn new(policy: BoxedBackoffPolicy, paused: bool) -> Self {
        Self {
            state: if paused {
                ConnectionState::Paused
            } else {
                ConnectionState::Disconnected
            },
            failed_attempts: 0,
            retry_timer: None,
            connection_id: None,
            backoff: BackoffGenerator::new(policy),
        }
    }

    pub(crate) fn snapshot(&self) -> EndpointState {
        EndpointState {
            state: self.state,
            failed_attempts: self.failed_attempts,
        }
    }

    /// Enter `Paused`. Callers must have cleared pending work first.
    pub(crate) fn pause(&mut self) {
        debug_assert!(self.retry_timer.is_none() && self.connection_id.is_none());
        self.state = ConnectionState::Paused;
        self.failed_attempts = 0;
    }

    /// Whether the record satisfies its state invariants
    pub(crate) fn is_consistent(&self) -> bool {
        match self.state {
            ConnectionState::Paused | ConnectionState::Connected => {
                self.retry_timer.is_none() && self.connection_id.is_none()
            }
            ConnectionState::Disconnected => {
                !(self.retry_timer.is_some() && self.connection_id.is_some())
            }
        }
    }
}
