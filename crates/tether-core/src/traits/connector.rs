// # TCP Connector
//
// Starts non-blocking connects and reports their outcome later.
//
// ## Contract
//
// - `connect` returns immediately with a fresh `ConnectionId`
// - Exactly one completion per id is delivered to
//   `ConnectionManager::handle_connect_result`, never re-entrantly
// - An attempt that does not finish within `timeout` completes with
//   `ConnectError::TimedOut`

use crate::endpoint::Endpoint;
use crate::error::ConnectError;
use std::fmt;
use std::time::Duration;

/// Opaque handle to an in-flight connection attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Outcome of one connection attempt
pub type ConnectResult<S> = Result<S, ConnectError>;

/// Lower-level service that initiates TCP connections
pub trait TcpConnector: Send {
    /// The connected stream type handed back on success
    type Socket: Send + 'static;

    /// Begin connecting to `endpoint`, giving up after `timeout`
    fn connect(&mut self, endpoint: Endpoint, timeout: Duration) -> ConnectionId;

    /// Abort an in-flight attempt, best effort
    ///
    /// The manager does not rely on this succeeding; a completion for a
    /// cancelled id is treated as stale.
    fn cancel(&mut self, _id: ConnectionId) -> bool {
        false
    }
}
