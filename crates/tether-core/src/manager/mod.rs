//! Connection manager
//!
//! The ConnectionManager is responsible for:
//! - Keeping a registry of desired endpoints
//! - Starting connection attempts for every endpoint that is not paused
//! - Scheduling retries with each endpoint's backoff policy
//! - Handing established sockets to the [`ConnectionHandler`]
//!
//! ## Architecture
//!
//! ```text
//!                 add / remove / disconnect / resume
//!                               │
//!                               ▼
//!                     ┌───────────────────┐
//!      ┌──────────────│ ConnectionManager │──────────────┐
//!      │              └───────────────────┘              │
//!      │ register_timeout      ▲       ▲        connect  │
//!      ▼                       │       │                 ▼
//! ┌──────────────┐  handle_timeout   handle_connect_result  ┌──────────────┐
//! │ TimerService │─────────────┘       └────────────────│ TcpConnector │
//! └──────────────┘                                      └──────────────┘
//!                               │
//!                               ▼ on_connected / on_failed
//!                     ┌───────────────────┐
//!                     │ ConnectionHandler │
//!                     └───────────────────┘
//! ```
//!
//! ## State Machine
//!
//! ```text
//! Disconnected ──attempt ok──▶ Connected
//! Disconnected ──attempt fails / socket refused──▶ Disconnected (+ retry timer)
//! Disconnected / Connected ──disconnect(pause)──▶ Paused
//! Connected ──disconnect──▶ Disconnected (immediate attempt)
//! Paused ──resume──▶ Disconnected (immediate attempt)
//! any ──remove──▶ gone
//! ```
//!
//! ## Threading
//!
//! The manager is a plain `&mut self` state machine with no internal
//! locking. Drive it from exactly one task or event loop; everything else
//! should talk to that task through a queue (see `tether-tokio`).

mod record;

pub use record::{ConnectionState, EndpointState};

use crate::backoff::BoxedBackoffPolicy;
use crate::endpoint::Endpoint;
use crate::error::{Error, Result};
use crate::traits::{
    ConnectResult, ConnectionHandler, ConnectionId, FailureAction, TcpConnector, TimerId,
    TimerService,
};
use record::EndpointRecord;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Maintains TCP connections to a set of endpoints, reconnecting with backoff
///
/// `S` is the socket type produced by the connector and consumed by the
/// handler.
///
/// ## Lifecycle
///
/// 1. Create with [`ConnectionManager::new()`]
/// 2. Register endpoints with [`add_endpoint()`](Self::add_endpoint)
/// 3. Feed timer expiries and connect completions back in via
///    [`handle_timeout()`](Self::handle_timeout) and
///    [`handle_connect_result()`](Self::handle_connect_result)
/// 4. Drop (or [`shutdown()`](Self::shutdown)) to cancel everything pending
pub struct ConnectionManager<S: Send + 'static> {
    /// Starts connection attempts
    connector: Box<dyn TcpConnector<Socket = S>>,

    /// Schedules retries
    timers: Box<dyn TimerService>,

    /// Receives sockets and decides on failures
    handler: Box<dyn ConnectionHandler<S>>,

    /// Upper bound on a single attempt
    connect_timeout: Duration,

    /// Endpoint registry
    endpoints: HashMap<Endpoint, EndpointRecord>,
}

impl<S: Send + 'static> ConnectionManager<S> {
    /// Create a new connection manager
    ///
    /// # Parameters
    ///
    /// - `connector`: Starts non-blocking connects
    /// - `timers`: One-shot timer service for retries
    /// - `handler`: Takes ownership of connected sockets
    /// - `connect_timeout`: How long one attempt may stay pending
    pub fn new(
        connector: Box<dyn TcpConnector<Socket = S>>,
        timers: Box<dyn TimerService>,
        handler: Box<dyn ConnectionHandler<S>>,
        connect_timeout: Duration,
    ) -> Self {
        Self {
            connector,
            timers,
            handler,
            connect_timeout,
            endpoints: HashMap::new(),
        }
    }

    /// The per-attempt connection timeout
    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// Start managing an endpoint
    ///
    /// Does nothing if the endpoint is already registered; the existing
    /// record and its policy are kept.
    ///
    /// # Parameters
    ///
    /// - `endpoint`: The remote ip:port
    /// - `policy`: Backoff policy, owned by this endpoint from now on
    /// - `paused`: Register without attempting a connection
    ///
    /// # Returns
    ///
    /// `true` if the endpoint was added, `false` if it was already present
    pub fn add_endpoint(
        &mut self,
        endpoint: Endpoint,
        policy: BoxedBackoffPolicy,
        paused: bool,
    ) -> bool {
        if self.endpoints.contains_key(&endpoint) {
            debug!(%endpoint, "Endpoint already registered, ignoring");
            return false;
        }

        let mut record = EndpointRecord::new(policy, paused);
        info!(%endpoint, paused, "Adding endpoint");

        if !paused {
            start_attempt(
                self.connector.as_mut(),
                self.connect_timeout,
                endpoint,
                &mut record,
            );
        }

        self.endpoints.insert(endpoint, record);
        true
    }

    /// Stop managing an endpoint
    ///
    /// Cancels any retry timer and abandons any in-flight attempt. A live
    /// socket already handed to the handler is not touched.
    ///
    /// # Returns
    ///
    /// `true` if the endpoint was registered
    pub fn remove_endpoint(&mut self, endpoint: Endpoint) -> bool {
        let Some(mut record) = self.endpoints.remove(&endpoint) else {
            debug!(%endpoint, "Remove for unknown endpoint");
            return false;
        };

        cancel_pending(
            self.connector.as_mut(),
            self.timers.as_mut(),
            endpoint,
            &mut record,
        );
        info!(%endpoint, "Removed endpoint");
        true
    }

    /// Number of registered endpoints
    pub fn endpoint_count(&self) -> usize {
        self.endpoints.len()
    }

    /// Registered endpoints, in no particular order
    pub fn endpoints(&self) -> impl Iterator<Item = Endpoint> + '_ {
        self.endpoints.keys().copied()
    }

    /// Current state and failure count of an endpoint
    ///
    /// Returns `None` if the endpoint is not registered.
    pub fn endpoint_state(&self, endpoint: Endpoint) -> Option<EndpointState> {
        self.endpoints.get(&endpoint).map(EndpointRecord::snapshot)
    }

    /// Tell the manager an endpoint's connection has gone away
    ///
    /// Bookkeeping only: closing the socket is the caller's job.
    ///
    /// - `pause == false`: the endpoint becomes `Disconnected` and a new
    ///   attempt starts straight away (a pending retry timer is cut short;
    ///   an attempt already in flight is left alone)
    /// - `pause == true`: the endpoint becomes `Paused`, pending work is
    ///   cancelled and the failure count is cleared
    ///
    /// # Errors
    ///
    /// - [`Error::UnknownEndpoint`] if the endpoint is not registered
    /// - [`Error::InvalidTransition`] for `pause == false` on a paused
    ///   endpoint (use [`resume()`](Self::resume))
    pub fn disconnect(&mut self, endpoint: Endpoint, pause: bool) -> Result<()> {
        let record = self
            .endpoints
            .get_mut(&endpoint)
            .ok_or(Error::UnknownEndpoint(endpoint))?;

        match record.state {
            ConnectionState::Paused if pause => return Ok(()),
            ConnectionState::Paused => {
                return Err(Error::invalid_transition(
                    endpoint,
                    record.state,
                    "reconnect",
                ));
            }
            ConnectionState::Disconnected if !pause && record.connection_id.is_some() => {
                debug!(%endpoint, "Attempt already in flight");
                return Ok(());
            }
            ConnectionState::Disconnected | ConnectionState::Connected => {}
        }

        cancel_pending(
            self.connector.as_mut(),
            self.timers.as_mut(),
            endpoint,
            record,
        );

        if pause {
            record.pause();
            info!(%endpoint, "Endpoint paused");
        } else {
            record.state = ConnectionState::Disconnected;
            info!(%endpoint, "Endpoint disconnected, reconnecting");
            start_attempt(
                self.connector.as_mut(),
                self.connect_timeout,
                endpoint,
                record,
            );
        }

        debug_assert!(record.is_consistent());
        Ok(())
    }

    /// Start connecting to a paused endpoint again
    ///
    /// The attempt starts immediately. The backoff position is kept, so a
    /// failure continues the sequence where it left off.
    ///
    /// # Errors
    ///
    /// - [`Error::UnknownEndpoint`] if the endpoint is not registered
    /// - [`Error::InvalidTransition`] if the endpoint is not paused
    pub fn resume(&mut self, endpoint: Endpoint) -> Result<()> {
        let record = self
            .endpoints
            .get_mut(&endpoint)
            .ok_or(Error::UnknownEndpoint(endpoint))?;

        if record.state != ConnectionState::Paused {
            return Err(Error::invalid_transition(endpoint, record.state, "resume"));
        }

        record.state = ConnectionState::Disconnected;
        info!(%endpoint, "Resuming endpoint");
        start_attempt(
            self.connector.as_mut(),
            self.connect_timeout,
            endpoint,
            record,
        );
        Ok(())
    }

    /// Deliver a retry timer expiry
    ///
    /// Expiries for removed endpoints, paused endpoints or superseded
    /// timers are ignored.
    ///
    /// # Returns
    ///
    /// `true` if an attempt was started
    pub fn handle_timeout(&mut self, id: TimerId, endpoint: Endpoint) -> bool {
        let Some(record) = self.endpoints.get_mut(&endpoint) else {
            debug!(%endpoint, timer = %id, "Retry timer fired for removed endpoint");
            return false;
        };

        if record.retry_timer != Some(id) || record.state == ConnectionState::Paused {
            debug!(%endpoint, timer = %id, "Ignoring stale retry timer");
            return false;
        }

        record.retry_timer = None;
        start_attempt(
            self.connector.as_mut(),
            self.connect_timeout,
            endpoint,
            record,
        );
        true
    }

    /// Deliver the outcome of a connection attempt
    ///
    /// A socket the handler refuses is closed and counted as a failure.
    /// Stale outcomes (endpoint removed, paused, or a different attempt
    /// expected) are discarded; a stale socket is dropped, which closes it.
    ///
    /// # Returns
    ///
    /// `true` if the outcome was applied
    pub fn handle_connect_result(
        &mut self,
        id: ConnectionId,
        endpoint: Endpoint,
        result: ConnectResult<S>,
    ) -> bool {
        let Some(record) = self.endpoints.get_mut(&endpoint) else {
            debug!(%endpoint, connection = %id, "Discarding result for removed endpoint");
            return false;
        };

        if record.connection_id != Some(id) {
            debug!(%endpoint, connection = %id, "Discarding stale connection result");
            return false;
        }
        record.connection_id = None;

        match result {
            Ok(socket) => match self.handler.on_connected(endpoint, socket) {
                Ok(()) => {
                    record.backoff.reset();
                    record.failed_attempts = 0;
                    record.state = ConnectionState::Connected;
                    info!(%endpoint, "TCP connection established");
                }
                Err(socket) => {
                    drop(socket);
                    record.state = ConnectionState::Disconnected;
                    record.failed_attempts = record.failed_attempts.saturating_add(1);
                    warn!(
                        %endpoint,
                        failed_attempts = record.failed_attempts,
                        "Handler refused connection, closing it"
                    );
                    schedule_retry(self.timers.as_mut(), endpoint, record);
                }
            },
            Err(error) => {
                record.failed_attempts = record.failed_attempts.saturating_add(1);
                warn!(
                    %endpoint,
                    failed_attempts = record.failed_attempts,
                    "Connection attempt failed: {}",
                    error
                );

                match self
                    .handler
                    .on_failed(endpoint, &error, record.failed_attempts)
                {
                    FailureAction::Retry => {
                        schedule_retry(self.timers.as_mut(), endpoint, record);
                    }
                    FailureAction::Pause => {
                        record.pause();
                        info!(%endpoint, "Handler paused endpoint after failure");
                    }
                }
            }
        }

        debug_assert!(record.is_consistent());
        true
    }

    /// Cancel all pending work and forget every endpoint
    pub fn shutdown(&mut self) {
        for (endpoint, mut record) in self.endpoints.drain() {
            cancel_pending(
                self.connector.as_mut(),
                self.timers.as_mut(),
                endpoint,
                &mut record,
            );
        }
    }
}

impl<S: Send + 'static> Drop for ConnectionManager<S> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Ask the connector for a new attempt and remember its id
fn start_attempt<S: Send + 'static>(
    connector: &mut dyn TcpConnector<Socket = S>,
    timeout: Duration,
    endpoint: Endpoint,
    record: &mut EndpointRecord,
) {
    debug_assert!(record.retry_timer.is_none() && record.connection_id.is_none());

    let id = connector.connect(endpoint, timeout);
    debug!(%endpoint, connection = %id, "Connection attempt started");
    record.connection_id = Some(id);
}

/// Arm a retry timer for the next backoff interval
fn schedule_retry(timers: &mut dyn TimerService, endpoint: Endpoint, record: &mut EndpointRecord) {
    let delay = record.backoff.next_backoff();
    let id = timers.register_timeout(delay, endpoint);
    debug!(%endpoint, timer = %id, ?delay, "Reconnect scheduled");
    record.retry_timer = Some(id);
}

/// Cancel the retry timer and abandon the in-flight attempt, if any
fn cancel_pending<S: Send + 'static>(
    connector: &mut dyn TcpConnector<Socket = S>,
    timers: &mut dyn TimerService,
    endpoint: Endpoint,
    record: &mut EndpointRecord,
) {
    if let Some(id) = record.retry_timer.take()
        && !timers.cancel_timeout(id)
    {
        debug!(%endpoint, timer = %id, "Retry timer already gone");
    }

    if let Some(id) = record.connection_id.take()
        && !connector.cancel(id)
    {
        debug!(%endpoint, connection = %id, "Attempt not cancelled, result will be discarded");
    }
}
