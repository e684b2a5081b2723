//! Test doubles and common utilities for connection manager contract tests
//!
//! Everything here is deterministic: timers run on a manual fake clock and
//! connection attempts only complete when a test says so.

#![allow(dead_code)]

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tether_core::{
    BoxedBackoffPolicy, ConnectError, ConnectionHandler, ConnectionId, ConnectionManager,
    Endpoint, EndpointState, FailureAction, TcpConnector, TimerId, TimerService,
};

pub const CONNECT_TIMEOUT: Duration = Duration::from_millis(500);

pub fn secs(s: u64) -> Duration {
    Duration::from_secs(s)
}

pub fn endpoint(last_octet: u8, port: u16) -> Endpoint {
    Endpoint::new([192, 168, 0, last_octet], port)
}

/// Stand-in for a connected stream; counts how many get dropped
#[derive(Debug)]
pub struct FakeSocket {
    pub endpoint: Endpoint,
    drops: Arc<AtomicUsize>,
}

impl Drop for FakeSocket {
    fn drop(&mut self) {
        self.drops.fetch_add(1, Ordering::SeqCst);
    }
}

/// A connection attempt the manager asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attempt {
    pub id: ConnectionId,
    pub endpoint: Endpoint,
    pub timeout: Duration,
}

#[derive(Default)]
pub struct ConnectorLog {
    next_id: u64,
    pub attempts: Vec<Attempt>,
    pub cancelled: Vec<ConnectionId>,
}

/// Connector that records attempts and never completes them on its own
pub struct ScriptedConnector {
    log: Arc<Mutex<ConnectorLog>>,
}

impl TcpConnector for ScriptedConnector {
    type Socket = FakeSocket;

    fn connect(&mut self, endpoint: Endpoint, timeout: Duration) -> ConnectionId {
        let mut log = self.log.lock().unwrap();
        log.next_id += 1;
        let id = ConnectionId(log.next_id);
        log.attempts.push(Attempt {
            id,
            endpoint,
            timeout,
        });
        id
    }

    fn cancel(&mut self, id: ConnectionId) -> bool {
        self.log.lock().unwrap().cancelled.push(id);
        true
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PendingTimer {
    pub id: TimerId,
    pub endpoint: Endpoint,
    pub delay: Duration,
    pub fires_at: Duration,
}

#[derive(Default)]
pub struct TimerLog {
    next_id: u64,
    pub now: Duration,
    pub pending: Vec<PendingTimer>,
    /// Every registration, in order
    pub registered: Vec<PendingTimer>,
    pub cancelled: Vec<TimerId>,
}

/// Timer service on a manual fake clock
pub struct ManualTimers {
    log: Arc<Mutex<TimerLog>>,
}

impl TimerService for ManualTimers {
    fn register_timeout(&mut self, delay: Duration, endpoint: Endpoint) -> TimerId {
        let mut log = self.log.lock().unwrap();
        log.next_id += 1;
        let timer = PendingTimer {
            id: TimerId(log.next_id),
            endpoint,
            delay,
            fires_at: log.now + delay,
        };
        log.pending.push(timer);
        log.registered.push(timer);
        timer.id
    }

    fn cancel_timeout(&mut self, id: TimerId) -> bool {
        let mut log = self.log.lock().unwrap();
        log.cancelled.push(id);
        let before = log.pending.len();
        log.pending.retain(|timer| timer.id != id);
        log.pending.len() != before
    }
}

#[derive(Default)]
pub struct HandlerLog {
    pub connected: Vec<Endpoint>,
    pub sockets: Vec<FakeSocket>,
    pub failures: Vec<(Endpoint, u32, bool)>,
    pub pause_after: Option<u32>,
    /// Hand sockets back instead of keeping them
    pub refusing: bool,
    pub refused: Vec<Endpoint>,
}

/// Handler that keeps every socket and records every failure
pub struct RecordingHandler {
    log: Arc<Mutex<HandlerLog>>,
}

impl ConnectionHandler<FakeSocket> for RecordingHandler {
    fn on_connected(&mut self, endpoint: Endpoint, socket: FakeSocket) -> Result<(), FakeSocket> {
        let mut log = self.log.lock().unwrap();
        if log.refusing {
            log.refused.push(endpoint);
            return Err(socket);
        }
        log.connected.push(endpoint);
        log.sockets.push(socket);
        Ok(())
    }

    fn on_failed(
        &mut self,
        endpoint: Endpoint,
        error: &ConnectError,
        failed_attempts: u32,
    ) -> FailureAction {
        let mut log = self.log.lock().unwrap();
        log.failures
            .push((endpoint, failed_attempts, error.is_timeout()));
        match log.pause_after {
            Some(limit) if failed_attempts >= limit => FailureAction::Pause,
            _ => FailureAction::Retry,
        }
    }
}

/// A manager wired to the fakes above, plus helpers to drive it
pub struct Harness {
    pub manager: ConnectionManager<FakeSocket>,
    connector: Arc<Mutex<ConnectorLog>>,
    timers: Arc<Mutex<TimerLog>>,
    handler: Arc<Mutex<HandlerLog>>,
    socket_drops: Arc<AtomicUsize>,
}

impl Harness {
    pub fn new() -> Self {
        let connector = Arc::new(Mutex::new(ConnectorLog::default()));
        let timers = Arc::new(Mutex::new(TimerLog::default()));
        let handler = Arc::new(Mutex::new(HandlerLog::default()));

        let manager = ConnectionManager::new(
            Box::new(ScriptedConnector {
                log: Arc::clone(&connector),
            }),
            Box::new(ManualTimers {
                log: Arc::clone(&timers),
            }),
            Box::new(RecordingHandler {
                log: Arc::clone(&handler),
            }),
            CONNECT_TIMEOUT,
        );

        Self {
            manager,
            connector,
            timers,
            handler,
            socket_drops: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Make the handler pause endpoints once they reach `limit` failures
    pub fn pause_after(self, limit: u32) -> Self {
        self.handler.lock().unwrap().pause_after = Some(limit);
        self
    }

    /// Make the handler hand back every socket until told otherwise
    pub fn set_refusing(&self, refusing: bool) {
        self.handler.lock().unwrap().refusing = refusing;
    }

    pub fn add(&mut self, endpoint: Endpoint, policy: BoxedBackoffPolicy) -> bool {
        self.manager.add_endpoint(endpoint, policy, false)
    }

    pub fn state(&self, endpoint: Endpoint) -> EndpointState {
        self.manager
            .endpoint_state(endpoint)
            .expect("endpoint is registered")
    }

    // --- connector side ---

    pub fn attempts(&self) -> Vec<Attempt> {
        self.connector.lock().unwrap().attempts.clone()
    }

    pub fn attempts_for(&self, endpoint: Endpoint) -> usize {
        self.attempts()
            .iter()
            .filter(|attempt| attempt.endpoint == endpoint)
            .count()
    }

    pub fn last_attempt(&self, endpoint: Endpoint) -> ConnectionId {
        self.attempts()
            .iter()
            .rev()
            .find(|attempt| attempt.endpoint == endpoint)
            .map(|attempt| attempt.id)
            .expect("an attempt was made")
    }

    pub fn cancelled_attempts(&self) -> Vec<ConnectionId> {
        self.connector.lock().unwrap().cancelled.clone()
    }

    pub fn socket(&self, endpoint: Endpoint) -> FakeSocket {
        FakeSocket {
            endpoint,
            drops: Arc::clone(&self.socket_drops),
        }
    }

    /// Complete the latest attempt for `endpoint` successfully
    pub fn succeed(&mut self, endpoint: Endpoint) -> bool {
        let id = self.last_attempt(endpoint);
        let socket = self.socket(endpoint);
        self.manager.handle_connect_result(id, endpoint, Ok(socket))
    }

    /// Complete the latest attempt for `endpoint` with a refused connection
    pub fn fail(&mut self, endpoint: Endpoint) -> bool {
        let id = self.last_attempt(endpoint);
        self.manager.handle_connect_result(
            id,
            endpoint,
            Err(ConnectError::Io(io::Error::from(
                io::ErrorKind::ConnectionRefused,
            ))),
        )
    }

    /// Complete the latest attempt for `endpoint` with a timeout
    pub fn time_out(&mut self, endpoint: Endpoint) -> bool {
        let id = self.last_attempt(endpoint);
        self.manager.handle_connect_result(
            id,
            endpoint,
            Err(ConnectError::TimedOut(CONNECT_TIMEOUT)),
        )
    }

    // --- timer side ---

    pub fn now(&self) -> Duration {
        self.timers.lock().unwrap().now
    }

    pub fn pending_timers(&self) -> Vec<PendingTimer> {
        self.timers.lock().unwrap().pending.clone()
    }

    pub fn pending_timer(&self, endpoint: Endpoint) -> Option<PendingTimer> {
        self.pending_timers()
            .into_iter()
            .find(|timer| timer.endpoint == endpoint)
    }

    /// Delays of every retry timer registered for `endpoint`, in order
    pub fn retry_delays(&self, endpoint: Endpoint) -> Vec<Duration> {
        self.timers
            .lock()
            .unwrap()
            .registered
            .iter()
            .filter(|timer| timer.endpoint == endpoint)
            .map(|timer| timer.delay)
            .collect()
    }

    /// Move the fake clock forward, firing due timers in order
    ///
    /// Returns how many timers fired.
    pub fn advance(&mut self, by: Duration) -> usize {
        let target = self.now() + by;
        let mut fired = 0;

        loop {
            // Lock released before calling into the manager, which may register timers
            let due = {
                let mut log = self.timers.lock().unwrap();
                let next = log
                    .pending
                    .iter()
                    .enumerate()
                    .filter(|(_, timer)| timer.fires_at <= target)
                    .min_by_key(|(_, timer)| (timer.fires_at, timer.id.0))
                    .map(|(index, _)| index);
                match next {
                    Some(index) => {
                        let timer = log.pending.remove(index);
                        log.now = timer.fires_at;
                        Some(timer)
                    }
                    None => {
                        log.now = target;
                        None
                    }
                }
            };

            let Some(timer) = due else { break };
            self.manager.handle_timeout(timer.id, timer.endpoint);
            fired += 1;
        }

        fired
    }

    // --- handler side ---

    pub fn connected(&self) -> Vec<Endpoint> {
        self.handler.lock().unwrap().connected.clone()
    }

    pub fn refused(&self) -> Vec<Endpoint> {
        self.handler.lock().unwrap().refused.clone()
    }

    pub fn failures(&self) -> Vec<(Endpoint, u32, bool)> {
        self.handler.lock().unwrap().failures.clone()
    }

    pub fn dropped_sockets(&self) -> usize {
        self.socket_drops.load(Ordering::SeqCst)
    }
}
