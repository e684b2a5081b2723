// # Driver
//
// Owns a `ConnectionManager` on a single task and serialises everything that
// touches it:
//
// ```text
//  ManagerHandle ──Command──▶ ┌────────┐ ◀──LoopEvent── TokioTimers
//  ManagerHandle ──Command──▶ │ Driver │ ◀──LoopEvent── TokioConnector
//                             └────────┘
//                                 │ on_connected
//                                 ▼
//                         ConnectionHandler
// ```
//
// Commands carry a oneshot reply. Loop events are the completions of tasks
// the manager started. Both arrive in order, so operations on one endpoint
// are totally ordered.

use crate::connector::TokioConnector;
use crate::event::{EventReceiver, LoopEvent, event_channel};
use crate::handle::ManagerHandle;
use crate::timers::TokioTimers;
use std::time::Duration;
use tether_core::{
    BoxedBackoffPolicy, ConnectionHandler, ConnectionManager, Endpoint, EndpointState, Result,
};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

/// Capacity of the command queue between handles and the driver
pub const COMMAND_CHANNEL_CAPACITY: usize = 64;

/// Requests sent from a [`ManagerHandle`] to the driver
pub(crate) enum Command {
    AddEndpoint {
        endpoint: Endpoint,
        policy: BoxedBackoffPolicy,
        paused: bool,
        reply: oneshot::Sender<bool>,
    },
    RemoveEndpoint {
        endpoint: Endpoint,
        reply: oneshot::Sender<bool>,
    },
    EndpointCount {
        reply: oneshot::Sender<usize>,
    },
    Endpoints {
        reply: oneshot::Sender<Vec<Endpoint>>,
    },
    EndpointState {
        endpoint: Endpoint,
        reply: oneshot::Sender<Option<EndpointState>>,
    },
    Disconnect {
        endpoint: Endpoint,
        pause: bool,
        reply: oneshot::Sender<Result<()>>,
    },
    Resume {
        endpoint: Endpoint,
        reply: oneshot::Sender<Result<()>>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Event loop that owns the connection manager
///
/// ## Lifecycle
///
/// 1. Create with [`Driver::new()`], which also returns the first handle
/// 2. Spawn [`run()`](Self::run) on a tokio runtime
/// 3. Use (and clone) the [`ManagerHandle`] from any task
/// 4. Stop with `ManagerHandle::shutdown()` or by dropping every handle
pub struct Driver {
    manager: ConnectionManager<TcpStream>,
    events: EventReceiver,
    commands: mpsc::Receiver<Command>,
}

impl Driver {
    /// Create a driver with tokio timers and connector
    ///
    /// # Parameters
    ///
    /// - `handler`: Receives connected streams (see `socket_channel`)
    /// - `connect_timeout`: Upper bound on a single attempt
    ///
    /// # Returns
    ///
    /// A tuple of (driver, handle); nothing runs until `run()` is awaited
    pub fn new(
        handler: Box<dyn ConnectionHandler<TcpStream>>,
        connect_timeout: Duration,
    ) -> (Self, ManagerHandle) {
        let (event_tx, event_rx) = event_channel();
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);

        let manager = ConnectionManager::new(
            Box::new(TokioConnector::new(event_tx.clone())),
            Box::new(TokioTimers::new(event_tx)),
            handler,
            connect_timeout,
        );

        let driver = Self {
            manager,
            events: event_rx,
            commands: command_rx,
        };

        (driver, ManagerHandle::new(command_tx))
    }

    /// Run until shutdown is requested or every handle has been dropped
    ///
    /// Pending timers and attempts are cancelled before this returns.
    pub async fn run(mut self) {
        info!(
            connect_timeout = ?self.manager.connect_timeout(),
            "Connection manager started"
        );

        loop {
            tokio::select! {
                Some(event) = self.events.recv() => {
                    self.handle_event(event);
                }

                command = self.commands.recv() => match command {
                    Some(Command::Shutdown { reply }) => {
                        info!("Shutdown requested");
                        self.manager.shutdown();
                        let _ = reply.send(());
                        break;
                    }
                    Some(command) => self.handle_command(command),
                    None => {
                        info!("All handles dropped");
                        break;
                    }
                },
            }
        }

        self.manager.shutdown();
        info!("Connection manager stopped");
    }

    fn handle_event(&mut self, event: LoopEvent) {
        match event {
            LoopEvent::TimerFired { id, endpoint } => {
                self.manager.handle_timeout(id, endpoint);
            }
            LoopEvent::ConnectFinished {
                id,
                endpoint,
                result,
            } => {
                self.manager.handle_connect_result(id, endpoint, result);
            }
        }
    }

    fn handle_command(&mut self, command: Command) {
        // A dropped reply receiver just means the caller stopped waiting
        match command {
            Command::AddEndpoint {
                endpoint,
                policy,
                paused,
                reply,
            } => {
                let _ = reply.send(self.manager.add_endpoint(endpoint, policy, paused));
            }
            Command::RemoveEndpoint { endpoint, reply } => {
                let _ = reply.send(self.manager.remove_endpoint(endpoint));
            }
            Command::EndpointCount { reply } => {
                let _ = reply.send(self.manager.endpoint_count());
            }
            Command::Endpoints { reply } => {
                let _ = reply.send(self.manager.endpoints().collect());
            }
            Command::EndpointState { endpoint, reply } => {
                let _ = reply.send(self.manager.endpoint_state(endpoint));
            }
            Command::Disconnect {
                endpoint,
                pause,
                reply,
            } => {
                let _ = reply.send(self.manager.disconnect(endpoint, pause));
            }
            Command::Resume { endpoint, reply } => {
                let _ = reply.send(self.manager.resume(endpoint));
            }
            Command::Shutdown { reply } => {
                debug!("Shutdown handled by run loop");
                let _ = reply.send(());
            }
        }
    }
}
