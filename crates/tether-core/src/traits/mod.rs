//! Collaborator traits for the connection manager
//!
//! The manager never touches sockets or clocks itself. It drives these
//! interfaces and is fed their results by whatever event loop owns it.
//!
//! - [`TimerService`]: One-shot retry timers
//! - [`TcpConnector`]: Non-blocking TCP connects with a timeout
//! - [`ConnectionHandler`]: Receives established sockets, decides on failures

pub mod timer;
pub mod connector;
pub mod handler;

pub use timer::{TimerId, TimerService};
pub use connector::{ConnectResult, ConnectionId, TcpConnector};
pub use handler::{ConnectionHandler, FailureAction};
