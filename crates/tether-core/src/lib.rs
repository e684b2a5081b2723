// # tether-core
//
// Core library for the tether TCP connection manager.
//
// ## Architecture Overview
//
// This library keeps TCP connections to a changing set of endpoints alive:
// - **BackoffPolicy**: Pure mapping from failure count to retry delay
// - **BackoffGenerator**: Per-endpoint failure counter over one policy
// - **TimerService / TcpConnector**: Traits for the event loop's timers and connects
// - **ConnectionHandler**: Strategy that takes connected sockets and rules on failures
// - **ConnectionManager**: Registry and state machine driving everything above
// - **discovery**: Maps configured target strings to endpoints and local widgets
//
// ## Design Principles
//
// 1. **Runtime-Agnostic**: No async runtime here; backends live in their own crates
// 2. **Single Owner**: The manager is driven from one task and never locks
// 3. **Composable**: Behaviour on success/failure is injected, not subclassed
// 4. **Library-First**: The daemon is a thin wrapper over this crate

pub mod backoff;
pub mod config;
pub mod discovery;
pub mod endpoint;
pub mod error;
pub mod manager;
pub mod traits;

// Re-export core types for convenience
pub use backoff::{
    BackoffGenerator, BackoffPolicy, BoxedBackoffPolicy, ConstantBackoff, ExponentialBackoff,
    LinearBackoff,
};
pub use config::{BackoffConfig, ManagerConfig, TetherConfig};
pub use discovery::{DiscoveredTargets, Target, resolve_targets};
pub use endpoint::Endpoint;
pub use error::{ConnectError, Error, Result};
pub use manager::{ConnectionManager, ConnectionState, EndpointState};
pub use traits::{
    ConnectResult, ConnectionHandler, ConnectionId, FailureAction, TcpConnector, TimerId,
    TimerService,
};
