// # Tokio Backend
//
// This crate runs a `tether_core::ConnectionManager` on tokio.
//
// ## Components
//
// - **TokioTimers**: Retry timers as abortable `sleep` tasks
// - **TokioConnector**: `TcpStream::connect` under `tokio::time::timeout`
// - **ChannelSocketFactory**: Hands connected streams to the application
// - **Driver**: Single task owning the manager
// - **ManagerHandle**: Cloneable async API, talks to the driver over a queue
//
// ## Usage
//
// ```no_run
// use std::time::Duration;
// use tether_core::ExponentialBackoff;
// use tether_tokio::{Driver, socket_channel};
//
// # async fn demo() -> tether_core::Result<()> {
// let (factory, mut sockets) = socket_channel(64);
// let (driver, handle) = Driver::new(Box::new(factory), Duration::from_secs(5));
// tokio::spawn(driver.run());
//
// let endpoint = "10.0.0.5:6038".parse()?;
// let policy = ExponentialBackoff::new(Duration::from_secs(1), Duration::from_secs(60));
// handle.add_endpoint(endpoint, Box::new(policy), false).await?;
//
// while let Some(connection) = sockets.recv().await {
//     // ... use connection.stream, then:
//     handle.disconnect(connection.endpoint, false).await?;
// }
// # Ok(())
// # }
// ```

pub mod connector;
pub mod driver;
pub mod event;
pub mod handle;
pub mod sockets;
pub mod timers;

pub use connector::{TokioConnector, connect_with_timeout};
pub use driver::{COMMAND_CHANNEL_CAPACITY, Driver};
pub use event::LoopEvent;
pub use handle::ManagerHandle;
pub use sockets::{ChannelSocketFactory, EstablishedConnection, socket_channel};
pub use timers::TokioTimers;
