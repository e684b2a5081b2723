//! Delivery of established connections to the application

use tether_core::{ConnectionHandler, Endpoint};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::warn;

/// A connected stream and the endpoint it belongs to
#[derive(Debug)]
pub struct EstablishedConnection {
    pub endpoint: Endpoint,
    pub stream: TcpStream,
}

/// [`ConnectionHandler`] that forwards connected streams over a bounded channel
///
/// The receiver owns each stream from then on and is expected to call
/// `ManagerHandle::disconnect` once it is done with it. A stream that cannot
/// be queued is handed back to the manager, which closes it and retries the
/// endpoint on its backoff. Failures use the default strategy (always retry).
pub struct ChannelSocketFactory {
    sockets: mpsc::Sender<EstablishedConnection>,
}

/// Create a socket factory and the receiver its streams arrive on
pub fn socket_channel(
    capacity: usize,
) -> (ChannelSocketFactory, mpsc::Receiver<EstablishedConnection>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (ChannelSocketFactory { sockets: tx }, rx)
}

impl ConnectionHandler<TcpStream> for ChannelSocketFactory {
    fn on_connected(&mut self, endpoint: Endpoint, stream: TcpStream) -> Result<(), TcpStream> {
        // Never block the driver
        match self
            .sockets
            .try_send(EstablishedConnection { endpoint, stream })
        {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(refused)) => {
                warn!(
                    %endpoint,
                    "Socket channel full, refusing connection. Consider increasing socket_channel_capacity."
                );
                Err(refused.stream)
            }
            Err(TrySendError::Closed(refused)) => {
                warn!(%endpoint, "Socket receiver dropped, refusing connection");
                Err(refused.stream)
            }
        }
    }
}
