//! Minimal embedding example for tether
//!
//! This example uses tether-core and tether-tokio as libraries with a custom
//! connection handler. The driver lifecycle is fully managed by the application.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tether_core::{
    ConnectError, ConnectionHandler, ConnectionState, Endpoint, ExponentialBackoff,
    FailureAction, LinearBackoff, Result,
};
use tether_tokio::Driver;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::Level;

/// Handler that forwards streams and gives up on an endpoint after a few failures
struct EmbeddedHandler {
    streams: mpsc::UnboundedSender<(Endpoint, TcpStream)>,
    give_up_after: u32,
    failures: Arc<AtomicUsize>,
}

impl ConnectionHandler<TcpStream> for EmbeddedHandler {
    fn on_connected(&mut self, endpoint: Endpoint, stream: TcpStream) -> std::result::Result<(), TcpStream> {
        println!("[Embedded] Connected to {}", endpoint);
        // Receiver gone means nobody will read it; hand the stream back
        self.streams
            .send((endpoint, stream))
            .map_err(|mpsc::error::SendError((_, stream))| stream)
    }

    fn on_failed(
        &mut self,
        endpoint: Endpoint,
        error: &ConnectError,
        failed_attempts: u32,
    ) -> FailureAction {
        self.failures.fetch_add(1, Ordering::SeqCst);
        println!(
            "[Embedded] {} failed ({}), attempt {}",
            endpoint, error, failed_attempts
        );

        if failed_attempts >= self.give_up_after {
            println!("[Embedded] Pausing {}", endpoint);
            FailureAction::Pause
        } else {
            FailureAction::Retry
        }
    }
}

/// A fake widget that greets every client and hangs up
async fn spawn_widget() -> std::io::Result<Endpoint> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let endpoint = Endpoint::from(listener.local_addr()?);

    tokio::spawn(async move {
        while let Ok((mut client, _)) = listener.accept().await {
            let _ = client.write_all(b"hello from widget\n").await;
        }
    });

    Ok(endpoint)
}

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);

    println!("=== Embedded tether Example ===\n");

    let widget = spawn_widget().await?;
    // Bound then released, so nothing listens there
    let missing = Endpoint::from(TcpListener::bind("127.0.0.1:0").await?.local_addr()?);

    // Create driver with a custom handler
    println!("1. Creating driver...");
    let (stream_tx, mut stream_rx) = mpsc::unbounded_channel();
    let failures = Arc::new(AtomicUsize::new(0));
    let handler = EmbeddedHandler {
        streams: stream_tx,
        give_up_after: 3,
        failures: Arc::clone(&failures),
    };
    let (driver, handle) = Driver::new(Box::new(handler), Duration::from_secs(2));
    let driver_task = tokio::spawn(driver.run());

    println!("2. Adding endpoints {} and {}...", widget, missing);
    handle
        .add_endpoint(
            widget,
            Box::new(ExponentialBackoff::new(
                Duration::from_millis(100),
                Duration::from_secs(5),
            )),
            false,
        )
        .await?;
    handle
        .add_endpoint(
            missing,
            Box::new(LinearBackoff::new(
                Duration::from_millis(50),
                Duration::from_millis(200),
            )),
            false,
        )
        .await?;

    // Read one greeting, then report the connection as gone
    println!("3. Talking to the widget...");
    if let Some((endpoint, mut stream)) = stream_rx.recv().await {
        let mut greeting = String::new();
        stream.read_to_string(&mut greeting).await?;
        println!("[Embedded] {} says: {}", endpoint, greeting.trim());
        drop(stream);
        handle.disconnect(endpoint, false).await?;
    }

    // The widget is reconnected straight away
    if let Some((endpoint, _stream)) = stream_rx.recv().await {
        println!("[Embedded] Reconnected to {}", endpoint);
    }

    // Wait for the handler to give up on the missing endpoint
    for _ in 0..50 {
        let state = handle.endpoint_state(missing).await?;
        if state.is_some_and(|s| s.state == ConnectionState::Paused) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    println!(
        "\n4. {} is now {:?} after {} failure(s)",
        missing,
        handle.endpoint_state(missing).await?,
        failures.load(Ordering::SeqCst)
    );

    println!("5. Removing {} and shutting down...", missing);
    handle.remove_endpoint(missing).await?;
    handle.shutdown().await?;
    let _ = driver_task.await;

    println!("\n=== Embedding Successful ===");
    println!("Key Points:");
    println!("- Driver lifecycle is fully controlled by application");
    println!("- Failure strategy is injected through ConnectionHandler");
    println!("- No global state");

    Ok(())
}
