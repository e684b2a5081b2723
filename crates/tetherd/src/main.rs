// # tetherd - Tether Daemon
//
// Keeps TCP connections to a set of widgets alive.
//
// This is a thin integration layer: all connection and retry logic lives in
// tether-core, all runtime plumbing in tether-tokio.
//
// The tetherd daemon is responsible for:
// 1. Reading configuration from environment variables (optionally a JSON file)
// 2. Initializing tracing and the runtime
// 3. Registering targets with the connection manager
// 4. Consuming established connections until they close
// 5. Shutting down cleanly on SIGTERM/SIGINT
//
// ## Configuration
//
// - `TETHER_CONFIG`: Path to a JSON configuration file (optional)
// - `TETHER_TARGETS`: Comma-separated targets (`10.0.0.5:6038`, `tcp://...`, `/dev/ttyUSB0`)
// - `TETHER_BACKOFF`: Backoff policy (constant, linear, exponential)
// - `TETHER_BACKOFF_INITIAL_MS`: Interval, step or initial wait (by policy)
// - `TETHER_BACKOFF_MAX_MS`: Upper bound on the wait (linear, exponential)
// - `TETHER_CONNECT_TIMEOUT_MS`: Per-attempt connect timeout
// - `TETHER_LOG_LEVEL`: trace, debug, info, warn, error
//
// Environment variables override values from the file.
//
// ## Example
//
// ```bash
// export TETHER_TARGETS=10.0.0.5:6038,10.0.0.6:6038,/dev/ttyUSB0
// export TETHER_BACKOFF=exponential
// export TETHER_BACKOFF_INITIAL_MS=1000
// export TETHER_BACKOFF_MAX_MS=60000
//
// tetherd
// ```

use anyhow::{Context, Result};
use std::env;
use std::process::ExitCode;
use std::time::Duration;
use tether_core::{BackoffConfig, Target, TetherConfig};
use tether_tokio::{Driver, EstablishedConnection, ManagerHandle, socket_channel};
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// How long shutdown may take before the daemon gives up waiting
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum TetherExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<TetherExitCode> for ExitCode {
    fn from(code: TetherExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Settings read from the environment
#[derive(Debug)]
struct Config {
    config_path: Option<String>,
    targets: Vec<String>,
    backoff_type: Option<String>,
    backoff_initial_ms: Option<u64>,
    backoff_max_ms: Option<u64>,
    connect_timeout_ms: Option<u64>,
    log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through `lookup`, which maps a variable name to its value
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let number = |name: &str| -> Result<Option<u64>> {
            lookup(name)
                .map(|value| {
                    value
                        .trim()
                        .parse()
                        .with_context(|| format!("{} must be a number. Got: '{}'", name, value))
                })
                .transpose()
        };

        Ok(Self {
            config_path: lookup("TETHER_CONFIG").filter(|path| !path.is_empty()),
            targets: lookup("TETHER_TARGETS")
                .unwrap_or_default()
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            backoff_type: lookup("TETHER_BACKOFF").map(|s| s.trim().to_lowercase()),
            backoff_initial_ms: number("TETHER_BACKOFF_INITIAL_MS")?,
            backoff_max_ms: number("TETHER_BACKOFF_MAX_MS")?,
            connect_timeout_ms: number("TETHER_CONNECT_TIMEOUT_MS")?,
            log_level: lookup("TETHER_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }

    /// Validate the daemon-only settings
    fn validate(&self) -> Result<()> {
        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "TETHER_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }

        if let Some(ref kind) = self.backoff_type {
            match kind.as_str() {
                "constant" | "linear" | "exponential" => {}
                _ => anyhow::bail!(
                    "TETHER_BACKOFF '{}' is not supported. \
                    Supported policies: constant, linear, exponential",
                    kind
                ),
            }
        }

        Ok(())
    }

    /// Build the library configuration: file first, environment on top
    fn tether_config(&self) -> Result<TetherConfig> {
        let mut tether = match self.config_path {
            Some(ref path) => TetherConfig::from_json_file(path)
                .with_context(|| format!("Failed to load TETHER_CONFIG '{}'", path))?,
            None => TetherConfig::new(),
        };

        if !self.targets.is_empty() {
            tether.targets = self.targets.clone();
        }

        if let Some(backoff) = self.backoff_override(&tether.backoff) {
            tether.backoff = backoff;
        }

        if let Some(timeout) = self.connect_timeout_ms {
            tether.manager.connect_timeout_ms = timeout;
        }

        if tether.targets.is_empty() {
            anyhow::bail!(
                "No targets configured. \
                Set them via: export TETHER_TARGETS=10.0.0.5:6038,/dev/ttyUSB0"
            );
        }

        tether
            .validate()
            .context("Invalid tether configuration")?;
        Ok(tether)
    }

    /// The backoff policy the environment asks for, if it asks for one
    ///
    /// Values not given in the environment are taken from `current`.
    fn backoff_override(&self, current: &BackoffConfig) -> Option<BackoffConfig> {
        if self.backoff_type.is_none()
            && self.backoff_initial_ms.is_none()
            && self.backoff_max_ms.is_none()
        {
            return None;
        }

        let (current_initial, current_max) = match *current {
            BackoffConfig::Constant { interval_ms } => (interval_ms, interval_ms),
            BackoffConfig::Linear { step_ms, max_ms } => (step_ms, max_ms),
            BackoffConfig::Exponential { initial_ms, max_ms } => (initial_ms, max_ms),
        };
        let initial = self.backoff_initial_ms.unwrap_or(current_initial);
        let max = self.backoff_max_ms.unwrap_or(current_max);

        let kind = self
            .backoff_type
            .as_deref()
            .unwrap_or_else(|| current.type_name());

        Some(match kind {
            "constant" => BackoffConfig::Constant {
                interval_ms: initial,
            },
            "linear" => BackoffConfig::Linear {
                step_ms: initial,
                max_ms: max,
            },
            _ => BackoffConfig::Exponential {
                initial_ms: initial,
                max_ms: max,
            },
        })
    }

    fn log_level(&self) -> Level {
        match self.log_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        }
    }
}

fn main() -> ExitCode {
    // Load configuration from environment
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return TetherExitCode::ConfigError.into();
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {:#}", e);
        return TetherExitCode::ConfigError.into();
    }

    let tether = match config.tether_config() {
        Ok(tether) => tether,
        Err(e) => {
            eprintln!("Configuration validation error: {:#}", e);
            return TetherExitCode::ConfigError.into();
        }
    };

    // Initialize tracing
    let subscriber = FmtSubscriber::builder()
        .with_max_level(config.log_level())
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return TetherExitCode::ConfigError.into();
    }

    info!("Starting tetherd daemon");
    info!(
        targets = tether.targets.len(),
        backoff = tether.backoff.type_name(),
        "Configuration loaded"
    );

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return TetherExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        if let Err(e) = run_daemon(tether).await {
            error!("Daemon error: {:#}", e);
            TetherExitCode::RuntimeError
        } else {
            TetherExitCode::CleanShutdown
        }
    });

    result.into()
}

/// Run the daemon until a shutdown signal arrives
async fn run_daemon(tether: TetherConfig) -> Result<()> {
    let discovered = tether.discover()?;
    if discovered.is_empty() {
        anyhow::bail!("No targets to manage");
    }

    let (factory, sockets) = socket_channel(tether.manager.socket_channel_capacity);
    let (driver, handle) = Driver::new(Box::new(factory), tether.manager.connect_timeout());
    let driver_task = tokio::spawn(driver.run());

    for endpoint in &discovered.endpoints {
        info!(widget = %Target::Tcp(*endpoint), "Managing widget");
    }
    // Non-TCP widgets are served elsewhere; the manager never sees them
    for widget in &discovered.widgets {
        info!(
            widget = %Target::Widget(widget.clone()),
            "Widget attached locally, not managed over TCP"
        );
    }

    handle
        .add_targets(&discovered, &tether.backoff)
        .await
        .context("Failed to register targets")?;

    let consumer = tokio::spawn(consume_connections(sockets, handle.clone()));

    info!("Daemon initialized successfully");

    let signal = wait_for_shutdown().await?;
    info!("Received shutdown signal: {}", signal);
    info!("Shutting down daemon");

    match tokio::time::timeout(SHUTDOWN_GRACE, handle.shutdown()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("Connection manager already stopped: {}", e),
        Err(_) => anyhow::bail!("Shutdown timeout after {:?}", SHUTDOWN_GRACE),
    }

    driver_task.await.context("Connection manager task failed")?;
    // The driver dropped its socket sender, so the consumer winds down
    if tokio::time::timeout(SHUTDOWN_GRACE, consumer).await.is_err() {
        warn!("Connection consumer did not stop in time");
    }

    info!("Daemon stopped");
    Ok(())
}

/// Take ownership of every established connection
///
/// Runs until the socket channel closes, then aborts every connection still
/// being served.
async fn consume_connections(
    mut sockets: mpsc::Receiver<EstablishedConnection>,
    handle: ManagerHandle,
) {
    let mut served = JoinSet::new();

    loop {
        tokio::select! {
            connection = sockets.recv() => match connection {
                Some(connection) => {
                    served.spawn(serve_connection(connection, handle.clone()));
                }
                None => break,
            },
            Some(_) = served.join_next(), if !served.is_empty() => {}
        }
    }

    if !served.is_empty() {
        info!(connections = served.len(), "Closing served connections");
    }
    served.shutdown().await;
}

/// Read from a widget until it goes away, then ask for a reconnect
async fn serve_connection(connection: EstablishedConnection, handle: ManagerHandle) {
    let EstablishedConnection {
        endpoint,
        mut stream,
    } = connection;
    let mut buffer = [0u8; 4096];

    loop {
        match stream.read(&mut buffer).await {
            Ok(0) => {
                info!(%endpoint, "Widget closed the connection");
                break;
            }
            Ok(n) => debug!(%endpoint, bytes = n, "Received data"),
            Err(e) => {
                warn!(%endpoint, "Connection error: {}", e);
                break;
            }
        }
    }

    drop(stream);
    if let Err(e) = handle.disconnect(endpoint, false).await {
        debug!(%endpoint, "Not reconnecting: {}", e);
    }
}

/// Wait for SIGTERM or SIGINT
///
/// # Returns
///
/// Returns the name of the signal received.
#[cfg(unix)]
async fn wait_for_shutdown() -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

/// Wait for CTRL-C
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}
