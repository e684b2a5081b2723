//! Configuration types for the tether system
//!
//! This module defines all configuration structures used throughout the crate.

use crate::backoff::{
    BoxedBackoffPolicy, ConstantBackoff, ExponentialBackoff, LinearBackoff,
};
use crate::discovery::{DiscoveredTargets, resolve_targets};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main tether configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TetherConfig {
    /// Targets to maintain connections to (see `discovery` for the syntax)
    pub targets: Vec<String>,

    /// Backoff policy applied to every TCP target
    #[serde(default)]
    pub backoff: BackoffConfig,

    /// Optional manager settings
    #[serde(default)]
    pub manager: ManagerConfig,
}

impl TetherConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self {
            targets: Vec::new(),
            backoff: BackoffConfig::default(),
            manager: ManagerConfig::default(),
        }
    }

    /// Load a configuration from a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, crate::Error> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.targets.is_empty() {
            return Err(crate::Error::config("No targets configured"));
        }

        self.backoff.validate()?;
        self.manager.validate()?;
        self.discover()?;

        Ok(())
    }

    /// Parse the configured targets
    pub fn discover(&self) -> Result<DiscoveredTargets, crate::Error> {
        resolve_targets(&self.targets)
    }
}

impl Default for TetherConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Backoff policy configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackoffConfig {
    /// Same wait after every failure
    Constant {
        /// Wait between attempts (in milliseconds)
        interval_ms: u64,
    },

    /// Wait grows by `step_ms` per failure
    Linear {
        /// Increment per failure (in milliseconds)
        step_ms: u64,
        /// Upper bound (in milliseconds)
        max_ms: u64,
    },

    /// Wait doubles per failure
    Exponential {
        /// Wait after the first failure (in milliseconds)
        initial_ms: u64,
        /// Upper bound (in milliseconds)
        max_ms: u64,
    },
}

impl BackoffConfig {
    /// Validate the backoff configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match *self {
            BackoffConfig::Constant { .. } => Ok(()),
            BackoffConfig::Linear { step_ms, max_ms } => {
                if step_ms == 0 {
                    return Err(crate::Error::config("Linear backoff step must be > 0"));
                }
                if max_ms < step_ms {
                    return Err(crate::Error::config(
                        "Linear backoff max must be >= step",
                    ));
                }
                Ok(())
            }
            BackoffConfig::Exponential { initial_ms, max_ms } => {
                if initial_ms == 0 {
                    return Err(crate::Error::config(
                        "Exponential backoff initial interval must be > 0",
                    ));
                }
                if max_ms < initial_ms {
                    return Err(crate::Error::config(
                        "Exponential backoff max must be >= initial interval",
                    ));
                }
                Ok(())
            }
        }
    }

    /// Build a fresh policy instance
    ///
    /// Each endpoint owns its own instance.
    pub fn build(&self) -> BoxedBackoffPolicy {
        match *self {
            BackoffConfig::Constant { interval_ms } => {
                Box::new(ConstantBackoff::new(Duration::from_millis(interval_ms)))
            }
            BackoffConfig::Linear { step_ms, max_ms } => Box::new(LinearBackoff::new(
                Duration::from_millis(step_ms),
                Duration::from_millis(max_ms),
            )),
            BackoffConfig::Exponential { initial_ms, max_ms } => {
                Box::new(ExponentialBackoff::new(
                    Duration::from_millis(initial_ms),
                    Duration::from_millis(max_ms),
                ))
            }
        }
    }

    /// Get the policy type name
    pub fn type_name(&self) -> &'static str {
        match self {
            BackoffConfig::Constant { .. } => "constant",
            BackoffConfig::Linear { .. } => "linear",
            BackoffConfig::Exponential { .. } => "exponential",
        }
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        BackoffConfig::Exponential {
            initial_ms: default_backoff_initial_ms(),
            max_ms: default_backoff_max_ms(),
        }
    }
}

fn default_backoff_initial_ms() -> u64 {
    1_000
}

fn default_backoff_max_ms() -> u64 {
    60_000
}

/// Manager configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// How long a single connection attempt may take (in milliseconds)
    ///
    /// A timed-out attempt counts as a failure, same as a refused one.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Capacity of the channel connected sockets are delivered on
    ///
    /// When full, new sockets are closed and dropped (with a warning log).
    ///
    /// Default: 64 sockets
    #[serde(default = "default_socket_channel_capacity")]
    pub socket_channel_capacity: usize,
}

impl ManagerConfig {
    /// Validate the manager configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.connect_timeout_ms == 0 {
            return Err(crate::Error::config("Connect timeout must be > 0"));
        }
        if self.socket_channel_capacity == 0 {
            return Err(crate::Error::config("Socket channel capacity must be > 0"));
        }
        Ok(())
    }

    /// The connect timeout as a duration
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout_ms(),
            socket_channel_capacity: default_socket_channel_capacity(),
        }
    }
}

fn default_connect_timeout_ms() -> u64 {
    5_000
}

fn default_socket_channel_capacity() -> usize {
    64
}
