//! Error types for the tether system
//!
//! This module defines all error types used throughout the crate.

use crate::endpoint::Endpoint;
use crate::manager::ConnectionState;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for tether operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the tether system
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration errors (including unparsable targets)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Operation on an endpoint that is not registered
    #[error("Unknown endpoint: {0}")]
    UnknownEndpoint(Endpoint),

    /// Operation not valid for the endpoint's current state
    #[error("Cannot {operation} endpoint {endpoint} while {state}")]
    InvalidTransition {
        /// Endpoint the operation targeted
        endpoint: Endpoint,
        /// State the endpoint was in
        state: ConnectionState,
        /// Operation name (e.g. "resume")
        operation: &'static str,
    },

    /// The manager's control loop has stopped
    #[error("Connection manager has stopped")]
    Stopped,

    /// I/O errors (configuration files)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an invalid transition error
    pub fn invalid_transition(
        endpoint: Endpoint,
        state: ConnectionState,
        operation: &'static str,
    ) -> Self {
        Self::InvalidTransition {
            endpoint,
            state,
            operation,
        }
    }
}

/// Outcome of a single failed connection attempt.
///
/// These are transient: the manager absorbs them into the failure counter
/// and schedules a retry. They never surface from the public operations.
#[derive(Error, Debug)]
pub enum ConnectError {
    /// The connect call itself failed (refused, unreachable, ...)
    #[error("connect failed: {0}")]
    Io(#[from] std::io::Error),

    /// The attempt did not complete within the connection timeout
    #[error("connect timed out after {0:?}")]
    TimedOut(Duration),
}

impl ConnectError {
    /// Whether this failure was a timeout rather than an explicit error
    pub fn is_timeout(&self) -> bool {
        matches!(self, ConnectError::TimedOut(_))
    }
}
