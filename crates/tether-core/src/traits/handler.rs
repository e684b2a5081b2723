// # Connection Handler
//
// The strategy the manager consults when an attempt completes.
//
// On success the handler plays the socket factory role: it receives the
// connected stream and owns it from then on. The manager keeps no handle
// and only resumes managing the endpoint after an explicit
// `ConnectionManager::disconnect`. A handler that cannot take the stream
// hands it back; the manager closes it and retries on backoff.
//
// On failure the handler is told about the error and may ask for the
// endpoint to be paused instead of retried.

use crate::endpoint::Endpoint;
use crate::error::ConnectError;

/// What to do after a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailureAction {
    /// Schedule a retry using the endpoint's backoff policy
    #[default]
    Retry,
    /// Stop trying until the caller resumes the endpoint
    Pause,
}

/// Receives established connections and observes failures
pub trait ConnectionHandler<S>: Send {
    /// Take ownership of a freshly connected socket
    ///
    /// Return `Err(socket)` to refuse it. The endpoint then counts a failure
    /// and is retried as if the attempt had failed.
    fn on_connected(&mut self, endpoint: Endpoint, socket: S) -> Result<(), S>;

    /// Observe a failed attempt
    ///
    /// `failed_attempts` already includes this failure.
    fn on_failed(
        &mut self,
        _endpoint: Endpoint,
        _error: &ConnectError,
        _failed_attempts: u32,
    ) -> FailureAction {
        FailureAction::Retry
    }
}
