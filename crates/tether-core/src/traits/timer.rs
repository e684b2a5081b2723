// # Timer Service
//
// One-shot timers used to schedule reconnect attempts.
//
// ## Delivery
//
// When a timer expires the owning event loop must call
// `ConnectionManager::handle_timeout` with the id and endpoint it was
// registered with. Expiry is never delivered from inside
// `register_timeout` itself.
//
// ## Cancellation
//
// `cancel_timeout` is best effort: an expiry that was already queued may
// still be delivered. The manager checks the id against the one it
// recorded and discards anything else.

use crate::endpoint::Endpoint;
use std::fmt;
use std::time::Duration;

/// Opaque handle to a registered timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(pub u64);

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer-{}", self.0)
    }
}

/// Source of one-shot timers
pub trait TimerService: Send {
    /// Arrange for `endpoint`'s retry to fire after `delay`
    fn register_timeout(&mut self, delay: Duration, endpoint: Endpoint) -> TimerId;

    /// Cancel a pending timer
    ///
    /// Returns `false` if the timer had already fired or was unknown.
    fn cancel_timeout(&mut self, id: TimerId) -> bool;
}
