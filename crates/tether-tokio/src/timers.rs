//! Retry timers as abortable sleep tasks

use crate::event::{EventSender, LoopEvent};
use std::collections::HashMap;
use std::time::Duration;
use tether_core::{Endpoint, TimerId, TimerService};
use tokio::task::AbortHandle;
use tracing::debug;

/// [`TimerService`] backed by `tokio::time::sleep`
///
/// Each timer is a spawned task that sleeps and then posts
/// [`LoopEvent::TimerFired`]. Must be used from within a tokio runtime.
pub struct TokioTimers {
    events: EventSender,
    next_id: u64,
    pending: HashMap<TimerId, AbortHandle>,
}

impl TokioTimers {
    pub fn new(events: EventSender) -> Self {
        Self {
            events,
            next_id: 0,
            pending: HashMap::new(),
        }
    }

    /// Number of timers that have not fired or been cancelled
    pub fn pending(&self) -> usize {
        self.pending
            .values()
            .filter(|handle| !handle.is_finished())
            .count()
    }
}

impl TimerService for TokioTimers {
    fn register_timeout(&mut self, delay: Duration, endpoint: Endpoint) -> TimerId {
        self.pending.retain(|_, handle| !handle.is_finished());

        self.next_id += 1;
        let id = TimerId(self.next_id);
        let events = self.events.clone();

        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if events.send(LoopEvent::TimerFired { id, endpoint }).is_err() {
                debug!(%endpoint, timer = %id, "Driver gone, dropping timer event");
            }
        });

        self.pending.insert(id, task.abort_handle());
        id
    }

    fn cancel_timeout(&mut self, id: TimerId) -> bool {
        match self.pending.remove(&id) {
            Some(handle) if !handle.is_finished() => {
                handle.abort();
                true
            }
            _ => false,
        }
    }
}

impl Drop for TokioTimers {
    fn drop(&mut self) {
        for handle in self.pending.values() {
            handle.abort();
        }
    }
}
