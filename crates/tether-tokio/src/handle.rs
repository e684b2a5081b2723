//! Cloneable async front end to the driver

use crate::driver::Command;
use tether_core::{
    BackoffConfig, BoxedBackoffPolicy, DiscoveredTargets, Endpoint, EndpointState, Error, Result,
};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

/// Handle to a running [`Driver`](crate::Driver)
///
/// Every method queues a command and waits for the driver's reply. All
/// methods return [`Error::Stopped`] once the driver has exited.
#[derive(Clone)]
pub struct ManagerHandle {
    commands: mpsc::Sender<Command>,
}

impl ManagerHandle {
    pub(crate) fn new(commands: mpsc::Sender<Command>) -> Self {
        Self { commands }
    }

    async fn request<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| Error::Stopped)?;
        response.await.map_err(|_| Error::Stopped)
    }

    /// Start managing an endpoint; `Ok(false)` if it was already registered
    pub async fn add_endpoint(
        &self,
        endpoint: Endpoint,
        policy: BoxedBackoffPolicy,
        paused: bool,
    ) -> Result<bool> {
        self.request(|reply| Command::AddEndpoint {
            endpoint,
            policy,
            paused,
            reply,
        })
        .await
    }

    /// Stop managing an endpoint; `Ok(false)` if it was not registered
    pub async fn remove_endpoint(&self, endpoint: Endpoint) -> Result<bool> {
        self.request(|reply| Command::RemoveEndpoint { endpoint, reply })
            .await
    }

    pub async fn endpoint_count(&self) -> Result<usize> {
        self.request(|reply| Command::EndpointCount { reply }).await
    }

    pub async fn endpoints(&self) -> Result<Vec<Endpoint>> {
        self.request(|reply| Command::Endpoints { reply }).await
    }

    pub async fn endpoint_state(&self, endpoint: Endpoint) -> Result<Option<EndpointState>> {
        self.request(|reply| Command::EndpointState { endpoint, reply })
            .await
    }

    /// Report a lost connection (see `ConnectionManager::disconnect`)
    ///
    /// The caller closes the stream itself.
    pub async fn disconnect(&self, endpoint: Endpoint, pause: bool) -> Result<()> {
        self.request(|reply| Command::Disconnect {
            endpoint,
            pause,
            reply,
        })
        .await?
    }

    /// Resume a paused endpoint
    pub async fn resume(&self, endpoint: Endpoint) -> Result<()> {
        self.request(|reply| Command::Resume { endpoint, reply })
            .await?
    }

    /// Register every TCP endpoint in `targets`, each with its own policy
    ///
    /// Widget targets are not TCP and are skipped.
    ///
    /// # Returns
    ///
    /// The number of endpoints that were newly added
    pub async fn add_targets(
        &self,
        targets: &DiscoveredTargets,
        backoff: &BackoffConfig,
    ) -> Result<usize> {
        let mut added = 0;
        for &endpoint in &targets.endpoints {
            if self.add_endpoint(endpoint, backoff.build(), false).await? {
                added += 1;
            }
        }

        if !targets.widgets.is_empty() {
            debug!(
                widgets = targets.widgets.len(),
                "Skipping non-TCP widget targets"
            );
        }

        info!(
            added,
            backoff = backoff.type_name(),
            "Registered TCP targets"
        );
        Ok(added)
    }

    /// Stop the driver, cancelling all pending timers and attempts
    ///
    /// Returns once the driver has finished cleaning up.
    pub async fn shutdown(&self) -> Result<()> {
        self.request(|reply| Command::Shutdown { reply }).await
    }

    /// Whether the driver has exited
    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }
}
