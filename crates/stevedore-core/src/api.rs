//! The daemon operation contract.
//!
//! [`DaemonClient`](crate::DaemonClient) is the only production
//! implementation; the trait exists so callers can be tested against a fake.

use tokio_util::sync::CancellationToken;

use crate::BoxFuture;
use crate::error::{ClientError, RunError};
use crate::stream::Subscription;
use crate::types::{Container, ContainerSpec, ContainerSummary, DaemonInfo, Event, HostConfig, LogsOptions};

/// Every operation the client exposes.
pub trait DaemonApi: Send + Sync {
    /// `GET /containers/json`.
    fn fetch_all_containers(&self) -> BoxFuture<'_, Result<Vec<ContainerSummary>, ClientError>>;

    /// `GET /containers/{name}/json`.
    fn fetch_container<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<Container, ClientError>>;

    /// `GET /info`.
    fn info(&self) -> BoxFuture<'_, Result<DaemonInfo, ClientError>>;

    /// `POST /images/create?fromImage={name}`, waiting for the pull to finish.
    fn pull_image<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<(), ClientError>>;

    /// `POST /containers/create`, returning the new container's id.
    fn create_container<'a>(&'a self, spec: &'a ContainerSpec) -> BoxFuture<'a, Result<String, ClientError>>;

    /// `POST /containers/{id}/start`, with an optional host config body.
    fn start_container<'a>(
        &'a self,
        id: &'a str,
        host_config: Option<&'a HostConfig>,
    ) -> BoxFuture<'a, Result<(), ClientError>>;

    /// `DELETE /containers/{name}`.
    fn remove_container<'a>(
        &'a self,
        name: &'a str,
        force: bool,
        volumes: bool,
    ) -> BoxFuture<'a, Result<(), ClientError>>;

    /// Stream `GET /events` until EOF or `cancel` fires.
    fn events(&self, cancel: CancellationToken) -> Subscription<Event>;

    /// Stream a container's log lines until EOF or `cancel` fires.
    fn container_logs(
        &self,
        id: &str,
        options: LogsOptions,
        cancel: CancellationToken,
    ) -> Subscription<String>;

    /// Create a container, then start it with the spec's host config.
    ///
    /// Start is never attempted if create fails. A container whose start
    /// fails is left in place; its id is reported in [`RunError::Start`].
    fn run_container<'a>(&'a self, spec: &'a ContainerSpec) -> BoxFuture<'a, Result<String, RunError>> {
        Box::pin(async move {
            let id = self.create_container(spec).await.map_err(RunError::Create)?;
            match self.start_container(&id, spec.host_config.as_ref()).await {
                Ok(()) => Ok(id),
                Err(source) => Err(RunError::Start { id, source }),
            }
        })
    }
}
