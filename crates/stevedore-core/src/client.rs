//! [`DaemonClient`]: the one implementation of [`DaemonApi`].
//!
//! One-shot operations run on the caller's task and close their connection
//! before returning, on success and on every error path.

use std::sync::Arc;

use futures::StreamExt;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde::de::DeserializeOwned;
use stevedore_config::{AppConfig, DEFAULT_STREAM_BUFFER};
use tokio_util::sync::CancellationToken;
use url::form_urlencoded;

use crate::BoxFuture;
use crate::address::Address;
use crate::api::DaemonApi;
use crate::error::ClientError;
use crate::framing::{self, Frame};
use crate::request::{Method, NO_BODY, RequestExecutor};
use crate::stream::{self, Subscription};
use crate::transport::{Connector, ResponseBody};
use crate::types::{
    Container, ContainerSpec, ContainerSummary, CreateResponse, DaemonInfo, Event, HostConfig,
    LogsOptions, PullProgress,
};

/// Characters escaped in a container name or id used as a path segment.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Client for a daemon's HTTP control API.
///
/// Holds only the resolved address; every call opens its own connection, so
/// one client can serve many concurrent calls.
#[derive(Clone)]
pub struct DaemonClient {
    executor: RequestExecutor,
    stream_buffer: usize,
}

impl DaemonClient {
    /// Client for the given connection string (see [`Address::resolve`]).
    pub fn new(host: &str) -> Self {
        Self::from_executor(RequestExecutor::new(Address::resolve(host)))
    }

    /// Client that dials through a custom [`Connector`].
    pub fn with_connector(host: &str, connector: Arc<dyn Connector>) -> Self {
        Self::from_executor(RequestExecutor::with_connector(
            Address::resolve(host),
            connector,
        ))
    }

    /// Client configured from the `[daemon]` and `[streams]` sections.
    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(&config.daemon.host).with_stream_buffer(config.streams.buffer)
    }

    fn from_executor(executor: RequestExecutor) -> Self {
        Self {
            executor,
            stream_buffer: DEFAULT_STREAM_BUFFER,
        }
    }

    /// Capacity of the channel behind each stream.
    pub fn with_stream_buffer(mut self, buffer: usize) -> Self {
        self.stream_buffer = buffer.max(1);
        self
    }

    /// Daemon address every call dials.
    pub fn address(&self) -> &Address {
        self.executor.address()
    }

    /// Executor behind this client, for requests the client has no method
    /// for.
    pub fn executor(&self) -> &RequestExecutor {
        &self.executor
    }

    async fn get_json<T: DeserializeOwned>(&self, uri: &str, context: &'static str) -> Result<T, ClientError> {
        let (body, connection) = self.executor.execute(Method::Get, uri, NO_BODY).await?;
        let decoded = body.json(context).await;
        connection.close();
        decoded
    }

    async fn send_and_discard(
        &self,
        method: Method,
        uri: &str,
        host_config: Option<&HostConfig>,
    ) -> Result<(), ClientError> {
        let (body, connection) = self.executor.execute(method, uri, host_config).await?;
        let drained = body.discard().await;
        connection.close();
        drained
    }
}

impl DaemonApi for DaemonClient {
    fn fetch_all_containers(&self) -> BoxFuture<'_, Result<Vec<ContainerSummary>, ClientError>> {
        Box::pin(self.get_json("/containers/json", "container list"))
    }

    fn fetch_container<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<Container, ClientError>> {
        Box::pin(async move {
            self.get_json(&format!("/containers/{}/json", segment(name)), "container")
                .await
        })
    }

    fn info(&self) -> BoxFuture<'_, Result<DaemonInfo, ClientError>> {
        Box::pin(self.get_json("/info", "daemon info"))
    }

    fn pull_image<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<(), ClientError>> {
        Box::pin(async move {
            // The pull runs as long as its progress body is being read
            let (body, connection) = self
                .executor
                .execute(Method::Post, &pull_uri(name), NO_BODY)
                .await?;
            let outcome = follow_pull_progress(body).await;
            connection.close();
            outcome
        })
    }

    fn create_container<'a>(&'a self, spec: &'a ContainerSpec) -> BoxFuture<'a, Result<String, ClientError>> {
        Box::pin(async move {
            let uri = create_uri(spec.name.as_deref());
            let (body, connection) = self.executor.execute(Method::Post, &uri, Some(spec)).await?;
            let created = body.json::<CreateResponse>("create response").await;
            connection.close();

            let created = created?;
            for warning in &created.warnings {
                tracing::warn!(id = %created.id, %warning, "daemon warning on create");
            }
            Ok(created.id)
        })
    }

    fn start_container<'a>(
        &'a self,
        id: &'a str,
        host_config: Option<&'a HostConfig>,
    ) -> BoxFuture<'a, Result<(), ClientError>> {
        Box::pin(async move {
            let uri = format!("/containers/{}/start", segment(id));
            self.send_and_discard(Method::Post, &uri, host_config).await
        })
    }

    fn remove_container<'a>(
        &'a self,
        name: &'a str,
        force: bool,
        volumes: bool,
    ) -> BoxFuture<'a, Result<(), ClientError>> {
        Box::pin(async move {
            self.send_and_discard(Method::Delete, &remove_uri(name, force, volumes), None)
                .await
        })
    }

    fn events(&self, cancel: CancellationToken) -> Subscription<Event> {
        stream::events(self.executor.clone(), self.stream_buffer, cancel)
    }

    fn container_logs(
        &self,
        id: &str,
        options: LogsOptions,
        cancel: CancellationToken,
    ) -> Subscription<String> {
        stream::logs(
            self.executor.clone(),
            logs_uri(id, &options),
            self.stream_buffer,
            cancel,
        )
    }
}

/// Read a pull's progress lines to the end. The daemon reports a failed pull
/// in band, as a line with an `error` key under a 200 status.
async fn follow_pull_progress(body: ResponseBody) -> Result<(), ClientError> {
    let mut frames = framing::lines(body);
    while let Some(frame) = frames.next().await {
        let Frame::Line(line) = frame? else {
            continue;
        };
        let Ok(progress) = serde_json::from_slice::<PullProgress>(&line) else {
            continue;
        };
        if let Some(message) = progress.error {
            return Err(ClientError::Reported { message });
        }
        if let Some(status) = progress.status {
            tracing::trace!(%status, "pull progress");
        }
    }
    Ok(())
}

fn segment(value: &str) -> String {
    utf8_percent_encode(value, PATH_SEGMENT).to_string()
}

fn query(pairs: &[(&str, &str)]) -> String {
    form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs)
        .finish()
}

fn flag(value: bool) -> &'static str {
    if value { "true" } else { "false" }
}

pub(crate) fn pull_uri(image: &str) -> String {
    format!("/images/create?{}", query(&[("fromImage", image)]))
}

pub(crate) fn create_uri(name: Option<&str>) -> String {
    match name {
        Some(name) => format!("/containers/create?{}", query(&[("name", name)])),
        None => "/containers/create".to_string(),
    }
}

pub(crate) fn remove_uri(name: &str, force: bool, volumes: bool) -> String {
    format!(
        "/containers/{}?{}",
        segment(name),
        query(&[("force", flag(force)), ("volumes", flag(volumes))])
    )
}

pub(crate) fn logs_uri(id: &str, options: &LogsOptions) -> String {
    let tail = options.tail.to_string();
    format!(
        "/containers/{}/logs?{}",
        segment(id),
        query(&[
            ("follow", flag(options.follow)),
            ("stdout", flag(options.stdout)),
            ("stderr", flag(options.stderr)),
            ("timestamps", flag(options.timestamps)),
            ("tail", tail.as_str()),
        ])
    )
}
