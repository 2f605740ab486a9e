#![deny(unsafe_code)]

//! Stevedore core: a narrow client for a container daemon's HTTP control API.
//!
//! Every request opens one fresh connection to the daemon (Unix socket or
//! TCP), speaks HTTP/1.1 over it, and closes it when the response has been
//! consumed. Long-lived endpoints (`/events`, container logs) are pumped by a
//! background task into a bounded channel that the caller drains.
//!
//! ```text
//! connection string ─▶ Address ─▶ Connector ─▶ RequestExecutor
//!                                                 │
//!                                   ┌─────────────┴──────────────┐
//!                                   ▼                            ▼
//!                         one-shot operations            event / log streams
//!                         (DaemonClient methods)         (Subscription<T>)
//! ```

use std::future::Future;
use std::pin::Pin;

/// A type-erased, `Send`-safe, boxed future: the return type for the
/// dyn-compatible traits in this crate ([`Connector`], [`DaemonApi`]).
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Connection-string parsing into a transport scheme and endpoint.
pub mod address;
/// The operation contract implemented by [`DaemonClient`].
pub mod api;
/// The concrete daemon client.
pub mod client;
/// Client error taxonomy.
pub mod error;
/// Bounded newline framing for streamed bodies.
pub mod framing;
/// Request execution and status validation.
pub mod request;
/// Event and log streaming.
pub mod stream;
/// Raw connections and HTTP exchanges.
pub mod transport;
/// Request and response records.
pub mod types;

pub use address::{Address, Scheme};
pub use api::DaemonApi;
pub use client::DaemonClient;
pub use error::{ClientError, RunError};
pub use request::{Method, RequestExecutor};
pub use stream::Subscription;
pub use transport::{BoxedStream, Connection, Connector, ResponseBody, SocketConnector};
pub use types::*;

/// Re-exported so callers can cancel streams without naming `tokio-util`.
pub use tokio_util::sync::CancellationToken;
