//! A scripted daemon for exercising the client end to end.
//!
//! [`ScriptedDaemon`] wraps an axum [`Router`] describing the endpoints a
//! test needs. Clients reach it either through a [`ScriptedConnector`], which
//! hands out an in-memory pipe per connection and serves it with hyper, or
//! over a real Unix socket via [`ScriptedDaemon::serve_unix`]. Every request
//! is recorded, and the connector counts connections opened and closed.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::body::{Body, Bytes};
use axum::extract::{Request, State};
use axum::middleware::{self, Next};
use axum::response::Response;
use hyper_util::rt::TokioIo;
use hyper_util::service::TowerToHyperService;
use stevedore_core::{Address, BoxFuture, BoxedStream, ClientError, Connector, DaemonClient};
use tokio::net::UnixListener;
use tokio::task::JoinHandle;
use tracing::debug;

/// Connection string given to clients built by [`ScriptedDaemon::client`].
/// Nothing is ever dialled at this path.
pub const SCRIPTED_HOST: &str = "unix:///scripted/daemon.sock";

const PIPE_BUFFER: usize = 64 * 1024;

/// A request as the scripted daemon saw it.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub content_type: Option<String>,
    pub body: Bytes,
}

impl RecordedRequest {
    /// Decoded query parameters in order.
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        url::form_urlencoded::parse(self.query.as_deref().unwrap_or_default().as_bytes())
            .into_owned()
            .collect()
    }

    /// First value of a query parameter.
    pub fn query_param(&self, key: &str) -> Option<String> {
        self.query_pairs()
            .into_iter()
            .find_map(|(k, v)| (k == key).then_some(v))
    }

    /// Body parsed as JSON. Panics if the body is not JSON.
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).expect("request body is not JSON")
    }
}

type RequestLog = Arc<Mutex<Vec<RecordedRequest>>>;

#[derive(Clone, Default)]
struct Counters {
    opened: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
}

/// In-process daemon serving a fixed set of routes.
pub struct ScriptedDaemon {
    router: Router,
    requests: RequestLog,
    counters: Counters,
}

impl ScriptedDaemon {
    /// Serve `routes`, recording every request.
    pub fn new(routes: Router) -> Self {
        let requests = RequestLog::default();
        let router = routes.layer(middleware::from_fn_with_state(requests.clone(), record));
        Self {
            router,
            requests,
            counters: Counters::default(),
        }
    }

    /// Connector that opens in-memory connections to this daemon.
    pub fn connector(&self) -> ScriptedConnector {
        ScriptedConnector {
            router: self.router.clone(),
            counters: self.counters.clone(),
        }
    }

    /// A client wired to this daemon through [`Self::connector`].
    pub fn client(&self) -> DaemonClient {
        DaemonClient::with_connector(SCRIPTED_HOST, Arc::new(self.connector()))
    }

    /// Requests received so far, in arrival order.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().expect("request log poisoned").clone()
    }

    /// The single request received so far. Panics unless exactly one arrived.
    pub fn only_request(&self) -> RecordedRequest {
        let requests = self.requests();
        assert_eq!(requests.len(), 1, "expected exactly one request: {requests:?}");
        requests[0].clone()
    }

    pub fn connections_opened(&self) -> usize {
        self.counters.opened.load(Ordering::SeqCst)
    }

    pub fn connections_closed(&self) -> usize {
        self.counters.closed.load(Ordering::SeqCst)
    }

    /// Wait until every connection opened so far has been closed by the
    /// client. Panics after two seconds.
    pub async fn wait_until_all_closed(&self) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while self.connections_closed() < self.connections_opened() {
            assert!(
                tokio::time::Instant::now() < deadline,
                "{} of {} connections still open",
                self.connections_opened() - self.connections_closed(),
                self.connections_opened()
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Serve the same routes on a Unix socket at `path`.
    pub fn serve_unix(&self, path: &Path) -> std::io::Result<JoinHandle<()>> {
        let listener = UnixListener::bind(path)?;
        let router = self.router.clone();
        Ok(tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router).await {
                debug!(error = %e, "scripted unix daemon stopped");
            }
        }))
    }
}

/// [`Connector`] handing out in-memory pipes to a [`ScriptedDaemon`].
#[derive(Clone)]
pub struct ScriptedConnector {
    router: Router,
    counters: Counters,
}

impl Connector for ScriptedConnector {
    fn connect<'a>(&'a self, _address: &'a Address) -> BoxFuture<'a, Result<BoxedStream, ClientError>> {
        Box::pin(async move {
            let (client, server) = tokio::io::duplex(PIPE_BUFFER);
            self.counters.opened.fetch_add(1, Ordering::SeqCst);

            let service = TowerToHyperService::new(self.router.clone());
            let closed = Arc::clone(&self.counters.closed);
            tokio::spawn(async move {
                let served = hyper::server::conn::http1::Builder::new()
                    .serve_connection(TokioIo::new(server), service)
                    .await;
                if let Err(e) = served {
                    debug!(error = %e, "scripted connection ended with error");
                }
                closed.fetch_add(1, Ordering::SeqCst);
            });

            Ok(Box::new(client) as BoxedStream)
        })
    }
}

async fn record(State(log): State<RequestLog>, request: Request, next: Next) -> Response {
    let (parts, body) = request.into_parts();
    let body = axum::body::to_bytes(body, usize::MAX)
        .await
        .unwrap_or_default();

    log.lock().expect("request log poisoned").push(RecordedRequest {
        method: parts.method.to_string(),
        path: parts.uri.path().to_string(),
        query: parts.uri.query().map(str::to_string),
        content_type: parts
            .headers
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        body: body.clone(),
    });

    next.run(Request::from_parts(parts, Body::from(body))).await
}
