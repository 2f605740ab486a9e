//! Raw connections to the daemon and the HTTP/1.1 exchange layered on them.
//!
//! A [`Connector`] dials one byte stream per request. [`Connection`] runs
//! the hyper client handshake over that stream and owns the background task
//! driving it; closing or dropping the `Connection` ends that task, which
//! releases the socket. [`ResponseBody`] is the body half of a response and
//! must not outlive its `Connection`.

use std::io;

use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use http_body_util::{BodyExt, Full, Limited};
use hyper::body::{Bytes, Incoming};
use hyper::client::conn::http1::SendRequest;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_util::io::StreamReader;
use tracing::{debug, trace};

use crate::BoxFuture;
use crate::address::{Address, Scheme};
use crate::error::ClientError;

/// Largest error body read when extracting the daemon's failure message.
const ERROR_BODY_LIMIT: usize = 64 * 1024;

/// A bidirectional byte stream a [`Connection`] can run HTTP over.
pub trait AsyncStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> AsyncStream for T {}

/// Boxed stream handed out by a [`Connector`].
pub type BoxedStream = Box<dyn AsyncStream>;

/// Opens raw connections to a daemon address.
///
/// [`SocketConnector`] is the real implementation; tests substitute one that
/// hands out in-memory pipes to a scripted daemon.
pub trait Connector: Send + Sync {
    fn connect<'a>(&'a self, address: &'a Address) -> BoxFuture<'a, Result<BoxedStream, ClientError>>;
}

/// Dials Unix sockets and TCP endpoints. No retry, no timeout.
#[derive(Debug, Clone, Copy, Default)]
pub struct SocketConnector;

impl Connector for SocketConnector {
    fn connect<'a>(&'a self, address: &'a Address) -> BoxFuture<'a, Result<BoxedStream, ClientError>> {
        Box::pin(async move {
            let stream = match &address.scheme {
                Scheme::LocalSocket => connect_unix(&address.endpoint).await,
                Scheme::Tcp => TcpStream::connect(&address.endpoint)
                    .await
                    .map(|s| Box::new(s) as BoxedStream),
                Scheme::Other(scheme) => Err(io::Error::new(
                    io::ErrorKind::Unsupported,
                    format!("unsupported scheme '{scheme}'"),
                )),
            };
            stream.map_err(|source| ClientError::Connection {
                address: address.to_string(),
                source,
            })
        })
    }
}

#[cfg(unix)]
async fn connect_unix(path: &str) -> io::Result<BoxedStream> {
    let stream = tokio::net::UnixStream::connect(path).await?;
    Ok(Box::new(stream))
}

#[cfg(not(unix))]
async fn connect_unix(path: &str) -> io::Result<BoxedStream> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        format!("local sockets are not supported on this platform ({path})"),
    ))
}

/// One HTTP/1.1 exchange over one freshly dialled stream.
pub struct Connection {
    sender: SendRequest<Full<Bytes>>,
    driver: Option<JoinHandle<()>>,
}

impl Connection {
    /// Dial `address` and complete the HTTP/1.1 client handshake.
    pub async fn open(connector: &dyn Connector, address: &Address) -> Result<Self, ClientError> {
        let stream = connector.connect(address).await?;
        let (sender, conn) =
            hyper::client::conn::http1::handshake::<_, Full<Bytes>>(TokioIo::new(stream)).await?;

        // Drive the connection in the background until it finishes or is closed
        let driver = tokio::spawn(async move {
            if let Err(e) = conn.await {
                debug!(error = %e, "daemon connection ended with error");
            }
        });

        trace!(%address, "connection opened");
        Ok(Self {
            sender,
            driver: Some(driver),
        })
    }

    /// Send a request and wait for the response head.
    pub async fn send(&mut self, request: Request<Full<Bytes>>) -> Result<Response<Incoming>, ClientError> {
        Ok(self.sender.send_request(request).await?)
    }

    /// Whether the background driver is still running.
    pub fn is_open(&self) -> bool {
        self.driver.as_ref().is_some_and(|d| !d.is_finished())
    }

    /// Close the connection, releasing the socket.
    pub fn close(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(driver) = self.driver.take() {
            driver.abort();
            trace!("connection closed");
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Buffered reader over a response body, for line-oriented streams.
pub type BodyReader = StreamReader<BoxStream<'static, io::Result<Bytes>>, Bytes>;

/// Body of an accepted response.
pub struct ResponseBody {
    inner: Incoming,
}

impl ResponseBody {
    pub(crate) fn new(inner: Incoming) -> Self {
        Self { inner }
    }

    /// Read the whole body into memory.
    pub async fn bytes(self) -> Result<Bytes, ClientError> {
        Ok(self.inner.collect().await?.to_bytes())
    }

    /// Read the whole body and decode it as JSON.
    pub async fn json<T: DeserializeOwned>(self, context: &'static str) -> Result<T, ClientError> {
        let bytes = self.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|source| ClientError::Decoding { context, source })
    }

    /// Read the body to its end and throw it away.
    pub async fn discard(mut self) -> Result<(), ClientError> {
        while let Some(frame) = self.inner.frame().await {
            frame?;
        }
        Ok(())
    }

    /// Turn the body into an `AsyncBufRead` for incremental reads.
    pub fn into_reader(self) -> BodyReader {
        let chunks = self.inner.into_data_stream().map_err(io::Error::other).boxed();
        StreamReader::new(chunks)
    }

    /// Best-effort extraction of the daemon's error message from a rejected
    /// response. The daemon sends `{"message": "..."}`; anything else is
    /// returned as trimmed text.
    pub(crate) async fn error_message(self) -> Option<String> {
        #[derive(Deserialize)]
        struct DaemonMessage {
            message: String,
        }

        let bytes = Limited::new(self.inner, ERROR_BODY_LIMIT)
            .collect()
            .await
            .ok()?
            .to_bytes();
        if let Ok(parsed) = serde_json::from_slice::<DaemonMessage>(&bytes) {
            return Some(parsed.message);
        }
        let text = String::from_utf8_lossy(&bytes).trim().to_string();
        (!text.is_empty()).then_some(text)
    }
}
