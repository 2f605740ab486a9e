//! The request executor: one request, one fresh connection.
//!
//! [`RequestExecutor::execute`] serializes an optional JSON body, dials the
//! daemon, sends the request, and checks the status against an allow-list.
//! Only 200, 201 and 204 pass; every other status, listed or unknown, is a
//! [`ClientError::Request`]. On success the caller gets the open body and
//! the open connection and must close both once done.

use std::fmt;
use std::sync::Arc;

use http_body_util::Full;
use hyper::StatusCode;
use hyper::body::Bytes;
use hyper::header::{CONTENT_TYPE, HOST};
use serde::Serialize;
use tracing::debug;

use crate::address::Address;
use crate::error::ClientError;
use crate::transport::{Connection, Connector, ResponseBody, SocketConnector};

/// Statuses treated as success. Everything else fails closed.
pub const ACCEPTED_STATUSES: [StatusCode; 3] =
    [StatusCode::OK, StatusCode::CREATED, StatusCode::NO_CONTENT];

/// Placeholder for requests without a body.
pub const NO_BODY: Option<&()> = None;

/// Whether `status` is on the success allow-list.
pub fn is_accepted(status: StatusCode) -> bool {
    ACCEPTED_STATUSES.contains(&status)
}

/// HTTP methods the daemon API needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Delete,
}

impl Method {
    fn as_hyper(self) -> hyper::Method {
        match self {
            Self::Get => hyper::Method::GET,
            Self::Post => hyper::Method::POST,
            Self::Delete => hyper::Method::DELETE,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_hyper().as_str())
    }
}

/// Issues requests to one daemon address. Holds no live connections, so it
/// is cheap to clone and safe to share across concurrent calls.
#[derive(Clone)]
pub struct RequestExecutor {
    address: Address,
    connector: Arc<dyn Connector>,
}

impl RequestExecutor {
    /// Executor dialling real sockets.
    pub fn new(address: Address) -> Self {
        Self::with_connector(address, Arc::new(SocketConnector))
    }

    /// Executor using a custom [`Connector`].
    pub fn with_connector(address: Address, connector: Arc<dyn Connector>) -> Self {
        Self { address, connector }
    }

    /// Address each request dials.
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Send one request over a new connection.
    ///
    /// `uri` is an absolute path plus query. A present `body` is sent as JSON.
    pub async fn execute<B>(
        &self,
        method: Method,
        uri: &str,
        body: Option<&B>,
    ) -> Result<(ResponseBody, Connection), ClientError>
    where
        B: Serialize + ?Sized,
    {
        let payload = body
            .map(serde_json::to_vec)
            .transpose()
            .map_err(ClientError::Encoding)?;

        let mut builder = hyper::Request::builder()
            .method(method.as_hyper())
            .uri(uri)
            .header(HOST, self.address.host_header());
        if payload.is_some() {
            builder = builder.header(CONTENT_TYPE, "application/json");
        }
        let request = builder.body(Full::new(payload.map(Bytes::from).unwrap_or_default()))?;

        let mut connection = Connection::open(self.connector.as_ref(), &self.address).await?;
        debug!(%method, uri, "daemon request");

        let response = connection.send(request).await?;
        let status = response.status();
        let body = ResponseBody::new(response.into_body());

        if !is_accepted(status) {
            let message = body.error_message().await;
            connection.close();
            debug!(%method, uri, status = status.as_u16(), "daemon rejected request");
            return Err(ClientError::Request {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("Unknown").to_string(),
                message,
            });
        }

        Ok((body, connection))
    }
}
