//! Errors returned by daemon operations.

/// Errors from talking to the daemon.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("failed to connect to daemon at {address}: {source}")]
    Connection {
        address: String,
        source: std::io::Error,
    },

    #[error("HTTP exchange with daemon failed: {0}")]
    Transport(#[from] hyper::Error),

    #[error("invalid request: {0}")]
    InvalidRequest(#[from] hyper::http::Error),

    #[error("daemon rejected request: {status} {reason}{}", detail(.message))]
    Request {
        status: u16,
        reason: String,
        message: Option<String>,
    },

    #[error("failed to encode request body: {0}")]
    Encoding(#[source] serde_json::Error),

    #[error("failed to decode {context}: {source}")]
    Decoding {
        context: &'static str,
        source: serde_json::Error,
    },

    #[error("stream line exceeds {limit} bytes")]
    LineTooLong { limit: usize },

    #[error("daemon reported an error: {message}")]
    Reported { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn detail(message: &Option<String>) -> String {
    match message {
        Some(m) => format!(" ({m})"),
        None => String::new(),
    }
}

impl ClientError {
    /// HTTP status carried by a [`ClientError::Request`], if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Request { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Failure of the composite create-then-start operation.
///
/// A container that was created is never rolled back, so a start failure
/// still reports the id the daemon assigned.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("failed to create container: {0}")]
    Create(#[source] ClientError),

    #[error("container {id} was created but failed to start: {source}")]
    Start {
        id: String,
        #[source]
        source: ClientError,
    },
}

impl RunError {
    /// Id of the container left behind, if creation got that far.
    pub fn created_id(&self) -> Option<&str> {
        match self {
            Self::Create(_) => None,
            Self::Start { id, .. } => Some(id),
        }
    }

    /// The underlying daemon error.
    pub fn client_error(&self) -> &ClientError {
        match self {
            Self::Create(e) | Self::Start { source: e, .. } => e,
        }
    }
}
