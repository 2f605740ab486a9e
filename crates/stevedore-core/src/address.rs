//! Connection-string resolution.
//!
//! A connection string is either `scheme://endpoint` or a bare filesystem
//! path. Bare paths mean a local Unix socket; `http` is an alias for `tcp`.
//! Resolution is pure and never fails: anything unrecognised is passed
//! through and rejected later by the connector.

use std::fmt;

const SCHEME_SEPARATOR: &str = "://";

/// Transport used to reach the daemon.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scheme {
    /// A Unix domain socket at a filesystem path.
    LocalSocket,
    /// A TCP `host:port`.
    Tcp,
    /// Any other scheme, kept verbatim.
    Other(String),
}

impl Scheme {
    fn from_prefix(prefix: &str) -> Self {
        match prefix {
            "unix" => Self::LocalSocket,
            "tcp" | "http" => Self::Tcp,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::LocalSocket => "unix",
            Self::Tcp => "tcp",
            Self::Other(s) => s,
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resolved daemon address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address {
    pub scheme: Scheme,
    /// Socket path for [`Scheme::LocalSocket`], `host:port` for [`Scheme::Tcp`].
    pub endpoint: String,
}

impl Address {
    /// Split a connection string on its first `://`.
    pub fn resolve(connection: &str) -> Self {
        match connection.split_once(SCHEME_SEPARATOR) {
            None => Self {
                scheme: Scheme::LocalSocket,
                endpoint: connection.to_string(),
            },
            Some((prefix, endpoint)) => Self {
                scheme: Scheme::from_prefix(prefix),
                endpoint: endpoint.to_string(),
            },
        }
    }

    /// Value for the HTTP `Host` header on requests to this address.
    pub fn host_header(&self) -> &str {
        match self.scheme {
            Scheme::Tcp => &self.endpoint,
            _ => "localhost",
        }
    }
}

impl From<&str> for Address {
    fn from(connection: &str) -> Self {
        Self::resolve(connection)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{SCHEME_SEPARATOR}{}", self.scheme, self.endpoint)
    }
}
