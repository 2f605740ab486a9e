//! Records exchanged with the daemon.
//!
//! Field names follow the daemon's PascalCase JSON. Request records carry an
//! `extra` map for fields this crate does not model; response records keep
//! unknown fields in `extra` where forward compatibility matters.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

// ── Requests ──────────────────────────────────────────────────────────

/// Request body for `POST /containers/create`.
///
/// `name` travels in the query string, never in the body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerSpec {
    #[serde(default, skip_serializing)]
    pub name: Option<String>,

    pub image: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cmd: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<String>,

    /// Keys like `"80/tcp"`; the daemon expects an empty object per key.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub exposed_ports: BTreeMap<String, Map<String, Value>>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_config: Option<HostConfig>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ContainerSpec {
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            ..Self::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_cmd<I, S>(mut self, cmd: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cmd = cmd.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_env(mut self, entry: impl Into<String>) -> Self {
        self.env.push(entry.into());
        self
    }

    /// Expose `port` (e.g. `"80/tcp"`) and bind it to `host_port` on all
    /// host interfaces.
    pub fn publish(mut self, port: impl Into<String>, host_port: impl Into<String>) -> Self {
        let port = port.into();
        self.exposed_ports.insert(port.clone(), Map::new());
        self.host_config
            .get_or_insert_with(HostConfig::default)
            .port_bindings
            .entry(port)
            .or_default()
            .push(PortBinding {
                host_ip: String::new(),
                host_port: host_port.into(),
            });
        self
    }

    pub fn with_host_config(mut self, host_config: HostConfig) -> Self {
        self.host_config = Some(host_config);
        self
    }
}

/// Host-side settings, sent on create and again on start.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct HostConfig {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty", deserialize_with = "null_as_default")]
    pub port_bindings: BTreeMap<String, Vec<PortBinding>>,

    #[serde(default, skip_serializing_if = "Vec::is_empty", deserialize_with = "null_as_default")]
    pub binds: Vec<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A host address/port a container port is bound to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortBinding {
    #[serde(rename = "HostIp", default)]
    pub host_ip: String,
    #[serde(rename = "HostPort", default)]
    pub host_port: String,
}

// ── Responses ─────────────────────────────────────────────────────────

/// Body of a successful create.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateResponse {
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub warnings: Vec<String>,
}

/// Full container record from `GET /containers/{name}/json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Container {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub network_settings: Option<NetworkSettings>,
    #[serde(default)]
    pub state: ContainerState,
    #[serde(default)]
    pub config: ContainerConfig,
    #[serde(default)]
    pub host_config: HostConfig,
}

impl Container {
    pub fn is_running(&self) -> bool {
        self.state.running
    }

    /// IP address on the default network, if the container has one.
    pub fn ip_address(&self) -> Option<&str> {
        self.network_settings
            .as_ref()
            .map(|n| n.ip_address.as_str())
            .filter(|ip| !ip.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkSettings {
    #[serde(rename = "IPAddress", default)]
    pub ip_address: String,
    /// Container port to host bindings. The daemon sends `null` for exposed
    /// but unpublished ports.
    #[serde(rename = "Ports", default, deserialize_with = "null_as_default")]
    pub ports: BTreeMap<String, Option<Vec<PortBinding>>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerState {
    #[serde(default)]
    pub running: bool,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub exit_code: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerConfig {
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub attach_stderr: bool,
    #[serde(default)]
    pub attach_stdin: bool,
    #[serde(default)]
    pub attach_stdout: bool,
}

/// Entry from `GET /containers/json`. The list endpoint reports state as a
/// plain string, unlike the full record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerSummary {
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub names: Vec<String>,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub created: i64,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub status: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub ports: Vec<PortSummary>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortSummary {
    #[serde(rename = "IP", default)]
    pub ip: Option<String>,
    #[serde(rename = "PrivatePort")]
    pub private_port: u16,
    #[serde(rename = "PublicPort", default)]
    pub public_port: Option<u16>,
    #[serde(rename = "Type", default)]
    pub kind: String,
}

/// Daemon-wide information from `GET /info`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DaemonInfo {
    #[serde(default)]
    pub containers: u64,
    #[serde(default)]
    pub images: u64,
    #[serde(default)]
    pub driver: String,
    /// Storage driver diagnostics as `[key, value]` pairs.
    #[serde(default, deserialize_with = "null_as_default")]
    pub driver_status: Vec<Vec<String>>,
    #[serde(default, deserialize_with = "flag")]
    pub debug: bool,
    #[serde(default)]
    pub execution_driver: String,
    #[serde(rename = "IPv4Forwarding", default, deserialize_with = "flag")]
    pub ipv4_forwarding: bool,
    #[serde(default)]
    pub index_server_address: String,
    #[serde(default)]
    pub init_path: String,
    #[serde(default)]
    pub init_sha1: String,
    #[serde(default)]
    pub kernel_version: String,
    #[serde(default)]
    pub operating_system: String,
    #[serde(default, deserialize_with = "flag")]
    pub memory_limit: bool,
    #[serde(rename = "NEventsListener", default)]
    pub n_events_listener: i64,
    #[serde(rename = "NFd", default)]
    pub n_fd: i64,
    #[serde(default)]
    pub n_goroutines: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub sockets: Vec<String>,
    #[serde(default, deserialize_with = "flag")]
    pub swap_limit: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DaemonInfo {
    /// Look up a storage driver diagnostic by key.
    pub fn driver_status(&self, key: &str) -> Option<&str> {
        self.driver_status.iter().find_map(|entry| match entry.as_slice() {
            [k, v, ..] if k == key => Some(v.as_str()),
            _ => None,
        })
    }

    /// The storage driver's `Root Dir`.
    pub fn root_dir(&self) -> Option<&str> {
        self.driver_status("Root Dir")
    }
}

/// One line of `POST /images/create` progress output.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PullProgress {
    #[serde(default)]
    pub status: Option<String>,
    /// Set when the pull failed after the daemon had already answered 200.
    #[serde(default)]
    pub error: Option<String>,
}

/// A state-change notification from `GET /events`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "id", default)]
    pub container_id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<i64>,
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.container_id, self.status)?;
        if let Some(from) = &self.from {
            write!(f, " ({from})")?;
        }
        Ok(())
    }
}

/// How many trailing log lines to fetch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Tail {
    #[default]
    All,
    Lines(i64),
}

impl From<i64> for Tail {
    /// `-1` means "all", matching the daemon's convention. Any other count
    /// is passed through as given.
    fn from(n: i64) -> Self {
        if n == -1 { Self::All } else { Self::Lines(n) }
    }
}

impl fmt::Display for Tail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("all"),
            Self::Lines(n) => write!(f, "{n}"),
        }
    }
}

/// Query flags for `GET /containers/{id}/logs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogsOptions {
    pub follow: bool,
    pub stdout: bool,
    pub stderr: bool,
    pub timestamps: bool,
    pub tail: Tail,
}

impl Default for LogsOptions {
    fn default() -> Self {
        Self {
            follow: false,
            stdout: true,
            stderr: true,
            timestamps: false,
            tail: Tail::All,
        }
    }
}

/// Accept `null` wherever the daemon may omit a collection.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Older daemons report booleans as 0/1.
fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(i64),
    }

    Ok(match Option::<Flag>::deserialize(deserializer)? {
        Some(Flag::Bool(b)) => b,
        Some(Flag::Int(n)) => n != 0,
        None => false,
    })
}
