#![deny(unsafe_code)]

//! Shared test utilities for the stevedore workspace.
//!
//! Provides a scripted in-process daemon and a config builder aimed at it,
//! so individual crate tests stay concise and consistent.
//!
//! Add this crate as a `[dev-dependency]` in any workspace member:
//!
//! ```toml
//! [dev-dependencies]
//! stevedore-test-utils = { workspace = true }
//! ```

pub mod config;
pub mod daemon;

pub use config::TestConfigBuilder;
pub use daemon::{RecordedRequest, SCRIPTED_HOST, ScriptedConnector, ScriptedDaemon};
