//! [`AppConfig`] values aimed at test daemons.

use std::path::{Path, PathBuf};

use stevedore_config::AppConfig;

/// Builds an [`AppConfig`] pointing at a test daemon, optionally writing it
/// out as a config file for load-path tests.
///
/// ```ignore
/// let config = TestConfigBuilder::new()
///     .unix_socket(&dir.path().join("daemon.sock"))
///     .stream_buffer(3)
///     .build();
/// ```
#[derive(Debug, Default)]
pub struct TestConfigBuilder {
    config: AppConfig,
}

impl TestConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn host(mut self, host: &str) -> Self {
        self.config.daemon.host = host.to_string();
        self
    }

    /// Dial a Unix socket, as served by [`crate::ScriptedDaemon::serve_unix`].
    pub fn unix_socket(self, path: &Path) -> Self {
        self.host(&format!("unix://{}", path.display()))
    }

    pub fn stream_buffer(mut self, buffer: usize) -> Self {
        self.config.streams.buffer = buffer;
        self
    }

    pub fn build(self) -> AppConfig {
        self.config
    }

    /// Write the config as `stevedore.toml` under `dir` and return its path.
    pub fn write_to(self, dir: &Path) -> std::io::Result<PathBuf> {
        let text = toml::to_string_pretty(&self.config).map_err(std::io::Error::other)?;
        let path = dir.join("stevedore.toml");
        std::fs::write(&path, text)?;
        Ok(path)
    }
}
