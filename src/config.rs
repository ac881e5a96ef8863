//! Configuration loading via `ortho-config`.

use std::ffi::OsString;
use std::time::Duration;

use camino::Utf8PathBuf;
use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

const STORE_DIR_NAME: &str = ".hostwright";

/// Orchestrator settings layered from defaults, `hostwright.toml`, and
/// `HOSTWRIGHT_*` environment variables.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "HOSTWRIGHT",
    discovery(
        app_name = "hostwright",
        env_var = "HOSTWRIGHT_CONFIG_PATH",
        config_file_name = "hostwright.toml",
        dotfile_name = ".hostwright.toml",
        project_file_name = "hostwright.toml"
    )
)]
pub struct HostwrightConfig {
    /// Store root. Empty means `~/.hostwright`.
    #[ortho_config(default = String::new())]
    pub storage_path: String,
    /// Delay between state polls in milliseconds.
    #[ortho_config(default = 1000)]
    pub poll_interval_ms: u64,
    /// Per-attempt timeout for the SSH port check in milliseconds.
    #[ortho_config(default = 2000)]
    pub ssh_connect_timeout_ms: u64,
}

impl HostwrightConfig {
    /// Loads configuration without parsing CLI arguments. Values merge
    /// defaults, configuration files, and environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when merging sources fails and
    /// [`ConfigError::Invalid`] when the merged values fail validation.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        let config = Self::load_from_iter([OsString::from("hostwright")])
            .map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Performs semantic validation.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when an interval is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(String::from(
                "poll interval must be greater than zero: set HOSTWRIGHT_POLL_INTERVAL_MS \
                 or poll_interval_ms in hostwright.toml",
            )));
        }
        if self.ssh_connect_timeout_ms == 0 {
            return Err(ConfigError::Invalid(String::from(
                "SSH connect timeout must be greater than zero: set \
                 HOSTWRIGHT_SSH_CONNECT_TIMEOUT_MS or ssh_connect_timeout_ms in hostwright.toml",
            )));
        }
        Ok(())
    }

    /// Returns the store root, falling back to `~/.hostwright` and then to
    /// `./.hostwright` when no home directory is known.
    #[must_use]
    pub fn store_root(&self) -> Utf8PathBuf {
        let configured = self.storage_path.trim();
        if !configured.is_empty() {
            return Utf8PathBuf::from(configured);
        }
        dirs::home_dir()
            .and_then(|home| Utf8PathBuf::from_path_buf(home).ok())
            .map_or_else(
                || Utf8PathBuf::from(STORE_DIR_NAME),
                |home| home.join(STORE_DIR_NAME),
            )
    }

    /// Delay between state polls.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Per-attempt timeout for the SSH port check.
    #[must_use]
    pub const fn ssh_connect_timeout(&self) -> Duration {
        Duration::from_millis(self.ssh_connect_timeout_ms)
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
    /// Raised when a value is out of range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}
