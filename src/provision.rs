//! Hand-off boundary to the component that installs the container engine.

use std::borrow::Cow;
use std::future::Future;
use std::pin::Pin;

use camino::Utf8PathBuf;
use shell_escape::unix::escape;
use thiserror::Error;
use tracing::info;

use crate::base::{DEFAULT_ENGINE_INSTALL_URL, engine_install_url_flag_set};
use crate::options::DriverOptions;

const ENGINE_INSTALL_URL_OPTION: &str = "engine-install-url";

/// Everything a provisioner needs to open an SSH session to a machine.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ConnectionDescriptor {
    /// Machine name.
    pub machine_name: String,
    /// Host name or IP address.
    pub address: String,
    /// SSH port.
    pub ssh_port: u16,
    /// SSH login user.
    pub ssh_user: String,
    /// Private key used for authentication.
    pub ssh_key_path: Utf8PathBuf,
}

/// Where the engine install script comes from.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub enum EngineInstallSource {
    /// [`DEFAULT_ENGINE_INSTALL_URL`].
    #[default]
    Default,
    /// Caller-supplied script URL.
    Custom(String),
}

impl EngineInstallSource {
    /// Picks the source from the `engine-install-url` option.
    #[must_use]
    pub fn from_options(options: &dyn DriverOptions) -> Self {
        if engine_install_url_flag_set(options) {
            Self::Custom(options.string(ENGINE_INSTALL_URL_OPTION))
        } else {
            Self::Default
        }
    }

    /// Returns the script URL.
    #[must_use]
    pub fn url(&self) -> &str {
        match self {
            Self::Default => DEFAULT_ENGINE_INSTALL_URL,
            Self::Custom(url) => url,
        }
    }
}

/// Renders the remote command that downloads and runs the install script.
#[must_use]
pub fn engine_install_command(source: &EngineInstallSource) -> String {
    let url = escape(Cow::Borrowed(source.url()));
    format!("if ! type docker; then curl -sSL {url} | sh -; fi")
}

/// Error reported by a provisioner.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("{message}")]
pub struct ProvisionError {
    /// Human-readable description of the failure.
    pub message: String,
}

impl ProvisionError {
    /// Creates an error from a message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Future returned by [`Provisioner::provision`].
pub type ProvisionFuture<'a> = Pin<Box<dyn Future<Output = Result<(), ProvisionError>> + Send + 'a>>;

/// Consumer of the "machine is running and reachable" signal.
pub trait Provisioner: Send + Sync {
    /// Installs and configures the container engine on the machine.
    fn provision<'a>(&'a self, connection: &'a ConnectionDescriptor) -> ProvisionFuture<'a>;
}

/// Provisioner that records the hand-off in the log and installs nothing.
///
/// Used by the CLI, where engine installation is left to an external runner.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct LogProvisioner {
    source: EngineInstallSource,
}

impl LogProvisioner {
    /// Creates a provisioner that reports `source` as the install script.
    #[must_use]
    pub const fn new(source: EngineInstallSource) -> Self {
        Self { source }
    }
}

impl Provisioner for LogProvisioner {
    fn provision<'a>(&'a self, connection: &'a ConnectionDescriptor) -> ProvisionFuture<'a> {
        Box::pin(async move {
            info!(
                machine = %connection.machine_name,
                address = %connection.address,
                port = connection.ssh_port,
                user = %connection.ssh_user,
                key = %connection.ssh_key_path,
                command = %engine_install_command(&self.source),
                "machine ready for engine installation"
            );
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::OptionMap;
    use rstest::rstest;

    #[rstest]
    #[case::absent(OptionMap::new(), EngineInstallSource::Default)]
    #[case::default_url(
        OptionMap::new().with("engine-install-url", DEFAULT_ENGINE_INSTALL_URL),
        EngineInstallSource::Default
    )]
    #[case::custom(
        OptionMap::new().with("engine-install-url", "https://test.docker.com"),
        EngineInstallSource::Custom(String::from("https://test.docker.com"))
    )]
    fn source_follows_override(#[case] options: OptionMap, #[case] expected: EngineInstallSource) {
        assert_eq!(EngineInstallSource::from_options(&options), expected);
    }

    #[test]
    fn default_command_uses_default_script() {
        let command = engine_install_command(&EngineInstallSource::Default);
        assert!(command.starts_with("if ! type docker; then curl -sSL "), "{command}");
        assert!(command.contains("https://get.docker.com"), "{command}");
        assert!(command.ends_with(" | sh -; fi"), "{command}");
    }

    #[test]
    fn custom_url_is_shell_escaped() {
        let source = EngineInstallSource::Custom(String::from("https://example.com/install.sh?a=1&b=2"));
        let command = engine_install_command(&source);
        assert!(
            command.contains("'https://example.com/install.sh?a=1&b=2'"),
            "{command}"
        );
    }

    #[tokio::test]
    async fn log_provisioner_accepts_connection() {
        let connection = ConnectionDescriptor {
            machine_name: String::from("m1"),
            address: String::from("10.0.0.5"),
            ssh_port: 22,
            ssh_user: String::from("root"),
            ssh_key_path: Utf8PathBuf::from("/s/machines/m1/id_rsa"),
        };
        let provisioner = LogProvisioner::default();
        assert_eq!(provisioner.provision(&connection).await, Ok(()));
    }
}
