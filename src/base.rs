//! Shared driver attributes and their self-defaulting accessors.

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::driver::DriverError;
use crate::options::DriverOptions;

/// SSH user assumed when a driver does not set one.
pub const DEFAULT_SSH_USER: &str = "root";
/// SSH port assumed when a driver does not set one.
pub const DEFAULT_SSH_PORT: u16 = 22;
/// Script source used to install the container engine.
pub const DEFAULT_ENGINE_INSTALL_URL: &str = "https://get.docker.com";
/// State polls allowed while waiting for a machine to run.
pub const DEFAULT_MAX_ATTEMPT: u32 = 60;
/// Identifier reported by drivers that forget to name themselves.
pub const UNKNOWN_DRIVER_NAME: &str = "unknown";

/// File name of the default private key inside the machine directory.
pub const DEFAULT_SSH_KEY_FILE: &str = "id_rsa";
/// Directory under the store root that holds one directory per machine.
pub const MACHINES_DIR: &str = "machines";

const SWARM_MASTER_OPTION: &str = "swarm-master";
const SWARM_HOST_OPTION: &str = "swarm-host";
const SWARM_DISCOVERY_OPTION: &str = "swarm-discovery";
const MAX_ATTEMPTS_OPTION: &str = "max-attempts";
const ENGINE_INSTALL_URL_OPTION: &str = "engine-install-url";

/// Attribute storage composed into every backend.
///
/// Zero values mean "unset": accessors fill them with the defaults above on
/// first use and never touch a field that already holds a value.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct BaseDriver {
    /// Address recorded by the backend, empty until known.
    #[serde(rename = "IPAddress")]
    pub ip_address: String,
    /// Machine name; also the directory name under the store root.
    pub machine_name: String,
    /// SSH login user.
    #[serde(rename = "SSHUser")]
    pub ssh_user: String,
    /// SSH port.
    #[serde(rename = "SSHPort")]
    pub ssh_port: u16,
    /// Private key used for SSH.
    #[serde(rename = "SSHKeyPath")]
    pub ssh_key_path: Utf8PathBuf,
    /// Store root.
    pub store_path: Utf8PathBuf,
    /// Whether the machine is a swarm master.
    pub swarm_master: bool,
    /// Swarm host address.
    pub swarm_host: String,
    /// Swarm discovery token.
    pub swarm_discovery: String,
    /// Poll budget used while waiting for the machine to run.
    pub max_attempt: u32,
}

impl BaseDriver {
    /// Creates a driver base for `machine_name` stored under `store_path`.
    #[must_use]
    pub fn new(machine_name: impl Into<String>, store_path: impl Into<Utf8PathBuf>) -> Self {
        Self {
            machine_name: machine_name.into(),
            store_path: store_path.into(),
            ..Self::default()
        }
    }

    /// Returns [`UNKNOWN_DRIVER_NAME`]; backends report their own name.
    #[must_use]
    pub const fn driver_name(&self) -> &'static str {
        UNKNOWN_DRIVER_NAME
    }

    /// Returns the machine name.
    #[must_use]
    pub fn machine_name(&self) -> &str {
        &self.machine_name
    }

    /// Returns the poll budget, defaulting it to [`DEFAULT_MAX_ATTEMPT`].
    pub const fn max_attempt(&mut self) -> u32 {
        if self.max_attempt == 0 {
            self.max_attempt = DEFAULT_MAX_ATTEMPT;
        }
        self.max_attempt
    }

    /// Returns the recorded address.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::AddressNotSet`] when no address is recorded.
    pub fn ip(&self) -> Result<String, DriverError> {
        if self.ip_address.is_empty() {
            return Err(DriverError::AddressNotSet);
        }
        Ok(self.ip_address.clone())
    }

    /// Returns the SSH key path, defaulting it to `<store>/machines/<name>/id_rsa`.
    pub fn ssh_key_path(&mut self) -> Utf8PathBuf {
        if self.ssh_key_path.as_str().is_empty() {
            self.ssh_key_path = self.resolve_store_path(DEFAULT_SSH_KEY_FILE);
        }
        self.ssh_key_path.clone()
    }

    /// Returns the SSH port, defaulting it to [`DEFAULT_SSH_PORT`].
    ///
    /// # Errors
    ///
    /// Never fails; the `Result` mirrors [`crate::Driver::ssh_port`].
    pub const fn ssh_port(&mut self) -> Result<u16, DriverError> {
        if self.ssh_port == 0 {
            self.ssh_port = DEFAULT_SSH_PORT;
        }
        Ok(self.ssh_port)
    }

    /// Returns the SSH user, defaulting it to [`DEFAULT_SSH_USER`].
    pub fn ssh_username(&mut self) -> String {
        if self.ssh_user.is_empty() {
            DEFAULT_SSH_USER.clone_into(&mut self.ssh_user);
        }
        self.ssh_user.clone()
    }

    /// Pre-create hook; nothing to check for the shared attributes.
    ///
    /// # Errors
    ///
    /// Never fails.
    pub const fn pre_create_check(&self) -> Result<(), DriverError> {
        Ok(())
    }

    /// Joins `file` onto this machine's store directory.
    #[must_use]
    pub fn resolve_store_path(&self, file: &str) -> Utf8PathBuf {
        self.store_path
            .join(MACHINES_DIR)
            .join(&self.machine_name)
            .join(file)
    }

    /// Overwrites the swarm and retry fields from `options`.
    ///
    /// Unlike the accessors this is explicit reconfiguration: absent options
    /// reset their field to the zero value.
    pub fn set_extra_config_from_options(&mut self, options: &dyn DriverOptions) {
        self.swarm_master = options.bool(SWARM_MASTER_OPTION);
        self.swarm_host = options.string(SWARM_HOST_OPTION);
        self.swarm_discovery = options.string(SWARM_DISCOVERY_OPTION);
        self.max_attempt = u32::try_from(options.int(MAX_ATTEMPTS_OPTION)).unwrap_or(0);
    }
}

/// Returns `true` when the caller overrode the engine install script URL
/// with something other than [`DEFAULT_ENGINE_INSTALL_URL`].
#[must_use]
pub fn engine_install_url_flag_set(options: &dyn DriverOptions) -> bool {
    let url = options.string(ENGINE_INSTALL_URL_OPTION);
    !url.is_empty() && url != DEFAULT_ENGINE_INSTALL_URL
}

/// Checks that `name` is usable both as a host name and as a store
/// directory.
///
/// # Errors
///
/// Returns [`DriverError::InvalidMachineName`] for empty names, names that
/// start with something other than an ASCII letter or digit, or names
/// containing characters outside `[A-Za-z0-9.-]`.
pub fn validate_machine_name(name: &str) -> Result<(), DriverError> {
    let mut chars = name.chars();
    let valid = chars.next().is_some_and(|first| first.is_ascii_alphanumeric())
        && chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '.');
    if valid {
        Ok(())
    } else {
        Err(DriverError::InvalidMachineName(name.to_owned()))
    }
}

/// Returns the directory holding `machine_name` under `store_path`.
#[must_use]
pub fn machine_dir(store_path: &Utf8Path, machine_name: &str) -> Utf8PathBuf {
    store_path.join(MACHINES_DIR).join(machine_name)
}
