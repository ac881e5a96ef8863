//! Capability interface implemented by every machine backend.
//!
//! A backend embeds a [`BaseDriver`] and exposes it through
//! [`Driver::base`] and [`Driver::base_mut`]. The provided methods forward
//! to it, so a backend only implements what actually differs: provider
//! calls, state queries, and (where the address is discoverable) `ip`.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use camino::Utf8PathBuf;
use thiserror::Error;

use crate::base::BaseDriver;
use crate::options::DriverOptions;

/// Lifecycle verb or query issued against a driver.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Operation {
    /// Pre-creation validation hook.
    PreCreateCheck,
    /// Machine creation.
    Create,
    /// Power-state query.
    GetState,
    /// Address lookup.
    GetIp,
    /// Power on.
    Start,
    /// Graceful power off.
    Stop,
    /// Reboot.
    Restart,
    /// Forced power off.
    Kill,
    /// Deletion of the machine and its provider resources.
    Remove,
}

impl Operation {
    /// Returns the lower-case verb used in logs and error messages.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PreCreateCheck => "pre-create check",
            Self::Create => "create",
            Self::GetState => "get state",
            Self::GetIp => "get IP",
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Restart => "restart",
            Self::Kill => "kill",
            Self::Remove => "remove",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Power state reported by a backend.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum MachineState {
    /// The backend has no state for the machine.
    #[default]
    None,
    /// Powered on.
    Running,
    /// Suspended in memory.
    Paused,
    /// Suspended to disk.
    Saved,
    /// Powered off.
    Stopped,
    /// Shutting down.
    Stopping,
    /// Booting.
    Starting,
    /// The backend reports a fault.
    Error,
    /// The backend timed out answering.
    Timeout,
}

impl MachineState {
    /// Returns `true` for [`MachineState::Running`].
    #[must_use]
    pub const fn is_running(self) -> bool {
        matches!(self, Self::Running)
    }
}

impl fmt::Display for MachineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::None => "",
            Self::Running => "Running",
            Self::Paused => "Paused",
            Self::Saved => "Saved",
            Self::Stopped => "Stopped",
            Self::Stopping => "Stopping",
            Self::Starting => "Starting",
            Self::Error => "Error",
            Self::Timeout => "Timeout",
        };
        f.write_str(label)
    }
}

/// Errors raised by drivers.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum DriverError {
    /// Raised by `ip` when no address has been recorded or discovered.
    #[error("IP address is not set")]
    AddressNotSet,
    /// Raised when a machine name cannot be used as a host name or path
    /// segment.
    #[error("invalid machine name '{0}': use letters, digits, '-' and '.', starting with a letter or digit")]
    InvalidMachineName(String),
    /// Raised when a driver option is missing or malformed.
    #[error("invalid option --{key}: {message}")]
    InvalidOption {
        /// Option key as passed to [`DriverOptions`].
        key: String,
        /// Human-readable description of the problem.
        message: String,
    },
    /// Raised by pre-create checks (credentials, quota, image).
    #[error("pre-create check failed: {0}")]
    Validation(String),
    /// Raised when the backend does not implement a verb.
    #[error("the {driver} driver does not support {operation}")]
    Unsupported {
        /// Backend identifier.
        driver: String,
        /// Verb that was attempted.
        operation: Operation,
    },
    /// Opaque provider failure.
    #[error("backend error: {message}")]
    Backend {
        /// Message returned by the provider.
        message: String,
    },
    /// Raised when driver state cannot be encoded or decoded.
    #[error("driver serialisation failed: {0}")]
    Serialization(String),
}

impl DriverError {
    /// Wraps a provider message as [`DriverError::Backend`].
    #[must_use]
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for DriverError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization(value.to_string())
    }
}

/// Future returned by asynchronous driver operations.
pub type DriverFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, DriverError>> + Send + 'a>>;

/// Wraps an already computed result as a [`DriverFuture`].
pub fn ready<'a, T: Send + 'a>(result: Result<T, DriverError>) -> DriverFuture<'a, T> {
    Box::pin(async move { result })
}

/// Machine lifecycle capability set.
///
/// Accessors that lazily default their field take `&mut self`; a driver is
/// therefore owned by one lifecycle operation at a time.
pub trait Driver: fmt::Debug + Send {
    /// Shared attribute storage.
    fn base(&self) -> &BaseDriver;

    /// Mutable shared attribute storage.
    fn base_mut(&mut self) -> &mut BaseDriver;

    /// Backend identifier. Every backend overrides this; the inherited value
    /// is [`crate::base::UNKNOWN_DRIVER_NAME`].
    fn driver_name(&self) -> &str {
        self.base().driver_name()
    }

    /// Name of the machine this driver manages.
    fn machine_name(&self) -> &str {
        self.base().machine_name()
    }

    /// Number of state polls allowed while waiting for the machine to run.
    fn max_attempt(&mut self) -> u32 {
        self.base_mut().max_attempt()
    }

    /// Address used to reach the machine.
    ///
    /// Backends able to discover the address from the provider override this
    /// instead of relying on the stored value.
    fn ip(&mut self) -> DriverFuture<'_, String> {
        ready(self.base().ip())
    }

    /// Whether the orchestrator should wait for the SSH port before handing
    /// the machine to the provisioner. Backends for hosts that are not
    /// managed over SSH return `false`.
    fn reachable_over_ssh(&self) -> bool {
        true
    }

    /// Private key used for SSH.
    fn ssh_key_path(&mut self) -> Utf8PathBuf {
        self.base_mut().ssh_key_path()
    }

    /// SSH port.
    ///
    /// # Errors
    ///
    /// The inherited implementation never fails; backends that look the port
    /// up remotely may.
    fn ssh_port(&mut self) -> Result<u16, DriverError> {
        self.base_mut().ssh_port()
    }

    /// SSH login user.
    fn ssh_username(&mut self) -> String {
        self.base_mut().ssh_username()
    }

    /// Validates credentials, quotas, or images before anything is created.
    fn pre_create_check(&mut self) -> DriverFuture<'_, ()> {
        ready(self.base().pre_create_check())
    }

    /// Applies backend-specific options.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::InvalidOption`] when a required option is
    /// missing or malformed.
    fn set_config_from_options(&mut self, options: &dyn DriverOptions) -> Result<(), DriverError>;

    /// Applies the swarm and retry options every backend shares.
    fn set_extra_config_from_options(&mut self, options: &dyn DriverOptions) {
        self.base_mut().set_extra_config_from_options(options);
    }

    /// Encodes the driver for the machine store.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Serialization`] when encoding fails.
    fn to_record(&self) -> Result<serde_json::Value, DriverError>;

    /// Creates the machine.
    fn create(&mut self) -> DriverFuture<'_, ()>;

    /// Queries the current power state.
    fn state(&mut self) -> DriverFuture<'_, MachineState>;

    /// Powers the machine on.
    fn start(&mut self) -> DriverFuture<'_, ()>;

    /// Powers the machine off gracefully.
    fn stop(&mut self) -> DriverFuture<'_, ()>;

    /// Reboots the machine.
    fn restart(&mut self) -> DriverFuture<'_, ()>;

    /// Powers the machine off forcibly.
    fn kill(&mut self) -> DriverFuture<'_, ()>;

    /// Deletes the machine and its provider resources.
    fn remove(&mut self) -> DriverFuture<'_, ()>;
}
