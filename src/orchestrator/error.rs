//! Errors surfaced by lifecycle operations.

use thiserror::Error;

use crate::driver::{DriverError, Operation};
use crate::provision::ProvisionError;
use crate::registry::RegistryError;
use crate::store::StoreError;

/// Coarse classification of a [`LifecycleError`].
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ErrorKind {
    /// Missing or invalid driver configuration, such as an unset address.
    Configuration,
    /// The pre-create check rejected the machine.
    Validation,
    /// A backend call failed.
    Backend,
    /// The attempt budget ran out.
    Timeout,
    /// The caller cancelled.
    Cancelled,
    /// Another operation or an existing machine holds the name.
    Conflict,
    /// The machine store could not be read or written.
    Store,
    /// The provisioner failed after the machine was reachable.
    Provision,
}

/// Errors raised by [`super::LifecycleOrchestrator`]. Every variant names
/// the machine it concerns.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// Raised when the driver is misconfigured.
    #[error("machine {machine}: {source}")]
    Configuration {
        /// Machine name.
        machine: String,
        /// Underlying driver error.
        #[source]
        source: DriverError,
    },
    /// Raised when the pre-create check fails. Never retried.
    #[error("machine {machine}: {source}")]
    Validation {
        /// Machine name.
        machine: String,
        /// Error returned by the check.
        #[source]
        source: DriverError,
    },
    /// Raised when a lifecycle verb fails. Never retried.
    #[error("machine {machine}: {operation} failed: {source}")]
    Backend {
        /// Machine name.
        machine: String,
        /// Verb that failed.
        operation: Operation,
        /// Error returned by the backend.
        #[source]
        source: DriverError,
    },
    /// Raised when the machine is not running once the budget is spent.
    #[error(
        "machine {machine} was not running after {attempts} state polls \
         (max attempts {max_attempts}); raise --max-attempts to wait longer"
    )]
    Timeout {
        /// Machine name.
        machine: String,
        /// Polls made.
        attempts: u32,
        /// Configured attempt budget.
        max_attempts: u32,
    },
    /// Raised when the machine runs but its SSH port never accepts a
    /// connection.
    #[error(
        "machine {machine}: SSH port {port} unreachable after {attempts} attempts \
         (max attempts {max_attempts})"
    )]
    SshUnreachable {
        /// Machine name.
        machine: String,
        /// SSH port checked.
        port: u16,
        /// Connection attempts made.
        attempts: u32,
        /// Configured attempt budget.
        max_attempts: u32,
    },
    /// Raised when the caller cancels between attempts.
    #[error("machine {machine}: cancelled after {attempts} attempts")]
    Cancelled {
        /// Machine name.
        machine: String,
        /// Attempts made before cancellation.
        attempts: u32,
    },
    /// Raised when create targets a name the store already holds.
    #[error("machine {machine} already exists")]
    AlreadyExists {
        /// Machine name.
        machine: String,
    },
    /// Raised when another lifecycle operation on the machine is in flight.
    #[error("machine {machine} is busy with another lifecycle operation")]
    Busy {
        /// Machine name.
        machine: String,
    },
    /// Raised when the machine store fails.
    #[error("machine {machine}: {source}")]
    Store {
        /// Machine name.
        machine: String,
        /// Underlying store error.
        #[source]
        source: StoreError,
    },
    /// Raised when a stored driver cannot be rebuilt.
    #[error("machine {machine}: {source}")]
    Registry {
        /// Machine name.
        machine: String,
        /// Underlying registry error.
        #[source]
        source: RegistryError,
    },
    /// Raised when provisioning fails.
    #[error("machine {machine}: provisioning failed: {source}")]
    Provision {
        /// Machine name.
        machine: String,
        /// Error returned by the provisioner.
        #[source]
        source: ProvisionError,
    },
}

impl LifecycleError {
    /// Classifies the error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration { .. } | Self::Registry { .. } => ErrorKind::Configuration,
            Self::Validation { .. } => ErrorKind::Validation,
            Self::Backend { .. } => ErrorKind::Backend,
            Self::Timeout { .. } | Self::SshUnreachable { .. } => ErrorKind::Timeout,
            Self::Cancelled { .. } => ErrorKind::Cancelled,
            Self::AlreadyExists { .. } | Self::Busy { .. } => ErrorKind::Conflict,
            Self::Store { .. } => ErrorKind::Store,
            Self::Provision { .. } => ErrorKind::Provision,
        }
    }

    /// Name of the machine the error concerns.
    #[must_use]
    pub fn machine(&self) -> &str {
        match self {
            Self::Configuration { machine, .. }
            | Self::Validation { machine, .. }
            | Self::Backend { machine, .. }
            | Self::Timeout { machine, .. }
            | Self::SshUnreachable { machine, .. }
            | Self::Cancelled { machine, .. }
            | Self::AlreadyExists { machine }
            | Self::Busy { machine }
            | Self::Store { machine, .. }
            | Self::Registry { machine, .. }
            | Self::Provision { machine, .. } => machine,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_message_names_machine_and_budget() {
        let err = LifecycleError::Timeout {
            machine: String::from("m1"),
            attempts: 5,
            max_attempts: 5,
        };
        let message = err.to_string();

        assert!(message.contains("m1"), "{message}");
        assert!(message.contains("max attempts 5"), "{message}");
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert_eq!(err.machine(), "m1");
    }

    #[test]
    fn backend_message_names_operation() {
        let err = LifecycleError::Backend {
            machine: String::from("m1"),
            operation: Operation::Create,
            source: DriverError::backend("quota exceeded"),
        };
        assert_eq!(
            err.to_string(),
            "machine m1: create failed: backend error: quota exceeded"
        );
        assert_eq!(err.kind(), ErrorKind::Backend);
    }
}
