//! Core library for the hostwright machine manager.
//!
//! The crate defines the capability contract every machine backend
//! implements ([`Driver`]), the shared attribute storage that gives backends
//! sensible defaults ([`BaseDriver`]), a name-keyed [`DriverRegistry`], and
//! the [`LifecycleOrchestrator`] that drives a machine from creation to a
//! running, reachable host (create → wait for running → wait for SSH →
//! provision).

pub mod base;
pub mod config;
pub mod driver;
pub mod drivers;
pub mod options;
pub mod orchestrator;
pub mod provision;
pub mod registry;
pub mod ssh;
pub mod store;

pub use base::{
    BaseDriver, DEFAULT_ENGINE_INSTALL_URL, DEFAULT_MAX_ATTEMPT, DEFAULT_SSH_PORT,
    DEFAULT_SSH_USER, engine_install_url_flag_set, validate_machine_name,
};
pub use config::{ConfigError, HostwrightConfig};
pub use driver::{Driver, DriverError, DriverFuture, MachineState, Operation};
pub use options::{DriverOptions, OptionMap, OptionValue};
pub use orchestrator::{
    CancelHandle, CancelSignal, CreateOutcome, ErrorKind, LifecycleError, LifecycleOrchestrator,
    LifecycleState, WaitOutcome,
};
pub use provision::{
    ConnectionDescriptor, EngineInstallSource, LogProvisioner, ProvisionError, Provisioner,
    engine_install_command,
};
pub use registry::{DriverFactory, DriverRecord, DriverRegistry, RegistryError};
pub use ssh::{SshCheck, SshWaitError};
pub use store::{MachineStore, StoreError};
