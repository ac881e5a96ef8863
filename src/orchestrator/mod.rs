//! Drives machines through their lifecycle.
//!
//! Creation runs pre-create check → create → poll until running → SSH check
//! → provisioner hand-off. Only the poll and the SSH check retry; every other
//! failure is surfaced as-is. One orchestrator can drive many machines at
//! once, but never two operations on the same machine.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tracing::{debug, info};

use crate::base::validate_machine_name;
use crate::config::HostwrightConfig;
use crate::driver::{Driver, DriverError, MachineState, Operation};
use crate::provision::{ConnectionDescriptor, Provisioner};
use crate::registry::{DriverRecord, DriverRegistry};
use crate::ssh::{SshCheck, SshWaitError};
use crate::store::{MachineStore, StoreError};

mod cancel;
mod error;
mod wait;

pub use cancel::{CancelHandle, CancelSignal};
pub use error::{ErrorKind, LifecycleError};
pub use wait::{LifecycleState, WaitOutcome};

const POLL_INTERVAL: Duration = Duration::from_secs(1);
const SSH_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Result of a successful create.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CreateOutcome {
    /// How the wait for `Running` went.
    pub wait: WaitOutcome,
    /// Connection details handed to the provisioner.
    pub connection: ConnectionDescriptor,
}

/// Runs lifecycle operations against drivers and persists them to the
/// machine store.
#[derive(Debug)]
pub struct LifecycleOrchestrator<P> {
    store: MachineStore,
    provisioner: P,
    poll_interval: Duration,
    ssh_check: Option<SshCheck>,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl<P> LifecycleOrchestrator<P> {
    /// Creates an orchestrator with a one second poll interval and the SSH
    /// check enabled.
    #[must_use]
    pub fn new(store: MachineStore, provisioner: P) -> Self {
        Self {
            store,
            provisioner,
            poll_interval: POLL_INTERVAL,
            ssh_check: Some(SshCheck {
                connect_timeout: SSH_CONNECT_TIMEOUT,
                interval: POLL_INTERVAL,
            }),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Creates an orchestrator whose store and timings come from `config`.
    #[must_use]
    pub fn from_config(config: &HostwrightConfig, provisioner: P) -> Self {
        Self::new(MachineStore::new(config.store_root()), provisioner)
            .with_poll_interval(config.poll_interval())
            .with_ssh_check(Some(SshCheck {
                connect_timeout: config.ssh_connect_timeout(),
                interval: config.poll_interval(),
            }))
    }

    /// Overrides the delay between state polls.
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Replaces the SSH check; `None` hands off as soon as the machine runs.
    #[must_use]
    pub const fn with_ssh_check(mut self, check: Option<SshCheck>) -> Self {
        self.ssh_check = check;
        self
    }

    /// Returns the machine store.
    #[must_use]
    pub const fn store(&self) -> &MachineStore {
        &self.store
    }

    /// Returns the provisioner that receives ready machines.
    #[must_use]
    pub const fn provisioner(&self) -> &P {
        &self.provisioner
    }

    /// Rebuilds the driver of an existing machine from the store.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Store`] when the record is missing or
    /// unreadable and [`LifecycleError::Registry`] when it cannot be decoded.
    pub fn load(
        &self,
        registry: &DriverRegistry,
        machine: &str,
    ) -> Result<Box<dyn Driver>, LifecycleError> {
        let record = self
            .store
            .load(machine)
            .map_err(|source| store_error(machine, source))?;
        registry
            .restore(record)
            .map_err(|source| LifecycleError::Registry {
                machine: machine.to_owned(),
                source,
            })
    }

    /// Queries the current power state once.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Backend`] when the query fails.
    pub async fn state(&self, driver: &mut dyn Driver) -> Result<MachineState, LifecycleError> {
        driver
            .state()
            .await
            .map_err(|source| backend_error(driver.machine_name(), Operation::GetState, source))
    }

    /// Powers the machine on and waits until it runs.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Busy`] or [`LifecycleError::Backend`], then
    /// [`LifecycleError::Timeout`] or [`LifecycleError::Cancelled`] from the
    /// wait.
    pub async fn start(
        &self,
        driver: &mut dyn Driver,
        cancel: &CancelSignal,
    ) -> Result<WaitOutcome, LifecycleError> {
        let _claim = self.claim(driver.machine_name())?;
        Self::run_verb(driver, Operation::Start).await?;
        let outcome = self.wait_for_running(driver, cancel).await?;
        self.persist(driver)?;
        Ok(outcome)
    }

    /// Reboots the machine and waits until it runs again.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Busy`] or [`LifecycleError::Backend`], then
    /// [`LifecycleError::Timeout`] or [`LifecycleError::Cancelled`] from the
    /// wait.
    pub async fn restart(
        &self,
        driver: &mut dyn Driver,
        cancel: &CancelSignal,
    ) -> Result<WaitOutcome, LifecycleError> {
        let _claim = self.claim(driver.machine_name())?;
        Self::run_verb(driver, Operation::Restart).await?;
        let outcome = self.wait_for_running(driver, cancel).await?;
        self.persist(driver)?;
        Ok(outcome)
    }

    /// Looks up the address of the machine.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Configuration`] when no address is known and
    /// [`LifecycleError::Backend`] when the backend lookup fails.
    pub async fn ip(&self, driver: &mut dyn Driver) -> Result<String, LifecycleError> {
        let result = driver.ip().await;
        result.map_err(|source| address_error(driver.machine_name(), source))
    }

    /// Powers the machine off gracefully.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Busy`] or [`LifecycleError::Backend`].
    pub async fn stop(&self, driver: &mut dyn Driver) -> Result<(), LifecycleError> {
        let _claim = self.claim(driver.machine_name())?;
        Self::run_verb(driver, Operation::Stop).await
    }

    /// Powers the machine off forcibly.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Busy`] or [`LifecycleError::Backend`].
    pub async fn kill(&self, driver: &mut dyn Driver) -> Result<(), LifecycleError> {
        let _claim = self.claim(driver.machine_name())?;
        Self::run_verb(driver, Operation::Kill).await
    }

    /// Deletes the machine, then its store directory.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Busy`], [`LifecycleError::Backend`] when the
    /// backend refuses (the store is left intact), or
    /// [`LifecycleError::Store`] when the directory cannot be deleted.
    pub async fn remove(&self, driver: &mut dyn Driver) -> Result<(), LifecycleError> {
        let machine = driver.machine_name().to_owned();
        let _claim = self.claim(&machine)?;
        Self::run_verb(driver, Operation::Remove).await?;
        match self.store.remove(&machine) {
            Ok(()) | Err(StoreError::NotFound { .. }) => {
                info!(machine = %machine, "machine removed");
                Ok(())
            }
            Err(source) => Err(store_error(&machine, source)),
        }
    }

    async fn run_verb(driver: &mut dyn Driver, operation: Operation) -> Result<(), LifecycleError> {
        debug!(machine = %driver.machine_name(), %operation, "running lifecycle verb");
        let result = match operation {
            Operation::Create => driver.create().await,
            Operation::Start => driver.start().await,
            Operation::Stop => driver.stop().await,
            Operation::Restart => driver.restart().await,
            Operation::Kill => driver.kill().await,
            Operation::Remove => driver.remove().await,
            Operation::PreCreateCheck => driver.pre_create_check().await,
            Operation::GetState => driver.state().await.map(|_| ()),
            Operation::GetIp => driver.ip().await.map(|_| ()),
        };
        result.map_err(|source| backend_error(driver.machine_name(), operation, source))
    }

    fn claim(&self, machine: &str) -> Result<InFlight, LifecycleError> {
        let mut in_flight = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if !in_flight.insert(machine.to_owned()) {
            return Err(LifecycleError::Busy {
                machine: machine.to_owned(),
            });
        }
        Ok(InFlight {
            set: Arc::clone(&self.in_flight),
            machine: machine.to_owned(),
        })
    }

    fn persist(&self, driver: &dyn Driver) -> Result<(), LifecycleError> {
        let machine = driver.machine_name();
        let record = DriverRecord::capture(driver).map_err(|source| {
            LifecycleError::Configuration {
                machine: machine.to_owned(),
                source,
            }
        })?;
        let path = self
            .store
            .save(machine, &record)
            .map_err(|source| store_error(machine, source))?;
        debug!(machine, path = %path, "saved machine record");
        Ok(())
    }
}

impl<P: Provisioner> LifecycleOrchestrator<P> {
    /// Creates a machine and drives it to running, reachable, and
    /// provisioned.
    ///
    /// The record is saved as soon as the backend has created the machine,
    /// so a machine that later fails to come up can still be removed.
    ///
    /// # Errors
    ///
    /// - [`LifecycleError::Configuration`] for an invalid name or address.
    /// - [`LifecycleError::Busy`] or [`LifecycleError::AlreadyExists`] when
    ///   the name is taken.
    /// - [`LifecycleError::Validation`] when the pre-create check fails;
    ///   create is not attempted.
    /// - [`LifecycleError::Backend`] when create fails.
    /// - [`LifecycleError::Timeout`], [`LifecycleError::SshUnreachable`], or
    ///   [`LifecycleError::Cancelled`] from the waits.
    /// - [`LifecycleError::Provision`] when the provisioner fails.
    pub async fn create(
        &self,
        driver: &mut dyn Driver,
        cancel: &CancelSignal,
    ) -> Result<CreateOutcome, LifecycleError> {
        let machine = driver.machine_name().to_owned();
        validate_machine_name(&machine).map_err(|source| LifecycleError::Configuration {
            machine: machine.clone(),
            source,
        })?;
        let _claim = self.claim(&machine)?;
        if self
            .store
            .exists(&machine)
            .map_err(|source| store_error(&machine, source))?
        {
            return Err(LifecycleError::AlreadyExists { machine });
        }

        driver
            .pre_create_check()
            .await
            .map_err(|source| LifecycleError::Validation {
                machine: machine.clone(),
                source,
            })?;

        info!(machine = %machine, driver = driver.driver_name(), "creating machine");
        Self::run_verb(driver, Operation::Create).await?;
        self.persist(driver)?;

        let wait = self.wait_for_running(driver, cancel).await?;
        let connection = connection_descriptor(driver).await?;
        if driver.reachable_over_ssh() {
            self.wait_for_ssh(&connection, driver.max_attempt(), cancel)
                .await?;
        } else {
            debug!(machine = %machine, "driver does not manage SSH; skipping SSH check");
        }

        self.provisioner
            .provision(&connection)
            .await
            .map_err(|source| LifecycleError::Provision {
                machine: machine.clone(),
                source,
            })?;
        self.persist(driver)?;
        info!(machine = %machine, address = %connection.address, "machine provisioned");

        Ok(CreateOutcome { wait, connection })
    }

    async fn wait_for_ssh(
        &self,
        connection: &ConnectionDescriptor,
        max_attempts: u32,
        cancel: &CancelSignal,
    ) -> Result<(), LifecycleError> {
        let Some(check) = self.ssh_check else {
            return Ok(());
        };
        match check.wait(connection, max_attempts, cancel).await {
            Ok(attempt) => {
                debug!(machine = %connection.machine_name, attempt, "SSH port reachable");
                Ok(())
            }
            Err(SshWaitError::Unreachable { attempts }) => Err(LifecycleError::SshUnreachable {
                machine: connection.machine_name.clone(),
                port: connection.ssh_port,
                attempts,
                max_attempts,
            }),
            Err(SshWaitError::Cancelled { attempts }) => Err(LifecycleError::Cancelled {
                machine: connection.machine_name.clone(),
                attempts,
            }),
        }
    }
}

/// Collects the SSH access parameters of a running machine.
async fn connection_descriptor(
    driver: &mut dyn Driver,
) -> Result<ConnectionDescriptor, LifecycleError> {
    let machine = driver.machine_name().to_owned();
    let address = driver
        .ip()
        .await
        .map_err(|source| address_error(&machine, source))?;
    let ssh_port = driver
        .ssh_port()
        .map_err(|source| LifecycleError::Configuration {
            machine: machine.clone(),
            source,
        })?;
    Ok(ConnectionDescriptor {
        machine_name: machine.clone(),
        address,
        ssh_port,
        ssh_user: driver.ssh_username(),
        ssh_key_path: driver.ssh_key_path(),
    })
}

/// A missing or malformed address is a configuration problem; anything else
/// came from the backend lookup.
fn address_error(machine: &str, source: DriverError) -> LifecycleError {
    match source {
        DriverError::AddressNotSet | DriverError::InvalidOption { .. } => {
            LifecycleError::Configuration {
                machine: machine.to_owned(),
                source,
            }
        }
        other => backend_error(machine, Operation::GetIp, other),
    }
}

fn backend_error(machine: &str, operation: Operation, source: DriverError) -> LifecycleError {
    LifecycleError::Backend {
        machine: machine.to_owned(),
        operation,
        source,
    }
}

fn store_error(machine: &str, source: StoreError) -> LifecycleError {
    LifecycleError::Store {
        machine: machine.to_owned(),
        source,
    }
}

/// Marks a machine as busy until dropped.
struct InFlight {
    set: Arc<Mutex<HashSet<String>>>,
    machine: String,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.set
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.machine);
    }
}
