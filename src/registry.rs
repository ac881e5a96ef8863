//! Maps driver names to factories so callers can select a backend by name.

use std::collections::BTreeMap;

use camino::Utf8Path;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::driver::{Driver, DriverError};
use crate::drivers::none::NoneDriverFactory;
use crate::options::DriverOptions;

/// Errors raised while resolving or building drivers.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum RegistryError {
    /// Raised when no factory is registered under the name.
    #[error("driver '{0}' is not registered")]
    UnknownDriver(String),
    /// Raised when a second factory claims an existing name.
    #[error("driver '{0}' is already registered")]
    DuplicateDriver(String),
    /// Raised when the factory or the driver rejects its configuration.
    #[error("failed to configure {driver} driver: {source}")]
    Driver {
        /// Driver name.
        driver: String,
        /// Underlying driver error.
        #[source]
        source: DriverError,
    },
}

/// Persisted form of a driver: its name plus its encoded state.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DriverRecord {
    /// Name of the factory that can decode `driver`.
    pub driver_name: String,
    /// Encoded driver state as produced by [`Driver::to_record`].
    pub driver: serde_json::Value,
}

impl DriverRecord {
    /// Captures the current state of `driver`.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Serialization`] when the driver cannot be
    /// encoded.
    pub fn capture(driver: &dyn Driver) -> Result<Self, DriverError> {
        Ok(Self {
            driver_name: driver.driver_name().to_owned(),
            driver: driver.to_record()?,
        })
    }
}

/// Builds drivers of one backend kind.
pub trait DriverFactory: Send + Sync {
    /// Name under which the factory registers.
    fn name(&self) -> &'static str;

    /// Builds an unconfigured driver for a new machine.
    fn new_driver(&self, machine_name: &str, store_path: &Utf8Path) -> Box<dyn Driver>;

    /// Rebuilds a driver from its persisted state.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Serialization`] when `record` does not decode.
    fn restore(&self, record: serde_json::Value) -> Result<Box<dyn Driver>, DriverError>;
}

/// Name-indexed collection of driver factories.
#[derive(Default)]
pub struct DriverRegistry {
    factories: BTreeMap<&'static str, Box<dyn DriverFactory>>,
}

impl std::fmt::Debug for DriverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverRegistry")
            .field("drivers", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl DriverRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding the drivers that ship with this crate.
    #[must_use]
    pub fn with_builtin_drivers() -> Self {
        let mut registry = Self::new();
        registry
            .factories
            .insert(NoneDriverFactory.name(), Box::new(NoneDriverFactory));
        registry
    }

    /// Registers `factory` under its name.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateDriver`] when the name is taken.
    pub fn register(&mut self, factory: impl DriverFactory + 'static) -> Result<(), RegistryError> {
        let name = factory.name();
        if self.factories.contains_key(name) {
            return Err(RegistryError::DuplicateDriver(name.to_owned()));
        }
        self.factories.insert(name, Box::new(factory));
        Ok(())
    }

    /// Lists registered driver names in lexical order.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.factories.keys().copied()
    }

    /// Builds and configures a driver for a new machine.
    ///
    /// Backend-specific options are applied first, then the shared swarm and
    /// retry options.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownDriver`] for unregistered names and
    /// [`RegistryError::Driver`] when the driver rejects `options`.
    pub fn build(
        &self,
        driver_name: &str,
        machine_name: &str,
        store_path: &Utf8Path,
        options: &dyn DriverOptions,
    ) -> Result<Box<dyn Driver>, RegistryError> {
        let factory = self.factory(driver_name)?;
        let mut driver = factory.new_driver(machine_name, store_path);
        driver
            .set_config_from_options(options)
            .map_err(|source| RegistryError::Driver {
                driver: driver_name.to_owned(),
                source,
            })?;
        driver.set_extra_config_from_options(options);
        debug!(driver = driver_name, machine = machine_name, "built driver");
        Ok(driver)
    }

    /// Rebuilds a driver from a persisted record.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownDriver`] when the record names an
    /// unregistered driver and [`RegistryError::Driver`] when decoding fails.
    pub fn restore(&self, record: DriverRecord) -> Result<Box<dyn Driver>, RegistryError> {
        let factory = self.factory(&record.driver_name)?;
        factory
            .restore(record.driver)
            .map_err(|source| RegistryError::Driver {
                driver: record.driver_name,
                source,
            })
    }

    fn factory(&self, driver_name: &str) -> Result<&dyn DriverFactory, RegistryError> {
        self.factories
            .get(driver_name)
            .map(|factory| &**factory)
            .ok_or_else(|| RegistryError::UnknownDriver(driver_name.to_owned()))
    }
}
