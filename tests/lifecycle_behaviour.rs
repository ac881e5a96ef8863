//! End-to-end lifecycle tests against a scripted backend registered through
//! the public driver registry.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use hostwright::driver::ready;
use hostwright::{
    BaseDriver, CancelSignal, ConnectionDescriptor, Driver, DriverError, DriverFactory,
    DriverFuture, DriverOptions, DriverRegistry, ErrorKind, LifecycleError, LifecycleOrchestrator,
    MachineState, MachineStore, OptionMap, ProvisionError, Provisioner, provision::ProvisionFuture,
};
use rstest::{fixture, rstest};
use serde::{Deserialize, Serialize};
use tempfile::TempDir;

const DRIVER_NAME: &str = "scripted";

/// State answers shared between the test and every driver built for it.
#[derive(Clone, Debug, Default)]
struct Script {
    states: Arc<Mutex<VecDeque<MachineState>>>,
    polls: Arc<Mutex<u32>>,
}

impl Script {
    fn push(&self, states: &[MachineState]) {
        self.states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(states.iter().copied());
    }

    fn next(&self) -> MachineState {
        *self.polls.lock().unwrap_or_else(PoisonError::into_inner) += 1;
        self.states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or(MachineState::Stopped)
    }

    fn polls(&self) -> u32 {
        *self.polls.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
struct ScriptedDriver {
    #[serde(flatten)]
    base: BaseDriver,
    #[serde(default)]
    size: String,
    #[serde(skip)]
    script: Script,
}

impl Driver for ScriptedDriver {
    fn base(&self) -> &BaseDriver {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BaseDriver {
        &mut self.base
    }

    fn driver_name(&self) -> &str {
        DRIVER_NAME
    }

    fn set_config_from_options(&mut self, options: &dyn DriverOptions) -> Result<(), DriverError> {
        self.size = options.string("scripted-size");
        if self.size.is_empty() {
            return Err(DriverError::InvalidOption {
                key: String::from("scripted-size"),
                message: String::from("required"),
            });
        }
        self.base.ip_address = String::from("192.0.2.10");
        Ok(())
    }

    fn to_record(&self) -> Result<serde_json::Value, DriverError> {
        Ok(serde_json::to_value(self)?)
    }

    fn create(&mut self) -> DriverFuture<'_, ()> {
        ready(Ok(()))
    }

    fn state(&mut self) -> DriverFuture<'_, MachineState> {
        ready(Ok(self.script.next()))
    }

    fn start(&mut self) -> DriverFuture<'_, ()> {
        ready(Ok(()))
    }

    fn stop(&mut self) -> DriverFuture<'_, ()> {
        ready(Ok(()))
    }

    fn restart(&mut self) -> DriverFuture<'_, ()> {
        ready(Ok(()))
    }

    fn kill(&mut self) -> DriverFuture<'_, ()> {
        ready(Ok(()))
    }

    fn remove(&mut self) -> DriverFuture<'_, ()> {
        ready(Ok(()))
    }
}

struct ScriptedFactory {
    script: Script,
}

impl DriverFactory for ScriptedFactory {
    fn name(&self) -> &'static str {
        DRIVER_NAME
    }

    fn new_driver(&self, machine_name: &str, store_path: &Utf8Path) -> Box<dyn Driver> {
        Box::new(ScriptedDriver {
            base: BaseDriver::new(machine_name, store_path),
            size: String::new(),
            script: self.script.clone(),
        })
    }

    fn restore(&self, record: serde_json::Value) -> Result<Box<dyn Driver>, DriverError> {
        let mut driver: ScriptedDriver = serde_json::from_value(record)?;
        driver.script = self.script.clone();
        Ok(Box::new(driver))
    }
}

#[derive(Debug, Default)]
struct CountingProvisioner {
    handoffs: Mutex<Vec<ConnectionDescriptor>>,
}

impl CountingProvisioner {
    fn handoffs(&self) -> Vec<ConnectionDescriptor> {
        self.handoffs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Provisioner for CountingProvisioner {
    fn provision<'a>(&'a self, connection: &'a ConnectionDescriptor) -> ProvisionFuture<'a> {
        Box::pin(async move {
            if connection.address.is_empty() {
                return Err(ProvisionError::new("no address"));
            }
            self.handoffs
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(connection.clone());
            Ok(())
        })
    }
}

struct World {
    _dir: TempDir,
    root: Utf8PathBuf,
    script: Script,
    registry: DriverRegistry,
    orchestrator: LifecycleOrchestrator<CountingProvisioner>,
}

#[fixture]
fn world() -> World {
    let dir = TempDir::new().unwrap_or_else(|err| panic!("temp dir: {err}"));
    let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf())
        .unwrap_or_else(|path| panic!("non UTF-8 temp dir: {}", path.display()));
    let script = Script::default();
    let mut registry = DriverRegistry::with_builtin_drivers();
    registry
        .register(ScriptedFactory {
            script: script.clone(),
        })
        .unwrap_or_else(|err| panic!("register: {err}"));
    let orchestrator = LifecycleOrchestrator::new(
        MachineStore::new(root.clone()),
        CountingProvisioner::default(),
    )
    .with_poll_interval(Duration::from_millis(1))
    .with_ssh_check(None);
    World {
        _dir: dir,
        root,
        script,
        registry,
        orchestrator,
    }
}

fn options(max_attempts: i64) -> OptionMap {
    OptionMap::new()
        .with("scripted-size", "small")
        .with("max-attempts", max_attempts)
        .with("swarm-master", true)
}

#[rstest]
#[tokio::test]
async fn machine_running_after_three_starting_polls(world: World) {
    world.script.push(&[
        MachineState::Starting,
        MachineState::Starting,
        MachineState::Starting,
        MachineState::Running,
    ]);
    let mut driver = world
        .registry
        .build(DRIVER_NAME, "m1", &world.root, &options(10))
        .unwrap_or_else(|err| panic!("build: {err}"));

    let outcome = world
        .orchestrator
        .create(&mut *driver, &CancelSignal::never())
        .await
        .unwrap_or_else(|err| panic!("create: {err}"));

    assert_eq!(outcome.wait.retries, 3);
    assert_eq!(outcome.wait.max_attempts, 10);
    assert_eq!(world.script.polls(), 4);
    assert_eq!(outcome.connection.address, "192.0.2.10");
    assert_eq!(outcome.connection.ssh_user, "root");
    assert_eq!(outcome.connection.ssh_port, 22);
    assert_eq!(
        world.orchestrator.provisioner().handoffs(),
        vec![outcome.connection]
    );
}

#[rstest]
#[tokio::test]
async fn machine_never_running_times_out(world: World) {
    let mut driver = world
        .registry
        .build(DRIVER_NAME, "m1", &world.root, &options(5))
        .unwrap_or_else(|err| panic!("build: {err}"));

    let err = world
        .orchestrator
        .create(&mut *driver, &CancelSignal::never())
        .await
        .expect_err("machine never runs");

    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert!(
        matches!(
            err,
            LifecycleError::Timeout {
                attempts: 5,
                max_attempts: 5,
                ..
            }
        ),
        "unexpected error: {err}"
    );
    assert_eq!(world.script.polls(), 5);
    assert!(world.orchestrator.provisioner().handoffs().is_empty());
}

#[rstest]
#[tokio::test]
async fn stored_machine_restarts_with_persisted_settings(world: World) {
    world.script.push(&[MachineState::Running]);
    let mut driver = world
        .registry
        .build(DRIVER_NAME, "m1", &world.root, &options(4))
        .unwrap_or_else(|err| panic!("build: {err}"));
    world
        .orchestrator
        .create(&mut *driver, &CancelSignal::never())
        .await
        .unwrap_or_else(|err| panic!("create: {err}"));

    let mut restored = world
        .orchestrator
        .load(&world.registry, "m1")
        .unwrap_or_else(|err| panic!("load: {err}"));
    assert_eq!(restored.driver_name(), DRIVER_NAME);
    assert!(restored.base().swarm_master);
    assert_eq!(restored.max_attempt(), 4);
    assert_eq!(
        restored.ssh_key_path(),
        world.root.join("machines").join("m1").join("id_rsa")
    );

    world
        .script
        .push(&[MachineState::Stopping, MachineState::Starting, MachineState::Running]);
    let outcome = world
        .orchestrator
        .restart(&mut *restored, &CancelSignal::never())
        .await
        .unwrap_or_else(|err| panic!("restart: {err}"));
    assert_eq!(outcome.retries, 2);
}

#[rstest]
fn missing_backend_option_is_reported_by_registry(world: World) {
    let err = world
        .registry
        .build(DRIVER_NAME, "m1", &world.root, &OptionMap::new())
        .expect_err("size is required");
    assert!(err.to_string().contains("scripted-size"), "{err}");
}
