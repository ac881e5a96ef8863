//! Binary entry point for the hostwright CLI.

mod cli;

use std::io::{self, Write};
use std::process;

use clap::Parser;
use thiserror::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;

use hostwright::{
    CancelSignal, ConfigError, Driver, DriverRegistry, EngineInstallSource, HostwrightConfig,
    LifecycleError, LifecycleOrchestrator, LogProvisioner, MachineStore, OptionMap,
    RegistryError, StoreError,
};

use cli::{Cli, CreateCommand, MachineArg, WaitingMachineArg};

const LOG_ENV: &str = "HOSTWRIGHT_LOG";
const DEFAULT_LOG_FILTER: &str = "info";

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    #[error("failed to write output: {0}")]
    Output(#[from] io::Error),
}

type Orchestrator = LifecycleOrchestrator<LogProvisioner>;

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();
    let exit_code = match dispatch(cli).await {
        Ok(()) => 0,
        Err(err) => {
            report_error(&err);
            1
        }
    };

    process::exit(exit_code);
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

async fn dispatch(cli: Cli) -> Result<(), CliError> {
    let config = HostwrightConfig::load_without_cli_args()?;
    let registry = DriverRegistry::with_builtin_drivers();

    match cli {
        Cli::Create(command) => create(&config, &registry, &command).await,
        Cli::State(machine) => {
            let (orchestrator, mut driver) = load(&config, &registry, &machine)?;
            let state = orchestrator.state(&mut *driver).await?;
            write_line(&state.to_string())
        }
        Cli::Start(machine) => {
            let (orchestrator, mut driver) = load_waiting(&config, &registry, &machine)?;
            orchestrator.start(&mut *driver, &cancel_on_ctrl_c()).await?;
            write_line(&format!("{} is running", machine.name))
        }
        Cli::Stop(machine) => {
            let (orchestrator, mut driver) = load(&config, &registry, &machine)?;
            orchestrator.stop(&mut *driver).await?;
            write_line(&format!("{} stopped", machine.name))
        }
        Cli::Restart(machine) => {
            let (orchestrator, mut driver) = load_waiting(&config, &registry, &machine)?;
            orchestrator.restart(&mut *driver, &cancel_on_ctrl_c()).await?;
            write_line(&format!("{} is running", machine.name))
        }
        Cli::Kill(machine) => {
            let (orchestrator, mut driver) = load(&config, &registry, &machine)?;
            orchestrator.kill(&mut *driver).await?;
            write_line(&format!("{} killed", machine.name))
        }
        Cli::Remove(machine) => {
            let (orchestrator, mut driver) = load(&config, &registry, &machine)?;
            orchestrator.remove(&mut *driver).await?;
            write_line(&format!("{} removed", machine.name))
        }
        Cli::Ip(machine) => {
            let (orchestrator, mut driver) = load(&config, &registry, &machine)?;
            let address = orchestrator.ip(&mut *driver).await?;
            write_line(&address)
        }
        Cli::List => {
            for name in MachineStore::new(config.store_root()).list()? {
                write_line(&name)?;
            }
            Ok(())
        }
        Cli::Drivers => {
            for name in registry.names() {
                write_line(name)?;
            }
            Ok(())
        }
    }
}

async fn create(
    config: &HostwrightConfig,
    registry: &DriverRegistry,
    command: &CreateCommand,
) -> Result<(), CliError> {
    let options = driver_options(command);
    let mut driver = registry.build(
        &command.driver,
        &command.name,
        &config.store_root(),
        &options,
    )?;
    let orchestrator = LifecycleOrchestrator::from_config(
        config,
        LogProvisioner::new(EngineInstallSource::from_options(&options)),
    );

    let outcome = orchestrator
        .create(&mut *driver, &cancel_on_ctrl_c())
        .await?;
    write_line(&format!(
        "{} is running at {} after {} state polls",
        outcome.wait.machine_name, outcome.connection.address, outcome.wait.polls
    ))
}

/// Collects the create flags under the option keys drivers look up.
fn driver_options(command: &CreateCommand) -> OptionMap {
    let mut options = OptionMap::new().with("swarm-master", command.swarm_master);
    let strings = [
        ("url", &command.url),
        ("swarm-host", &command.swarm_host),
        ("swarm-discovery", &command.swarm_discovery),
        ("engine-install-url", &command.engine_install_url),
    ];
    for (key, value) in strings {
        if let Some(value_set) = value {
            options.insert(key, value_set.as_str());
        }
    }
    if let Some(max_attempts) = command.max_attempts {
        options.insert("max-attempts", max_attempts);
    }
    options
}

fn load(
    config: &HostwrightConfig,
    registry: &DriverRegistry,
    machine: &MachineArg,
) -> Result<(Orchestrator, Box<dyn Driver>), CliError> {
    let orchestrator = LifecycleOrchestrator::from_config(config, LogProvisioner::default());
    let driver = orchestrator.load(registry, &machine.name)?;
    Ok((orchestrator, driver))
}

fn load_waiting(
    config: &HostwrightConfig,
    registry: &DriverRegistry,
    machine: &WaitingMachineArg,
) -> Result<(Orchestrator, Box<dyn Driver>), CliError> {
    let orchestrator = LifecycleOrchestrator::from_config(config, LogProvisioner::default());
    let mut driver = orchestrator.load(registry, &machine.name)?;
    if let Some(max_attempts) = machine.max_attempts {
        driver.base_mut().max_attempt = max_attempts;
    }
    Ok((orchestrator, driver))
}

/// Returns a signal that fires on Ctrl-C. Polling stops after the backend
/// call in flight returns.
fn cancel_on_ctrl_c() -> CancelSignal {
    let (handle, signal) = CancelSignal::channel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received; stopping after the current attempt");
            handle.cancel();
        }
    });
    signal
}

fn write_line(line: &str) -> Result<(), CliError> {
    writeln!(io::stdout(), "{line}")?;
    Ok(())
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}

#[cfg(test)]
mod tests {
    use super::*;
    use hostwright::DriverOptions;

    fn create_command(args: &[&str]) -> CreateCommand {
        let argv = ["hostwright", "create"].into_iter().chain(args.iter().copied());
        match Cli::try_parse_from(argv) {
            Ok(Cli::Create(command)) => command,
            Ok(other) => panic!("expected create, got {other:?}"),
            Err(err) => panic!("parse failed: {err}"),
        }
    }

    #[test]
    fn driver_options_carry_create_flags() {
        let command = create_command(&[
            "m1",
            "--url",
            "tcp://10.0.0.5:2376",
            "--swarm-master",
            "--swarm-host",
            "tcp://0.0.0.0:3376",
            "--max-attempts",
            "5",
        ]);
        let options = driver_options(&command);

        assert_eq!(command.driver, "none");
        assert_eq!(options.string("url"), "tcp://10.0.0.5:2376");
        assert!(options.bool("swarm-master"));
        assert_eq!(options.string("swarm-host"), "tcp://0.0.0.0:3376");
        assert_eq!(options.string("swarm-discovery"), "");
        assert_eq!(options.int("max-attempts"), 5);
        assert_eq!(
            EngineInstallSource::from_options(&options),
            EngineInstallSource::Default
        );
    }

    #[test]
    fn engine_install_override_is_forwarded() {
        let command = create_command(&["m1", "--engine-install-url", "https://test.docker.com"]);
        let options = driver_options(&command);

        assert_eq!(
            EngineInstallSource::from_options(&options),
            EngineInstallSource::Custom(String::from("https://test.docker.com"))
        );
    }

    #[test]
    fn write_error_renders_message() {
        let err = CliError::Config(ConfigError::Invalid(String::from("bad")));
        let mut buffer = Vec::new();
        write_error(&mut buffer, &err);
        let rendered = String::from_utf8(buffer).unwrap_or_else(|utf8| panic!("utf8: {utf8}"));
        assert_eq!(rendered, "invalid configuration: bad\n");
    }
}
