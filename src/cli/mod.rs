//! Command-line interface definitions for the `hostwright` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page.

use clap::{Args, Parser};

/// Top-level CLI for the `hostwright` binary.
#[derive(Debug, Parser)]
#[command(
    name = "hostwright",
    about = "Create and manage container hosts through pluggable machine drivers",
    arg_required_else_help = true
)]
pub(crate) enum Cli {
    /// Create a machine and wait until it is running and reachable.
    #[command(name = "create")]
    Create(CreateCommand),
    /// Print the power state of a machine.
    #[command(name = "state")]
    State(MachineArg),
    /// Start a machine and wait until it is running.
    #[command(name = "start")]
    Start(WaitingMachineArg),
    /// Stop a machine gracefully.
    #[command(name = "stop")]
    Stop(MachineArg),
    /// Restart a machine and wait until it is running.
    #[command(name = "restart")]
    Restart(WaitingMachineArg),
    /// Power a machine off forcibly.
    #[command(name = "kill")]
    Kill(MachineArg),
    /// Remove a machine and its local record.
    #[command(name = "rm")]
    Remove(MachineArg),
    /// Print the address of a machine.
    #[command(name = "ip")]
    Ip(MachineArg),
    /// List stored machines.
    #[command(name = "ls")]
    List,
    /// List available drivers.
    #[command(name = "drivers")]
    Drivers,
}

/// Arguments for `hostwright create`.
#[derive(Debug, Args)]
pub(crate) struct CreateCommand {
    /// Machine name; letters, digits, '-' and '.'.
    pub(crate) name: String,
    /// Driver that creates the machine.
    #[arg(long, short = 'd', default_value = "none", value_name = "DRIVER")]
    pub(crate) driver: String,
    /// Engine URL of an existing host (none driver).
    #[arg(long, value_name = "URL")]
    pub(crate) url: Option<String>,
    /// Configure the machine as a swarm master.
    #[arg(long)]
    pub(crate) swarm_master: bool,
    /// Swarm host address.
    #[arg(long, value_name = "ADDR")]
    pub(crate) swarm_host: Option<String>,
    /// Swarm discovery token.
    #[arg(long, value_name = "TOKEN")]
    pub(crate) swarm_discovery: Option<String>,
    /// State polls allowed while waiting for the machine to run [default: 60].
    #[arg(long, value_name = "N")]
    pub(crate) max_attempts: Option<i64>,
    /// Script used to install the container engine [default: https://get.docker.com].
    #[arg(long, value_name = "URL")]
    pub(crate) engine_install_url: Option<String>,
}

/// Machine selector shared by single-machine subcommands.
#[derive(Debug, Args)]
pub(crate) struct MachineArg {
    /// Machine name.
    pub(crate) name: String,
}

/// Machine selector for verbs that wait for the machine to run.
#[derive(Debug, Args)]
pub(crate) struct WaitingMachineArg {
    /// Machine name.
    pub(crate) name: String,
    /// State polls allowed while waiting; defaults to the stored budget.
    #[arg(long = "max-attempts", value_name = "N")]
    pub(crate) max_attempts: Option<u32>,
}
