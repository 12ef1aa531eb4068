use anyhow::Result;
use clap::Parser;
use tracing_subscriber::filter::EnvFilter;

mod apply_cmd;
mod cli;
mod compile_cmd;
mod interfaces_cmd;
mod network_cmd;
mod path_guard;
mod verify_cmd;
mod watch_cmd;

use cli::{Cli, Command};

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Compile(args) => compile_cmd::run_compile(args),
        Command::Verify(args) => verify_cmd::run_verify(args),
        Command::Apply(args) => apply_cmd::run_apply(args),
        Command::Watch(args) => watch_cmd::run_watch(args),
        Command::Network(cmd) => network_cmd::run_network(cmd),
        Command::Forward(cmd) => network_cmd::run_forward(cmd),
        Command::Reservation(cmd) => network_cmd::run_reservation(cmd),
        Command::Interfaces(args) => interfaces_cmd::run_interfaces(args),
    }
}

fn init_logging(verbose: bool) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "warn" }));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Runtime for the commands that drive external processes.
pub(crate) fn runtime() -> Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?)
}
