//! dark-mode-daemon: runs your scripts whenever the OS switches between
//! light and dark mode.
//!
//! # Usage
//!
//! ```text
//! dark-mode-daemon list [--verbose] [--resolve]
//! dark-mode-daemon daemon [--verbose]
//! dark-mode-daemon run <light|dark> [--verbose] [--json]
//! dark-mode-daemon current [--plain] [--watch]
//! dark-mode-daemon autostart setup [--binary-path <path>] [--force] | check | remove
//! dark-mode-daemon logs [--lines <n>] [--stderr-only]
//! ```

mod commands;

use std::process::ExitCode;

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};

use commands::{
    autostart::AutostartCommand, current::CurrentArgs, daemon::DaemonArgs, list::ListArgs,
    logs::LogsArgs, run::RunArgs,
};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "dark-mode-daemon",
    version,
    about = "Run scripts whenever the system switches between light and dark mode",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the executable scripts that would be run, one per line.
    List(ListArgs),

    /// Run scripts now and on every wake or appearance change.
    Daemon(DaemonArgs),

    /// Run every script once for the given mode.
    Run(RunArgs),

    /// Print the current system color mode.
    Current(CurrentArgs),

    /// Start the daemon automatically when you log in.
    Autostart {
        #[command(subcommand)]
        command: AutostartCommand,
    },

    /// Print recent daemon log lines.
    Logs(LogsArgs),
}

// ---------------------------------------------------------------------------
// Unknown command detection
// ---------------------------------------------------------------------------

/// The first argument, when it names neither a subcommand nor a help or
/// version flag.
fn unknown_command(args: &[String]) -> Option<&str> {
    let first = args.first()?;
    let known = Cli::command()
        .get_subcommands()
        .flat_map(|sub| {
            std::iter::once(sub.get_name().to_string())
                .chain(sub.get_all_aliases().map(str::to_string))
        })
        .chain(["help", "-h", "--help", "-V", "--version"].map(str::to_string))
        .any(|name| name == *first);
    (!known).then_some(first.as_str())
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<ExitCode> {
    let args: Vec<String> = std::env::args_os()
        .skip(1)
        .map(|arg| arg.to_string_lossy().into_owned())
        .collect();
    if let Some(command) = unknown_command(&args) {
        println!("Unknown command: {command}");
        return Ok(ExitCode::FAILURE);
    }

    let cli = Cli::parse();
    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        println!();
        return Ok(ExitCode::SUCCESS);
    };

    match command {
        Commands::List(args) => args.run()?,
        Commands::Daemon(args) => args.run()?,
        Commands::Run(args) => args.run()?,
        Commands::Current(args) => args.run()?,
        Commands::Autostart { command } => commands::autostart::run(command)?,
        Commands::Logs(args) => args.run()?,
    }
    Ok(ExitCode::SUCCESS)
}
