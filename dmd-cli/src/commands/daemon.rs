//! `dark-mode-daemon daemon`: foreground daemon loop.

use anyhow::{Context, Result};
use clap::Args;
use tracing::level_filters::LevelFilter;

use dmd_daemon::{init_tracing, start_blocking, LogTarget};

#[derive(Args, Debug)]
pub struct DaemonArgs {
    /// Log debug diagnostics.
    #[arg(short, long)]
    pub verbose: bool,
}

impl DaemonArgs {
    pub fn run(self) -> Result<()> {
        let level = if self.verbose {
            LevelFilter::DEBUG
        } else {
            LevelFilter::INFO
        };
        init_tracing(level, LogTarget::Stdout);

        start_blocking().context("daemon exited with error")
    }
}
