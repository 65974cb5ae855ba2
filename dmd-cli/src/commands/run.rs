//! `dark-mode-daemon run <mode>`: one dispatch, on demand.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use tracing::level_filters::LevelFilter;

use dmd_core::{ColorMode, DispatchSummary, Trigger};
use dmd_daemon::{dispatch_blocking, init_tracing, LogTarget};

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Mode to pass to every script (light or dark).
    pub mode: ColorMode,

    /// Log debug diagnostics.
    #[arg(short, long)]
    pub verbose: bool,

    /// Print the dispatch summary as JSON.
    #[arg(long)]
    pub json: bool,
}

impl RunArgs {
    pub fn run(self) -> Result<()> {
        let level = if self.verbose {
            LevelFilter::DEBUG
        } else {
            LevelFilter::WARN
        };
        init_tracing(level, LogTarget::Stderr);

        let summary = dispatch_blocking(self.mode, Trigger::Manual)
            .with_context(|| format!("failed to run scripts for {} mode", self.mode))?;

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&summary).context("failed to render summary JSON")?
            );
        } else {
            print_summary(&summary);
        }
        Ok(())
    }
}

fn print_summary(summary: &DispatchSummary) {
    for result in &summary.results {
        let marker = if result.success() {
            "ok".green()
        } else {
            "failed".red()
        };
        println!("{marker} {} ({})", result.script, result.status);
    }

    let line = format!(
        "{} notified {} scripts about the change to {} mode",
        summary.mode.emoji(),
        summary.notified,
        summary.mode
    );
    if summary.failed > 0 {
        println!("{line}; {}", format!("{} failed", summary.failed).red());
    } else {
        println!("{line}");
    }
}
