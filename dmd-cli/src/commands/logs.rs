//! `dark-mode-daemon logs`: tail of the daemon's log files.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;

use dmd_daemon::paths::{state_base_dir, stderr_log_path, stdout_log_path};

#[derive(Args, Debug)]
pub struct LogsArgs {
    /// Number of trailing lines to show.
    #[arg(long, default_value_t = 100)]
    pub lines: usize,

    /// Show only the stderr log file.
    #[arg(long)]
    pub stderr_only: bool,
}

impl LogsArgs {
    pub fn run(self) -> Result<()> {
        let base = state_base_dir().context("could not determine config directory")?;

        if !self.stderr_only {
            print_tail(&stdout_log_path(&base), self.lines)
                .context("failed to read daemon stdout log")?;
        }
        print_tail(&stderr_log_path(&base), self.lines)
            .context("failed to read daemon stderr log")?;
        Ok(())
    }
}

fn print_tail(path: &Path, lines: usize) -> Result<()> {
    if !path.exists() {
        println!("log file not found: {}", path.display());
        return Ok(());
    }

    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let tail = tail_lines(BufReader::new(file), lines)
        .with_context(|| format!("read {}", path.display()))?;

    println!("==> {} <==", path.display());
    for line in tail {
        println!("{line}");
    }
    Ok(())
}

fn tail_lines(reader: impl BufRead, lines: usize) -> std::io::Result<VecDeque<String>> {
    let mut tail = VecDeque::with_capacity(lines);
    if lines == 0 {
        return Ok(tail);
    }
    for line in reader.lines() {
        if tail.len() == lines {
            tail.pop_front();
        }
        tail.push_back(line?);
    }
    Ok(tail)
}
