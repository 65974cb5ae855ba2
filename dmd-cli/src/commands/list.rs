//! `dark-mode-daemon list`: the scripts a dispatch would run right now.

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use tracing::level_filters::LevelFilter;

use dmd_daemon::{init_tracing, EntryKind, LocateError, LogTarget, ScriptLocator};

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Also report skipped entries and why they were skipped (on stderr).
    #[arg(short, long)]
    pub verbose: bool,

    /// Print symlink targets instead of the paths inside the scripts directory.
    #[arg(long)]
    pub resolve: bool,
}

impl ListArgs {
    pub fn run(self) -> Result<()> {
        // Diagnostics go to stderr so stdout stays a plain list of paths.
        let level = if self.verbose {
            LevelFilter::DEBUG
        } else {
            LevelFilter::WARN
        };
        init_tracing(level, LogTarget::Stderr);

        let scan = match ScriptLocator::from_env().scan() {
            Ok(scan) => scan,
            Err(err @ LocateError::Unreadable { .. }) => {
                eprintln!("{} {err}", "warning:".yellow().bold());
                return Ok(());
            }
            Err(err) => {
                if self.verbose {
                    eprintln!("{err}");
                }
                return Ok(());
            }
        };

        if self.verbose {
            eprintln!("{} {}", "scripts directory:".dimmed(), scan.scripts_dir.display());
        }

        let mut entries = scan.entries;
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        for entry in &entries {
            match &entry.kind {
                EntryKind::Script if self.resolve => println!("{}", entry.resolved().display()),
                EntryKind::Script => println!("{}", entry.path.display()),
                skipped if self.verbose => {
                    eprintln!(
                        "{} {} ({})",
                        "skipped".dimmed(),
                        entry.path.display(),
                        skip_reason(skipped)
                    );
                }
                _ => {}
            }
        }
        Ok(())
    }
}

fn skip_reason(kind: &EntryKind) -> String {
    match kind {
        EntryKind::Script => "script".to_string(),
        EntryKind::Directory => "directory".to_string(),
        EntryKind::NotExecutable => "not executable".to_string(),
        EntryKind::Unresolvable(reason) => format!("unreadable: {reason}"),
    }
}
