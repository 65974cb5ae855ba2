//! `dark-mode-daemon autostart`: launchd agent on macOS, XDG autostart
//! entry on Linux.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use colored::Colorize;

#[derive(Subcommand, Debug)]
pub enum AutostartCommand {
    /// Install the autostart entry for this binary.
    Setup(SetupArgs),
    /// Report whether the autostart entry is installed.
    Check,
    /// Remove the autostart entry.
    Remove,
}

#[derive(Args, Debug)]
pub struct SetupArgs {
    /// Binary to start at login; defaults to the running executable.
    #[arg(long)]
    pub binary_path: Option<PathBuf>,

    /// Overwrite an existing entry.
    #[arg(long)]
    pub force: bool,
}

pub fn run(command: AutostartCommand) -> Result<()> {
    match command {
        AutostartCommand::Setup(args) => {
            let binary = match args.binary_path {
                Some(path) => path,
                None => std::env::current_exe().context("could not determine executable path")?,
            };
            let path = platform::setup(&binary, args.force)?;
            println!("{} autostart entry installed: {}", "✓".green(), path.display());
        }
        AutostartCommand::Check => match platform::check()? {
            Some(path) => println!("autostart is set up: {}", path.display()),
            None => println!("autostart is not set up"),
        },
        AutostartCommand::Remove => {
            if platform::remove()? {
                println!("autostart entry removed");
            } else {
                println!("autostart is not set up; nothing to remove");
            }
        }
    }
    Ok(())
}

#[cfg(target_os = "macos")]
mod platform {
    use super::*;
    use dmd_daemon::launchd::{self, AgentStatus};
    use dmd_daemon::paths::state_base_dir;

    fn home() -> Result<PathBuf> {
        dirs::home_dir().context("could not determine home directory")
    }

    pub fn setup(binary: &Path, force: bool) -> Result<PathBuf> {
        let base = state_base_dir().context("could not determine config directory")?;
        launchd::install(&home()?, &base, binary, force).context("failed to install launchd agent")
    }

    pub fn check() -> Result<Option<PathBuf>> {
        match launchd::status(&home()?).context("failed to query launchd agent")? {
            AgentStatus::NotInstalled => Ok(None),
            AgentStatus::Installed { plist, loaded } => {
                if !loaded {
                    eprintln!("{} agent is installed but not loaded", "warning:".yellow().bold());
                }
                Ok(Some(plist))
            }
        }
    }

    pub fn remove() -> Result<bool> {
        launchd::uninstall(&home()?).context("failed to remove launchd agent")
    }
}

#[cfg(target_os = "linux")]
mod platform {
    use super::*;
    use dmd_daemon::xdg_autostart;

    fn config_home() -> Result<PathBuf> {
        dirs::config_dir().context("could not determine XDG config directory")
    }

    pub fn setup(binary: &Path, force: bool) -> Result<PathBuf> {
        xdg_autostart::install(&config_home()?, binary, force)
            .context("failed to write autostart entry")
    }

    pub fn check() -> Result<Option<PathBuf>> {
        let config_home = config_home()?;
        Ok(xdg_autostart::is_installed(&config_home).then(|| xdg_autostart::entry_path(&config_home)))
    }

    pub fn remove() -> Result<bool> {
        xdg_autostart::uninstall(&config_home()?).context("failed to remove autostart entry")
    }
}

#[cfg(not(any(target_os = "macos", target_os = "linux")))]
mod platform {
    use super::*;
    use anyhow::bail;

    pub fn setup(_binary: &Path, _force: bool) -> Result<PathBuf> {
        bail!("autostart is only supported on macOS and Linux")
    }

    pub fn check() -> Result<Option<PathBuf>> {
        bail!("autostart is only supported on macOS and Linux")
    }

    pub fn remove() -> Result<bool> {
        bail!("autostart is only supported on macOS and Linux")
    }
}
