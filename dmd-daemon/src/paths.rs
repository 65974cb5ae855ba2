use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::DaemonError;

pub const APP_DIR_NAME: &str = "dark-mode-daemon";
pub const SCRIPTS_DIR: &str = "scripts";
pub const LOGS_DIR: &str = "logs";

pub const AGENT_LABEL: &str = "io.github.dark-mode-daemon";
pub const AUTOSTART_ENTRY: &str = "dark-mode-daemon.desktop";

pub const DAEMON_STDOUT_LOG: &str = "daemon.log";
pub const DAEMON_STDERR_LOG: &str = "daemon-err.log";

pub const GLOBAL_PREFERENCES_FILE: &str = ".GlobalPreferences.plist";
pub const PREFERENCES_DEBOUNCE: Duration = Duration::from_millis(500);

/// Clock gap between wall time and monotonic time that counts as a sleep.
pub const WAKE_GAP_THRESHOLD: Duration = Duration::from_secs(10);

/// First existing candidate of `$XDG_CONFIG_HOME/dark-mode-daemon` and
/// `$HOME/.config/dark-mode-daemon`.
pub fn resolve_base_dir(xdg_config_home: Option<&Path>, home: Option<&Path>) -> Option<PathBuf> {
    let xdg_candidate = xdg_config_home
        .filter(|dir| !dir.as_os_str().is_empty())
        .map(|dir| dir.join(APP_DIR_NAME));
    let home_candidate = home.map(default_base_dir);

    xdg_candidate
        .into_iter()
        .chain(home_candidate)
        .find(|candidate| candidate.is_dir())
}

/// [`resolve_base_dir`] fed from the process environment.
pub fn base_dir_from_env() -> Option<PathBuf> {
    let xdg = env::var_os("XDG_CONFIG_HOME").map(PathBuf::from);
    let home = dirs::home_dir();
    resolve_base_dir(xdg.as_deref(), home.as_deref())
}

/// Base directory to use for files the daemon itself creates (logs), even
/// when no configuration directory exists yet.
pub fn state_base_dir() -> Result<PathBuf, DaemonError> {
    if let Some(base) = base_dir_from_env() {
        return Ok(base);
    }
    let home = dirs::home_dir().ok_or(DaemonError::HomeNotFound)?;
    Ok(default_base_dir(&home))
}

pub fn default_base_dir(home: &Path) -> PathBuf {
    home.join(".config").join(APP_DIR_NAME)
}

pub fn scripts_dir(base: &Path) -> PathBuf {
    base.join(SCRIPTS_DIR)
}

pub fn logs_dir(base: &Path) -> PathBuf {
    base.join(LOGS_DIR)
}

pub fn script_logs_dir(base: &Path) -> PathBuf {
    logs_dir(base).join(SCRIPTS_DIR)
}

pub fn stdout_log_path(base: &Path) -> PathBuf {
    logs_dir(base).join(DAEMON_STDOUT_LOG)
}

pub fn stderr_log_path(base: &Path) -> PathBuf {
    logs_dir(base).join(DAEMON_STDERR_LOG)
}

pub fn launch_agents_dir(home: &Path) -> PathBuf {
    home.join("Library").join("LaunchAgents")
}

pub fn launchd_plist_path(home: &Path) -> PathBuf {
    launch_agents_dir(home).join(format!("{AGENT_LABEL}.plist"))
}

pub fn preferences_dir(home: &Path) -> PathBuf {
    home.join("Library").join("Preferences")
}

pub fn xdg_autostart_dir(config_home: &Path) -> PathBuf {
    config_home.join("autostart")
}
