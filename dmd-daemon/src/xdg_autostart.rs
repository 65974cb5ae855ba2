//! XDG autostart entry (`<config home>/autostart/dark-mode-daemon.desktop`)
//! that launches the daemon with the desktop session.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::{io_err, DaemonError};
use crate::paths::{xdg_autostart_dir, AUTOSTART_ENTRY};

pub fn entry_path(config_home: &Path) -> PathBuf {
    xdg_autostart_dir(config_home).join(AUTOSTART_ENTRY)
}

pub fn generate_desktop_entry(binary_path: &Path) -> String {
    format!(
        "[Desktop Entry]
Name=Dark Mode Daemon
GenericName=Dark Mode Daemon
Comment=Runs scripts when the OS color mode changes
Exec={exec} daemon
Terminal=false
Type=Application
X-GNOME-Autostart-enabled=true
",
        exec = escape_string_value(&quote_exec_arg(&binary_path.display().to_string()))
    )
}

/// Quote an `Exec` argument following desktop entry quoting rules when it needs it.
fn quote_exec_arg(arg: &str) -> String {
    const RESERVED: &[char] = &[
        ' ', '\t', '\n', '"', '\'', '\\', '>', '<', '~', '|', '&', ';', '$', '*', '?', '#', '(',
        ')', '`',
    ];
    if !arg.contains(RESERVED) {
        return arg.to_string();
    }
    let mut quoted = String::with_capacity(arg.len() + 2);
    quoted.push('"');
    for ch in arg.chars() {
        if matches!(ch, '"' | '`' | '$' | '\\') {
            quoted.push('\\');
        }
        quoted.push(ch);
    }
    quoted.push('"');
    quoted
}

/// The `string` value escapes, applied to the whole `Exec` value after quoting.
fn escape_string_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '\\' => escaped.push_str("\\\\"),
            '\n' => escaped.push_str("\\n"),
            '\t' => escaped.push_str("\\t"),
            '\r' => escaped.push_str("\\r"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

/// Write the autostart entry. An existing entry is kept unless `force`.
pub fn install(config_home: &Path, binary_path: &Path, force: bool) -> Result<PathBuf, DaemonError> {
    if !config_home.is_dir() {
        return Err(DaemonError::Autostart(format!(
            "config home '{}' is not a directory",
            config_home.display()
        )));
    }

    let dir = xdg_autostart_dir(config_home);
    fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;

    let entry = entry_path(config_home);
    if entry.exists() && !force {
        return Err(DaemonError::Autostart(format!(
            "autostart entry already exists at '{}'; pass --force to overwrite it",
            entry.display()
        )));
    }

    fs::write(&entry, generate_desktop_entry(binary_path)).map_err(|e| io_err(&entry, e))?;
    tracing::info!(path = %entry.display(), "autostart entry written");
    Ok(entry)
}

pub fn is_installed(config_home: &Path) -> bool {
    entry_path(config_home).is_file()
}

/// Remove the entry; `Ok(false)` when there was nothing to remove.
pub fn uninstall(config_home: &Path) -> Result<bool, DaemonError> {
    let entry = entry_path(config_home);
    match fs::remove_file(&entry) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
        Err(err) => Err(io_err(&entry, err)),
    }
}
