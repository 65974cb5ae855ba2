//! Size-based rotation for the daemon logs and per-script output logs.
//!
//! `name.log` is shifted to `name.log.1`, older copies move up one slot and
//! whatever falls past the last slot is deleted.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::paths::{stderr_log_path, stdout_log_path};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationPolicy {
    /// Rotate once the live file reaches this size.
    pub max_bytes: u64,
    /// Numbered copies to retain; zero disables rotation.
    pub keep: usize,
}

impl RotationPolicy {
    /// `daemon.log` / `daemon-err.log`.
    pub const DAEMON: Self = Self {
        max_bytes: 10 * 1024 * 1024,
        keep: 5,
    };

    /// `logs/scripts/<name>.log`.
    pub const SCRIPT_OUTPUT: Self = Self {
        max_bytes: 1024 * 1024,
        keep: 3,
    };

    /// Rotate `path` if it has outgrown the policy. Returns whether it did.
    ///
    /// A missing file is not an error. The live path is recreated empty so
    /// an open redirect keeps a valid target.
    pub fn apply(&self, path: &Path) -> io::Result<bool> {
        let len = match fs::metadata(path) {
            Ok(meta) => meta.len(),
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(err) => return Err(err),
        };
        if self.keep == 0 || len < self.max_bytes {
            return Ok(false);
        }

        remove_if_present(&slot(path, self.keep))?;
        for n in (1..self.keep).rev() {
            let older = slot(path, n);
            if older.exists() {
                fs::rename(&older, slot(path, n + 1))?;
            }
        }
        fs::rename(path, slot(path, 1))?;
        fs::File::create(path)?;
        Ok(true)
    }
}

/// Apply [`RotationPolicy::DAEMON`] to both daemon logs under `base`.
pub fn rotate_daemon_logs(base: &Path) {
    for path in [stdout_log_path(base), stderr_log_path(base)] {
        match RotationPolicy::DAEMON.apply(&path) {
            Ok(true) => tracing::info!(path = %path.display(), "rotated log file"),
            Ok(false) => {}
            Err(err) => tracing::warn!(path = %path.display(), error = %err, "cannot rotate log file"),
        }
    }
}

fn slot(path: &Path, n: usize) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(format!(".{n}"));
    path.with_file_name(name)
}

fn remove_if_present(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(err) if err.kind() != io::ErrorKind::NotFound => Err(err),
        _ => Ok(()),
    }
}
