//! Script discovery: one level of `<base>/scripts`, executable regular files only.
//!
//! Nothing is cached. Every [`ScriptLocator::locate`] call re-resolves the
//! base directory (when tracking the environment) and re-lists the scripts
//! directory, so scripts added or removed between dispatches are picked up.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use dmd_core::ScriptPath;
use thiserror::Error;

use crate::paths::{base_dir_from_env, scripts_dir};

/// Why a scan produced no scripts directory to look at.
#[derive(Debug, Error)]
pub enum LocateError {
    #[error("did not find any dark-mode-daemon directory")]
    NoConfigDir,

    #[error("did not find any scripts in {0}")]
    NoScriptsDir(PathBuf),

    #[error("failed to read scripts in {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryKind {
    Script,
    Directory,
    NotExecutable,
    /// Metadata could not be read, e.g. a dangling symlink.
    Unresolvable(String),
}

#[derive(Debug, Clone)]
pub struct ScriptEntry {
    /// Path inside the scripts directory.
    pub path: PathBuf,
    pub kind: EntryKind,
}

impl ScriptEntry {
    /// Symlink target of the entry, or the entry itself when it cannot be resolved.
    pub fn resolved(&self) -> PathBuf {
        fs::canonicalize(&self.path).unwrap_or_else(|_| self.path.clone())
    }
}

#[derive(Debug, Clone)]
pub struct ScriptScan {
    pub scripts_dir: PathBuf,
    /// Directory listing order; not sorted.
    pub entries: Vec<ScriptEntry>,
}

impl ScriptScan {
    pub fn scripts(&self) -> impl Iterator<Item = &ScriptEntry> {
        self.entries
            .iter()
            .filter(|entry| entry.kind == EntryKind::Script)
    }
}

#[derive(Debug, Clone)]
enum BaseDir {
    /// Re-resolve from `XDG_CONFIG_HOME` / `HOME` on every scan.
    Environment,
    Fixed(Option<PathBuf>),
}

#[derive(Debug, Clone)]
pub struct ScriptLocator {
    base: BaseDir,
}

impl ScriptLocator {
    pub fn from_env() -> Self {
        Self {
            base: BaseDir::Environment,
        }
    }

    pub fn with_base_dir(base: impl Into<PathBuf>) -> Self {
        Self {
            base: BaseDir::Fixed(Some(base.into())),
        }
    }

    /// A locator with no configuration directory at all.
    pub fn unconfigured() -> Self {
        Self {
            base: BaseDir::Fixed(None),
        }
    }

    pub fn base_dir(&self) -> Option<PathBuf> {
        match &self.base {
            BaseDir::Environment => base_dir_from_env(),
            BaseDir::Fixed(base) => base.clone(),
        }
    }

    /// List every entry of the scripts directory together with its classification.
    pub fn scan(&self) -> Result<ScriptScan, LocateError> {
        let base = self.base_dir().ok_or(LocateError::NoConfigDir)?;
        let dir = absolute(&scripts_dir(&base));
        if !dir.is_dir() {
            return Err(LocateError::NoScriptsDir(dir));
        }

        let read_dir = fs::read_dir(&dir).map_err(|source| LocateError::Unreadable {
            path: dir.clone(),
            source,
        })?;

        let mut entries = Vec::new();
        for entry in read_dir {
            let entry = entry.map_err(|source| LocateError::Unreadable {
                path: dir.clone(),
                source,
            })?;
            let path = entry.path();
            let kind = classify(&path);
            entries.push(ScriptEntry { path, kind });
        }

        Ok(ScriptScan {
            scripts_dir: dir,
            entries,
        })
    }

    /// Executable scripts for one dispatch. Never fails: every problem is
    /// logged and turns into an empty or shorter list.
    pub fn locate(&self) -> Vec<ScriptPath> {
        let scan = match self.scan() {
            Ok(scan) => scan,
            Err(err @ LocateError::Unreadable { .. }) => {
                tracing::warn!(error = %err, "could not list scripts");
                return Vec::new();
            }
            Err(err) => {
                tracing::info!("{err}");
                return Vec::new();
            }
        };

        tracing::info!(dir = %scan.scripts_dir.display(), "using scripts directory");

        let mut scripts = Vec::new();
        for entry in scan.entries {
            match entry.kind {
                EntryKind::Script => scripts.push(ScriptPath::from(entry.path)),
                EntryKind::Directory => {
                    tracing::info!(path = %entry.path.display(), "skipping directory");
                }
                EntryKind::NotExecutable => {
                    tracing::info!(
                        path = %entry.path.display(),
                        "skipping file, since it is not executable",
                    );
                }
                EntryKind::Unresolvable(reason) => {
                    tracing::warn!(path = %entry.path.display(), error = %reason, "skipping unreadable entry");
                }
            }
        }
        scripts
    }
}

fn classify(path: &Path) -> EntryKind {
    let metadata = match fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(err) => return EntryKind::Unresolvable(err.to_string()),
    };

    if metadata.is_dir() {
        return EntryKind::Directory;
    }
    if !metadata.is_file() || !is_executable(path) {
        return EntryKind::NotExecutable;
    }
    EntryKind::Script
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use nix::unistd::{access, AccessFlags};
    access(path, AccessFlags::X_OK).is_ok()
}

#[cfg(not(unix))]
fn is_executable(_path: &Path) -> bool {
    true
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    env::current_dir()
        .map(|cwd| cwd.join(path))
        .unwrap_or_else(|_| path.to_path_buf())
}
