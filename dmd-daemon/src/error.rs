use std::path::PathBuf;

use thiserror::Error;

/// Error surface for the daemon runtime, platform collaborators, and autostart management.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("notify error: {0}")]
    Notify(#[from] notify::Error),

    #[error("appearance query failed: {0}")]
    Appearance(String),

    #[error("event source '{source_name}' stopped: {reason}")]
    EventSource {
        source_name: &'static str,
        reason: String,
    },

    #[error("task join failure: {0}")]
    Join(String),

    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,

    #[error("launchd error: {0}")]
    Launchd(String),

    #[error("autostart error: {0}")]
    Autostart(String),
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> DaemonError {
    DaemonError::Io {
        path: path.into(),
        source,
    }
}
