//! Domain types shared by the daemon runtime and the CLI.
//!
//! Script locations travel as [`ScriptPath`], which keeps the `PathBuf` intact.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Environment variable carrying the new mode into every script.
pub const COLOR_MODE_ENV: &str = "DMD_COLOR_MODE";

// ---------------------------------------------------------------------------
// Color mode
// ---------------------------------------------------------------------------

/// The inferred system color scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ColorMode {
    #[default]
    Light,
    Dark,
}

impl ColorMode {
    /// Map a platform style name onto a mode.
    ///
    /// Only an exact match with `dark_sentinel` yields [`ColorMode::Dark`];
    /// any other value, including no value at all, is light.
    pub fn from_style(style: Option<&str>, dark_sentinel: &str) -> Self {
        match style {
            Some(style) if style == dark_sentinel => ColorMode::Dark,
            _ => ColorMode::Light,
        }
    }

    /// Value exported through [`COLOR_MODE_ENV`].
    pub fn as_str(self) -> &'static str {
        match self {
            ColorMode::Light => "light",
            ColorMode::Dark => "dark",
        }
    }

    pub fn emoji(self) -> &'static str {
        match self {
            ColorMode::Light => "☀️",
            ColorMode::Dark => "🌙",
        }
    }
}

impl fmt::Display for ColorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ColorMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "light" => Ok(ColorMode::Light),
            "dark" => Ok(ColorMode::Dark),
            other => Err(format!("unknown color mode '{other}'; expected: light, dark")),
        }
    }
}

// ---------------------------------------------------------------------------
// Script paths
// ---------------------------------------------------------------------------

/// Absolute path to an executable script found in the scripts directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ScriptPath(pub PathBuf);

impl ScriptPath {
    pub fn as_path(&self) -> &Path {
        &self.0
    }

    /// File name used for per-script log files and diagnostics.
    pub fn file_name(&self) -> String {
        self.0
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.0.display().to_string())
    }
}

impl fmt::Display for ScriptPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.display().fmt(f)
    }
}

impl From<PathBuf> for ScriptPath {
    fn from(path: PathBuf) -> Self {
        Self(path)
    }
}

impl From<&Path> for ScriptPath {
    fn from(path: &Path) -> Self {
        Self(path.to_path_buf())
    }
}

impl AsRef<Path> for ScriptPath {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// Execution results
// ---------------------------------------------------------------------------

/// How a single script execution ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScriptStatus {
    /// The child exited on its own with this code.
    Exited { code: i32 },
    /// The child was terminated by a signal and has no exit code.
    Signaled,
    /// The child could not be started at all.
    SpawnFailed { reason: String },
    /// Waiting on the child failed after it was started.
    WaitFailed { reason: String },
    /// The configured timeout expired; the child was killed.
    TimedOut { after_ms: u64 },
}

impl ScriptStatus {
    pub fn timed_out(after: Duration) -> Self {
        ScriptStatus::TimedOut {
            after_ms: after.as_millis() as u64,
        }
    }

    /// Exit code, when the child produced one.
    pub fn code(&self) -> Option<i32> {
        match self {
            ScriptStatus::Exited { code } => Some(*code),
            _ => None,
        }
    }
}

impl fmt::Display for ScriptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScriptStatus::Exited { code } => write!(f, "exited with status {code}"),
            ScriptStatus::Signaled => write!(f, "terminated by signal"),
            ScriptStatus::SpawnFailed { reason } => write!(f, "failed to launch: {reason}"),
            ScriptStatus::WaitFailed { reason } => write!(f, "failed while waiting: {reason}"),
            ScriptStatus::TimedOut { after_ms } => write!(f, "timed out after {after_ms}ms"),
        }
    }
}

/// Outcome of running one script for one dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub script: ScriptPath,
    pub mode: ColorMode,
    /// Captured standard output; empty when it was not valid UTF-8.
    pub stdout: String,
    pub status: ScriptStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl ExecutionResult {
    pub fn success(&self) -> bool {
        self.status.code() == Some(0)
    }
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

/// The scripts resolved for one dispatch, together with the mode they run for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchBatch {
    pub mode: ColorMode,
    pub scripts: Vec<ScriptPath>,
}

impl DispatchBatch {
    pub fn new(mode: ColorMode, scripts: Vec<ScriptPath>) -> Self {
        Self { mode, scripts }
    }

    pub fn is_empty(&self) -> bool {
        self.scripts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.scripts.len()
    }
}

/// What caused a dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    Startup,
    Wake,
    AppearanceChanged,
    /// `run <mode>` from the command line.
    Manual,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::Startup => write!(f, "startup"),
            Trigger::Wake => write!(f, "wake"),
            Trigger::AppearanceChanged => write!(f, "appearance_changed"),
            Trigger::Manual => write!(f, "manual"),
        }
    }
}

/// Emitted once every execution of a batch has returned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchSummary {
    pub mode: ColorMode,
    pub trigger: Trigger,
    pub notified: usize,
    pub failed: usize,
    pub results: Vec<ExecutionResult>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl DispatchSummary {
    pub fn succeeded(&self) -> usize {
        self.notified - self.failed
    }
}
