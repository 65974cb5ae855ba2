//! Optional `config.yaml` living next to the `scripts` directory.
//!
//! Every key is optional; a missing file is the same as an empty one.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::ColorMode;

pub const CONFIG_FILE: &str = "config.yaml";
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

/// Which event source the daemon subscribes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EventSourceKind {
    /// Platform notifications (preferences watcher on macOS, gsettings on Linux).
    #[default]
    Native,
    /// Periodically query the appearance instead of listening for notifications.
    Polling,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Mode used when the appearance query itself fails.
    #[serde(default)]
    pub fallback_mode: ColorMode,

    /// Run the scripts of one dispatch concurrently. When false they run one
    /// after another; the dispatch still waits for all of them.
    #[serde(default = "default_parallel")]
    pub parallel: bool,

    /// Kill a script that runs longer than this many seconds.
    #[serde(default)]
    pub script_timeout_secs: Option<u64>,

    /// Append each script's stdout to `logs/scripts/<name>.log`.
    #[serde(default)]
    pub log_script_output: bool,

    /// Tick of the polling source and the wake detector.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    #[serde(default)]
    pub event_source: EventSourceKind,
}

fn default_parallel() -> bool {
    true
}

fn default_poll_interval_secs() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}

impl Default for Config {
    fn default() -> Self {
        Self {
            fallback_mode: ColorMode::default(),
            parallel: default_parallel(),
            script_timeout_secs: None,
            log_script_output: false,
            poll_interval_secs: default_poll_interval_secs(),
            event_source: EventSourceKind::default(),
        }
    }
}

impl Config {
    /// Load `config.yaml` from `base_dir`, returning defaults when the file is absent.
    pub fn load_from_dir(base_dir: &Path) -> Result<Self, ConfigError> {
        Self::load(&base_dir.join(CONFIG_FILE))
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        if contents.trim().is_empty() {
            return Ok(Self::default());
        }

        serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn script_timeout(&self) -> Option<Duration> {
        self.script_timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    /// Never zero, so interval timers stay valid.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }
}
