//! dark-mode-daemon core library: domain types, config file model, errors.
//!
//! Public API surface:
//! - [`types`]: color mode, script paths, execution results, dispatch summaries
//! - [`config`]: optional `config.yaml` loader
//! - [`error`]: [`ConfigError`]

pub mod config;
pub mod error;
pub mod types;

pub use config::{Config, EventSourceKind};
pub use error::ConfigError;
pub use types::{
    ColorMode, DispatchBatch, DispatchSummary, ExecutionResult, ScriptPath, ScriptStatus,
    Trigger, COLOR_MODE_ENV,
};
