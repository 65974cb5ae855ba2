//! dark-mode-daemon runtime: script lookup and execution, fan-out dispatch,
//! OS event sources, and autostart management.

pub mod adapter;
pub mod appearance;
pub mod dispatcher;
mod error;
pub mod events;
pub mod executor;
pub mod gsettings;
pub mod launchd;
pub mod locator;
pub mod log_rotation;
pub mod paths;
pub mod polling;
pub mod preferences;
mod runtime;
pub mod xdg_autostart;

pub use adapter::EventAdapter;
pub use appearance::{native_appearance, AppearanceQuery, ManualAppearance};
pub use dispatcher::Dispatcher;
pub use error::DaemonError;
pub use events::{EventCallback, EventSource, SystemEvent, WakeDetector};
pub use executor::ScriptExecutor;
pub use launchd::{generate_plist, install as install_launchd, uninstall as uninstall_launchd};
pub use locator::{EntryKind, LocateError, ScriptEntry, ScriptLocator, ScriptScan};
pub use runtime::{
    dispatch_blocking, init_tracing, load_config, native_event_source, start_blocking,
    watch_blocking, Daemon, DaemonState, LogTarget, RunningDaemon,
};
