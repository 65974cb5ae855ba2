use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

use dmd_core::{ColorMode, Config, DispatchSummary, EventSourceKind, Trigger};

use crate::adapter::EventAdapter;
use crate::appearance::{native_appearance, query_off_thread, AppearanceQuery};
use crate::dispatcher::Dispatcher;
use crate::error::{io_err, DaemonError};
use crate::events::EventSource;
use crate::executor::ScriptExecutor;
use crate::locator::ScriptLocator;
use crate::paths;
use crate::polling::PollingSource;

const LOG_ROTATION_INTERVAL: Duration = Duration::from_secs(60);

/// Where diagnostics are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTarget {
    Stdout,
    Stderr,
}

/// Install the global tracing subscriber. `RUST_LOG` wins over `default_level`.
pub fn init_tracing(default_level: LevelFilter, target: LogTarget) {
    let filter = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy();

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);
    let _ = match target {
        LogTarget::Stdout => builder.with_writer(io::stdout).try_init(),
        LogTarget::Stderr => builder.with_writer(io::stderr).try_init(),
    };
}

/// Config from `<base>/config.yaml`; any problem is a warning and yields defaults.
pub fn load_config(base: Option<&Path>) -> Config {
    let Some(base) = base else {
        return Config::default();
    };
    match Config::load_from_dir(base) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(error = %err, "ignoring unusable config file");
            Config::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonState {
    Starting,
    Running,
}

/// The long-lived daemon: one startup dispatch, then event-driven dispatches
/// until shutdown.
pub struct Daemon {
    adapter: EventAdapter,
    source: Box<dyn EventSource>,
    fallback_source: Option<Box<dyn EventSource>>,
    log_base: Option<PathBuf>,
}

impl Daemon {
    pub fn new(adapter: EventAdapter, source: Box<dyn EventSource>) -> Self {
        Self {
            adapter,
            source,
            fallback_source: None,
            log_base: None,
        }
    }

    /// Wire the daemon from config: native appearance, scripts resolved from
    /// the environment on every dispatch, and the configured event source.
    pub fn from_config(config: &Config, base: Option<&Path>) -> Self {
        let appearance = native_appearance();
        let adapter = EventAdapter::new(
            Arc::new(dispatcher_from_config(config, base)),
            appearance.clone(),
            config.fallback_mode,
        );

        let (source, fallback) = configured_sources(appearance, config);
        let mut daemon = Daemon::new(adapter, source);
        daemon.fallback_source = fallback;

        match paths::state_base_dir() {
            Ok(log_base) => daemon.with_log_rotation(log_base),
            Err(err) => {
                tracing::warn!(error = %err, "log rotation disabled");
                daemon
            }
        }
    }

    /// Source to switch to when the primary one stops with an error.
    pub fn with_fallback_source(mut self, source: Box<dyn EventSource>) -> Self {
        self.fallback_source = Some(source);
        self
    }

    /// Rotate the daemon's own log files under `base` in the background.
    pub fn with_log_rotation(mut self, base: PathBuf) -> Self {
        self.log_base = Some(base);
        self
    }

    /// `Starting`: awaited startup dispatch, subscriptions registered, source
    /// started. Returns once the daemon is `Running`.
    pub async fn start(self, shutdown_tx: broadcast::Sender<()>) -> RunningDaemon {
        let Daemon {
            adapter,
            source,
            fallback_source,
            log_base,
        } = self;
        tracing::debug!(state = ?DaemonState::Starting, source = source.name(), "daemon starting");

        // Subscribed first so a shutdown sent while startup scripts run is kept.
        let shutdown_rx = shutdown_tx.subscribe();
        let startup = adapter.dispatch_current(Trigger::Startup).await;

        let subscriber = adapter.clone();
        let source = SupervisedSource::start(
            source,
            fallback_source,
            Box::new(move |source: &mut dyn EventSource| {
                subscribe_adapter(source, &subscriber)
            }),
            shutdown_tx.clone(),
        );

        let rotation_handle = log_base.map(|base| {
            let shutdown_rx = shutdown_tx.subscribe();
            tokio::spawn(async move { log_rotation_task(base, shutdown_rx).await })
        });

        tracing::info!(source = source.name, "daemon running");
        RunningDaemon {
            startup,
            source,
            rotation_handle,
            shutdown_tx,
            shutdown_rx,
        }
    }

    /// Start, then block until shutdown.
    pub async fn run(self, shutdown_tx: broadcast::Sender<()>) -> Result<(), DaemonError> {
        self.start(shutdown_tx).await.wait().await
    }
}

pub struct RunningDaemon {
    startup: DispatchSummary,
    source: SupervisedSource,
    rotation_handle: Option<JoinHandle<Result<(), DaemonError>>>,
    shutdown_tx: broadcast::Sender<()>,
    shutdown_rx: broadcast::Receiver<()>,
}

impl RunningDaemon {
    pub fn state(&self) -> DaemonState {
        DaemonState::Running
    }

    pub fn startup_summary(&self) -> &DispatchSummary {
        &self.startup
    }

    pub fn source_name(&self) -> &'static str {
        self.source.name
    }

    /// Block until the shutdown channel fires.
    pub async fn wait(mut self) -> Result<(), DaemonError> {
        loop {
            tokio::select! {
                _ = self.shutdown_rx.recv() => break,
                _ = self.source.supervise() => {}
            }
        }

        tracing::info!("daemon shutting down");
        let _ = self.shutdown_tx.send(());
        self.source.stop().await;
        if let Some(handle) = self.rotation_handle {
            handle_join("log_rotation", handle.await)?;
        }
        Ok(())
    }
}

type Subscriber = Box<dyn Fn(&mut dyn EventSource) + Send + Sync>;

/// A started event source plus the one it is replaced with when it breaks.
struct SupervisedSource {
    name: &'static str,
    handle: Option<JoinHandle<Result<(), DaemonError>>>,
    fallback: Option<Box<dyn EventSource>>,
    subscriber: Subscriber,
    shutdown_tx: broadcast::Sender<()>,
}

impl SupervisedSource {
    fn start(
        mut source: Box<dyn EventSource>,
        fallback: Option<Box<dyn EventSource>>,
        subscriber: Subscriber,
        shutdown_tx: broadcast::Sender<()>,
    ) -> Self {
        subscriber(source.as_mut());
        let name = source.name();
        let handle = source.start(shutdown_tx.subscribe());
        Self {
            name,
            handle: Some(handle),
            fallback,
            subscriber,
            shutdown_tx,
        }
    }

    /// Resolves when the running source stops. A failed source is replaced by
    /// the fallback; with nothing left running this never resolves.
    async fn supervise(&mut self) {
        let Some(handle) = self.handle.as_mut() else {
            return std::future::pending().await;
        };
        let joined = handle.await;
        self.handle = None;

        let err = match flatten_join(self.name, joined) {
            Ok(()) => return,
            Err(err) => err,
        };
        tracing::error!(source = self.name, error = %err, "event source stopped");

        match self.fallback.take() {
            Some(mut fallback) => {
                tracing::warn!(source = fallback.name(), "switching to fallback event source");
                (self.subscriber)(fallback.as_mut());
                self.name = fallback.name();
                self.handle = Some(fallback.start(self.shutdown_tx.subscribe()));
            }
            None => tracing::error!("no event source left; waiting for shutdown"),
        }
    }

    async fn stop(self) {
        let Some(handle) = self.handle else { return };
        if let Err(err) = flatten_join(self.name, handle.await) {
            tracing::warn!(source = self.name, error = %err, "event source ended with an error");
        }
    }
}

fn subscribe_adapter(source: &mut dyn EventSource, adapter: &EventAdapter) {
    let on_wake = adapter.clone();
    source.on_wake(Arc::new(move || {
        on_wake.on_wake();
    }));
    let on_change = adapter.clone();
    source.on_appearance_changed(Arc::new(move || {
        on_change.on_appearance_changed();
    }));
}

fn dispatcher_from_config(config: &Config, base: Option<&Path>) -> Dispatcher {
    let executor = ScriptExecutor::from_config(config, base);
    Dispatcher::new(ScriptLocator::from_env(), executor).with_parallel(config.parallel)
}

/// Primary source per `event_source`, plus the polling fallback for native sources.
fn configured_sources(
    appearance: Arc<dyn AppearanceQuery>,
    config: &Config,
) -> (Box<dyn EventSource>, Option<Box<dyn EventSource>>) {
    let polling: Box<dyn EventSource> =
        Box::new(PollingSource::new(appearance.clone(), config.poll_interval()));
    match config.event_source {
        EventSourceKind::Polling => (polling, None),
        EventSourceKind::Native => (native_event_source(appearance, config), Some(polling)),
    }
}

/// Platform notification source: preferences watch on macOS, `gsettings
/// monitor` on Linux, polling elsewhere.
pub fn native_event_source(
    appearance: Arc<dyn AppearanceQuery>,
    config: &Config,
) -> Box<dyn EventSource> {
    #[cfg(target_os = "macos")]
    {
        match dirs::home_dir() {
            Some(home) => Box::new(crate::preferences::PreferencesWatchSource::new(
                paths::preferences_dir(&home),
                appearance,
            )),
            None => Box::new(PollingSource::new(appearance, config.poll_interval())),
        }
    }

    #[cfg(target_os = "linux")]
    {
        let _ = (appearance, config);
        Box::new(crate::gsettings::GsettingsMonitorSource::new())
    }

    #[cfg(not(any(target_os = "macos", target_os = "linux")))]
    {
        Box::new(PollingSource::new(appearance, config.poll_interval()))
    }
}

fn build_runtime() -> Result<tokio::runtime::Runtime, DaemonError> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))
}

/// Build a runtime, run the daemon from the environment's config, and block
/// until Ctrl-C or SIGTERM.
pub fn start_blocking() -> Result<(), DaemonError> {
    let base = paths::base_dir_from_env();
    let config = load_config(base.as_deref());
    if base.is_none() {
        tracing::info!("no configuration directory found; running with defaults");
    }

    build_runtime()?.block_on(async move {
        let (shutdown_tx, _) = broadcast::channel::<()>(16);
        let signal_handle = {
            let shutdown = shutdown_tx.clone();
            tokio::spawn(async move { signal_task(shutdown).await })
        };

        let daemon = Daemon::from_config(&config, base.as_deref());
        let result = daemon.run(shutdown_tx.clone()).await;
        let _ = shutdown_tx.send(());
        handle_join("signal_handler", signal_handle.await)?;
        result
    })
}

/// One dispatch of `mode` using the environment's config. Blocks until every
/// script has returned.
pub fn dispatch_blocking(mode: ColorMode, trigger: Trigger) -> Result<DispatchSummary, DaemonError> {
    let base = paths::base_dir_from_env();
    let config = load_config(base.as_deref());
    let dispatcher = dispatcher_from_config(&config, base.as_deref());
    Ok(build_runtime()?.block_on(dispatcher.dispatch(mode, trigger)))
}

/// Report the current mode, then every change of it, until Ctrl-C or SIGTERM.
/// No scripts are run.
pub fn watch_blocking<F>(mut on_mode: F) -> Result<(), DaemonError>
where
    F: FnMut(ColorMode) + Send,
{
    let base = paths::base_dir_from_env();
    let config = load_config(base.as_deref());
    let appearance = native_appearance();

    build_runtime()?.block_on(async move {
        let (shutdown_tx, _) = broadcast::channel::<()>(16);
        let mut shutdown_rx = shutdown_tx.subscribe();
        let signal_handle = {
            let shutdown = shutdown_tx.clone();
            tokio::spawn(async move { signal_task(shutdown).await })
        };

        let fallback = config.fallback_mode;
        let current = move |appearance: Arc<dyn AppearanceQuery>| async move {
            query_off_thread(appearance).await.unwrap_or_else(|err| {
                tracing::warn!(error = %err, fallback = %fallback, "could not query appearance");
                fallback
            })
        };

        let mut last = current(appearance.clone()).await;
        on_mode(last);

        let (change_tx, mut change_rx) = mpsc::unbounded_channel::<()>();
        let (source, fallback) = configured_sources(appearance.clone(), &config);
        let mut source = SupervisedSource::start(
            source,
            fallback,
            Box::new(move |source: &mut dyn EventSource| {
                let change_tx = change_tx.clone();
                source.on_appearance_changed(Arc::new(move || {
                    let _ = change_tx.send(());
                }));
            }),
            shutdown_tx.clone(),
        );

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => break,
                _ = source.supervise() => {}
                Some(()) = change_rx.recv() => {
                    let mode = current(appearance.clone()).await;
                    if mode != last {
                        on_mode(mode);
                        last = mode;
                    }
                }
            }
        }

        let _ = shutdown_tx.send(());
        source.stop().await;
        handle_join("signal_handler", signal_handle.await)
    })
}

async fn signal_task(shutdown: broadcast::Sender<()>) -> Result<(), DaemonError> {
    let mut shutdown_rx = shutdown.subscribe();

    #[cfg(unix)]
    let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .map_err(|e| io_err("SIGTERM handler", e))?;

    #[cfg(unix)]
    let terminated = terminate.recv();
    #[cfg(not(unix))]
    let terminated = std::future::pending::<Option<()>>();

    tokio::select! {
        _ = shutdown_rx.recv() => Ok(()),
        _ = terminated => {
            tracing::info!("received SIGTERM, shutting down");
            let _ = shutdown.send(());
            Ok(())
        }
        signal = tokio::signal::ctrl_c() => {
            match signal {
                Ok(()) => {
                    tracing::info!("received ctrl-c, shutting down");
                    let _ = shutdown.send(());
                    Ok(())
                }
                Err(err) => Err(io_err("ctrl-c handler", err)),
            }
        }
    }
}

async fn log_rotation_task(
    base: PathBuf,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let mut interval = tokio::time::interval(LOG_ROTATION_INTERVAL);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    interval.tick().await;

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = interval.tick() => {
                let base = base.clone();
                // Rotation problems are logged inside; they never stop the daemon.
                tokio::task::spawn_blocking(move || crate::log_rotation::rotate_daemon_logs(&base))
                    .await
                    .ok();
            }
        }
    }
    Ok(())
}

fn flatten_join(
    name: &str,
    joined: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    joined.map_err(|err| DaemonError::Join(format!("{name}: {err}")))?
}

fn handle_join(
    name: &str,
    joined: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    match joined {
        Ok(inner) => inner,
        Err(err) => Err(DaemonError::Join(format!("{name} task: {err}"))),
    }
}
