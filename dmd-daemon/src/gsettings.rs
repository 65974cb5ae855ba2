//! GNOME event source: every line printed by `gsettings monitor` on the
//! color-scheme key is an appearance change. Wake comes from the clock-gap
//! detector, polled alongside.

use std::ffi::OsString;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::appearance::{GNOME_COLOR_SCHEME_KEY, GNOME_INTERFACE_SCHEMA};
use crate::error::{io_err, DaemonError};
use crate::events::{EventSource, Subscriptions, SystemEvent, WakeDetector};
use crate::paths::WAKE_GAP_THRESHOLD;

const SOURCE_NAME: &str = "gsettings";
const WAKE_CHECK_INTERVAL: Duration = Duration::from_secs(5);

pub struct GsettingsMonitorSource {
    program: OsString,
    args: Vec<OsString>,
    wake_threshold: Duration,
    subscriptions: Subscriptions,
}

impl Default for GsettingsMonitorSource {
    fn default() -> Self {
        Self::with_command(
            "gsettings",
            ["monitor", GNOME_INTERFACE_SCHEMA, GNOME_COLOR_SCHEME_KEY],
        )
    }
}

impl GsettingsMonitorSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Monitor an arbitrary line-printing command instead of `gsettings`.
    pub fn with_command<I, S>(program: impl Into<OsString>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            wake_threshold: WAKE_GAP_THRESHOLD,
            subscriptions: Subscriptions::default(),
        }
    }
}

impl EventSource for GsettingsMonitorSource {
    fn name(&self) -> &'static str {
        SOURCE_NAME
    }

    fn subscriptions_mut(&mut self) -> &mut Subscriptions {
        &mut self.subscriptions
    }

    fn start(
        self: Box<Self>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> JoinHandle<Result<(), DaemonError>> {
        let GsettingsMonitorSource {
            program,
            args,
            wake_threshold,
            subscriptions,
        } = *self;

        tokio::spawn(async move {
            let mut child = Command::new(&program)
                .args(&args)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::null())
                .kill_on_drop(true)
                .spawn()
                .map_err(|e| io_err(&program, e))?;

            let stdout = child.stdout.take().ok_or_else(|| DaemonError::EventSource {
                source_name: SOURCE_NAME,
                reason: "monitor stdout was not captured".to_string(),
            })?;
            let mut lines = BufReader::new(stdout).lines();

            let mut ticker = tokio::time::interval(WAKE_CHECK_INTERVAL);
            ticker.tick().await;
            let mut wake = WakeDetector::new(wake_threshold);
            tracing::info!(program = ?program, "monitoring appearance changes");

            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    _ = ticker.tick() => {
                        if wake.check() {
                            tracing::info!("clock gap detected, treating as wake");
                            subscriptions.fire(SystemEvent::Wake);
                        }
                    }
                    line = lines.next_line() => {
                        match line.map_err(|e| io_err(&program, e))? {
                            Some(line) => {
                                tracing::debug!(line = %line.trim(), "monitor reported a change");
                                subscriptions.fire(SystemEvent::AppearanceChanged);
                            }
                            None => {
                                return Err(DaemonError::EventSource {
                                    source_name: SOURCE_NAME,
                                    reason: "monitor process closed its output".to_string(),
                                });
                            }
                        }
                    }
                }
            }

            let _ = child.start_kill();
            Ok(())
        })
    }
}
