#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use dmd_core::{ColorMode, Trigger};
use dmd_daemon::events::Subscriptions;
use dmd_daemon::{
    DaemonError, Daemon, DaemonState, Dispatcher, EventAdapter, EventSource, ManualAppearance,
    ScriptExecutor, ScriptLocator, SystemEvent,
};
use tempfile::TempDir;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_test::{assert_ok, assert_pending};

/// Event source whose notifications are pushed by the test.
struct ChannelSource {
    subscriptions: Subscriptions,
    events: mpsc::UnboundedReceiver<SystemEvent>,
}

impl EventSource for ChannelSource {
    fn name(&self) -> &'static str {
        "channel"
    }

    fn subscriptions_mut(&mut self) -> &mut Subscriptions {
        &mut self.subscriptions
    }

    fn start(
        self: Box<Self>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> JoinHandle<Result<(), DaemonError>> {
        let ChannelSource {
            subscriptions,
            mut events,
        } = *self;
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => return Ok(()),
                    Some(event) = events.recv() => {
                        subscriptions.fire(event);
                    }
                }
            }
        })
    }
}

fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write script");
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod");
    path
}

fn read_lines(path: &Path) -> Vec<String> {
    fs::read_to_string(path)
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect()
}

async fn wait_for_lines(path: &Path, expected: usize) -> Vec<String> {
    for _ in 0..250 {
        let lines = read_lines(path);
        if lines.len() >= expected {
            return lines;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    read_lines(path)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn daemon_runs_scripts_on_startup_and_on_every_event() {
    let base = TempDir::new().expect("base");
    let scripts = base.path().join("scripts");
    fs::create_dir_all(&scripts).expect("mkdir scripts");
    let log = base.path().join("modes.log");

    write_script(
        &scripts,
        "10-record.sh",
        &format!("echo \"$DMD_COLOR_MODE\" >> '{}'", log.display()),
    );
    write_script(&scripts, "20-fail.sh", "exit 7");
    fs::write(scripts.join("notes.txt"), "not executable").expect("write notes");

    let appearance = Arc::new(ManualAppearance::mode(ColorMode::Dark));
    let dispatcher = Dispatcher::new(
        ScriptLocator::with_base_dir(base.path()),
        ScriptExecutor::new(),
    );
    let adapter = EventAdapter::new(Arc::new(dispatcher), appearance.clone(), ColorMode::Light);

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let source = ChannelSource {
        subscriptions: Subscriptions::default(),
        events: events_rx,
    };

    let (shutdown_tx, _) = broadcast::channel(4);
    let running = Daemon::new(adapter, Box::new(source))
        .start(shutdown_tx.clone())
        .await;

    assert_eq!(running.state(), DaemonState::Running);
    let startup = running.startup_summary();
    assert_eq!(startup.trigger, Trigger::Startup);
    assert_eq!(startup.mode, ColorMode::Dark);
    assert_eq!(startup.notified, 2);
    assert_eq!(startup.failed, 1);
    assert_eq!(read_lines(&log), vec!["dark"]);

    let mut waiting = tokio_test::task::spawn(running.wait());
    assert_pending!(waiting.poll());

    appearance.set_mode(ColorMode::Light);
    events_tx
        .send(SystemEvent::AppearanceChanged)
        .expect("send change");
    assert_eq!(wait_for_lines(&log, 2).await, vec!["dark", "light"]);

    // A script added while running is picked up by the next dispatch.
    write_script(
        &scripts,
        "30-late.sh",
        &format!("echo \"late-$DMD_COLOR_MODE\" >> '{}'", log.display()),
    );
    events_tx.send(SystemEvent::Wake).expect("send wake");
    let mut lines = wait_for_lines(&log, 4).await;
    lines.sort();
    assert_eq!(lines, vec!["dark", "late-light", "light", "light"]);

    assert_pending!(waiting.poll());
    shutdown_tx.send(()).expect("shutdown");
    assert_ok!(waiting.await);
}
