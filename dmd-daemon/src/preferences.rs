//! macOS event source: watches the global preferences plist, which the
//! system rewrites whenever the interface style flips. Writes to that file
//! are frequent and unrelated to appearance, so each one is confirmed with
//! an appearance query before anything fires.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{recommended_watcher, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::appearance::AppearanceQuery;
use crate::error::{io_err, DaemonError};
use crate::events::{EventSource, Subscriptions, SystemEvent, WakeDetector};
use crate::paths::{GLOBAL_PREFERENCES_FILE, PREFERENCES_DEBOUNCE, WAKE_GAP_THRESHOLD};
use crate::polling::{mode_changed, observe_mode};

const SOURCE_NAME: &str = "preferences";
const WAKE_CHECK_INTERVAL: Duration = Duration::from_secs(5);

pub struct PreferencesWatchSource {
    preferences_dir: PathBuf,
    appearance: Arc<dyn AppearanceQuery>,
    wake_threshold: Duration,
    subscriptions: Subscriptions,
}

impl PreferencesWatchSource {
    pub fn new(preferences_dir: impl Into<PathBuf>, appearance: Arc<dyn AppearanceQuery>) -> Self {
        Self {
            preferences_dir: preferences_dir.into(),
            appearance,
            wake_threshold: WAKE_GAP_THRESHOLD,
            subscriptions: Subscriptions::default(),
        }
    }
}

impl EventSource for PreferencesWatchSource {
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
        let PreferencesWatchSource {
            preferences_dir,
            appearance,
            wake_threshold,
            subscriptions,
        } = *self;

        tokio::spawn(async move {
            // FSEvents reports canonical paths (/private/var/...), so match against those.
            let preferences_dir = std::fs::canonicalize(&preferences_dir)
                .map_err(|e| io_err(&preferences_dir, e))?;

            let (event_tx, mut event_rx) = mpsc::unbounded_channel::<notify::Result<Event>>();
            let mut _watcher: RecommendedWatcher = recommended_watcher(move |event| {
                let _ = event_tx.send(event);
            })?;
            _watcher.watch(&preferences_dir, RecursiveMode::NonRecursive)?;

            let mut ticker = tokio::time::interval(WAKE_CHECK_INTERVAL);
            ticker.tick().await;
            let mut wake = WakeDetector::new(wake_threshold);
            let mut last_mode = observe_mode(&appearance).await;
            let mut last_seen: Option<Instant> = None;
            tracing::info!(
                dir = %preferences_dir.display(),
                mode = ?last_mode,
                "watching global preferences"
            );

            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    _ = ticker.tick() => {
                        if wake.check() {
                            tracing::info!("clock gap detected, treating as wake");
                            subscriptions.fire(SystemEvent::Wake);
                        }
                    }
                    event = event_rx.recv() => {
                        let Some(event) = event else {
                            return Err(DaemonError::EventSource {
                                source_name: SOURCE_NAME,
                                reason: "file watcher channel closed".to_string(),
                            });
                        };
                        let event = match event {
                            Ok(event) => event,
                            Err(err) => {
                                tracing::warn!(error = %err, "watcher event error");
                                continue;
                            }
                        };
                        if !is_relevant_event_kind(&event.kind)
                            || !event.paths.iter().any(|path| is_global_preferences(path))
                        {
                            continue;
                        }
                        if !should_process_event(&mut last_seen, Instant::now(), PREFERENCES_DEBOUNCE) {
                            continue;
                        }

                        let Some(mode) = observe_mode(&appearance).await else { continue };
                        if mode_changed(last_mode, mode) {
                            tracing::info!(mode = %mode, "appearance changed");
                            subscriptions.fire(SystemEvent::AppearanceChanged);
                        }
                        last_mode = Some(mode);
                    }
                }
            }

            Ok(())
        })
    }
}

fn is_relevant_event_kind(kind: &EventKind) -> bool {
    matches!(kind, EventKind::Create(_) | EventKind::Modify(_))
}

fn is_global_preferences(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(|name| name == GLOBAL_PREFERENCES_FILE)
        .unwrap_or(false)
}

fn should_process_event(last_seen: &mut Option<Instant>, now: Instant, threshold: Duration) -> bool {
    match last_seen {
        Some(seen_at) if now.duration_since(*seen_at) < threshold => false,
        _ => {
            *last_seen = Some(now);
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::appearance::ManualAppearance;
    use dmd_core::ColorMode;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    #[test]
    fn only_the_global_preferences_file_matters() {
        assert!(is_global_preferences(Path::new(
            "/Users/someone/Library/Preferences/.GlobalPreferences.plist"
        )));
        assert!(!is_global_preferences(Path::new(
            "/Users/someone/Library/Preferences/com.apple.finder.plist"
        )));
    }

    #[test]
    fn debounce_drops_events_inside_the_window() {
        let start = Instant::now();
        let mut last_seen = None;
        let window = Duration::from_millis(500);

        assert!(should_process_event(&mut last_seen, start, window));
        assert!(!should_process_event(
            &mut last_seen,
            start + Duration::from_millis(100),
            window
        ));
        assert!(should_process_event(
            &mut last_seen,
            start + Duration::from_millis(600),
            window
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn plist_write_with_new_mode_fires_once() {
        let prefs = TempDir::new().expect("prefs dir");
        let plist = prefs.path().join(GLOBAL_PREFERENCES_FILE);
        std::fs::write(&plist, b"light").expect("seed plist");

        let appearance = Arc::new(ManualAppearance::mode(ColorMode::Light));
        let changes = Arc::new(AtomicUsize::new(0));
        let mut source = Box::new(PreferencesWatchSource::new(
            prefs.path(),
            appearance.clone(),
        ));
        let counter = changes.clone();
        source.on_appearance_changed(Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        let (shutdown_tx, _) = broadcast::channel(4);
        let handle = source.start(shutdown_tx.subscribe());
        tokio::time::sleep(Duration::from_millis(300)).await;

        // Unrelated file and unchanged mode: nothing fires.
        std::fs::write(prefs.path().join("com.example.plist"), b"x").expect("other plist");
        std::fs::write(&plist, b"still light").expect("touch plist");
        tokio::time::sleep(Duration::from_millis(700)).await;
        assert_eq!(changes.load(Ordering::SeqCst), 0);

        appearance.set_mode(ColorMode::Dark);
        std::fs::write(&plist, b"dark").expect("rewrite plist");

        let deadline = Instant::now() + Duration::from_secs(5);
        while changes.load(Ordering::SeqCst) == 0 && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        assert_eq!(changes.load(Ordering::SeqCst), 1);

        shutdown_tx.send(()).expect("send shutdown");
        handle.await.expect("join").expect("source result");
    }
}
