//! Portable event source: periodic appearance queries plus clock-gap wake
//! detection. Used where no native notification exists, and as the fallback
//! when a native source breaks down.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use dmd_core::ColorMode;

use crate::appearance::{query_off_thread, AppearanceQuery};
use crate::error::DaemonError;
use crate::events::{EventSource, Subscriptions, SystemEvent, WakeDetector};
use crate::paths::WAKE_GAP_THRESHOLD;

pub struct PollingSource {
    appearance: Arc<dyn AppearanceQuery>,
    interval: Duration,
    wake_threshold: Duration,
    subscriptions: Subscriptions,
}

impl PollingSource {
    pub fn new(appearance: Arc<dyn AppearanceQuery>, interval: Duration) -> Self {
        Self {
            appearance,
            interval,
            wake_threshold: WAKE_GAP_THRESHOLD,
            subscriptions: Subscriptions::default(),
        }
    }

    pub fn with_wake_threshold(mut self, threshold: Duration) -> Self {
        self.wake_threshold = threshold;
        self
    }
}

impl EventSource for PollingSource {
    fn name(&self) -> &'static str {
        "polling"
    }

    fn subscriptions_mut(&mut self) -> &mut Subscriptions {
        &mut self.subscriptions
    }

    fn start(
        self: Box<Self>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> JoinHandle<Result<(), DaemonError>> {
        let PollingSource {
            appearance,
            interval,
            wake_threshold,
            subscriptions,
        } = *self;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            let mut wake = WakeDetector::new(wake_threshold);
            let mut last_mode = observe_mode(&appearance).await;
            tracing::info!(
                interval_ms = interval.as_millis() as u64,
                mode = ?last_mode,
                "polling for appearance changes"
            );

            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    _ = ticker.tick() => {
                        if wake.check() {
                            tracing::info!("clock gap detected, treating as wake");
                            subscriptions.fire(SystemEvent::Wake);
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

/// A change needs a known previous mode; the first successful read only
/// establishes the baseline.
pub(crate) fn mode_changed(previous: Option<ColorMode>, current: ColorMode) -> bool {
    matches!(previous, Some(previous) if previous != current)
}

pub(crate) async fn observe_mode(appearance: &Arc<dyn AppearanceQuery>) -> Option<ColorMode> {
    match query_off_thread(appearance.clone()).await {
        Ok(mode) => Some(mode),
        Err(err) => {
            tracing::warn!(error = %err, "appearance query failed");
            None
        }
    }
}
