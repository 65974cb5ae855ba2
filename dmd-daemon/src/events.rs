//! Event source capability: the two OS notifications the daemon reacts to.
//!
//! Platform layers implement [`EventSource`]; the daemon only registers
//! callbacks and starts the source, so dispatch logic never touches OS APIs.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::error::DaemonError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SystemEvent {
    Wake,
    AppearanceChanged,
}

impl fmt::Display for SystemEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SystemEvent::Wake => write!(f, "wake"),
            SystemEvent::AppearanceChanged => write!(f, "appearance-changed"),
        }
    }
}

pub type EventCallback = Arc<dyn Fn() + Send + Sync>;

/// Registered callbacks, grouped by event.
#[derive(Clone, Default)]
pub struct Subscriptions {
    wake: Vec<EventCallback>,
    appearance: Vec<EventCallback>,
}

impl Subscriptions {
    pub fn register(&mut self, event: SystemEvent, callback: EventCallback) {
        match event {
            SystemEvent::Wake => self.wake.push(callback),
            SystemEvent::AppearanceChanged => self.appearance.push(callback),
        }
    }

    /// Invoke every callback for `event`; returns how many ran.
    pub fn fire(&self, event: SystemEvent) -> usize {
        let callbacks = match event {
            SystemEvent::Wake => &self.wake,
            SystemEvent::AppearanceChanged => &self.appearance,
        };
        tracing::debug!(%event, subscribers = callbacks.len(), "delivering event");
        for callback in callbacks {
            callback();
        }
        callbacks.len()
    }
}

impl fmt::Debug for Subscriptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriptions")
            .field("wake", &self.wake.len())
            .field("appearance", &self.appearance.len())
            .finish()
    }
}

/// Something that delivers wake and appearance-change notifications.
pub trait EventSource: Send {
    fn name(&self) -> &'static str;

    fn subscriptions_mut(&mut self) -> &mut Subscriptions;

    fn on_wake(&mut self, callback: EventCallback) {
        self.subscriptions_mut()
            .register(SystemEvent::Wake, callback);
    }

    fn on_appearance_changed(&mut self, callback: EventCallback) {
        self.subscriptions_mut()
            .register(SystemEvent::AppearanceChanged, callback);
    }

    /// Start delivering events on the current runtime until `shutdown` fires.
    ///
    /// The task resolves `Ok(())` on shutdown and `Err` when the source
    /// itself broke down.
    fn start(self: Box<Self>, shutdown: broadcast::Receiver<()>)
        -> JoinHandle<Result<(), DaemonError>>;
}

/// Detects sleep by comparing wall-clock progress with monotonic progress.
///
/// The monotonic clock stops while the machine sleeps; the wall clock does
/// not. A gap larger than the threshold between two observations means the
/// machine was asleep in between.
#[derive(Debug, Clone)]
pub struct WakeDetector {
    last_wall: SystemTime,
    last_mono: Instant,
    threshold: Duration,
}

impl WakeDetector {
    pub fn new(threshold: Duration) -> Self {
        Self::starting_at(SystemTime::now(), Instant::now(), threshold)
    }

    pub fn starting_at(wall: SystemTime, mono: Instant, threshold: Duration) -> Self {
        Self {
            last_wall: wall,
            last_mono: mono,
            threshold,
        }
    }

    pub fn check(&mut self) -> bool {
        self.observe(SystemTime::now(), Instant::now())
    }

    pub fn observe(&mut self, wall: SystemTime, mono: Instant) -> bool {
        // A wall clock that went backwards (NTP, manual change) is not a wake.
        let wall_elapsed = wall.duration_since(self.last_wall).unwrap_or_default();
        let mono_elapsed = mono.saturating_duration_since(self.last_mono);
        self.last_wall = wall;
        self.last_mono = mono;

        wall_elapsed.saturating_sub(mono_elapsed) > self.threshold
    }
}
