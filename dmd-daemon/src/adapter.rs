//! Bridges OS notifications to dispatches.
//!
//! Each notification re-reads the current appearance and fans it out to the
//! scripts. Handlers return immediately; the dispatch runs as its own task so
//! the event source is never blocked by slow scripts.

use std::sync::Arc;

use tokio::task::JoinHandle;

use dmd_core::{ColorMode, DispatchSummary, Trigger};

use crate::appearance::{query_off_thread, AppearanceQuery};
use crate::dispatcher::Dispatcher;

#[derive(Clone)]
pub struct EventAdapter {
    dispatcher: Arc<Dispatcher>,
    appearance: Arc<dyn AppearanceQuery>,
    fallback: ColorMode,
}

impl EventAdapter {
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        appearance: Arc<dyn AppearanceQuery>,
        fallback: ColorMode,
    ) -> Self {
        Self {
            dispatcher,
            appearance,
            fallback,
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn on_wake(&self) -> JoinHandle<DispatchSummary> {
        self.spawn_dispatch(Trigger::Wake)
    }

    pub fn on_appearance_changed(&self) -> JoinHandle<DispatchSummary> {
        self.spawn_dispatch(Trigger::AppearanceChanged)
    }

    /// Query the mode now and dispatch it, waiting for every script.
    pub async fn dispatch_current(&self, trigger: Trigger) -> DispatchSummary {
        let mode = self.current_mode().await;
        self.dispatcher.dispatch(mode, trigger).await
    }

    pub async fn current_mode(&self) -> ColorMode {
        match query_off_thread(self.appearance.clone()).await {
            Ok(mode) => mode,
            Err(err) => {
                tracing::warn!(error = %err, fallback = %self.fallback, "could not query appearance");
                self.fallback
            }
        }
    }

    fn spawn_dispatch(&self, trigger: Trigger) -> JoinHandle<DispatchSummary> {
        let adapter = self.clone();
        tokio::spawn(async move {
            tracing::debug!(trigger = %trigger, "dispatch requested");
            adapter.dispatch_current(trigger).await
        })
    }
}
