//! # Status Polling Ingestor
//!
//! A self-scheduling poller for the backend's aggregate status endpoint. It runs
//! only while the connection manager is in fallback, and is cancelled through the
//! token it was started with. A period in which the AI engine is not believed
//! active is skipped without a request.
//!
//! Each poll response is split into the same events the push channel would have
//! delivered (AI status, mode summary, signal phase) and routed through the
//! dispatcher.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::core::ai_status::AiStatusTracker;
use crate::core::connection_manager::BackendSource;
use crate::core::dispatcher::Dispatcher;
use crate::errors::CallResult;
use crate::models::events::PushEvent;
use crate::models::signal::SignalUpdate;
use crate::models::status::{StatusSnapshot, SystemModeUpdate};

/// # Poll Result
///
/// The outcome of one successful poll: events to dispatch, and how long to wait
/// before the next one.
pub struct PollResult {
    /// Events derived from the response, in dispatch order.
    pub events: Vec<PushEvent>,
    /// Delay before the next poll.
    pub next_delay: Duration,
}

/// # Status Poller
pub struct StatusPoller {
    /// Where the status comes from.
    source: Arc<dyn BackendSource>,
    /// Where the derived events go.
    dispatcher: Arc<Dispatcher>,
    /// Nominal period.
    interval: Duration,
    /// Gates each poll on the engine being believed active.
    ai: Arc<AiStatusTracker>,
}

impl StatusPoller {
    /// Creates a poller with a fixed period.
    pub fn new(
        source: Arc<dyn BackendSource>,
        dispatcher: Arc<Dispatcher>,
        interval: Duration,
        ai: Arc<AiStatusTracker>,
    ) -> Self {
        Self { source, dispatcher, interval, ai }
    }

    /// # Main Execution Loop
    ///
    /// Waits one period, polls, dispatches, repeats. A period in which the AI
    /// engine is inactive makes no request. Failed polls are logged and retried
    /// after one period. Cancellation is honored both while waiting and
    /// while a request is in flight; an abandoned response is never dispatched.
    pub async fn run(&self, token: CancellationToken) {
        log::info!("Status polling started (every {}ms).", self.interval.as_millis());
        let mut delay = self.interval;

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }

            if !self.ai.snapshot().active {
                log::debug!("AI engine inactive; skipping status poll.");
                delay = self.interval;
                continue;
            }

            let polled = tokio::select! {
                _ = token.cancelled() => break,
                res = self.execute_poll() => res,
            };

            match polled {
                Ok(result) => {
                    for event in result.events {
                        let kind = event.kind();
                        if let Err(e) = self.dispatcher.dispatch(event) {
                            log::debug!("Polled {:?} event not routed: {}", kind, e);
                        }
                    }
                    delay = result.next_delay;
                }
                Err(e) => {
                    log::warn!("Status poll failed: {}. Retrying in {}ms.", e, self.interval.as_millis());
                    delay = self.interval;
                }
            }
        }
        log::info!("Status polling stopped.");
    }

    /// # Execute Poll
    ///
    /// One request to the status endpoint, normalized into events.
    pub async fn execute_poll(&self) -> CallResult<PollResult> {
        let snapshot = self.source.status().await?;
        Ok(PollResult { events: snapshot_events(snapshot), next_delay: self.interval })
    }
}

/// Splits a status response into dispatchable events.
pub fn snapshot_events(snapshot: StatusSnapshot) -> Vec<PushEvent> {
    let mut events = Vec::with_capacity(3);
    if let Some(patch) = snapshot.ai_engine.filter(|p| !p.is_empty()) {
        events.push(PushEvent::AiStatus(patch));
    }
    if snapshot.demo_mode.is_some() || snapshot.esp32_online_count.is_some() {
        events.push(PushEvent::SystemMode(SystemModeUpdate {
            demo_mode: snapshot.demo_mode,
            esp32_online_count: snapshot.esp32_online_count,
            ai_engine_active: None,
        }));
    }
    if let Some(light) = snapshot.light {
        events.push(PushEvent::Signal(SignalUpdate { camera: snapshot.camera, ..SignalUpdate::phase_only(light) }));
    }
    events
}
