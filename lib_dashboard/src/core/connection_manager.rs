//! # Connection Manager
//!
//! Owns the push-channel lifecycle and its HTTP-poll fallback.
//!
//! ## State machine
//!
//! ```text
//! Disconnected --start()--> Connecting --push ok--> PushConnected
//!                               |                      |  ^
//!                          push failed            dropped | push ok
//!                               v                      v  |
//!                           PollFallback <-------------+--+
//! ```
//!
//! - Polling runs only in `PollFallback`. It is started the moment the push channel
//!   fails or drops and cancelled the moment it reports connected. Within fallback a
//!   poll is made only while the AI engine is believed active.
//! - Push attempts use a fixed delay. After the configured number of consecutive
//!   failed retries the manager stays in `PollFallback` until [`retrigger`] is called.
//! - A connected channel that stays silent past the inactivity timeout is treated
//!   as dropped.
//! - [`stop`] cancels every task this manager spawned and waits for them, so no
//!   frame or poll result is dispatched after it returns.
//!
//! [`retrigger`]: ConnectionManager::retrigger
//! [`stop`]: ConnectionManager::stop

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use serde::Serialize;
use tokio::sync::{watch, Notify};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::configs::ConnectionSettings;
use crate::core::ai_status::AiStatusTracker;
use crate::core::dispatcher::Dispatcher;
use crate::errors::{CallResult, PushError};
use crate::ingestors::status_polling::StatusPoller;
use crate::models::status::{BootstrapPayload, StatusSnapshot};

/// One item read from the push channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushFrame {
    /// A JSON text frame.
    Text(String),
    /// Keep-alive traffic with no payload.
    Heartbeat,
}

/// An established push channel.
pub type PushStream = BoxStream<'static, Result<PushFrame, PushError>>;

/// Opens push channels.
pub trait PushConnector: Send + Sync {
    /// Connects and resolves to the frame stream.
    fn connect(&self) -> BoxFuture<'_, Result<PushStream, PushError>>;
}

/// The backend calls the engine needs at boot and in fallback.
pub trait BackendSource: Send + Sync {
    /// The one-shot startup snapshot.
    fn bootstrap(&self) -> BoxFuture<'_, CallResult<BootstrapPayload>>;
    /// The aggregate status polled in fallback.
    fn status(&self) -> BoxFuture<'_, CallResult<StatusSnapshot>>;
    /// Mirrors an operator deletion to the backend. Sources without a remote
    /// store accept it unconditionally.
    fn delete_violation<'a>(&'a self, remote_id: &'a str) -> BoxFuture<'a, CallResult<()>> {
        let _ = remote_id;
        Box::pin(async { Ok(()) })
    }
}

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConnectionState {
    /// Not started, or stopped.
    Disconnected,
    /// First push attempt in flight.
    Connecting,
    /// Push channel up; no polling.
    PushConnected,
    /// Push channel down; polling.
    PollFallback,
}

#[derive(Default)]
struct Tokens {
    /// Cancels everything started by the current `start()`.
    root: Option<CancellationToken>,
    /// Cancels the running poll loop.
    poll: Option<CancellationToken>,
}

/// The manager.
pub struct ConnectionManager {
    settings: ConnectionSettings,
    connector: Arc<dyn PushConnector>,
    poller: Arc<StatusPoller>,
    dispatcher: Arc<Dispatcher>,
    state_tx: watch::Sender<ConnectionState>,
    tokens: Mutex<Tokens>,
    tracker: TaskTracker,
    retrigger: Notify,
    exhausted: AtomicBool,
}

impl ConnectionManager {
    /// Builds a stopped manager.
    pub fn new(
        settings: ConnectionSettings,
        connector: Arc<dyn PushConnector>,
        source: Arc<dyn BackendSource>,
        dispatcher: Arc<Dispatcher>,
        ai: Arc<AiStatusTracker>,
    ) -> Self {
        let poller = Arc::new(StatusPoller::new(source, dispatcher.clone(), settings.poll_interval(), ai));
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            settings,
            connector,
            poller,
            dispatcher,
            state_tx,
            tokens: Mutex::new(Tokens::default()),
            tracker: TaskTracker::new(),
            retrigger: Notify::new(),
            exhausted: AtomicBool::new(false),
        }
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    /// State notifications.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Starts the supervisor. A second call while running is ignored.
    pub fn start(self: &Arc<Self>) {
        let root = {
            let mut tokens = self.tokens.lock().unwrap_or_else(PoisonError::into_inner);
            if tokens.root.as_ref().is_some_and(|t| !t.is_cancelled()) {
                log::warn!("Connection manager already started.");
                return;
            }
            let root = CancellationToken::new();
            tokens.root = Some(root.clone());
            root
        };
        self.tracker.reopen();
        self.set_state(ConnectionState::Connecting);
        let this = Arc::clone(self);
        self.tracker.spawn(async move { this.supervise(root).await });
    }

    /// Cancels the supervisor, any pending retry and the poll loop, and waits for them.
    pub async fn stop(&self) {
        {
            let mut tokens = self.tokens.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(root) = tokens.root.take() {
                root.cancel();
            }
            tokens.poll = None;
        }
        self.tracker.close();
        self.tracker.wait().await;
        self.exhausted.store(false, Ordering::SeqCst);
        self.set_state(ConnectionState::Disconnected);
        log::info!("Connection manager stopped.");
    }

    /// Resumes push attempts after they were exhausted. Returns false if the
    /// manager was not waiting for a retrigger.
    pub fn retrigger(&self) -> bool {
        if self.exhausted.swap(false, Ordering::SeqCst) {
            log::info!("Push reconnection retriggered.");
            self.retrigger.notify_waiters();
            true
        } else {
            log::debug!("Retrigger ignored; push attempts are not exhausted.");
            false
        }
    }

    /// Records a push-channel success and stops polling. Returns false (and does
    /// nothing) if already connected.
    pub fn mark_push_connected(&self) -> bool {
        if self.state() == ConnectionState::PushConnected {
            log::debug!("Duplicate push-connected notification ignored.");
            return false;
        }
        if let Some(poll) = self.tokens.lock().unwrap_or_else(PoisonError::into_inner).poll.take() {
            poll.cancel();
        }
        self.set_state(ConnectionState::PushConnected);
        true
    }

    /// Records a push-channel failure and makes sure the poll loop runs.
    fn enter_fallback(&self, root: &CancellationToken) {
        if root.is_cancelled() {
            return;
        }
        self.set_state(ConnectionState::PollFallback);

        let child = {
            let mut tokens = self.tokens.lock().unwrap_or_else(PoisonError::into_inner);
            if tokens.poll.as_ref().is_some_and(|t| !t.is_cancelled()) {
                return;
            }
            let child = root.child_token();
            tokens.poll = Some(child.clone());
            child
        };
        let poller = Arc::clone(&self.poller);
        self.tracker.spawn(async move { poller.run(child).await });
    }

    fn set_state(&self, next: ConnectionState) {
        self.state_tx.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            log::info!("Connection {:?} -> {:?}", *current, next);
            *current = next;
            true
        });
    }

    async fn supervise(self: Arc<Self>, root: CancellationToken) {
        let mut failures: u32 = 0;
        loop {
            let attempt = tokio::select! {
                _ = root.cancelled() => break,
                res = self.connector.connect() => res,
            };

            match attempt {
                Ok(stream) => {
                    failures = 0;
                    self.mark_push_connected();
                    let reason = self.pump(stream, &root).await;
                    if root.is_cancelled() {
                        break;
                    }
                    log::warn!("Push channel dropped: {}", reason);
                    self.enter_fallback(&root);
                }
                Err(e) => {
                    failures += 1;
                    log::warn!("Push connect attempt {} failed: {}", failures, e);
                    self.enter_fallback(&root);

                    if failures > self.settings.reconnect_attempts {
                        log::warn!(
                            "Push reconnection gave up after {} attempts; staying on poll fallback.",
                            failures
                        );
                        let notified = self.retrigger.notified();
                        self.exhausted.store(true, Ordering::SeqCst);
                        tokio::select! {
                            _ = root.cancelled() => break,
                            _ = notified => {}
                        }
                        failures = 0;
                        continue;
                    }
                }
            }

            tokio::select! {
                _ = root.cancelled() => break,
                _ = tokio::time::sleep(self.settings.reconnect_delay()) => {}
            }
        }
        log::debug!("Push supervisor exited.");
    }

    /// Forwards frames until the channel fails, goes silent or is cancelled.
    async fn pump(&self, mut stream: PushStream, root: &CancellationToken) -> PushError {
        let silent_limit = self.settings.silent_failure_timeout();
        let mut last_activity = Instant::now();

        loop {
            tokio::select! {
                _ = root.cancelled() => return PushError::Closed,
                item = stream.next() => match item {
                    Some(Ok(PushFrame::Text(text))) => {
                        last_activity = Instant::now();
                        let _ = self.dispatcher.dispatch_frame(&text);
                    }
                    Some(Ok(PushFrame::Heartbeat)) => last_activity = Instant::now(),
                    Some(Err(e)) => return e,
                    None => return PushError::Closed,
                },
                // Watchdog: a silent channel is as good as a dead one.
                _ = tokio::time::sleep(Duration::from_secs(1)) => {
                    if !silent_limit.is_zero() && last_activity.elapsed() > silent_limit {
                        log::warn!("Push channel silent for {}s.", silent_limit.as_secs());
                        return PushError::Closed;
                    }
                }
            }
        }
    }
}
