//! # Dashboard Engine
//!
//! The composition root. `DashboardEngine` owns every state holder, registers
//! each one as the dispatcher sink for the event kinds it consumes, and runs the
//! engine's own timers:
//!
//! - the signal clock, one `tick()` per configured period;
//! - the red-phase trigger, which schedules a demo spawn after a jittered delay
//!   whenever the signal turns red in demo mode;
//! - the ambient spawner, which occasionally records a demo violation while the
//!   signal is red, the mode is demo and the AI engine is idle.
//!
//! Every task is tracked, so [`DashboardEngine::shutdown`] returns only once none
//! of them can touch state any more.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::configs::EngineConfig;
use crate::core::{
    AiStatusTracker, BackendSource, ConnectionManager, DeviceTracker, Dispatcher, EventSink, ModeArbiter,
    PhaseChange, PushConnector, SignalCycle, SystemLogBook, SystemMode,
};
use crate::errors::RequestFailure;
use crate::ledger::{DeleteOutcome, ViolationLedger};
use crate::models::events::{EventKind, PushEvent};
use crate::models::signal::SignalPhase;
use crate::models::status::{BootstrapPayload, SystemModeUpdate};
use crate::models::violation::{ViolationCandidate, ViolationRecord, ViolationSource};
use crate::simulation::DemoSynthesizer;

/// Outcome of [`DashboardEngine::boot`].
#[derive(Debug, Clone, PartialEq)]
pub struct BootReport {
    /// Mode after boot.
    pub mode: SystemMode,
    /// Historical violations loaded.
    pub violations_loaded: usize,
    /// Why the bootstrap call failed, if it did.
    pub failure: Option<RequestFailure>,
    /// Theme preferred by the backend.
    pub theme: Option<String>,
}

impl BootReport {
    /// Whether boot fell back to demo defaults.
    pub fn is_degraded(&self) -> bool {
        self.failure.is_some()
    }
}

/// Outcome of an operator deletion.
#[derive(Debug, Clone, PartialEq)]
pub struct DeletionReport {
    /// What happened locally.
    pub outcome: DeleteOutcome,
    /// Set when mirroring the deletion to the backend failed. The local deletion
    /// stands either way.
    pub mirror_failure: Option<RequestFailure>,
}

/// The engine.
pub struct DashboardEngine {
    config: EngineConfig,
    dispatcher: Arc<Dispatcher>,
    signal: Arc<SignalCycle>,
    arbiter: Arc<ModeArbiter>,
    ai: Arc<AiStatusTracker>,
    ledger: Arc<ViolationLedger>,
    devices: Arc<DeviceTracker>,
    log_book: Arc<SystemLogBook>,
    demo: DemoSynthesizer,
    connection: Arc<ConnectionManager>,
    source: Arc<dyn BackendSource>,
    tracker: TaskTracker,
    token: Mutex<Option<CancellationToken>>,
}

impl DashboardEngine {
    /// Wires every component. Nothing runs until [`start`](Self::start).
    pub fn new(
        config: EngineConfig,
        connector: Arc<dyn PushConnector>,
        source: Arc<dyn BackendSource>,
    ) -> Self {
        Self::with_ledger(config, connector, source, ViolationLedger::new())
    }

    /// Like [`new`](Self::new), with a caller-built ledger (e.g. on a test clock).
    pub fn with_ledger(
        config: EngineConfig,
        connector: Arc<dyn PushConnector>,
        source: Arc<dyn BackendSource>,
        ledger: ViolationLedger,
    ) -> Self {
        let dispatcher = Arc::new(Dispatcher::new());
        let signal = Arc::new(SignalCycle::new(config.signal));
        let arbiter = Arc::new(ModeArbiter::new());
        let ai = Arc::new(AiStatusTracker::new());
        let ledger = Arc::new(ledger);
        let devices = Arc::new(DeviceTracker::new());
        let log_book = Arc::new(SystemLogBook::new(config.log_capacity));
        let connection = Arc::new(ConnectionManager::new(
            config.connection.clone(),
            connector,
            source.clone(),
            dispatcher.clone(),
            ai.clone(),
        ));

        register_sinks(&dispatcher, &signal, &arbiter, &ai, &ledger, &devices, &log_book);

        Self {
            demo: DemoSynthesizer::new(config.demo.clone()),
            config,
            dispatcher,
            signal,
            arbiter,
            ai,
            ledger,
            devices,
            log_book,
            connection,
            source,
            tracker: TaskTracker::new(),
            token: Mutex::new(None),
        }
    }

    /// One bootstrap call. Any failure leaves the engine in full demo mode with
    /// an empty ledger.
    pub async fn boot(&self) -> BootReport {
        match self.source.bootstrap().await {
            Ok(payload) => self.apply_bootstrap(payload),
            Err(failure) => {
                log::warn!("Bootstrap failed: {}. Starting in demo mode.", failure);
                self.arbiter.update(Some(0), Some(false));
                BootReport {
                    mode: self.arbiter.mode(),
                    violations_loaded: 0,
                    failure: Some(failure),
                    theme: None,
                }
            }
        }
    }

    fn apply_bootstrap(&self, payload: BootstrapPayload) -> BootReport {
        let violations_loaded = self.ledger.load_history(payload.violations);
        if let Some(patch) = &payload.ai_engine {
            self.ai.merge(patch);
        }
        self.arbiter.system_mode(&SystemModeUpdate {
            demo_mode: payload.demo_mode,
            esp32_online_count: Some(payload.esp32_online_count.unwrap_or(0)),
            ai_engine_active: Some(self.ai.snapshot().active),
        });
        if let Some(traffic) = &payload.traffic {
            self.signal.apply_remote(traffic);
        }
        self.devices.seed(payload.devices.iter());
        self.log_book.load_history(&payload.events);

        let report = BootReport {
            mode: self.arbiter.mode(),
            violations_loaded,
            failure: None,
            theme: payload.theme,
        };
        log::info!(
            "Bootstrap complete: mode {:?}, {} violation(s), {} device(s) known.",
            report.mode,
            report.violations_loaded,
            self.devices.snapshot().len()
        );
        report
    }

    /// Starts the connection manager and the engine timers. A second call while
    /// running is ignored.
    pub fn start(self: &Arc<Self>) {
        let token = {
            let mut guard = self.token.lock().unwrap_or_else(PoisonError::into_inner);
            if guard.as_ref().is_some_and(|t| !t.is_cancelled()) {
                log::warn!("Dashboard engine already started.");
                return;
            }
            let token = CancellationToken::new();
            *guard = Some(token.clone());
            token
        };

        self.tracker.reopen();
        self.connection.start();

        // Subscribe before spawning so the first red transition cannot be missed.
        let phases = self.signal.subscribe();
        self.tracker.spawn(Arc::clone(self).run_signal_clock(token.clone()));
        self.tracker.spawn(Arc::clone(self).run_red_trigger(phases, token.clone()));
        self.tracker.spawn(Arc::clone(self).run_ambient_spawner(token));
        log::info!("Dashboard engine started.");
    }

    /// Cancels every timer and the connection manager, and waits for them.
    pub async fn shutdown(&self) {
        if let Some(token) = self.token.lock().unwrap_or_else(PoisonError::into_inner).take() {
            token.cancel();
        }
        self.tracker.close();
        self.connection.stop().await;
        self.tracker.wait().await;
        log::info!("Dashboard engine stopped.");
    }

    async fn run_signal_clock(self: Arc<Self>, token: CancellationToken) {
        let period = self.config.tick();
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    self.signal.tick();
                }
            }
        }
    }

    async fn run_red_trigger(self: Arc<Self>, mut phases: broadcast::Receiver<PhaseChange>, token: CancellationToken) {
        loop {
            let change = tokio::select! {
                _ = token.cancelled() => break,
                recv = phases.recv() => match recv {
                    Ok(change) => change,
                    Err(RecvError::Lagged(n)) => {
                        log::warn!("Red-phase trigger lagged; {} phase change(s) skipped.", n);
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                },
            };

            if change.phase != SignalPhase::Red || self.arbiter.mode() != SystemMode::Demo {
                continue;
            }
            if !self.demo.should_spawn_on_red() {
                continue;
            }

            let delay = self.demo.spawn_delay();
            log::debug!("Demo spawn scheduled in {:?}.", delay);
            let this = Arc::clone(&self);
            let token = token.clone();
            self.tracker.spawn(async move {
                tokio::select! {
                    _ = token.cancelled() => {}
                    _ = tokio::time::sleep(delay) => {
                        this.spawn_demo(false);
                    }
                }
            });
        }
    }

    async fn run_ambient_spawner(self: Arc<Self>, token: CancellationToken) {
        let period = self.config.demo.ambient_interval();
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    self.spawn_demo(true);
                }
            }
        }
    }

    /// Records a demo violation if the signal is red and the mode is still demo.
    /// The ambient path also requires an idle AI engine and wins a dice roll.
    fn spawn_demo(&self, ambient: bool) -> Option<Arc<ViolationRecord>> {
        if self.signal.phase() != SignalPhase::Red || self.arbiter.mode() != SystemMode::Demo {
            return None;
        }
        if ambient && (self.ai.snapshot().active || !self.demo.ambient_roll()) {
            return None;
        }
        Some(self.ledger.record(self.demo.synthesize(), ViolationSource::Demo))
    }

    /// Holds the signal at `phase`.
    pub fn force_signal(&self, phase: SignalPhase) -> PhaseChange {
        self.signal.force_override(phase)
    }

    /// Releases an operator hold. Returns false if none was active.
    pub fn resume_signal(&self) -> bool {
        self.signal.clear_override()
    }

    /// Records an operator-entered violation.
    pub fn record_manual(&self, candidate: ViolationCandidate) -> Arc<ViolationRecord> {
        self.ledger.record(candidate, ViolationSource::Operator)
    }

    /// Deletes violation `id` locally and, for backend-originated records,
    /// mirrors the deletion to the backend.
    pub async fn delete_violation(&self, id: u64) -> DeletionReport {
        let outcome = self.ledger.delete(id);
        let remote_id = match &outcome {
            DeleteOutcome::Removed(record) if record.source == ViolationSource::Server => record.remote_id.clone(),
            _ => None,
        };

        let mirror_failure = match remote_id {
            Some(remote_id) => match self.source.delete_violation(&remote_id).await {
                Ok(()) => None,
                Err(failure) => {
                    log::warn!("Backend delete of violation {} failed: {}", remote_id, failure.user_message());
                    Some(failure)
                }
            },
            None => None,
        };
        DeletionReport { outcome, mirror_failure }
    }

    /// Resumes push reconnection after the attempts were exhausted.
    pub fn retrigger_push(&self) -> bool {
        self.connection.retrigger()
    }

    /// Whether the last AI status is older than the configured threshold.
    pub fn ai_is_stale(&self) -> bool {
        self.ai.is_stale(self.config.ai_stale_after())
    }

    /// Engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The routing table fed by push and poll.
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Signal cycle.
    pub fn signal(&self) -> &Arc<SignalCycle> {
        &self.signal
    }

    /// Mode arbiter.
    pub fn arbiter(&self) -> &Arc<ModeArbiter> {
        &self.arbiter
    }

    /// AI status tracker.
    pub fn ai(&self) -> &Arc<AiStatusTracker> {
        &self.ai
    }

    /// Violation ledger.
    pub fn ledger(&self) -> &Arc<ViolationLedger> {
        &self.ledger
    }

    /// Device tracker.
    pub fn devices(&self) -> &Arc<DeviceTracker> {
        &self.devices
    }

    /// Backend log book.
    pub fn log_book(&self) -> &Arc<SystemLogBook> {
        &self.log_book
    }

    /// Connection manager.
    pub fn connection(&self) -> &Arc<ConnectionManager> {
        &self.connection
    }
}

fn sink<F>(f: F) -> Arc<dyn EventSink>
where
    F: Fn(PushEvent) + Send + Sync + 'static,
{
    Arc::new(f)
}

fn register_sinks(
    dispatcher: &Dispatcher,
    signal: &Arc<SignalCycle>,
    arbiter: &Arc<ModeArbiter>,
    ai: &Arc<AiStatusTracker>,
    ledger: &Arc<ViolationLedger>,
    devices: &Arc<DeviceTracker>,
    log_book: &Arc<SystemLogBook>,
) {
    let s = signal.clone();
    dispatcher.register(
        EventKind::Signal,
        sink(move |event: PushEvent| {
            if let PushEvent::Signal(update) = event {
                s.apply_remote(&update);
            }
        }),
    );

    let l = ledger.clone();
    dispatcher.register(
        EventKind::Violation,
        sink(move |event: PushEvent| {
            if let PushEvent::Violation(candidate) = event {
                l.record(candidate, ViolationSource::Server);
            }
        }),
    );

    let d = devices.clone();
    dispatcher.register(
        EventKind::Device,
        sink(move |event: PushEvent| {
            if let PushEvent::Device(update) = event {
                d.apply(&update);
            }
        }),
    );

    let (t, a) = (ai.clone(), arbiter.clone());
    dispatcher.register(
        EventKind::AiStatus,
        sink(move |event: PushEvent| {
            if let PushEvent::AiStatus(patch) = event {
                t.merge(&patch);
                if let Some(active) = patch.active {
                    a.set_ai_active(active);
                }
            }
        }),
    );

    let a = arbiter.clone();
    dispatcher.register(
        EventKind::FieldDevice,
        sink(move |event: PushEvent| {
            if let PushEvent::FieldDevice(notice) = event {
                a.field_device(&notice);
            }
        }),
    );

    let a = arbiter.clone();
    dispatcher.register(
        EventKind::SystemMode,
        sink(move |event: PushEvent| {
            if let PushEvent::SystemMode(update) = event {
                a.system_mode(&update);
            }
        }),
    );

    let b = log_book.clone();
    dispatcher.register(
        EventKind::Log,
        sink(move |event: PushEvent| {
            if let PushEvent::Log(line) = event {
                b.push(line);
            }
        }),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configs::DemoSettings;
    use crate::core::{ConnectionState, PushStream};
    use crate::errors::{CallResult, PushError};
    use crate::ledger::LedgerCounters;
    use crate::models::status::StatusSnapshot;
    use futures_util::future::BoxFuture;
    use serde_json::json;
    use std::time::Duration;

    struct NoPush;

    impl PushConnector for NoPush {
        fn connect(&self) -> BoxFuture<'_, Result<PushStream, PushError>> {
            Box::pin(async { Err(PushError::Connect("refused".into())) })
        }
    }

    struct ScriptedSource {
        bootstrap: Mutex<Option<CallResult<BootstrapPayload>>>,
        deleted: Mutex<Vec<String>>,
    }

    impl ScriptedSource {
        fn new(bootstrap: CallResult<BootstrapPayload>) -> Arc<Self> {
            Arc::new(Self { bootstrap: Mutex::new(Some(bootstrap)), deleted: Mutex::new(Vec::new()) })
        }
    }

    impl BackendSource for ScriptedSource {
        fn bootstrap(&self) -> BoxFuture<'_, CallResult<BootstrapPayload>> {
            let result = self
                .bootstrap
                .lock()
                .unwrap()
                .take()
                .unwrap_or(Err(RequestFailure::Unreachable("gone".into())));
            Box::pin(async move { result })
        }

        fn status(&self) -> BoxFuture<'_, CallResult<StatusSnapshot>> {
            Box::pin(async { Err(RequestFailure::Unreachable("offline".into())) })
        }

        fn delete_violation<'a>(&'a self, remote_id: &'a str) -> BoxFuture<'a, CallResult<()>> {
            self.deleted.lock().unwrap().push(remote_id.to_string());
            Box::pin(async { Ok(()) })
        }
    }

    fn payload(value: serde_json::Value) -> BootstrapPayload {
        serde_json::from_value(value).unwrap()
    }

    fn engine(source: Arc<ScriptedSource>, demo: DemoSettings) -> Arc<DashboardEngine> {
        let config = EngineConfig { demo, ..Default::default() };
        Arc::new(DashboardEngine::new(config, Arc::new(NoPush), source))
    }

    fn quiet_demo() -> DemoSettings {
        DemoSettings {
            min_delay_ms: 1000,
            max_delay_ms: 1000,
            ambient_probability: 0.0,
            seed: Some(3),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_bootstrap_failure_is_demo_with_no_violations() {
        let source = ScriptedSource::new(Err(RequestFailure::Timeout));
        let engine = engine(source, quiet_demo());

        let report = engine.boot().await;
        assert_eq!(report.mode, SystemMode::Demo);
        assert_eq!(report.violations_loaded, 0);
        assert_eq!(report.failure, Some(RequestFailure::Timeout));
        assert!(report.is_degraded());
        assert!(engine.ledger().is_empty());
    }

    #[tokio::test]
    async fn test_end_to_end_demo_to_live_single_notification() {
        let source = ScriptedSource::new(Ok(payload(json!({"demo_mode": true, "esp32_online_count": 0}))));
        let engine = engine(source, quiet_demo());

        let report = engine.boot().await;
        assert_eq!(report.mode, SystemMode::Demo);

        let mut changes = engine.arbiter().subscribe();
        engine
            .dispatcher()
            .dispatch_frame(r#"{"event":"esp32_connected","data":{"count":1,"ai_engine_active":true}}"#)
            .unwrap();
        engine
            .dispatcher()
            .dispatch_frame(r#"{"event":"ai_engine_status","data":{"active":true,"fps":14.0}}"#)
            .unwrap();

        assert_eq!(engine.arbiter().mode(), SystemMode::Live);
        let change = changes.try_recv().unwrap();
        assert_eq!((change.previous, change.current), (SystemMode::Demo, SystemMode::Live));
        assert!(changes.try_recv().is_err());
        assert_eq!(engine.ai().snapshot().fps, 14.0);
    }

    #[tokio::test]
    async fn test_separate_ai_event_moves_partial_to_live() {
        let source = ScriptedSource::new(Ok(payload(json!({"demo_mode": true, "esp32_online_count": 0}))));
        let engine = engine(source, quiet_demo());
        assert_eq!(engine.boot().await.mode, SystemMode::Demo);

        let mut changes = engine.arbiter().subscribe();
        engine
            .dispatcher()
            .dispatch_frame(r#"42["esp32_connected",{"count":1}]"#)
            .unwrap();
        assert_eq!(engine.arbiter().mode(), SystemMode::Partial);

        engine
            .dispatcher()
            .dispatch_frame(r#"42["ai_engine_status",{"active":true}]"#)
            .unwrap();
        assert_eq!(engine.arbiter().mode(), SystemMode::Live);

        let seen: Vec<_> = std::iter::from_fn(|| changes.try_recv().ok())
            .map(|c| (c.previous, c.current))
            .collect();
        assert_eq!(
            seen,
            vec![(SystemMode::Demo, SystemMode::Partial), (SystemMode::Partial, SystemMode::Live)]
        );
    }

    #[tokio::test]
    async fn test_bootstrap_loads_history_and_state() {
        let source = ScriptedSource::new(Ok(payload(json!({
            "demo_mode": false,
            "esp32_online_count": 2,
            "ai_engine": {"ai_active": true},
            "violations": [
                {"id": 12, "plate": "59D-67890", "ts": 1700000200.0},
                {"id": 11, "plate": "29A-11222", "ts": 1700000100.0}
            ],
            "traffic": {"light": "GREEN", "countdown": 12},
            "devices": {"cam1": {"name": "Laptop", "status": "ONLINE"}},
            "events": [{"level": "WARN", "source": "ai", "message": "model warming", "ts": 1700000000.0}],
            "theme": "dark"
        }))));
        let engine = engine(source, quiet_demo());

        let report = engine.boot().await;
        assert_eq!(report.mode, SystemMode::Live);
        assert_eq!(report.violations_loaded, 2);
        assert_eq!(report.theme.as_deref(), Some("dark"));
        assert_eq!(engine.ledger().all()[0].plate, "59D-67890");
        assert_eq!(engine.signal().phase(), SignalPhase::Green);
        assert_eq!(engine.devices().online_count(), 1);
        assert_eq!(engine.log_book().len(), 1);
    }

    #[tokio::test]
    async fn test_operator_delete_mirrors_server_records() {
        let source = ScriptedSource::new(Ok(payload(json!({
            "violations": [{"id": "77", "plate": "88A-66778"}]
        }))));
        let engine = engine(source.clone(), quiet_demo());
        engine.boot().await;

        let server_id = engine.ledger().all()[0].id;
        let manual = engine.record_manual(ViolationCandidate { plate: "31e-88990".into(), ..Default::default() });
        assert_eq!(manual.source, ViolationSource::Operator);

        let report = engine.delete_violation(server_id).await;
        assert!(matches!(report.outcome, DeleteOutcome::Removed(_)));
        assert_eq!(report.mirror_failure, None);
        engine.delete_violation(manual.id).await;
        assert_eq!(*source.deleted.lock().unwrap(), vec!["77".to_string()]);

        let again = engine.delete_violation(server_id).await;
        assert_eq!(again.outcome, DeleteOutcome::NotFound);
        assert_eq!(engine.ledger().counters(), LedgerCounters { lifetime_total: 2, today: 0 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_red_in_demo_spawns_after_delay() {
        let source = ScriptedSource::new(Err(RequestFailure::Unreachable("down".into())));
        let engine = engine(source, quiet_demo());
        engine.boot().await;
        engine.start();

        engine.force_signal(SignalPhase::Red);
        tokio::time::sleep(Duration::from_millis(900)).await;
        assert!(engine.ledger().is_empty());
        tokio::time::sleep(Duration::from_millis(200)).await;

        let all = engine.ledger().all();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].source, ViolationSource::Demo);
        assert_eq!(all[0].phase, SignalPhase::Red);

        engine.shutdown().await;
        assert_eq!(engine.connection().state(), ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawn_skipped_when_no_longer_red_or_demo() {
        let source = ScriptedSource::new(Err(RequestFailure::Unreachable("down".into())));
        let engine = engine(source, quiet_demo());
        engine.boot().await;
        engine.start();

        engine.force_signal(SignalPhase::Red);
        tokio::time::sleep(Duration::from_millis(100)).await;
        engine.force_signal(SignalPhase::Green);
        tokio::time::sleep(Duration::from_millis(2000)).await;
        assert!(engine.ledger().is_empty());

        engine.arbiter().set_device_count(1);
        engine.force_signal(SignalPhase::Red);
        tokio::time::sleep(Duration::from_millis(2000)).await;
        assert!(engine.ledger().is_empty());

        engine.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_timers() {
        let source = ScriptedSource::new(Err(RequestFailure::Unreachable("down".into())));
        let engine = engine(source, quiet_demo());
        engine.boot().await;
        engine.start();
        engine.shutdown().await;

        engine.force_signal(SignalPhase::Red);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(engine.ledger().is_empty());
        assert!(engine.resume_signal());
    }
}
