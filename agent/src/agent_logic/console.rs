use lib_dashboard::core::DeviceTransitionKind;
use lib_dashboard::ledger::LedgerChange;
use lib_dashboard::retrieve::SessionEvent;
use lib_dashboard::DashboardEngine;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::interval;

const SUMMARY_INTERVAL: Duration = Duration::from_secs(60);

/// Mirrors engine notifications into the log until shutdown.
pub async fn run(
    engine: Arc<DashboardEngine>,
    mut session: broadcast::Receiver<SessionEvent>,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut modes = engine.arbiter().subscribe();
    let mut phases = engine.signal().subscribe();
    let mut ledger = engine.ledger().subscribe();
    let mut devices = engine.devices().subscribe();
    let mut connection = engine.connection().subscribe();
    let mut summary = interval(SUMMARY_INTERVAL);

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                log::info!(target: "console", "Console received shutdown signal.");
                break;
            }
            Ok(change) = modes.recv() => {
                log::info!(target: "console", "MODE {:?} -> {:?}", change.previous, change.current);
            }
            Ok(change) = phases.recv() => {
                log::debug!(target: "console", "SIGNAL {} -> {} ({:?})", change.previous, change.phase, change.cause);
            }
            Ok(change) = ledger.recv() => match change {
                LedgerChange::Recorded(v) => log::info!(
                    target: "console",
                    "VIOLATION #{} {} {} {} conf {:.0}%",
                    v.id,
                    v.plate,
                    v.vehicle_type,
                    v.speed_kmh.map(|s| format!("{:.1} km/h", s)).unwrap_or_else(|| "-".to_string()),
                    v.confidence
                ),
                LedgerChange::Deleted(id) => log::info!(target: "console", "VIOLATION #{} deleted", id),
                LedgerChange::HistoryLoaded(n) => log::info!(target: "console", "{} historical violation(s) loaded", n),
            },
            Ok(transition) = devices.recv() => match transition.kind {
                DeviceTransitionKind::Lost => log::warn!(target: "console", "DEVICE {} lost", transition.device_id),
                DeviceTransitionKind::Recovered => log::info!(target: "console", "DEVICE {} back online", transition.device_id),
            },
            Ok(()) = connection.changed() => {
                let state = *connection.borrow_and_update();
                log::info!(target: "console", "CONNECTION {:?}", state);
            }
            Ok(SessionEvent::Expired) = session.recv() => {
                log::error!(target: "console", "Session expired. Sign in again to resume backend actions.");
            }
            _ = summary.tick() => {
                let counters = engine.ledger().counters();
                let signal = engine.signal().snapshot();
                log::info!(
                    target: "console",
                    "STATUS mode {:?} | signal {} {}s | violations today {} / total {} | AI {}",
                    engine.arbiter().mode(),
                    signal.phase,
                    signal.countdown,
                    counters.today,
                    counters.lifetime_total,
                    if engine.ai_is_stale() { "stale" } else { "fresh" }
                );
            }
        }
    }
}
