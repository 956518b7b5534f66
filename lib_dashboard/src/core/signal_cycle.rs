//! # Signal Cycle
//!
//! The traffic signal state machine. Phases follow the ring
//! `GREEN -> YELLOW -> RED -> GREEN`, each held for its configured number of
//! clock ticks. A manual override freezes the ring until it is cleared, and
//! authoritative backend updates may move it at any time.
//!
//! Invariant: `countdown` stays within `0..=duration(phase)`. The countdown reaches
//! zero on the tick that performs the transition and is immediately reset to the
//! new phase's duration, so one full ring takes exactly `green + yellow + red`
//! ticks.

use std::sync::{Mutex, PoisonError};

use serde::Serialize;
use tokio::sync::broadcast;

use crate::configs::CycleTimings;
use crate::models::signal::{CameraState, SignalPhase, SignalUpdate};

/// What moved the signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PhaseChangeCause {
    /// The clock ran the countdown out.
    Clock,
    /// An operator forced the phase.
    Override,
    /// The backend reported a different phase.
    Remote,
}

/// Fired on every phase transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PhaseChange {
    /// Phase before the transition.
    pub previous: SignalPhase,
    /// Phase after the transition.
    pub phase: SignalPhase,
    /// Camera state tied to the new phase.
    pub camera: CameraState,
    /// What caused it.
    pub cause: PhaseChangeCause,
}

/// Point-in-time view of the signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SignalSnapshot {
    /// Current phase.
    pub phase: SignalPhase,
    /// Camera state for the phase.
    pub camera: CameraState,
    /// Ticks left in the phase.
    pub countdown: u32,
    /// Nominal duration of the phase.
    pub duration: u32,
    /// Phase held by an operator override, if any.
    pub overridden: Option<SignalPhase>,
    /// Current phase durations.
    pub timings: CycleTimings,
}

struct CycleState {
    phase: SignalPhase,
    countdown: u32,
    override_phase: Option<SignalPhase>,
    timings: CycleTimings,
}

impl CycleState {
    fn duration(&self, phase: SignalPhase) -> u32 {
        phase.duration(&self.timings)
    }
}

/// The signal state machine.
pub struct SignalCycle {
    state: Mutex<CycleState>,
    tx: broadcast::Sender<PhaseChange>,
}

impl SignalCycle {
    /// Starts in RED with a full countdown.
    pub fn new(timings: CycleTimings) -> Self {
        let timings = timings.clamped();
        let (tx, _) = broadcast::channel(64);
        Self {
            state: Mutex::new(CycleState {
                phase: SignalPhase::Red,
                countdown: timings.red,
                override_phase: None,
                timings,
            }),
            tx,
        }
    }

    /// Phase-change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<PhaseChange> {
        self.tx.subscribe()
    }

    /// Current state.
    pub fn snapshot(&self) -> SignalSnapshot {
        let s = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        SignalSnapshot {
            phase: s.phase,
            camera: s.phase.camera_state(),
            countdown: s.countdown,
            duration: s.duration(s.phase),
            overridden: s.override_phase,
            timings: s.timings,
        }
    }

    /// Current phase.
    pub fn phase(&self) -> SignalPhase {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).phase
    }

    /// One clock tick. No-op while overridden.
    pub fn tick(&self) -> Option<PhaseChange> {
        let change = {
            let mut s = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if s.override_phase.is_some() {
                return None;
            }
            s.countdown = s.countdown.saturating_sub(1);
            if s.countdown > 0 {
                return None;
            }
            let previous = s.phase;
            s.phase = previous.successor();
            s.countdown = s.duration(s.phase);
            PhaseChange { previous, phase: s.phase, camera: s.phase.camera_state(), cause: PhaseChangeCause::Clock }
        };
        self.publish(change);
        Some(change)
    }

    /// Holds the signal at `phase` with a fresh countdown.
    pub fn force_override(&self, phase: SignalPhase) -> PhaseChange {
        let change = {
            let mut s = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            let previous = s.phase;
            s.override_phase = Some(phase);
            s.phase = phase;
            s.countdown = s.duration(phase);
            PhaseChange { previous, phase, camera: phase.camera_state(), cause: PhaseChangeCause::Override }
        };
        log::info!("Signal override: {} -> {}", change.previous, change.phase);
        self.publish(change);
        change
    }

    /// Resumes the clock from the current phase and countdown.
    pub fn clear_override(&self) -> bool {
        let mut s = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let held = s.override_phase.take();
        if let Some(phase) = held {
            log::info!("Signal override on {} cleared; {}s left in phase.", phase, s.countdown);
        }
        held.is_some()
    }

    /// Adopts an authoritative backend update. Ignored while overridden.
    pub fn apply_remote(&self, update: &SignalUpdate) -> Option<PhaseChange> {
        let change = {
            let mut s = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(held) = s.override_phase {
                log::debug!("Ignoring backend signal {} while override holds {}.", update.light, held);
                return None;
            }
            if let Some(cycle) = update.cycle {
                s.timings = cycle.clamped();
            }
            let previous = s.phase;
            let duration = s.duration(update.light);
            s.phase = update.light;
            s.countdown = match update.countdown {
                Some(c) => c.clamp(1, duration),
                None if previous == update.light => s.countdown.clamp(1, duration),
                None => duration,
            };
            if previous == update.light {
                return None;
            }
            PhaseChange {
                previous,
                phase: update.light,
                camera: update.camera.unwrap_or_else(|| update.light.camera_state()),
                cause: PhaseChangeCause::Remote,
            }
        };
        self.publish(change);
        Some(change)
    }

    /// Replaces the phase durations. The running countdown is clamped to the new duration.
    pub fn reconfigure(&self, timings: CycleTimings) -> CycleTimings {
        let mut s = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        s.timings = timings.clamped();
        let duration = s.duration(s.phase);
        s.countdown = s.countdown.clamp(1, duration);
        log::info!(
            "Signal cycle reconfigured: green {}s, yellow {}s, red {}s.",
            s.timings.green,
            s.timings.yellow,
            s.timings.red
        );
        s.timings
    }

    fn publish(&self, change: PhaseChange) {
        log::debug!("Signal {} -> {} ({:?})", change.previous, change.phase, change.cause);
        let _ = self.tx.send(change);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timings() -> CycleTimings {
        CycleTimings { green: 6, yellow: 3, red: 5 }
    }

    #[test]
    fn test_full_ring_takes_sum_of_durations() {
        let cycle = SignalCycle::new(timings());
        let mut rx = cycle.subscribe();
        let mut transitions = Vec::new();

        for n in 1..=timings().total() {
            let before = cycle.snapshot();
            assert!(before.countdown >= 1 && before.countdown <= before.duration);
            if let Some(change) = cycle.tick() {
                // the countdown had exactly one tick left
                assert_eq!(before.countdown, 1);
                transitions.push((n, change.phase));
            }
        }

        assert_eq!(
            transitions,
            vec![(5, SignalPhase::Green), (11, SignalPhase::Yellow), (14, SignalPhase::Red)]
        );
        assert_eq!(rx.try_recv().unwrap().phase, SignalPhase::Green);
        assert_eq!(cycle.snapshot().countdown, 5);
    }

    #[test]
    fn test_override_freezes_then_resumes_from_held_phase() {
        let cycle = SignalCycle::new(timings());
        let change = cycle.force_override(SignalPhase::Green);
        assert_eq!(change.previous, SignalPhase::Red);
        assert_eq!(change.camera, CameraState::Idle);

        for _ in 0..50 {
            assert!(cycle.tick().is_none());
        }
        assert_eq!(cycle.snapshot().countdown, 6);

        assert!(cycle.clear_override());
        assert!(!cycle.clear_override());
        let mut seen = Vec::new();
        for _ in 0..6 {
            if let Some(c) = cycle.tick() {
                seen.push(c);
            }
        }
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].previous, SignalPhase::Green);
        assert_eq!(seen[0].phase, SignalPhase::Yellow);
    }

    #[test]
    fn test_override_to_same_phase_still_notifies() {
        let cycle = SignalCycle::new(timings());
        let mut rx = cycle.subscribe();
        cycle.tick();
        cycle.force_override(SignalPhase::Red);
        let change = rx.try_recv().unwrap();
        assert_eq!((change.previous, change.phase), (SignalPhase::Red, SignalPhase::Red));
        assert_eq!(cycle.snapshot().countdown, 5);
    }

    #[test]
    fn test_remote_update_moves_and_clamps() {
        let cycle = SignalCycle::new(timings());
        let change = cycle
            .apply_remote(&SignalUpdate { countdown: Some(99), ..SignalUpdate::phase_only(SignalPhase::Yellow) })
            .unwrap();
        assert_eq!(change.cause, PhaseChangeCause::Remote);
        assert_eq!(cycle.snapshot().countdown, 3);

        // same phase: countdown adjusts, no notification
        let same = SignalUpdate { countdown: Some(2), ..SignalUpdate::phase_only(SignalPhase::Yellow) };
        assert!(cycle.apply_remote(&same).is_none());
        assert_eq!(cycle.snapshot().countdown, 2);

        cycle.force_override(SignalPhase::Red);
        assert!(cycle.apply_remote(&SignalUpdate::phase_only(SignalPhase::Green)).is_none());
        assert_eq!(cycle.phase(), SignalPhase::Red);
    }

    #[test]
    fn test_reconfigure_enforces_minimums() {
        let cycle = SignalCycle::new(CycleTimings { green: 30, yellow: 5, red: 30 });
        let applied = cycle.reconfigure(CycleTimings { green: 2, yellow: 1, red: 8 });
        assert_eq!(applied, CycleTimings { green: 5, yellow: 3, red: 8 });
        assert_eq!(cycle.snapshot().countdown, 8);
    }
}
