//! # Event Dispatcher
//!
//! Routes every inbound event to exactly one sink, keyed by [`EventKind`].
//!
//! Frames from the push channel and synthesized events from the status poller go
//! through the same path, so both obey the same routing table. Delivery is
//! synchronous: the caller's task runs the sink to completion before the next
//! frame is looked at, which keeps events in arrival order.
//!
//! A frame that cannot be routed (bad envelope, unknown kind, malformed payload,
//! no sink) is logged and dropped. Nothing a backend sends can take the
//! dispatcher down.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use crate::errors::DispatchError;
use crate::models::events::{EventKind, PushEvent, RawFrame};

/// A consumer of one kind of event.
pub trait EventSink: Send + Sync {
    /// Handles one event. Must not block.
    fn deliver(&self, event: PushEvent);
}

impl<F> EventSink for F
where
    F: Fn(PushEvent) + Send + Sync,
{
    fn deliver(&self, event: PushEvent) {
        self(event)
    }
}

/// Delivery counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Events handed to a sink.
    pub delivered: u64,
    /// Frames or events dropped.
    pub dropped: u64,
}

/// The routing table.
#[derive(Default)]
pub struct Dispatcher {
    /// One sink per kind.
    sinks: RwLock<HashMap<EventKind, Arc<dyn EventSink>>>,
    delivered: AtomicU64,
    dropped: AtomicU64,
}

impl Dispatcher {
    /// An empty routing table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Routes `kind` to `sink`, replacing any previous sink.
    pub fn register(&self, kind: EventKind, sink: Arc<dyn EventSink>) {
        let mut sinks = self.sinks.write().unwrap_or_else(PoisonError::into_inner);
        if sinks.insert(kind, sink).is_some() {
            log::warn!("Sink for {:?} replaced.", kind);
        } else {
            log::debug!("Sink for {:?} registered.", kind);
        }
    }

    /// Parses, decodes and routes one text frame.
    pub fn dispatch_frame(&self, text: &str) -> Result<EventKind, DispatchError> {
        let routed = RawFrame::parse(text)
            .and_then(PushEvent::decode)
            .and_then(|event| self.route(event));
        if let Err(e) = &routed {
            self.drop_with_log(e);
        }
        routed
    }

    /// Routes an already-decoded event.
    pub fn dispatch(&self, event: PushEvent) -> Result<EventKind, DispatchError> {
        let routed = self.route(event);
        if let Err(e) = &routed {
            self.drop_with_log(e);
        }
        routed
    }

    /// Delivery counters so far.
    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            delivered: self.delivered.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }

    fn route(&self, event: PushEvent) -> Result<EventKind, DispatchError> {
        let kind = event.kind();
        // Clone the sink out so a sink may register or dispatch without deadlocking.
        let sink = self
            .sinks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .cloned()
            .ok_or(DispatchError::NoRoute(kind))?;
        sink.deliver(event);
        self.delivered.fetch_add(1, Ordering::Relaxed);
        Ok(kind)
    }

    fn drop_with_log(&self, error: &DispatchError) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
        match error {
            DispatchError::UnknownKind(name) => log::debug!("Dropping unhandled push event '{}'.", name),
            other => log::warn!("Dropping push event: {}", other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn recorder() -> (Arc<Mutex<Vec<PushEvent>>>, Arc<dyn EventSink>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink_seen = seen.clone();
        let sink: Arc<dyn EventSink> = Arc::new(move |e: PushEvent| sink_seen.lock().unwrap().push(e));
        (seen, sink)
    }

    #[test]
    fn test_known_kinds_reach_one_sink_in_order() {
        let dispatcher = Dispatcher::new();
        let (signals, sink) = recorder();
        dispatcher.register(EventKind::Signal, sink);
        let (logs, sink) = recorder();
        dispatcher.register(EventKind::Log, sink);

        dispatcher.dispatch_frame(r#"{"event":"traffic_state","data":{"light":"GREEN"}}"#).unwrap();
        dispatcher.dispatch_frame(r#"{"event":"system_event","data":{"level":"INFO","message":"a"}}"#).unwrap();
        dispatcher.dispatch_frame(r#"{"event":"traffic_state","data":{"light":"YELLOW"}}"#).unwrap();

        let signals = signals.lock().unwrap();
        assert_eq!(signals.len(), 2);
        assert!(matches!(&signals[0], PushEvent::Signal(u) if u.light == crate::models::SignalPhase::Green));
        assert!(matches!(&signals[1], PushEvent::Signal(u) if u.light == crate::models::SignalPhase::Yellow));
        assert_eq!(logs.lock().unwrap().len(), 1);
        assert_eq!(dispatcher.stats(), DispatchStats { delivered: 3, dropped: 0 });
    }

    #[test]
    fn test_socketio_event_packet_is_routed() {
        let dispatcher = Dispatcher::new();
        let (signals, sink) = recorder();
        dispatcher.register(EventKind::Signal, sink);

        assert_eq!(
            dispatcher.dispatch_frame(r#"42["traffic_state",{"light":"RED","countdown":9}]"#),
            Ok(EventKind::Signal)
        );
        let signals = signals.lock().unwrap();
        assert!(matches!(
            &signals[0],
            PushEvent::Signal(u) if u.light == crate::models::SignalPhase::Red && u.countdown == Some(9)
        ));
        assert_eq!(dispatcher.stats(), DispatchStats { delivered: 1, dropped: 0 });
    }

    #[test]
    fn test_bad_frames_never_reach_sinks() {
        let dispatcher = Dispatcher::new();
        let (signals, sink) = recorder();
        dispatcher.register(EventKind::Signal, sink);

        assert!(matches!(dispatcher.dispatch_frame("{{{"), Err(DispatchError::BadFrame(_))));
        assert!(matches!(
            dispatcher.dispatch_frame(r#"{"event":"full_status","data":{}}"#),
            Err(DispatchError::UnknownKind(_))
        ));
        assert!(matches!(
            dispatcher.dispatch_frame(r#"{"event":"traffic_state","data":{"countdown":3}}"#),
            Err(DispatchError::Malformed { .. })
        ));
        assert_eq!(
            dispatcher.dispatch_frame(r#"{"event":"system_event","data":{}}"#),
            Err(DispatchError::NoRoute(EventKind::Log))
        );

        assert!(signals.lock().unwrap().is_empty());
        assert_eq!(dispatcher.stats().dropped, 4);
    }
}
