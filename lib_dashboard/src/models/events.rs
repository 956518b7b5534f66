//! # Push Events
//!
//! The push channel is Socket.IO: each event arrives as an event packet
//! `42["<name>", <payload>]`, possibly with a `/namespace,` prefix and an ack id.
//! The flat JSON envelope `{"event": <name>, "data": <payload>}` is accepted too.
//! Decoding happens in two steps so the dispatcher can tell an unknown event
//! (dropped quietly) from a known event with a bad payload (dropped loudly).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::DispatchError;
use crate::models::signal::SignalUpdate;
use crate::models::status::{
    AiStatusPatch, DeviceUpdate, FieldDeviceNotice, SystemLogLine, SystemModeUpdate,
};
use crate::models::violation::ViolationCandidate;

/// Routing key for inbound events. Each kind has exactly one sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// Signal phase update.
    Signal,
    /// New violation.
    Violation,
    /// Camera status change.
    Device,
    /// AI engine status.
    AiStatus,
    /// Field device connected or disconnected.
    FieldDevice,
    /// Backend mode summary.
    SystemMode,
    /// Backend log line.
    Log,
}

impl EventKind {
    /// Maps a wire event name to its kind.
    pub fn from_event_name(name: &str) -> Option<EventKind> {
        match name {
            "traffic_state" => Some(EventKind::Signal),
            "new_violation" => Some(EventKind::Violation),
            "device_update" => Some(EventKind::Device),
            "ai_engine_status" | "ai_status" | "context_update" => Some(EventKind::AiStatus),
            "esp32_connected" | "esp32_disconnected" => Some(EventKind::FieldDevice),
            "system_mode" => Some(EventKind::SystemMode),
            "system_event" => Some(EventKind::Log),
            _ => None,
        }
    }
}

/// The undecoded envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawFrame {
    /// Wire event name.
    pub event: String,
    /// Event payload.
    #[serde(default)]
    pub data: Value,
}

/// Engine.IO message type followed by the Socket.IO EVENT type.
pub const SOCKETIO_EVENT_PREFIX: &str = "42";

impl RawFrame {
    /// Parses a text frame: a Socket.IO event packet or a JSON envelope.
    pub fn parse(text: &str) -> Result<RawFrame, DispatchError> {
        match text.strip_prefix(SOCKETIO_EVENT_PREFIX) {
            Some(packet) => Self::parse_event_packet(packet),
            None => serde_json::from_str(text).map_err(|e| DispatchError::BadFrame(e.to_string())),
        }
    }

    /// Decodes `[/ns,][ack]["name", data, ...]`. Arguments past the first are ignored.
    fn parse_event_packet(packet: &str) -> Result<RawFrame, DispatchError> {
        let packet = if packet.starts_with('/') {
            packet
                .split_once(',')
                .map(|(_, rest)| rest)
                .ok_or_else(|| DispatchError::BadFrame("unterminated namespace".to_string()))?
        } else {
            packet
        };
        let payload = packet.trim_start_matches(|c: char| c.is_ascii_digit());
        let args: Vec<Value> =
            serde_json::from_str(payload).map_err(|e| DispatchError::BadFrame(e.to_string()))?;

        let mut args = args.into_iter();
        let event = match args.next() {
            Some(Value::String(name)) => name,
            Some(_) => return Err(DispatchError::BadFrame("event name is not a string".to_string())),
            None => return Err(DispatchError::BadFrame("empty event packet".to_string())),
        };
        Ok(RawFrame { event, data: args.next().unwrap_or(Value::Null) })
    }
}

/// A decoded inbound event.
#[derive(Debug, Clone, PartialEq)]
pub enum PushEvent {
    /// `traffic_state`.
    Signal(SignalUpdate),
    /// `new_violation`.
    Violation(ViolationCandidate),
    /// `device_update`.
    Device(DeviceUpdate),
    /// `ai_engine_status`, `ai_status`, `context_update`.
    AiStatus(AiStatusPatch),
    /// `esp32_connected`, `esp32_disconnected`.
    FieldDevice(FieldDeviceNotice),
    /// `system_mode`.
    SystemMode(SystemModeUpdate),
    /// `system_event`.
    Log(SystemLogLine),
}

impl PushEvent {
    /// Routing key of this event.
    pub fn kind(&self) -> EventKind {
        match self {
            PushEvent::Signal(_) => EventKind::Signal,
            PushEvent::Violation(_) => EventKind::Violation,
            PushEvent::Device(_) => EventKind::Device,
            PushEvent::AiStatus(_) => EventKind::AiStatus,
            PushEvent::FieldDevice(_) => EventKind::FieldDevice,
            PushEvent::SystemMode(_) => EventKind::SystemMode,
            PushEvent::Log(_) => EventKind::Log,
        }
    }

    /// Decodes an envelope into a typed event.
    pub fn decode(frame: RawFrame) -> Result<PushEvent, DispatchError> {
        let kind = EventKind::from_event_name(&frame.event)
            .ok_or_else(|| DispatchError::UnknownKind(frame.event.clone()))?;
        let malformed = |e: serde_json::Error| DispatchError::Malformed { kind, reason: e.to_string() };

        let event = match kind {
            EventKind::Signal => PushEvent::Signal(serde_json::from_value(frame.data).map_err(malformed)?),
            EventKind::Violation => {
                PushEvent::Violation(serde_json::from_value(frame.data).map_err(malformed)?)
            }
            EventKind::Device => PushEvent::Device(serde_json::from_value(frame.data).map_err(malformed)?),
            EventKind::AiStatus => {
                PushEvent::AiStatus(serde_json::from_value(frame.data).map_err(malformed)?)
            }
            EventKind::FieldDevice => {
                let data = if frame.data.is_null() { Value::Object(Default::default()) } else { frame.data };
                let mut notice: FieldDeviceNotice = serde_json::from_value(data).map_err(malformed)?;
                notice.connected = frame.event == "esp32_connected";
                PushEvent::FieldDevice(notice)
            }
            EventKind::SystemMode => {
                PushEvent::SystemMode(serde_json::from_value(frame.data).map_err(malformed)?)
            }
            EventKind::Log => PushEvent::Log(serde_json::from_value(frame.data).map_err(malformed)?),
        };
        Ok(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_field_device_sets_direction() {
        let frame = RawFrame::parse(r#"{"event":"esp32_disconnected","data":{"count":0,"device_id":"ctl-1"}}"#).unwrap();
        match PushEvent::decode(frame).unwrap() {
            PushEvent::FieldDevice(n) => {
                assert!(!n.connected);
                assert_eq!(n.count, Some(0));
            }
            other => panic!("unexpected {:?}", other),
        }

        let frame = RawFrame::parse(r#"{"event":"esp32_connected"}"#).unwrap();
        match PushEvent::decode(frame).unwrap() {
            PushEvent::FieldDevice(n) => assert!(n.connected && n.count.is_none()),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_unknown_and_malformed_are_distinguished() {
        let unknown = RawFrame::parse(r#"{"event":"theme_update","data":{"theme":"dark"}}"#).unwrap();
        assert_eq!(
            PushEvent::decode(unknown),
            Err(DispatchError::UnknownKind("theme_update".into()))
        );

        let bad = RawFrame::parse(r#"{"event":"traffic_state","data":{"light":"PURPLE"}}"#).unwrap();
        assert!(matches!(
            PushEvent::decode(bad),
            Err(DispatchError::Malformed { kind: EventKind::Signal, .. })
        ));

        assert!(matches!(RawFrame::parse("not json"), Err(DispatchError::BadFrame(_))));
    }

    #[test]
    fn test_socketio_event_packets() {
        let frame = RawFrame::parse(r#"42["traffic_state",{"light":"RED","countdown":9}]"#).unwrap();
        assert_eq!(frame.event, "traffic_state");
        assert_eq!(frame.data["countdown"], 9);

        let frame = RawFrame::parse(r#"42/dash,17["esp32_connected"]"#).unwrap();
        assert_eq!(frame.event, "esp32_connected");
        assert_eq!(frame.data, Value::Null);

        assert!(matches!(RawFrame::parse("42[]"), Err(DispatchError::BadFrame(_))));
        assert!(matches!(RawFrame::parse("42[7,{}]"), Err(DispatchError::BadFrame(_))));
        assert!(matches!(RawFrame::parse(r#"42/dash["x"]"#), Err(DispatchError::BadFrame(_))));
    }

    #[test]
    fn test_aliases_share_a_kind() {
        for name in ["ai_engine_status", "ai_status", "context_update"] {
            assert_eq!(EventKind::from_event_name(name), Some(EventKind::AiStatus));
        }
        let frame = RawFrame::parse(r#"{"event":"traffic_state","data":{"light":"RED","countdown":9}}"#).unwrap();
        assert_eq!(
            PushEvent::decode(frame).unwrap().kind(),
            EventKind::Signal
        );
    }
}
