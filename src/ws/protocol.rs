//! Wire protocol: inbound frame parsing and outbound envelope construction.
//!
//! Everything the server pushes is a JSON `{statusCode, type, payload}`
//! envelope. Status codes are banded: 1xxx application messages, 2xxx
//! presence/system/ack, 3xxx room-membership events (produced by other
//! services, delivered through the same engine).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const STATUS_MESSAGE: u16 = 1001;
pub const STATUS_PRESENCE: u16 = 2001;
pub const STATUS_ACK: u16 = 2002;
pub const STATUS_ROOM_EVENT: u16 = 3001;

pub const TYPE_MESSAGE: &str = "MESSAGE";
pub const TYPE_PRESENCE: &str = "PRESENCE";
pub const TYPE_ACK: &str = "ACK";

/// Heartbeat frames are plain text: the literal prefix, optionally followed
/// (no delimiter) by the client's current room id. Answered with `pong`.
pub const HEARTBEAT_PREFIX: &str = "ping";
pub const HEARTBEAT_REPLY: &str = "pong";

/// Uniform server→client wire wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub status_code: u16,
    #[serde(rename = "type")]
    pub kind: String,
    pub payload: Value,
}

/// Client→server chat frame.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatFrame {
    /// Public identity of the sender; must match the connection's
    /// authenticated identity or the frame is dropped.
    pub sender: String,
    pub room: String,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub attachments: Vec<String>,
    /// Client correlation id, echoed back in the ACK.
    pub temp_id: String,
}

pub fn parse_chat_frame(raw: &str) -> Result<ChatFrame, serde_json::Error> {
    serde_json::from_str(raw)
}

/// If `text` is a heartbeat frame, returns its optional room suffix
/// (`Some(None)` for a bare heartbeat). Returns `None` for anything else.
pub fn parse_heartbeat(text: &str) -> Option<Option<&str>> {
    let rest = text.strip_prefix(HEARTBEAT_PREFIX)?;
    Some((!rest.is_empty()).then_some(rest))
}

/// Message shape, classified purely from the presence of non-empty text and
/// a non-empty attachment list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Text,
    Attachment,
    Mixed,
}

impl MessageKind {
    /// Returns `None` when the frame has no content at all, which makes it
    /// invalid.
    pub fn classify(text: Option<&str>, attachments: &[String]) -> Option<Self> {
        let has_text = text.is_some_and(|t| !t.is_empty());
        let has_attachments = !attachments.is_empty();
        match (has_text, has_attachments) {
            (true, false) => Some(Self::Text),
            (false, true) => Some(Self::Attachment),
            (true, true) => Some(Self::Mixed),
            (false, false) => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "TEXT",
            Self::Attachment => "ATTACHMENT",
            Self::Mixed => "MIXED",
        }
    }
}

/// The fan-out envelope for a routed chat message.
pub fn message_envelope(
    sender: &str,
    room: &str,
    seq: u64,
    kind: MessageKind,
    text: Option<&str>,
    attachments: &[String],
    at: DateTime<Utc>,
) -> Envelope {
    Envelope {
        status_code: STATUS_MESSAGE,
        kind: TYPE_MESSAGE.to_string(),
        payload: json!({
            "sender": sender,
            "room": room,
            "seq": seq,
            "kind": kind.as_str(),
            "text": text,
            "attachments": attachments,
            "timestamp": at.timestamp_millis(),
        }),
    }
}

/// The per-sender acknowledgement: correlates the client's tempId with the
/// sequence number the store assigned.
pub fn ack_envelope(temp_id: &str, seq: u64) -> Envelope {
    Envelope {
        status_code: STATUS_ACK,
        kind: TYPE_ACK.to_string(),
        payload: json!({
            "tempId": temp_id,
            "seq": seq,
        }),
    }
}

/// A confirmed online/offline transition for a user.
pub fn presence_envelope(identity: &str, online: bool, at: DateTime<Utc>) -> Envelope {
    Envelope {
        status_code: STATUS_PRESENCE,
        kind: TYPE_PRESENCE.to_string(),
        payload: json!({
            "userIdentity": identity,
            "isOnline": online,
            "timestamp": at.timestamp_millis(),
        }),
    }
}

/// Room-membership/ownership events originate in other services; the gateway
/// only wraps and delivers them.
pub fn room_event_envelope(event: &str, payload: Value) -> Envelope {
    Envelope {
        status_code: STATUS_ROOM_EVENT,
        kind: event.to_string(),
        payload,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heartbeat_with_and_without_room_suffix() {
        assert_eq!(parse_heartbeat("ping"), Some(None));
        assert_eq!(parse_heartbeat("pingr1"), Some(Some("r1")));
        assert_eq!(parse_heartbeat("{\"sender\":\"a\"}"), None);
        assert_eq!(parse_heartbeat(""), None);
    }

    #[test]
    fn chat_frame_parses_with_optional_fields_absent() {
        let frame = parse_chat_frame(
            r#"{"sender":"alice","room":"r1","text":"hi","tempId":"t1"}"#,
        )
        .unwrap();
        assert_eq!(frame.sender, "alice");
        assert_eq!(frame.room, "r1");
        assert_eq!(frame.text.as_deref(), Some("hi"));
        assert!(frame.attachments.is_empty());
        assert_eq!(frame.temp_id, "t1");
    }

    #[test]
    fn classification_covers_all_shapes() {
        let atts = vec!["file-1".to_string()];
        assert_eq!(MessageKind::classify(Some("hi"), &[]), Some(MessageKind::Text));
        assert_eq!(
            MessageKind::classify(None, &atts),
            Some(MessageKind::Attachment)
        );
        assert_eq!(
            MessageKind::classify(Some("hi"), &atts),
            Some(MessageKind::Mixed)
        );
        assert_eq!(MessageKind::classify(None, &[]), None);
        assert_eq!(MessageKind::classify(Some(""), &[]), None);
    }

    #[test]
    fn envelopes_serialize_with_wire_field_names() {
        let env = ack_envelope("t1", 9);
        let value: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&env).unwrap()).unwrap();
        assert_eq!(value["statusCode"], 2002);
        assert_eq!(value["type"], "ACK");
        assert_eq!(value["payload"]["tempId"], "t1");
        assert_eq!(value["payload"]["seq"], 9);
    }

    #[test]
    fn message_envelope_carries_the_routed_fields() {
        let at = Utc::now();
        let env = message_envelope(
            "alice",
            "r1",
            4,
            MessageKind::Text,
            Some("hi"),
            &[],
            at,
        );
        assert_eq!(env.status_code, STATUS_MESSAGE);
        assert_eq!(env.payload["sender"], "alice");
        assert_eq!(env.payload["room"], "r1");
        assert_eq!(env.payload["seq"], 4);
        assert_eq!(env.payload["kind"], "TEXT");
        assert_eq!(env.payload["timestamp"], at.timestamp_millis());
    }
}
