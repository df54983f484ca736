//! Wire protocol for the real-time fan-out: WebSocket message types shared
//! by the fan-out server and client.
//!
//! Each frame is one complete JSON document over a WebSocket text frame, one
//! message per frame. A single integer protocol version is negotiated by
//! exact match at handshake.

use sa_domain::StoredEvent;
use serde::{Deserialize, Serialize};

/// The only protocol version this crate speaks. A client whose `hello`
/// carries a different value is rejected with `VERSION_MISMATCH`.
pub const PROTOCOL_VERSION: u32 = 1;

/// Client → server frames.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum ClientFrame {
    #[serde(rename = "hello")]
    Hello { version: u32 },

    #[serde(rename = "subscribe")]
    Subscribe {
        stream_id: String,
        #[serde(default)]
        after_seq: u64,
    },

    #[serde(rename = "unsubscribe")]
    Unsubscribe { stream_id: String },

    #[serde(rename = "pong")]
    Pong,
}

/// Server → client frames.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum ServerFrame {
    #[serde(rename = "server-hello")]
    ServerHello { version: u32 },

    #[serde(rename = "event")]
    Event {
        stream_id: String,
        event: StoredEvent,
    },

    #[serde(rename = "replay-end")]
    ReplayEnd {
        stream_id: String,
        last_replay_seq: u64,
    },

    #[serde(rename = "ping")]
    Ping,

    #[serde(rename = "error")]
    Error {
        code: ErrorCode,
        message: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    VersionMismatch,
    UnknownStream,
    ReplayFailed,
    BufferOverflow,
    InvalidMessage,
}

impl ClientFrame {
    /// Decode a text frame, rejecting malformed JSON and unknown frame
    /// types without panicking — the caller turns `None` into an
    /// `INVALID_MESSAGE` error frame and keeps the connection open.
    pub fn decode(text: &str) -> Option<Self> {
        serde_json::from_str(text).ok()
    }

    pub fn encode(&self) -> String {
        serde_json::to_string(self).expect("ClientFrame always serializes")
    }
}

impl ServerFrame {
    pub fn encode(&self) -> String {
        serde_json::to_string(self).expect("ServerFrame always serializes")
    }

    pub fn decode(text: &str) -> Option<Self> {
        serde_json::from_str(text).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sa_domain::StreamEvent;

    #[test]
    fn hello_round_trips() {
        let frame = ClientFrame::Hello { version: 1 };
        let json = serde_json::to_string(&frame).unwrap();
        assert_eq!(ClientFrame::decode(&json), Some(frame));
    }

    #[test]
    fn unknown_frame_type_decodes_to_none() {
        assert_eq!(ClientFrame::decode(r#"{"type":"bogus"}"#), None);
    }

    #[test]
    fn malformed_json_decodes_to_none() {
        assert_eq!(ClientFrame::decode("not json"), None);
    }

    #[test]
    fn negative_seq_is_rejected_by_type() {
        // after_seq is u64; serde rejects a negative literal outright.
        assert_eq!(
            ClientFrame::decode(r#"{"type":"subscribe","stream_id":"s1","after_seq":-1}"#),
            None
        );
    }

    #[test]
    fn event_frame_encodes_tagged() {
        let frame = ServerFrame::Event {
            stream_id: "run:r1".into(),
            event: StoredEvent {
                seq: 1,
                timestamp: Utc::now(),
                stream_id: "run:r1".into(),
                event: StreamEvent::new("text-delta", serde_json::json!({"delta": "hi"})),
            },
        };
        let json = frame.encode();
        assert!(json.contains("\"type\":\"event\""));
    }

    #[test]
    fn error_frame_round_trips() {
        let frame = ServerFrame::Error {
            code: ErrorCode::BufferOverflow,
            message: "replay buffer exceeded max_buffer_size".into(),
        };
        let json = frame.encode();
        assert!(json.contains("BUFFER_OVERFLOW"));
    }

    #[test]
    fn subscribe_frame_round_trips_through_encode_decode() {
        let frame = ClientFrame::Subscribe {
            stream_id: "run:r1".into(),
            after_seq: 42,
        };
        assert_eq!(ClientFrame::decode(&frame.encode()), Some(frame));
    }

    #[test]
    fn replay_end_round_trips_through_encode_decode() {
        let frame = ServerFrame::ReplayEnd {
            stream_id: "run:r1".into(),
            last_replay_seq: 7,
        };
        assert_eq!(ServerFrame::decode(&frame.encode()), Some(frame));
    }
}
