/// WebSocket wire messages
///
/// Data frames carry one broadcast event in an envelope:
/// `{"type":"data","v":1,"t":"host","kind":"cpu","seq":7,"ts":1700000000000,"data":12}`
use crate::broadcast::Event;
use serde::{Deserialize, Serialize};

pub const PROTOCOL_VERSION: u8 = 1;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WsEnvelope {
    /// Protocol version
    pub v: u8,
    /// Topic
    pub t: String,
    pub kind: String,
    pub seq: u64,
    /// Publish time, milliseconds since the epoch
    pub ts: i64,
    /// JSON payload, or the raw text when the payload is not JSON
    pub data: serde_json::Value,
}

impl WsEnvelope {
    pub fn from_event(event: &Event) -> Self {
        let data = serde_json::from_slice(&event.payload)
            .unwrap_or_else(|_| serde_json::Value::String(event.payload_str().into_owned()));
        Self {
            v: PROTOCOL_VERSION,
            t: event.topic.clone(),
            kind: event.kind.clone(),
            seq: event.sequence,
            ts: event.timestamp.timestamp_millis(),
            data,
        }
    }
}

/// Messages a client may send
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Hello {
        #[serde(default)]
        client_id: Option<String>,
    },

    /// Application-level keepalive
    Ping {
        #[serde(default)]
        id: Option<String>,
    },
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Data(WsEnvelope),

    Ack {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        context: Option<serde_json::Value>,
    },

    Error {
        message: String,
        code: String,
    },

    Pong {
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<String>,
    },
}

impl ServerMessage {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
