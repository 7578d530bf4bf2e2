//! Inbound and outbound frame definitions.

use serde::{Deserialize, Serialize};

use chorus_core::error::AppError;
use chorus_core::types::{ConnectionId, UserId};
use chorus_entity::presence::PresenceStatus;

/// A client frame: `{"event": "...", "data": {...}, "request_id": "..."}`.
///
/// A `request_id` asks for an `ack` frame carrying the outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundFrame {
    pub event: String,
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(default)]
    pub request_id: Option<String>,
}

impl InboundFrame {
    /// Deserialize the payload into an event-specific type.
    pub fn parse_data<T: serde::de::DeserializeOwned>(&self) -> Result<T, AppError> {
        serde_json::from_value(self.data.clone()).map_err(|e| {
            AppError::validation(format!("Invalid payload for '{}': {e}", self.event))
        })
    }
}

/// Frames sent by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    /// First frame after a successful handshake.
    Connected {
        connection_id: ConnectionId,
        user_id: UserId,
        username: String,
    },
    /// Outcome of a frame that carried a `request_id`.
    Ack {
        request_id: String,
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        data: Option<serde_json::Value>,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },
    /// Failure of a frame without a `request_id`.
    Error {
        event: String,
        message: String,
        code: String,
    },
    /// A broadcast delivered on a subscribed key.
    Event {
        key: String,
        event: String,
        payload: serde_json::Value,
    },
    Ping {
        timestamp: i64,
    },
    Presence {
        user_id: UserId,
        username: String,
        status: PresenceStatus,
    },
    /// The server is closing this connection.
    ForceDisconnect {
        reason: String,
    },
}

impl OutboundMessage {
    pub fn ack_ok(request_id: String, data: serde_json::Value) -> Self {
        Self::Ack {
            request_id,
            success: true,
            data: (!data.is_null()).then_some(data),
            message: None,
            code: None,
        }
    }

    pub fn ack_err(request_id: String, message: String, code: String) -> Self {
        Self::Ack {
            request_id,
            success: false,
            data: None,
            message: Some(message),
            code: Some(code),
        }
    }

    pub fn event(key: impl Into<String>, event: impl Into<String>, payload: serde_json::Value) -> Self {
        Self::Event {
            key: key.into(),
            event: event.into(),
            payload,
        }
    }
}
