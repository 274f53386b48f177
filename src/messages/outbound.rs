use crate::messages::Direction;
use chrono::{DateTime, Utc};
use pushgate_store::Payload;
use serde_json::Value;
use uuid::Uuid;

/// Send result of an outbound message. Set exactly once from the server's
/// per-message response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SentStatus {
    Undefined,
    Sent,
    Failed,
}

/// An outbound (client-to-server) message.
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    pub message_id: String,
    pub destination: Option<String>,
    pub text: String,
    pub custom_payload: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub sent_status: SentStatus,
}

impl OutboundMessage {
    /// Create a message queued for sending, with a locally generated id.
    pub fn new(destination: Option<String>, text: impl Into<String>) -> Self {
        Self {
            message_id: Uuid::new_v4().to_string(),
            destination,
            text: text.into(),
            custom_payload: None,
            created_at: Utc::now(),
            sent_status: SentStatus::Undefined,
        }
    }

    pub fn with_custom_payload(mut self, payload: Value) -> Self {
        self.custom_payload = Some(payload);
        self
    }

    pub fn direction(&self) -> Direction {
        Direction::Outbound
    }

    /// Wire representation sent to the server.
    pub fn to_payload(&self) -> Payload {
        let mut payload = Payload::new();
        payload.insert("messageId".into(), Value::String(self.message_id.clone()));
        if let Some(destination) = &self.destination {
            payload.insert("destination".into(), Value::String(destination.clone()));
        }
        payload.insert("text".into(), Value::String(self.text.clone()));
        if let Some(custom) = &self.custom_payload {
            payload.insert("customPayload".into(), custom.clone());
        }
        payload
    }
}
