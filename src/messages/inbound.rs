use crate::errors::{PipelineError, PipelineResult};
use crate::messages::Direction;
use crate::messages::payload::{self, Alert, keys};
use chrono::{DateTime, Utc};
use pushgate_store::{DeliveryMethod, MessageIdentity, Payload, SeenStatus};
use serde_json::Value;

/// An inbound (server-to-client) message as parsed from a raw payload.
///
/// `message_id` is the sole identity; payloads may legitimately differ
/// across duplicate deliveries and are not re-validated.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub message_id: String,
    pub original_payload: Payload,
    pub created_at: DateTime<Utc>,
    pub delivery_method: DeliveryMethod,
    pub is_silent: bool,
    pub custom_payload: Option<Value>,
    pub seen_status: SeenStatus,
    pub delivery_report_sent: bool,
    alert: Alert,
}

impl InboundMessage {
    /// Parse a raw payload into a message value. Derivation of `is_silent`
    /// happens exactly once, here.
    pub fn from_payload(
        payload: Payload,
        delivery_method: DeliveryMethod,
        created_at: DateTime<Utc>,
    ) -> PipelineResult<Self> {
        let message_id = payload
            .get(keys::MESSAGE_ID)
            .and_then(Value::as_str)
            .map(str::to_owned)
            .ok_or_else(|| PipelineError::MalformedPayload("missing messageId".into()))?;
        let Some(aps) = payload.get(keys::APS).and_then(Value::as_object) else {
            return Err(PipelineError::MalformedPayload(format!(
                "message {} has no alert section",
                message_id
            )));
        };

        let is_silent = payload::is_silent(&payload);
        let alert = match payload::silent_data(&payload) {
            Some(silent) if is_silent => Alert::merged(aps, silent),
            _ => Alert::from_aps(aps),
        };
        let custom_payload = payload.get(keys::CUSTOM_PAYLOAD).cloned();

        Ok(Self {
            message_id,
            original_payload: payload,
            created_at,
            delivery_method,
            is_silent,
            custom_payload,
            seen_status: SeenStatus::NotSeen,
            delivery_report_sent: false,
            alert,
        })
    }

    /// Parse a server-fetched JSON object (pull delivery).
    pub fn from_json(value: Value, created_at: DateTime<Utc>) -> PipelineResult<Self> {
        let payload: Payload = serde_json::from_value(value)
            .map_err(|e| PipelineError::MalformedPayload(format!("not a JSON object: {}", e)))?;
        Self::from_payload(payload, DeliveryMethod::Pull, created_at)
    }

    pub fn direction(&self) -> Direction {
        Direction::Inbound
    }

    pub fn text(&self) -> Option<&str> {
        self.alert.body.as_deref()
    }

    pub fn title(&self) -> Option<&str> {
        self.alert.title.as_deref()
    }

    pub fn sound(&self) -> Option<&str> {
        self.alert.sound.as_deref()
    }

    pub fn badge(&self) -> Option<i64> {
        self.alert.badge
    }

    pub fn identity(&self) -> MessageIdentity {
        MessageIdentity {
            message_id: self.message_id.clone(),
            is_silent: self.is_silent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload_from(json: serde_json::Value) -> Payload {
        serde_json::from_value(json).unwrap()
    }

    fn parse(json: serde_json::Value) -> PipelineResult<InboundMessage> {
        InboundMessage::from_payload(payload_from(json), DeliveryMethod::Push, Utc::now())
    }

    #[test]
    fn test_parses_visible_message() {
        let msg = parse(serde_json::json!({
            "messageId": "m1",
            "aps": {"alert": {"body": "hi there", "title": "hello"}, "badge": 1},
            "customPayload": {"k": "v"}
        }))
        .unwrap();
        assert_eq!(msg.message_id, "m1");
        assert!(!msg.is_silent);
        assert_eq!(msg.text(), Some("hi there"));
        assert_eq!(msg.title(), Some("hello"));
        assert_eq!(msg.badge(), Some(1));
        assert_eq!(msg.custom_payload, Some(serde_json::json!({"k": "v"})));
        assert_eq!(msg.seen_status, SeenStatus::NotSeen);
        assert!(!msg.delivery_report_sent);
    }

    #[test]
    fn test_silent_message_merges_alert_from_silent_data() {
        let msg = parse(serde_json::json!({
            "messageId": "m2",
            "aps": {},
            "internalData": {"silent": {"body": "quiet hello", "sound": "none"}}
        }))
        .unwrap();
        assert!(msg.is_silent);
        assert_eq!(msg.text(), Some("quiet hello"));
        assert_eq!(msg.sound(), Some("none"));
    }

    #[test]
    fn test_missing_message_id_is_malformed() {
        let err = parse(serde_json::json!({"aps": {"alert": {"body": "x"}}})).unwrap_err();
        assert!(matches!(err, PipelineError::MalformedPayload(_)));
    }

    #[test]
    fn test_missing_aps_is_malformed() {
        let err = parse(serde_json::json!({"messageId": "m3"})).unwrap_err();
        assert!(matches!(err, PipelineError::MalformedPayload(_)));
    }

    #[test]
    fn test_from_json_sets_pull_delivery() {
        let msg = InboundMessage::from_json(
            serde_json::json!({"messageId": "m4", "aps": {"alert": {"body": "fetched"}}}),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(msg.delivery_method, DeliveryMethod::Pull);
    }

    #[test]
    fn test_payload_key_order_preserved() {
        let msg = parse(serde_json::json!({
            "messageId": "m5",
            "aps": {"alert": {"body": "x"}},
            "zebra": 1,
            "apple": 2
        }))
        .unwrap();
        let keys: Vec<&str> = msg.original_payload.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["messageId", "aps", "zebra", "apple"]);
    }
}
