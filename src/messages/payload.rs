//! Well-known payload keys and the alert section shared by both silent and
//! user-visible notifications.
//!
//! Payloads are opaque ordered maps; the pipeline only ever looks at the
//! keys defined here and passes everything else through untouched.

use pushgate_store::Payload;
use serde_json::Value;

pub mod keys {
    pub const MESSAGE_ID: &str = "messageId";
    pub const APS: &str = "aps";
    pub const ALERT: &str = "alert";
    pub const BODY: &str = "body";
    pub const TITLE: &str = "title";
    pub const SOUND: &str = "sound";
    pub const BADGE: &str = "badge";
    pub const INTERNAL_DATA: &str = "internalData";
    pub const SILENT: &str = "silent";
    pub const CUSTOM_PAYLOAD: &str = "customPayload";
    pub const GEO: &str = "geo";

    pub const REGION_ID: &str = "id";
    pub const REGION_TITLE: &str = "title";
    pub const REGION_LATITUDE: &str = "latitude";
    pub const REGION_LONGITUDE: &str = "longitude";
    pub const REGION_RADIUS: &str = "radiusInMeters";
    pub const REGION_EXPIRY: &str = "expiry";
}

/// Resolved alert content of an inbound message.
///
/// For silent messages the alert fields are carried inside the silent
/// sub-object and override the native alert section.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Alert {
    pub body: Option<String>,
    pub title: Option<String>,
    pub sound: Option<String>,
    pub badge: Option<i64>,
}

impl Alert {
    pub(crate) fn from_aps(aps: &serde_json::Map<String, Value>) -> Self {
        let alert = aps.get(keys::ALERT).and_then(Value::as_object);
        Self {
            body: alert
                .and_then(|a| a.get(keys::BODY))
                .and_then(Value::as_str)
                .map(str::to_owned),
            title: alert
                .and_then(|a| a.get(keys::TITLE))
                .and_then(Value::as_str)
                .map(str::to_owned),
            sound: aps
                .get(keys::SOUND)
                .and_then(Value::as_str)
                .map(str::to_owned),
            badge: aps.get(keys::BADGE).and_then(Value::as_i64),
        }
    }

    /// Alert section of a silent message: fields from the silent sub-object
    /// take precedence over whatever the native section carries.
    pub(crate) fn merged(
        native: &serde_json::Map<String, Value>,
        silent: &serde_json::Map<String, Value>,
    ) -> Self {
        let base = Self::from_aps(native);
        Self {
            body: silent
                .get(keys::BODY)
                .and_then(Value::as_str)
                .map(str::to_owned)
                .or(base.body),
            title: silent
                .get(keys::TITLE)
                .and_then(Value::as_str)
                .map(str::to_owned)
                .or(base.title),
            sound: silent
                .get(keys::SOUND)
                .and_then(Value::as_str)
                .map(str::to_owned)
                .or(base.sound),
            badge: base.badge,
        }
    }
}

/// The `internalData` section, if present and an object.
pub(crate) fn internal_data(payload: &Payload) -> Option<&serde_json::Map<String, Value>> {
    payload.get(keys::INTERNAL_DATA).and_then(Value::as_object)
}

/// The silent sub-object under `internalData`, if any.
pub(crate) fn silent_data(payload: &Payload) -> Option<&serde_json::Map<String, Value>> {
    internal_data(payload)?.get(keys::SILENT).and_then(Value::as_object)
}

/// A message is silent when the payload carries a silent sub-object
/// (push-originated) or a boolean silent marker at the top level
/// (server-originated). Either overrides the presence of an alert.
pub(crate) fn is_silent(payload: &Payload) -> bool {
    if silent_data(payload).is_some() {
        return true;
    }
    payload
        .get(keys::SILENT)
        .and_then(Value::as_bool)
        .unwrap_or(false)
}
