use anyhow::{Result, bail};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};

/// Raw message content as received from the transport layer. Key order is
/// preserved so re-serialized payloads round-trip byte-identical.
pub type Payload = IndexMap<String, serde_json::Value>;

/// How an inbound message reached the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMethod {
    /// Delivered by the platform push transport.
    Push,
    /// Fetched from the server.
    Pull,
    /// Replayed from a locally scheduled notification.
    LocalReplay,
}

impl DeliveryMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            DeliveryMethod::Push => "push",
            DeliveryMethod::Pull => "pull",
            DeliveryMethod::LocalReplay => "local_replay",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "push" => Ok(DeliveryMethod::Push),
            "pull" => Ok(DeliveryMethod::Pull),
            "local_replay" => Ok(DeliveryMethod::LocalReplay),
            other => bail!("unknown delivery method: {}", other),
        }
    }
}

/// Pipeline classification of a stored record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Default,
    Silent,
    LocationTrigger,
}

impl MessageType {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageType::Default => "default",
            MessageType::Silent => "silent",
            MessageType::LocationTrigger => "location_trigger",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "default" => Ok(MessageType::Default),
            "silent" => Ok(MessageType::Silent),
            "location_trigger" => Ok(MessageType::LocationTrigger),
            other => bail!("unknown message type: {}", other),
        }
    }
}

/// Whether the user has seen a message, and whether the server knows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeenStatus {
    NotSeen,
    SeenNotSent,
    SeenSent,
}

impl SeenStatus {
    pub fn as_i64(self) -> i64 {
        match self {
            SeenStatus::NotSeen => 0,
            SeenStatus::SeenNotSent => 1,
            SeenStatus::SeenSent => 2,
        }
    }

    pub fn from_i64(v: i64) -> Result<Self> {
        match v {
            0 => Ok(SeenStatus::NotSeen),
            1 => Ok(SeenStatus::SeenNotSent),
            2 => Ok(SeenStatus::SeenSent),
            other => bail!("unknown seen status: {}", other),
        }
    }
}

/// Lifecycle state of the campaign a location-trigger record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignState {
    Active,
    Suspended,
    Finished,
}

impl CampaignState {
    pub fn as_str(self) -> &'static str {
        match self {
            CampaignState::Active => "active",
            CampaignState::Suspended => "suspended",
            CampaignState::Finished => "finished",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "active" => Ok(CampaignState::Active),
            "suspended" => Ok(CampaignState::Suspended),
            "finished" => Ok(CampaignState::Finished),
            other => bail!("unknown campaign state: {}", other),
        }
    }
}

/// Minimal dedup projection of a message. Equality and hashing go through
/// `message_id` only; `is_silent` rides along for classification.
#[derive(Debug, Clone, Eq)]
pub struct MessageIdentity {
    pub message_id: String,
    pub is_silent: bool,
}

impl PartialEq for MessageIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.message_id == other.message_id
    }
}

impl Hash for MessageIdentity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.message_id.hash(state);
    }
}

/// Persisted counterpart of an inbound message plus pipeline-owned state.
///
/// Created exactly once when a message is first recognized as new;
/// `report_sent` flips only on a confirmed delivery report. Records are
/// never deleted by the pipeline.
#[derive(Debug, Clone)]
pub struct StoredRecord {
    pub message_id: String,
    pub payload: Payload,
    pub created_at: DateTime<Utc>,
    pub is_silent: bool,
    pub delivery_method: DeliveryMethod,
    pub seen_status: SeenStatus,
    pub report_sent: bool,
    pub message_type: MessageType,
    pub campaign_id: Option<String>,
    pub campaign_state: Option<CampaignState>,
}

impl StoredRecord {
    pub fn identity(&self) -> MessageIdentity {
        MessageIdentity {
            message_id: self.message_id.clone(),
            is_silent: self.is_silent,
        }
    }
}
