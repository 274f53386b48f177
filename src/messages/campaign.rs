use crate::messages::InboundMessage;
use crate::messages::payload::{internal_data, keys};
use chrono::{DateTime, TimeZone, Utc};
use pushgate_store::CampaignState;
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

const CAMPAIGN_TITLE_MAX_CHARS: usize = 15;

/// A circular geographic trigger region. Holds its owning campaign by id
/// only — the campaign resolves regions, never the other way around.
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    pub id: String,
    pub title: String,
    pub latitude: f64,
    pub longitude: f64,
    pub radius_m: f64,
    pub expiry: DateTime<Utc>,
    pub campaign_id: String,
}

impl Region {
    fn from_value(value: &Value, campaign_id: &str) -> Option<Self> {
        let obj = value.as_object()?;
        let radius_m = obj.get(keys::REGION_RADIUS)?.as_f64()?;
        if radius_m <= 0.0 {
            return None;
        }
        let expiry_ms = obj.get(keys::REGION_EXPIRY)?.as_i64()?;
        Some(Self {
            id: obj.get(keys::REGION_ID)?.as_str()?.to_owned(),
            title: obj
                .get(keys::REGION_TITLE)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_owned(),
            latitude: obj.get(keys::REGION_LATITUDE)?.as_f64()?,
            longitude: obj.get(keys::REGION_LONGITUDE)?.as_f64()?,
            radius_m,
            expiry: Utc.timestamp_millis_opt(expiry_ms).single()?,
            campaign_id: campaign_id.to_owned(),
        })
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expiry
    }
}

/// A location-trigger campaign carried inside a message payload.
#[derive(Debug, Clone)]
pub struct Campaign {
    pub id: String,
    pub title: String,
    pub message: String,
    pub received_at: DateTime<Utc>,
    pub state: CampaignState,
    pub regions: Vec<Region>,
}

impl Campaign {
    /// Build a campaign from the region data of a message, if it carries
    /// any. Requires alert text; regions that fail to parse are skipped
    /// with a warning.
    pub fn from_message(message: &InboundMessage) -> Option<Self> {
        let regions_data = internal_data(&message.original_payload)?
            .get(keys::GEO)?
            .as_array()?;
        let text = message.text()?;

        let id = Uuid::new_v4().to_string();
        let regions: Vec<Region> = regions_data
            .iter()
            .filter_map(|v| {
                let region = Region::from_value(v, &id);
                if region.is_none() {
                    warn!(
                        "skipping unparsable region in message {}",
                        message.message_id
                    );
                }
                region
            })
            .collect();
        if regions.is_empty() {
            return None;
        }

        Some(Self {
            id,
            title: truncate_chars(text, CAMPAIGN_TITLE_MAX_CHARS),
            message: text.to_owned(),
            received_at: message.created_at,
            state: CampaignState::Active,
            regions,
        })
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}
