//! Contract of the location-region monitoring subsystem.
//!
//! The pipeline only classifies and hands over: region matching and
//! entered/exited events are the subsystem's own business, announced on
//! its own channel rather than the pipeline bus.

use crate::messages::Campaign;
use pushgate_store::StoredRecord;
use tracing::debug;

pub trait LocationMonitor: Send + Sync {
    /// Whether region monitoring is currently running. When it is not,
    /// location-trigger payloads degrade to default/silent classification.
    fn is_active(&self) -> bool;

    /// Hand a newly persisted location-trigger record and its campaign to
    /// the subsystem for region registration.
    fn register_trigger(&self, record: &StoredRecord, campaign: &Campaign);
}

/// Stand-in used when the embedding app runs without location monitoring.
#[derive(Default)]
pub struct InactiveLocationMonitor;

impl LocationMonitor for InactiveLocationMonitor {
    fn is_active(&self) -> bool {
        false
    }

    fn register_trigger(&self, record: &StoredRecord, _campaign: &Campaign) {
        debug!(
            "location monitoring inactive, ignoring trigger {}",
            record.message_id
        );
    }
}
