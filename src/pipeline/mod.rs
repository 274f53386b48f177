//! The two units of pipeline work: ingestion and delivery reporting.

mod ingestion;
mod reporting;

pub use ingestion::{INGESTION_TASK_KIND, IngestionTask};
pub use reporting::{DELIVERY_REPORT_TASK_KIND, DeliveryReportTask};

use crate::messages::InboundMessage;
use std::sync::{Arc, RwLock};

/// Host application state at the moment a batch is submitted, as reported
/// by the embedding platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppState {
    Active,
    /// Transitioning to foreground — the state the platform reports while
    /// the user is opening the app from a notification.
    Inactive,
    Background,
}

pub type TapHandler = Arc<dyn Fn(&InboundMessage) + Send + Sync>;

/// Single-slot, replaceable handler invoked when tap detection fires.
#[derive(Clone, Default)]
pub struct TapHandlerSlot(Arc<RwLock<Option<TapHandler>>>);

impl TapHandlerSlot {
    pub fn set(&self, handler: Option<TapHandler>) {
        *self.0.write().expect("tap handler lock poisoned") = handler;
    }

    pub fn invoke(&self, message: &InboundMessage) {
        let handler = self
            .0
            .read()
            .expect("tap handler lock poisoned")
            .clone();
        if let Some(handler) = handler {
            handler(message);
        }
    }
}
