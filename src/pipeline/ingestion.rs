use crate::bus::{Event, EventBus};
use crate::errors::PipelineError;
use crate::location::LocationMonitor;
use crate::messages::{Campaign, InboundMessage};
use crate::pipeline::{AppState, TapHandlerSlot};
use crate::scheduler::{CancelFlag, Task};
use async_trait::async_trait;
use pushgate_store::{CampaignState, MessageStore, MessageType, StoredRecord};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

pub const INGESTION_TASK_KIND: &str = "message-ingestion";

/// Dedup, persist, classify and announce one batch of inbound messages.
///
/// The whole set-difference-then-write sequence runs in one store session,
/// so a concurrently running reporting task never observes a half-written
/// batch, and resubmitting the same batch is idempotent.
pub struct IngestionTask {
    batch: Vec<InboundMessage>,
    app_state: AppState,
    store: Arc<MessageStore>,
    bus: Arc<EventBus>,
    location: Arc<dyn LocationMonitor>,
    tap_handler: TapHandlerSlot,
}

struct IngestOutcome {
    new: Vec<(InboundMessage, MessageType)>,
    existing: Vec<InboundMessage>,
    triggers: Vec<(StoredRecord, Campaign)>,
}

impl IngestionTask {
    pub fn new(
        batch: Vec<InboundMessage>,
        app_state: AppState,
        store: Arc<MessageStore>,
        bus: Arc<EventBus>,
        location: Arc<dyn LocationMonitor>,
        tap_handler: TapHandlerSlot,
    ) -> Self {
        Self {
            batch,
            app_state,
            store,
            bus,
            location,
            tap_handler,
        }
    }

    /// The platform reports `Inactive` while the user opens the app from a
    /// notification; a single-candidate batch in that state is taken as a
    /// tap. A heuristic: there is no explicit platform signal for it.
    fn is_notification_tapped(&self) -> bool {
        self.app_state == AppState::Inactive && self.batch.len() == 1
    }

    fn fire_tap(&self, message: &InboundMessage) {
        debug!("notification {} tapped", message.message_id);
        self.bus.publish(&Event::NotificationTapped {
            message: message.clone(),
        });
        self.tap_handler.invoke(message);
    }

    fn classify(&self, message: &InboundMessage) -> (StoredRecord, Option<Campaign>) {
        let mut record = StoredRecord {
            message_id: message.message_id.clone(),
            payload: message.original_payload.clone(),
            created_at: message.created_at,
            is_silent: message.is_silent,
            delivery_method: message.delivery_method,
            seen_status: message.seen_status,
            report_sent: message.delivery_report_sent,
            message_type: MessageType::Default,
            campaign_id: None,
            campaign_state: None,
        };
        if let Some(campaign) = Campaign::from_message(message) {
            if self.location.is_active() {
                record.message_type = MessageType::LocationTrigger;
                record.campaign_id = Some(campaign.id.clone());
                record.campaign_state = Some(CampaignState::Active);
                return (record, Some(campaign));
            }
            // Region data without an active monitor degrades to the
            // alert-based classification below.
        }
        if message.is_silent {
            record.message_type = MessageType::Silent;
        }
        (record, None)
    }
}

#[async_trait]
impl Task for IngestionTask {
    fn kind(&self) -> &'static str {
        INGESTION_TASK_KIND
    }

    async fn run(&self, cancel: CancelFlag) -> Result<(), PipelineError> {
        debug!("starting message ingestion");
        if self.batch.is_empty() {
            debug!("no candidates to handle");
            return Ok(());
        }
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        let outcome = self
            .store
            .with_session(|session| {
                let stored = session.identities()?;
                let mut seen_in_batch = HashSet::new();
                let mut new = Vec::new();
                let mut existing = Vec::new();
                for message in &self.batch {
                    if !seen_in_batch.insert(message.message_id.clone()) {
                        continue;
                    }
                    if stored.contains(&message.identity()) {
                        existing.push(message.clone());
                    } else {
                        new.push(message.clone());
                    }
                }
                if new.is_empty() {
                    return Ok(IngestOutcome {
                        new: Vec::new(),
                        existing,
                        triggers: Vec::new(),
                    });
                }

                let mut records = Vec::new();
                let mut triggers = Vec::new();
                let new = new
                    .into_iter()
                    .map(|message| {
                        let (record, campaign) = self.classify(&message);
                        let message_type = record.message_type;
                        if let Some(campaign) = campaign {
                            triggers.push((record.clone(), campaign));
                        }
                        records.push(record);
                        (message, message_type)
                    })
                    .collect();
                session.create_records(&records)?;
                Ok(IngestOutcome {
                    new,
                    existing,
                    triggers,
                })
            })
            .map_err(PipelineError::Store)?;

        // Side effects only after the batch committed.
        for (record, campaign) in &outcome.triggers {
            self.location.register_trigger(record, campaign);
        }

        if outcome.new.is_empty() {
            debug!("no new messages to handle");
            if self.is_notification_tapped()
                && let Some(message) = outcome.existing.first()
            {
                self.fire_tap(message);
            }
            return Ok(());
        }

        info!("persisted {} new messages", outcome.new.len());
        if self.is_notification_tapped()
            && let Some((message, _)) = outcome.new.first()
        {
            self.fire_tap(message);
        }
        for (message, message_type) in &outcome.new {
            // Location triggers are announced by the location subsystem's
            // own channel, not here.
            if *message_type == MessageType::LocationTrigger {
                continue;
            }
            self.bus.publish(&Event::MessageReceived {
                message: message.clone(),
            });
        }
        Ok(())
    }
}
