use crate::api::{ApiClient, BaseUrlManager};
use crate::bus::{Event, EventBus, EventHandler, EventKind, SubscriptionToken};
use crate::config::PushConfig;
use crate::errors::{PipelineError, PipelineResult};
use crate::location::{InactiveLocationMonitor, LocationMonitor};
use crate::messages::{InboundMessage, OutboundMessage, SentStatus};
use crate::pipeline::{
    AppState, DeliveryReportTask, IngestionTask, TapHandler, TapHandlerSlot,
};
use crate::scheduler::{TaskCompletion, TaskScheduler};
use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use pushgate_store::{DeliveryMethod, MessageStore, Payload};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// The assembled pipeline: store, scheduler, fan-out bus, API client and
/// tap-handler slot behind one explicitly constructed context.
///
/// Lifecycle belongs to the embedding process: construct it at bootstrap,
/// pass it by reference, call [`PushClient::shutdown`] on the way out.
pub struct PushClient {
    store: Arc<MessageStore>,
    bus: Arc<EventBus>,
    api: Arc<ApiClient>,
    scheduler: TaskScheduler,
    location: Arc<dyn LocationMonitor>,
    base_url: BaseUrlManager,
    tap_handler: TapHandlerSlot,
}

impl PushClient {
    pub fn new(config: PushConfig) -> Result<Self> {
        let store = Arc::new(MessageStore::open(&config.database_path)?);
        let bus = Arc::new(EventBus::new());
        let api = Arc::new(ApiClient::new(&config.base_url, &config.application_code));
        let base_url = BaseUrlManager::new(
            store.clone(),
            api.clone(),
            Duration::hours(config.base_url_check_hours),
        );

        let tap_handler = TapHandlerSlot::default();
        tap_handler.set(Some(default_tap_handler(store.clone(), bus.clone())));

        Ok(Self {
            store,
            bus,
            api,
            scheduler: TaskScheduler::new(config.max_concurrency),
            location: Arc::new(InactiveLocationMonitor),
            base_url,
            tap_handler,
        })
    }

    /// Attach a running location-monitor subsystem. Without one,
    /// location-trigger payloads degrade to default/silent records.
    pub fn with_location_monitor(mut self, monitor: Arc<dyn LocationMonitor>) -> Self {
        self.location = monitor;
        self
    }

    /// Replace the notification-tap handler. The default marks the tapped
    /// message as seen; `None` disables tap handling entirely.
    pub fn set_notification_tap_handler(&self, handler: Option<TapHandler>) {
        self.tap_handler.set(handler);
    }

    pub fn subscribe(&self, kind: EventKind, handler: EventHandler) -> SubscriptionToken {
        self.bus.subscribe(kind, handler)
    }

    pub fn unsubscribe(&self, token: SubscriptionToken) {
        self.bus.unsubscribe(token);
    }

    /// Ingest one payload delivered by the platform push transport.
    pub fn handle_push_payload(
        &self,
        payload: Payload,
        app_state: AppState,
    ) -> PipelineResult<TaskCompletion> {
        let message = InboundMessage::from_payload(payload, DeliveryMethod::Push, Utc::now())
            .inspect_err(|e| warn!("rejecting pushed payload: {}", e))?;
        Ok(self.submit_ingestion(vec![message], app_state))
    }

    /// Ingest a batch fetched from the server. Malformed candidates are
    /// dropped with a warning; the rest of the batch proceeds.
    pub fn handle_pulled_payloads(
        &self,
        payloads: Vec<serde_json::Value>,
        app_state: AppState,
    ) -> TaskCompletion {
        let now = Utc::now();
        let batch: Vec<InboundMessage> = payloads
            .into_iter()
            .filter_map(|value| match InboundMessage::from_json(value, now) {
                Ok(message) => Some(message),
                Err(e) => {
                    warn!("dropping pulled candidate: {}", e);
                    None
                }
            })
            .collect();
        self.submit_ingestion(batch, app_state)
    }

    /// A locally replayed notification re-enters only tap detection; the
    /// message was ingested when it originally arrived.
    pub fn handle_local_replay(
        &self,
        payload: Payload,
        created_at: DateTime<Utc>,
        app_state: AppState,
    ) -> PipelineResult<()> {
        let message =
            InboundMessage::from_payload(payload, DeliveryMethod::LocalReplay, created_at)
                .inspect_err(|e| warn!("rejecting replayed payload: {}", e))?;
        if app_state == AppState::Inactive {
            debug!("replayed notification {} tapped", message.message_id);
            self.bus.publish(&Event::NotificationTapped {
                message: message.clone(),
            });
            self.tap_handler.invoke(&message);
        }
        Ok(())
    }

    /// Refresh the base URL if due, then kick off an exclusive delivery
    /// report pass. Returns `None` when a pass is already in flight.
    pub async fn sync(&self) -> Option<TaskCompletion> {
        if let Err(e) = self.base_url.check().await {
            warn!("base url check failed: {}", e);
        }
        self.submit_delivery_report()
    }

    /// Submit a delivery report pass; rejected while one is in flight.
    pub fn submit_delivery_report(&self) -> Option<TaskCompletion> {
        self.scheduler.submit_exclusive(DeliveryReportTask::new(
            self.store.clone(),
            self.api.clone(),
            self.bus.clone(),
        ))
    }

    /// Mark messages as seen by the user and announce the change.
    pub fn set_seen(&self, message_ids: &[String]) -> PipelineResult<()> {
        let changed = self
            .store
            .mark_seen(message_ids)
            .map_err(PipelineError::Store)?;
        if !changed.is_empty() {
            self.bus.publish(&Event::SeenStatusChanged {
                message_ids: changed,
            });
        }
        Ok(())
    }

    /// Send outbound messages; each comes back with its sent status set
    /// from the server's per-message result.
    pub async fn send_messages(
        &self,
        mut messages: Vec<OutboundMessage>,
    ) -> PipelineResult<Vec<OutboundMessage>> {
        let statuses: HashMap<String, SentStatus> = self
            .api
            .post_messages(&messages)
            .await
            .map_err(PipelineError::Network)?
            .into_iter()
            .collect();
        for message in &mut messages {
            message.sent_status = statuses
                .get(&message.message_id)
                .copied()
                .unwrap_or(SentStatus::Failed);
        }
        Ok(messages)
    }

    /// Cancel in-flight work and stop admitting new tasks.
    pub fn shutdown(&self) {
        self.scheduler.shutdown();
    }

    /// Direct handle to the message store, e.g. for data-retention jobs
    /// owned by the embedding app.
    pub fn store_handle(&self) -> &MessageStore {
        &self.store
    }

    fn submit_ingestion(&self, batch: Vec<InboundMessage>, app_state: AppState) -> TaskCompletion {
        self.scheduler.submit(IngestionTask::new(
            batch,
            app_state,
            self.store.clone(),
            self.bus.clone(),
            self.location.clone(),
            self.tap_handler.clone(),
        ))
    }
}

/// Out of the box a tap marks the corresponding message as seen.
fn default_tap_handler(store: Arc<MessageStore>, bus: Arc<EventBus>) -> TapHandler {
    Arc::new(move |message: &InboundMessage| {
        debug!("notification alert tapped");
        match store.mark_seen(&[message.message_id.clone()]) {
            Ok(changed) if !changed.is_empty() => {
                bus.publish(&Event::SeenStatusChanged {
                    message_ids: changed,
                });
            }
            Ok(_) => {}
            Err(e) => warn!("failed to mark tapped message seen: {}", e),
        }
    })
}
