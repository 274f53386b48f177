use crate::api::ApiClient;
use crate::bus::{Event, EventBus};
use crate::errors::PipelineError;
use crate::scheduler::{CancelFlag, Task};
use async_trait::async_trait;
use pushgate_store::MessageStore;
use std::sync::Arc;
use tracing::{debug, info};

pub const DELIVERY_REPORT_TASK_KIND: &str = "delivery-report";

/// Outbox pass: report every unacknowledged record to the server and mark
/// exactly that batch reported, gated strictly on a confirmed response.
///
/// No internal retries: on failure the records stay unreported and the
/// next externally triggered run naturally re-attempts the same set.
pub struct DeliveryReportTask {
    store: Arc<MessageStore>,
    api: Arc<ApiClient>,
    bus: Arc<EventBus>,
}

impl DeliveryReportTask {
    pub fn new(store: Arc<MessageStore>, api: Arc<ApiClient>, bus: Arc<EventBus>) -> Self {
        Self { store, api, bus }
    }
}

#[async_trait]
impl Task for DeliveryReportTask {
    fn kind(&self) -> &'static str {
        DELIVERY_REPORT_TASK_KIND
    }

    async fn run(&self, cancel: CancelFlag) -> Result<(), PipelineError> {
        let unreported = self.store.find_unreported().map_err(PipelineError::Store)?;
        if unreported.is_empty() {
            info!("no delivery reports to send");
            return Ok(());
        }

        let message_ids: Vec<String> = unreported
            .into_iter()
            .map(|record| record.message_id)
            .collect();
        debug!("reporting delivery of {} messages", message_ids.len());

        if cancel.is_cancelled() {
            info!("delivery reporting cancelled");
            return Err(PipelineError::Cancelled);
        }
        self.api
            .post_delivery_report(&message_ids)
            .await
            .map_err(PipelineError::Network)?;
        if cancel.is_cancelled() {
            // Confirmed by the server but cancelled before marking: leave
            // the records unreported; the next run re-sends (idempotent
            // server side) rather than risking an unmarked success.
            info!("delivery reporting cancelled");
            return Err(PipelineError::Cancelled);
        }

        self.store
            .with_session(|session| session.mark_reported(&message_ids))
            .map_err(PipelineError::Store)?;
        info!("delivery report sent for {} messages", message_ids.len());
        self.bus.publish(&Event::DeliveryReportsSent { message_ids });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::EventKind;
    use chrono::Utc;
    use pushgate_store::{DeliveryMethod, MessageType, Payload, SeenStatus, StoredRecord};
    use std::sync::Mutex;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn record(id: &str) -> StoredRecord {
        StoredRecord {
            message_id: id.to_string(),
            payload: Payload::new(),
            created_at: Utc::now(),
            is_silent: false,
            delivery_method: DeliveryMethod::Push,
            seen_status: SeenStatus::NotSeen,
            report_sent: false,
            message_type: MessageType::Default,
            campaign_id: None,
            campaign_state: None,
        }
    }

    struct Fixture {
        store: Arc<MessageStore>,
        bus: Arc<EventBus>,
        reported_events: Arc<Mutex<Vec<Vec<String>>>>,
        _dir: tempfile::TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let store =
                Arc::new(MessageStore::open(dir.path().join("messages.sqlite3")).unwrap());
            let bus = Arc::new(EventBus::new());
            let reported_events = Arc::new(Mutex::new(Vec::new()));
            let sink = reported_events.clone();
            bus.subscribe(
                EventKind::DeliveryReportsSent,
                Arc::new(move |event| {
                    if let Event::DeliveryReportsSent { message_ids } = event {
                        sink.lock().unwrap().push(message_ids.clone());
                    }
                }),
            );
            Self {
                store,
                bus,
                reported_events,
                _dir: dir,
            }
        }

        fn task(&self, server: &MockServer) -> DeliveryReportTask {
            DeliveryReportTask::new(
                self.store.clone(),
                Arc::new(ApiClient::new(server.uri(), "code")),
                self.bus.clone(),
            )
        }
    }

    #[tokio::test]
    async fn test_success_marks_exact_batch_and_announces() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/messages/deliveryreport"))
            .and(body_json(serde_json::json!({"messageIDs": ["m1", "m2"]})))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let fx = Fixture::new();
        fx.store
            .with_session(|s| s.create_records(&[record("m1"), record("m2")]))
            .unwrap();

        fx.task(&server).run(CancelFlag::default()).await.unwrap();

        assert!(fx.store.find_unreported().unwrap().is_empty());
        assert_eq!(
            *fx.reported_events.lock().unwrap(),
            vec![vec!["m1".to_string(), "m2".to_string()]]
        );
    }

    #[tokio::test]
    async fn test_failure_mutates_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/messages/deliveryreport"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let fx = Fixture::new();
        fx.store
            .with_session(|s| s.create_records(&[record("m1")]))
            .unwrap();

        let result = fx.task(&server).run(CancelFlag::default()).await;
        assert!(matches!(result, Err(PipelineError::Network(_))));
        assert_eq!(fx.store.find_unreported().unwrap().len(), 1);
        assert!(fx.reported_events.lock().unwrap().is_empty());

        // The next run re-attempts the same set.
        server.reset().await;
        Mock::given(method("POST"))
            .and(path("/messages/deliveryreport"))
            .and(body_json(serde_json::json!({"messageIDs": ["m1"]})))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        fx.task(&server).run(CancelFlag::default()).await.unwrap();
        assert!(fx.store.find_unreported().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_outbox_skips_network() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let fx = Fixture::new();
        fx.task(&server).run(CancelFlag::default()).await.unwrap();
        assert!(fx.reported_events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_run_marks_nothing() {
        let server = MockServer::start().await;
        let fx = Fixture::new();
        fx.store
            .with_session(|s| s.create_records(&[record("m1")]))
            .unwrap();

        let cancel = CancelFlag::default();
        cancel.cancel();
        let result = fx.task(&server).run(cancel).await;
        assert!(matches!(result, Err(PipelineError::Cancelled)));
        assert_eq!(fx.store.find_unreported().unwrap().len(), 1);
    }
}
