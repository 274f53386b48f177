//! End-to-end pipeline flows against a real store and a mock server.

use pushgate::bus::{Event, EventKind};
use pushgate::pipeline::AppState;
use pushgate::store::{MessageType, Payload, SeenStatus};
use pushgate::{PushClient, PushConfig};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("pushgate=debug")
        .try_init();
}

fn payload(id: &str, body: &str) -> Payload {
    serde_json::from_value(serde_json::json!({
        "messageId": id,
        "aps": {"alert": {"body": body}}
    }))
    .unwrap()
}

struct Recorded {
    received: Arc<Mutex<Vec<String>>>,
    tapped: Arc<Mutex<Vec<String>>>,
}

fn record_events(client: &PushClient) -> Recorded {
    let received = Arc::new(Mutex::new(Vec::new()));
    let sink = received.clone();
    client.subscribe(
        EventKind::MessageReceived,
        Arc::new(move |event| {
            if let Event::MessageReceived { message } = event {
                sink.lock().unwrap().push(message.message_id.clone());
            }
        }),
    );
    let tapped = Arc::new(Mutex::new(Vec::new()));
    let sink = tapped.clone();
    client.subscribe(
        EventKind::NotificationTapped,
        Arc::new(move |event| {
            if let Event::NotificationTapped { message } = event {
                sink.lock().unwrap().push(message.message_id.clone());
            }
        }),
    );
    Recorded { received, tapped }
}

#[tokio::test]
async fn single_new_message_while_opening_the_app() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let client =
        PushClient::new(PushConfig::new("app-code", dir.path().join("m.sqlite3"))).unwrap();
    let events = record_events(&client);

    // One fresh candidate arriving while the platform reports Inactive:
    // persisted as Default, fanned out once, and treated as a tap.
    client
        .handle_push_payload(payload("m1", "hi"), AppState::Inactive)
        .unwrap()
        .await
        .unwrap()
        .unwrap();

    let records = client.store_handle().find_by_ids(&["m1".into()]).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].message_type, MessageType::Default);
    assert_eq!(*events.received.lock().unwrap(), vec!["m1"]);
    assert_eq!(*events.tapped.lock().unwrap(), vec!["m1"]);
    // The default tap handler marked it seen.
    assert_eq!(records[0].seen_status, SeenStatus::SeenNotSent);
}

#[tokio::test]
async fn duplicate_delivery_via_push_and_pull() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let client =
        PushClient::new(PushConfig::new("app-code", dir.path().join("m.sqlite3"))).unwrap();
    let events = record_events(&client);

    client
        .handle_push_payload(payload("m1", "hi"), AppState::Active)
        .unwrap()
        .await
        .unwrap()
        .unwrap();
    // The same message comes back from a background fetch alongside a new one.
    client
        .handle_pulled_payloads(
            vec![
                serde_json::json!({"messageId": "m1", "aps": {"alert": {"body": "hi"}}}),
                serde_json::json!({"messageId": "m2", "aps": {"alert": {"body": "more"}}}),
            ],
            AppState::Background,
        )
        .await
        .unwrap()
        .unwrap();

    assert_eq!(*events.received.lock().unwrap(), vec!["m1", "m2"]);
    assert!(events.tapped.lock().unwrap().is_empty());
}

#[tokio::test]
async fn delivery_reporting_is_exclusive_and_atomic() {
    init_tracing();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/messages/deliveryreport"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(150)))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let mut config = PushConfig::new("app-code", dir.path().join("m.sqlite3"));
    config.base_url = server.uri();
    let client = PushClient::new(config).unwrap();

    client
        .handle_push_payload(payload("m1", "hi"), AppState::Active)
        .unwrap()
        .await
        .unwrap()
        .unwrap();

    let first = client.submit_delivery_report().expect("first pass accepted");
    // While the first pass is waiting on the server, a second is rejected
    // and must not disturb the in-flight batch.
    assert!(client.submit_delivery_report().is_none());

    first.await.unwrap().unwrap();
    assert!(client.store_handle().find_unreported().unwrap().is_empty());

    // With the pass finished the kind is free again; an empty outbox
    // completes without touching the network (the mock expects one call).
    let second = client.submit_delivery_report().expect("kind free again");
    second.await.unwrap().unwrap();
}

#[tokio::test]
async fn sync_recovers_base_url_then_reports() {
    init_tracing();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/baseurl"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"baseUrl": server.uri()})),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/messages/deliveryreport"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let mut config = PushConfig::new("app-code", dir.path().join("m.sqlite3"));
    config.base_url = server.uri();
    let client = PushClient::new(config).unwrap();

    client
        .handle_push_payload(payload("m1", "hi"), AppState::Active)
        .unwrap()
        .await
        .unwrap()
        .unwrap();

    let completion = client.sync().await.expect("report pass accepted");
    completion.await.unwrap().unwrap();
    assert!(client.store_handle().find_unreported().unwrap().is_empty());

    // A second sync inside the check interval skips the lookup endpoint.
    let completion = client.sync().await.expect("second pass accepted");
    completion.await.unwrap().unwrap();
}

#[tokio::test]
async fn failed_report_keeps_records_queued() {
    init_tracing();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/messages/deliveryreport"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let mut config = PushConfig::new("app-code", dir.path().join("m.sqlite3"));
    config.base_url = server.uri();
    let client = PushClient::new(config).unwrap();

    client
        .handle_push_payload(payload("m1", "hi"), AppState::Active)
        .unwrap()
        .await
        .unwrap()
        .unwrap();

    let result = client
        .submit_delivery_report()
        .expect("pass accepted")
        .await
        .unwrap();
    assert!(result.is_err());
    // No data loss: the record stays flagged until the server recovers.
    assert_eq!(client.store_handle().find_unreported().unwrap().len(), 1);
}
