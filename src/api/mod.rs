//! HTTP client for the delivery-report / message-send server surface.

mod base_url;

pub use base_url::{BaseUrlManager, should_refresh};

use crate::messages::{OutboundMessage, SentStatus};
use anyhow::{Context, Result, bail};
use reqwest::Client;
use serde::Deserialize;
use std::sync::RwLock;
use std::time::Duration;
use tracing::debug;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// Client for the push server's report, send and lookup endpoints.
///
/// The base URL is swappable at runtime (base-URL recovery); the
/// application code authenticates every request.
pub struct ApiClient {
    http: Client,
    base_url: RwLock<String>,
    application_code: String,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, application_code: impl Into<String>) -> Self {
        let http = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            http,
            base_url: RwLock::new(base_url.into()),
            application_code: application_code.into(),
        }
    }

    pub fn base_url(&self) -> String {
        self.base_url.read().expect("base url lock poisoned").clone()
    }

    pub fn set_base_url(&self, url: impl Into<String>) {
        *self.base_url.write().expect("base url lock poisoned") = url.into();
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url().trim_end_matches('/'), path)
    }

    fn authorization(&self) -> String {
        format!("App {}", self.application_code)
    }

    /// Report delivery of the given messages in one batched request.
    pub async fn post_delivery_report(&self, message_ids: &[String]) -> Result<()> {
        debug!("posting delivery report for {} messages", message_ids.len());
        let resp = self
            .http
            .post(self.endpoint("messages/deliveryreport"))
            .header(reqwest::header::AUTHORIZATION, self.authorization())
            .json(&serde_json::json!({ "messageIDs": message_ids }))
            .send()
            .await
            .context("delivery report request failed")?;
        ensure_success(resp).await?;
        Ok(())
    }

    /// Ask the server which base URL this application should be talking to.
    pub async fn fetch_base_url(&self) -> Result<String> {
        #[derive(Deserialize)]
        struct BaseUrlResponse {
            #[serde(rename = "baseUrl")]
            base_url: String,
        }

        let resp = self
            .http
            .get(self.endpoint("baseurl"))
            .header(reqwest::header::AUTHORIZATION, self.authorization())
            .query(&[("applicationCode", self.application_code.as_str())])
            .send()
            .await
            .context("base url lookup request failed")?;
        let resp = ensure_success(resp).await?;
        let body: BaseUrlResponse = resp
            .json()
            .await
            .context("base url lookup returned an unreadable body")?;
        Ok(body.base_url)
    }

    /// Send a batch of outbound messages; returns the server's per-message
    /// sent status keyed by message id.
    pub async fn post_messages(
        &self,
        messages: &[OutboundMessage],
    ) -> Result<Vec<(String, SentStatus)>> {
        #[derive(Deserialize)]
        struct SendResponse {
            messages: Vec<SendResult>,
        }
        #[derive(Deserialize)]
        struct SendResult {
            #[serde(rename = "messageId")]
            message_id: String,
            #[serde(rename = "statusCode")]
            status_code: i64,
        }

        let payloads: Vec<_> = messages.iter().map(OutboundMessage::to_payload).collect();
        let resp = self
            .http
            .post(self.endpoint("messages/mo"))
            .header(reqwest::header::AUTHORIZATION, self.authorization())
            .json(&serde_json::json!({ "messages": payloads }))
            .send()
            .await
            .context("message send request failed")?;
        let resp = ensure_success(resp).await?;
        let body: SendResponse = resp
            .json()
            .await
            .context("message send returned an unreadable body")?;
        Ok(body
            .messages
            .into_iter()
            .map(|r| {
                let status = match r.status_code {
                    0 => SentStatus::Sent,
                    _ => SentStatus::Failed,
                };
                (r.message_id, status)
            })
            .collect())
    }
}

async fn ensure_success(resp: reqwest::Response) -> Result<reqwest::Response> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        bail!("server responded {}: {}", status, body);
    }
    Ok(resp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> ApiClient {
        ApiClient::new(server.uri(), "test-app-code")
    }

    #[tokio::test]
    async fn test_delivery_report_posts_ids_with_auth() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/messages/deliveryreport"))
            .and(header("Authorization", "App test-app-code"))
            .and(body_json(serde_json::json!({"messageIDs": ["m1", "m2"]})))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        client(&server)
            .post_delivery_report(&["m1".into(), "m2".into()])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_delivery_report_server_error_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/messages/deliveryreport"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let err = client(&server)
            .post_delivery_report(&["m1".into()])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("500"));
    }

    #[tokio::test]
    async fn test_fetch_base_url() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/baseurl"))
            .and(query_param("applicationCode", "test-app-code"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"baseUrl": "https://eu.push.example"})),
            )
            .mount(&server)
            .await;

        let url = client(&server).fetch_base_url().await.unwrap();
        assert_eq!(url, "https://eu.push.example");
    }

    #[tokio::test]
    async fn test_post_messages_maps_statuses() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/messages/mo"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "messages": [
                    {"messageId": "a", "statusCode": 0},
                    {"messageId": "b", "statusCode": 1}
                ]
            })))
            .mount(&server)
            .await;

        let out = vec![
            OutboundMessage::new(None, "first"),
            OutboundMessage::new(None, "second"),
        ];
        let statuses = client(&server).post_messages(&out).await.unwrap();
        assert_eq!(statuses.len(), 2);
        assert_eq!(statuses[0], ("a".to_string(), SentStatus::Sent));
        assert_eq!(statuses[1], ("b".to_string(), SentStatus::Failed));
    }

    #[tokio::test]
    async fn test_base_url_swap_redirects_requests() {
        let first = MockServer::start().await;
        let second = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/messages/deliveryreport"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&second)
            .await;

        let client = client(&first);
        client.set_base_url(second.uri());
        client.post_delivery_report(&["m1".into()]).await.unwrap();
    }
}
