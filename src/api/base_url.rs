use crate::api::ApiClient;
use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use pushgate_store::MessageStore;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Whether enough time has passed since `last_check` to query the lookup
/// endpoint again. A missing timestamp always refreshes.
pub fn should_refresh(
    last_check: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    interval: Duration,
) -> bool {
    match last_check {
        None => true,
        Some(at) => at + interval <= now,
    }
}

/// Keeps the API client pointed at the base URL the server wants us on.
///
/// The lookup endpoint is queried at most once per interval; the gating
/// timestamp persists in the store so restarts don't re-query early.
pub struct BaseUrlManager {
    store: Arc<MessageStore>,
    api: Arc<ApiClient>,
    interval: Duration,
}

impl BaseUrlManager {
    pub const DEFAULT_INTERVAL_HOURS: i64 = 24;

    pub fn new(store: Arc<MessageStore>, api: Arc<ApiClient>, interval: Duration) -> Self {
        Self {
            store,
            api,
            interval,
        }
    }

    /// No-op inside the interval; otherwise query the lookup endpoint and
    /// swap the client's base URL on success. A failed lookup is logged
    /// and leaves both the URL and the timestamp untouched.
    pub async fn check(&self) -> Result<()> {
        let last_check = self.store.base_url_checked_at()?;
        let now = Utc::now();
        if !should_refresh(last_check, now, self.interval) {
            debug!("base url check not due yet (last {:?})", last_check);
            return Ok(());
        }

        debug!("checking current base url");
        match self.api.fetch_base_url().await {
            Ok(url) => {
                self.api.set_base_url(&url);
                self.store.set_base_url_checked_at(now)?;
                info!("base url set to {}", url);
            }
            Err(e) => error!("base url lookup failed: {}", e),
        }
        Ok(())
    }
}
