use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration of one pipeline instance.
///
/// Loaded from TOML or built programmatically by the embedding process;
/// everything except the application code and database path has a default.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushConfig {
    /// Application code issued by the push portal; authenticates every
    /// server request.
    pub application_code: String,

    /// Where the message store database lives.
    pub database_path: PathBuf,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Maximum number of pipeline tasks in flight at once.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// How often the base-URL lookup endpoint may be re-queried.
    #[serde(default = "default_base_url_check_hours")]
    pub base_url_check_hours: i64,
}

fn default_base_url() -> String {
    "https://api.pushgate.io".to_string()
}

fn default_max_concurrency() -> usize {
    4
}

fn default_base_url_check_hours() -> i64 {
    crate::api::BaseUrlManager::DEFAULT_INTERVAL_HOURS
}

impl PushConfig {
    pub fn new(application_code: impl Into<String>, database_path: impl Into<PathBuf>) -> Self {
        Self {
            application_code: application_code.into(),
            database_path: database_path.into(),
            base_url: default_base_url(),
            max_concurrency: default_max_concurrency(),
            base_url_check_hours: default_base_url_check_hours(),
        }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config at {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("failed to parse config at {}", path.display()))
    }
}
