//! Engine configuration loaded from a JSON file.

use std::{fmt, io, time::Duration};

use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;
use thiserror::Error;
use xside_core::SelectionPolicy;

use crate::blob::BlobStoreConfig;
use crate::catalog::{CatalogApiConfig, DEFAULT_MAX_ATTEMPTS, DEFAULT_PAGE_SIZE, DEFAULT_USER_AGENT};
use crate::sync::{DEFAULT_IMAGE_CONCURRENCY, SyncOptions};

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config {path}: {source}")]
    Read {
        /// Configuration file path.
        path: Utf8PathBuf,
        /// Filesystem failure.
        #[source]
        source: io::Error,
    },
    /// The file was not valid configuration JSON.
    #[error("failed to parse config {path}: {source}")]
    Parse {
        /// Configuration file path.
        path: Utf8PathBuf,
        /// Decoder failure.
        #[source]
        source: serde_json::Error,
    },
}

/// Catalog API section of [`EngineConfig`].
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
    /// Base URL of the catalog service.
    pub base_url: String,
    /// Account email.
    pub email: String,
    /// Account password.
    pub password: String,
    /// Per-attempt timeout in seconds.
    pub timeout_secs: u64,
    /// User agent string.
    pub user_agent: String,
    /// Attempts per request, including the first.
    pub max_attempts: u32,
    /// Retry backoff ceiling in milliseconds.
    pub retry_backoff_ms: u64,
}

impl Default for ApiSettings {
    fn default() -> Self {
        let defaults = CatalogApiConfig::default();
        Self {
            base_url: defaults.base_url,
            email: String::new(),
            password: String::new(),
            timeout_secs: defaults.timeout.as_secs(),
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_backoff_ms: 0,
        }
    }
}

impl fmt::Debug for ApiSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiSettings")
            .field("base_url", &self.base_url)
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("timeout_secs", &self.timeout_secs)
            .field("user_agent", &self.user_agent)
            .field("max_attempts", &self.max_attempts)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .finish()
    }
}

impl ApiSettings {
    /// Session configuration described by these settings.
    #[must_use]
    pub fn to_session_config(&self) -> CatalogApiConfig {
        CatalogApiConfig::new(self.base_url.clone())
            .with_credentials(self.email.clone(), self.password.clone())
            .with_timeout(Duration::from_secs(self.timeout_secs))
            .with_user_agent(self.user_agent.clone())
            .with_max_attempts(self.max_attempts)
            .with_retry_backoff(Duration::from_millis(self.retry_backoff_ms))
    }
}

/// Complete engine configuration.
///
/// Every field has a default, so an empty JSON object is a valid file.
///
/// # Examples
///
/// ```
/// use xside_data::config::EngineConfig;
///
/// let config = EngineConfig::from_json_str(r#"{"api": {"base_url": "http://catalog:8000"}}"#)
///     .expect("valid config");
/// assert_eq!(config.api.base_url, "http://catalog:8000");
/// assert_eq!(config.database.as_str(), "local.db");
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Catalog API settings.
    pub api: ApiSettings,
    /// Image bucket settings.
    pub blob_store: BlobStoreConfig,
    /// SQLite database holding the catalog snapshot.
    pub database: Utf8PathBuf,
    /// Directory holding downloaded images.
    pub media_root: Utf8PathBuf,
    /// Records requested per catalog page.
    pub page_size: u32,
    /// Upper bound on concurrent image downloads.
    pub image_concurrency: usize,
    /// Whether stored images are bzip2-compressed.
    pub decompress_images: bool,
    /// Whether inactive items take part in selection.
    pub include_inactive: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            api: ApiSettings::default(),
            blob_store: BlobStoreConfig::default(),
            database: Utf8PathBuf::from("local.db"),
            media_root: Utf8PathBuf::from("media"),
            page_size: DEFAULT_PAGE_SIZE,
            image_concurrency: DEFAULT_IMAGE_CONCURRENCY,
            decompress_images: false,
            include_inactive: true,
        }
    }
}

impl EngineConfig {
    /// Parse configuration from a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Read and parse the JSON configuration file at `path`.
    pub fn from_json_file(path: &Utf8Path) -> Result<Self, ConfigError> {
        let contents = xside_fs::read_utf8_file(path).map_err(|source| ConfigError::Read {
            path: path.to_owned(),
            source,
        })?;
        Self::from_json_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_owned(),
            source,
        })
    }

    /// Sync pipeline options described by this configuration.
    #[must_use]
    pub fn sync_options(&self) -> SyncOptions {
        SyncOptions::new(self.media_root.clone())
            .with_page_size(self.page_size)
            .with_image_concurrency(self.image_concurrency)
            .with_decompress_images(self.decompress_images)
    }

    /// Selection policy described by this configuration.
    #[must_use]
    pub const fn selection_policy(&self) -> SelectionPolicy {
        SelectionPolicy {
            include_inactive: self.include_inactive,
        }
    }
}
