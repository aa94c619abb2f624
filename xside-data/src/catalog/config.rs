//! Settings for the catalog API session.

use std::{fmt, time::Duration};

/// Default user agent for catalog API requests.
pub const DEFAULT_USER_AGENT: &str = "xside-engine/0.1";

/// Default per-request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default number of attempts per request, counting the first.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Configuration for [`CatalogSession`](super::CatalogSession).
#[derive(Clone)]
pub struct CatalogApiConfig {
    /// Base URL of the catalog service (e.g., `"http://localhost:8000"`).
    pub base_url: String,
    /// Account email used to authenticate.
    pub email: String,
    /// Account password used to authenticate.
    pub password: String,
    /// Timeout applied to each HTTP attempt.
    pub timeout: Duration,
    /// User agent string for requests.
    pub user_agent: String,
    /// Attempts per request, including the first; timeouts count.
    pub max_attempts: u32,
    /// Upper bound of the jittered delay before a retry; zero retries at once.
    pub retry_backoff: Duration,
}

impl Default for CatalogApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_owned(),
            email: String::new(),
            password: String::new(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_backoff: Duration::ZERO,
        }
    }
}

impl fmt::Debug for CatalogApiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CatalogApiConfig")
            .field("base_url", &self.base_url)
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("timeout", &self.timeout)
            .field("user_agent", &self.user_agent)
            .field("max_attempts", &self.max_attempts)
            .field("retry_backoff", &self.retry_backoff)
            .finish()
    }
}

impl CatalogApiConfig {
    /// Create a configuration for the service at `base_url`.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Set the account credentials.
    #[must_use]
    pub fn with_credentials(mut self, email: impl Into<String>, password: impl Into<String>) -> Self {
        self.email = email.into();
        self.password = password.into();
        self
    }

    /// Set the per-attempt timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the user agent string.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Set the attempt budget; values below one are raised to one.
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Set the retry backoff ceiling.
    #[must_use]
    pub const fn with_retry_backoff(mut self, retry_backoff: Duration) -> Self {
        self.retry_backoff = retry_backoff;
        self
    }
}
