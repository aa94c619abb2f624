//! Authenticated HTTP session against the catalog service.
//!
//! The session obtains a bearer token pair on first use, attaches the access
//! token to every request, refreshes it when the service reports it as
//! invalid, and retries failed requests within a fixed attempt budget.
//!
//! # Concurrency
//!
//! Tokens live behind a read-write lock. Authentication and refresh are
//! serialised by a separate mutex; a caller that waited on it re-checks the
//! access token it saw fail and skips the refresh when another caller has
//! already replaced it.

use std::{fmt, time::Duration};

use log::{debug, info, warn};
use rand::Rng;
use reqwest::{Client, Method, StatusCode, Url};
use serde::Deserialize;
use serde_json::{Value, json};
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};

use super::{CatalogApiConfig, DisplayEvent};

const TOKEN_PATH: &str = "api/token/";
const REFRESH_PATH: &str = "api/refresh/";
const CLIENTS_PATH: &str = "api/client/";
const ITEMS_PATH: &str = "api/item/";
const EVENTS_PATH: &str = "api/incoming";
const TOKEN_NOT_VALID: &str = "token_not_valid";

/// Default number of records per listing page.
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Access and refresh tokens issued by the catalog service.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct TokenPair {
    /// Short-lived bearer token.
    pub access: String,
    /// Token used to obtain a new pair.
    pub refresh: String,
}

impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenPair")
            .field("access", &"<redacted>")
            .field("refresh", &"<redacted>")
            .finish()
    }
}

/// Paging parameters for listing endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    /// Zero-based page number.
    pub page: u32,
    /// Records per page.
    pub page_size: u32,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 0,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl PageRequest {
    /// Request page `page` with the default page size.
    #[must_use]
    pub fn page(page: u32) -> Self {
        Self {
            page,
            ..Self::default()
        }
    }

    /// Set the page size.
    #[must_use]
    pub const fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    fn query(self) -> [(&'static str, String); 2] {
        [
            ("page_size", self.page_size.to_string()),
            ("page", self.page.to_string()),
        ]
    }
}

/// Authentication failures.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The service rejected the credentials.
    #[error("authentication rejected with status {status}: {body}")]
    Unauthorized {
        /// HTTP status code.
        status: u16,
        /// Response body.
        body: String,
    },
    /// Refresh failed and the fallback authentication failed too.
    #[error("access token expired and re-authentication failed: {source}")]
    TokenExpired {
        /// Failure of the fallback authentication.
        #[source]
        source: Box<AuthError>,
    },
    /// The token endpoint could not be reached.
    #[error("token request to {url} failed: {message}")]
    Transport {
        /// Fully qualified request URL.
        url: String,
        /// Transport error description.
        message: String,
    },
    /// The token response was not a token pair.
    #[error("failed to parse token response from {url}: {message}")]
    Parse {
        /// Fully qualified request URL.
        url: String,
        /// Decoder message.
        message: String,
    },
}

/// Request failures after authentication.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The service kept answering with a non-success status.
    #[error("request to {url} failed with status {status}: {body}")]
    Status {
        /// Fully qualified request URL.
        url: String,
        /// HTTP status code of the last attempt.
        status: u16,
        /// Response body of the last attempt.
        body: String,
    },
    /// The last attempt timed out.
    #[error("request to {url} timed out after {timeout:?}")]
    Timeout {
        /// Fully qualified request URL.
        url: String,
        /// Per-attempt timeout.
        timeout: Duration,
    },
    /// The last attempt failed in transport.
    #[error("network error contacting {url}: {message}")]
    Network {
        /// Fully qualified request URL.
        url: String,
        /// Transport error description.
        message: String,
    },
    /// A success response carried invalid JSON.
    #[error("failed to parse response from {url}: {message}")]
    Parse {
        /// Fully qualified request URL.
        url: String,
        /// Decoder message.
        message: String,
    },
    /// The endpoint did not form a valid URL.
    #[error("invalid endpoint {endpoint:?}: {source}")]
    InvalidEndpoint {
        /// Offending endpoint.
        endpoint: String,
        /// Parser failure.
        #[source]
        source: url::ParseError,
    },
    /// Authentication failed.
    #[error(transparent)]
    Auth(#[from] AuthError),
}

/// Error raised when a session cannot be constructed.
#[derive(Debug, Error)]
pub enum SessionBuildError {
    /// The base URL was not a valid absolute URL.
    #[error("invalid catalog base URL {url:?}: {source}")]
    InvalidBaseUrl {
        /// Rejected URL.
        url: String,
        /// Parser failure.
        #[source]
        source: url::ParseError,
    },
    /// The HTTP client could not be built.
    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),
}

/// Authenticated catalog API session.
///
/// # Examples
///
/// ```no_run
/// use xside_data::catalog::{CatalogApiConfig, CatalogSession, PageRequest};
///
/// # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
/// let config = CatalogApiConfig::new("http://localhost:8000")
///     .with_credentials("svc@example.com", "secret");
/// let session = CatalogSession::new(config)?;
/// let first_page = session.get_items(None, PageRequest::default()).await?;
/// println!("{}", first_page["data"]);
/// # Ok(())
/// # }
/// ```
pub struct CatalogSession {
    client: Client,
    config: CatalogApiConfig,
    base_url: Url,
    tokens: RwLock<Option<TokenPair>>,
    auth_lock: Mutex<()>,
}

impl fmt::Debug for CatalogSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CatalogSession")
            .field("config", &self.config)
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: Option<String>,
}

impl CatalogSession {
    /// Create a session; no request is made until first use.
    pub fn new(config: CatalogApiConfig) -> Result<Self, SessionBuildError> {
        let base_url = parse_base_url(&config.base_url)?;
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .connect_timeout(config.timeout)
            .timeout(config.timeout)
            .build()
            .map_err(SessionBuildError::HttpClient)?;
        Ok(Self {
            client,
            config,
            base_url,
            tokens: RwLock::new(None),
            auth_lock: Mutex::new(()),
        })
    }

    /// Configuration this session was built with.
    #[must_use]
    pub const fn config(&self) -> &CatalogApiConfig {
        &self.config
    }

    /// Post the configured credentials and store the issued token pair.
    pub async fn authenticate(&self) -> Result<TokenPair, AuthError> {
        let _guard = self.auth_lock.lock().await;
        self.authenticate_locked().await
    }

    /// Exchange the refresh token for a new pair.
    ///
    /// When the refresh is rejected, falls back to one full authentication.
    pub async fn refresh(&self) -> Result<TokenPair, AuthError> {
        let _guard = self.auth_lock.lock().await;
        self.refresh_locked().await
    }

    /// `GET` a JSON document from `endpoint`, relative to the base URL.
    pub async fn get(&self, endpoint: &str, params: &[(&str, String)]) -> Result<Value, ApiError> {
        let url = self.endpoint_url(endpoint)?;
        self.send_with_retry(Method::GET, url, params, None).await
    }

    /// List clients, or fetch one client when `client_id` is given.
    pub async fn get_clients(
        &self,
        client_id: Option<u64>,
        page: PageRequest,
    ) -> Result<Value, ApiError> {
        self.get(&record_path(CLIENTS_PATH, client_id), &page.query())
            .await
    }

    /// List items, or fetch one item when `item_id` is given.
    pub async fn get_items(
        &self,
        item_id: Option<u64>,
        page: PageRequest,
    ) -> Result<Value, ApiError> {
        self.get(&record_path(ITEMS_PATH, item_id), &page.query())
            .await
    }

    /// Report a display event.
    pub async fn send_event(&self, event: &DisplayEvent) -> Result<Value, ApiError> {
        let url = self.endpoint_url(EVENTS_PATH)?;
        let body = event.to_feature_collection();
        self.send_with_retry(Method::POST, url, &[], Some(&body))
            .await
    }

    fn endpoint_url(&self, endpoint: &str) -> Result<Url, ApiError> {
        self.base_url
            .join(endpoint.trim_start_matches('/'))
            .map_err(|source| ApiError::InvalidEndpoint {
                endpoint: endpoint.to_owned(),
                source,
            })
    }

    async fn send_with_retry(
        &self,
        method: Method,
        url: Url,
        params: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<Value, ApiError> {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            let access = self.access_token().await?;
            let outcome = self
                .attempt(method.clone(), &url, params, body, &access)
                .await;
            let (error, token_rejected) = match outcome {
                Attempt::Success(value) => return Ok(value),
                Attempt::Fatal(error) => return Err(error),
                Attempt::TokenRejected(error) => (error, true),
                Attempt::Retryable(error) => (error, false),
            };
            if attempt >= max_attempts {
                return Err(error);
            }
            if token_rejected {
                debug!("access token rejected by {url}; refreshing");
                self.refresh_if_current(&access).await?;
            }
            warn!("attempt {attempt}/{max_attempts} for {url} failed: {error}");
            attempt += 1;
            let delay = retry_delay(self.config.retry_backoff, attempt);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
    }

    async fn attempt(
        &self,
        method: Method,
        url: &Url,
        params: &[(&str, String)],
        body: Option<&Value>,
        access: &str,
    ) -> Attempt {
        let mut request = self
            .client
            .request(method, url.clone())
            .bearer_auth(access);
        if !params.is_empty() {
            request = request.query(params);
        }
        if let Some(payload) = body {
            request = request.json(payload);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(err) => return Attempt::Retryable(self.convert_reqwest_error(&err, url)),
        };
        let status = response.status();
        let text = match response.text().await {
            Ok(text) => text,
            Err(err) => return Attempt::Retryable(self.convert_reqwest_error(&err, url)),
        };

        if status.is_success() {
            return match parse_body(&text) {
                Ok(value) => Attempt::Success(value),
                Err(err) => Attempt::Fatal(ApiError::Parse {
                    url: url.to_string(),
                    message: err.to_string(),
                }),
            };
        }

        let error = ApiError::Status {
            url: url.to_string(),
            status: status.as_u16(),
            body: text,
        };
        if status == StatusCode::UNAUTHORIZED && is_token_not_valid(&error) {
            Attempt::TokenRejected(error)
        } else {
            Attempt::Retryable(error)
        }
    }

    fn convert_reqwest_error(&self, error: &reqwest::Error, url: &Url) -> ApiError {
        if error.is_timeout() {
            return ApiError::Timeout {
                url: url.to_string(),
                timeout: self.config.timeout,
            };
        }
        ApiError::Network {
            url: url.to_string(),
            message: error.to_string(),
        }
    }

    async fn access_token(&self) -> Result<String, AuthError> {
        if let Some(tokens) = self.tokens.read().await.as_ref() {
            return Ok(tokens.access.clone());
        }
        let _guard = self.auth_lock.lock().await;
        if let Some(tokens) = self.tokens.read().await.as_ref() {
            return Ok(tokens.access.clone());
        }
        Ok(self.authenticate_locked().await?.access)
    }

    async fn refresh_if_current(&self, stale_access: &str) -> Result<(), AuthError> {
        let _guard = self.auth_lock.lock().await;
        let already_replaced = self
            .tokens
            .read()
            .await
            .as_ref()
            .is_some_and(|tokens| tokens.access != stale_access);
        if already_replaced {
            debug!("access token already refreshed by a concurrent request");
            return Ok(());
        }
        self.refresh_locked().await.map(drop)
    }

    async fn authenticate_locked(&self) -> Result<TokenPair, AuthError> {
        let body = json!({"email": self.config.email, "password": self.config.password});
        let tokens = self.post_for_tokens(TOKEN_PATH, &body).await?;
        info!("authenticated against {}", self.base_url);
        Ok(tokens)
    }

    async fn refresh_locked(&self) -> Result<TokenPair, AuthError> {
        let stored_refresh = self
            .tokens
            .read()
            .await
            .as_ref()
            .map(|tokens| tokens.refresh.clone());
        let Some(refresh) = stored_refresh else {
            return self.authenticate_locked().await;
        };

        match self
            .post_for_tokens(REFRESH_PATH, &json!({"refresh": refresh}))
            .await
        {
            Ok(tokens) => {
                info!("access tokens refreshed");
                Ok(tokens)
            }
            Err(err) => {
                warn!("token refresh failed: {err}; re-authenticating");
                self.authenticate_locked()
                    .await
                    .map_err(|source| AuthError::TokenExpired {
                        source: Box::new(source),
                    })
            }
        }
    }

    async fn post_for_tokens(&self, path: &str, body: &Value) -> Result<TokenPair, AuthError> {
        let url = self
            .base_url
            .join(path)
            .map_err(|err| AuthError::Transport {
                url: path.to_owned(),
                message: err.to_string(),
            })?;
        let transport = |err: reqwest::Error| AuthError::Transport {
            url: url.to_string(),
            message: err.to_string(),
        };

        let response = self
            .client
            .post(url.clone())
            .json(body)
            .send()
            .await
            .map_err(transport)?;
        let status = response.status();
        if !status.is_success() {
            return Err(AuthError::Unauthorized {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        let tokens: TokenPair = response.json().await.map_err(|err| AuthError::Parse {
            url: url.to_string(),
            message: err.to_string(),
        })?;
        *self.tokens.write().await = Some(tokens.clone());
        Ok(tokens)
    }
}

enum Attempt {
    Success(Value),
    TokenRejected(ApiError),
    Retryable(ApiError),
    Fatal(ApiError),
}

fn parse_base_url(raw: &str) -> Result<Url, SessionBuildError> {
    // A trailing slash makes `Url::join` append instead of replacing the
    // last segment.
    let normalised = format!("{}/", raw.trim_end_matches('/'));
    Url::parse(&normalised).map_err(|source| SessionBuildError::InvalidBaseUrl {
        url: raw.to_owned(),
        source,
    })
}

fn record_path(collection: &str, id: Option<u64>) -> String {
    id.map_or_else(|| collection.to_owned(), |record| format!("{collection}{record}"))
}

fn parse_body(text: &str) -> Result<Value, serde_json::Error> {
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(text)
}

fn is_token_not_valid(error: &ApiError) -> bool {
    let ApiError::Status { body, .. } = error else {
        return false;
    };
    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|parsed| parsed.code)
        .is_some_and(|code| code == TOKEN_NOT_VALID)
}

/// Full-jitter delay before attempt `attempt`, capped by `backoff * (attempt - 1)`.
fn retry_delay(backoff: Duration, attempt: u32) -> Duration {
    if backoff.is_zero() {
        return Duration::ZERO;
    }
    let base = u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX);
    let ceiling = base.saturating_mul(u64::from(attempt.saturating_sub(1)));
    Duration::from_millis(rand::thread_rng().gen_range(0..=ceiling))
}
