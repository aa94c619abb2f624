//! Scripted catalog and image sources for sync tests.

use std::{
    collections::{HashMap, HashSet},
    sync::{
        Mutex, PoisonError,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::{Value, json};
use xside_core::{AreaGeometry, ImagePath};

use crate::blob::StoreError;
use crate::catalog::{ApiError, PageRequest};
use crate::sync::{CatalogSource, ImageSource};

/// Raw catalog record as the service would send it.
///
/// # Panics
///
/// Panics when `areas` cannot be encoded, which never happens for
/// well-formed geometry.
#[must_use]
#[expect(clippy::expect_used, reason = "builders fail fast on bad fixtures")]
pub fn catalog_record(id: u64, areas: &AreaGeometry, max_rate: f64, images: &[&str]) -> Value {
    json!({
        "id": id,
        "client": "Client1",
        "name": format!("TestItem{id}"),
        "areas": serde_json::to_value(areas).expect("geometry encodes"),
        "is_active": true,
        "max_rate": max_rate,
        "images": images,
    })
}

/// Catalog source that serves fixed pages by page number.
///
/// Pages past the end are empty. A page number can be scripted to fail.
#[derive(Debug, Default)]
pub struct StubCatalogSource {
    pages: Vec<Vec<Value>>,
    fail_page: Option<u32>,
    requests: AtomicUsize,
}

impl StubCatalogSource {
    /// Serve `pages` in order.
    #[must_use]
    pub fn with_pages(pages: Vec<Vec<Value>>) -> Self {
        Self {
            pages,
            ..Self::default()
        }
    }

    /// Answer requests for `page` with a server error.
    #[must_use]
    pub const fn failing_on_page(mut self, page: u32) -> Self {
        self.fail_page = Some(page);
        self
    }

    /// Number of page requests served so far.
    #[must_use]
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CatalogSource for StubCatalogSource {
    async fn fetch_page(&self, page: PageRequest) -> Result<Vec<Value>, ApiError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        if self.fail_page == Some(page.page) {
            return Err(ApiError::Status {
                url: format!("api/item/?page={}", page.page),
                status: 500,
                body: "scripted failure".to_owned(),
            });
        }
        let index = usize::try_from(page.page).unwrap_or(usize::MAX);
        Ok(self.pages.get(index).cloned().unwrap_or_default())
    }
}

/// Image source backed by a map, with scripted failures and latency.
#[derive(Debug, Default)]
pub struct StubImageSource {
    images: HashMap<String, Bytes>,
    failing: HashSet<String>,
    delay: Option<Duration>,
    fetched: Mutex<Vec<String>>,
}

impl StubImageSource {
    /// Serve `contents` for each path in `paths`.
    #[must_use]
    pub fn with_images(paths: &[&str], contents: &[u8]) -> Self {
        Self {
            images: paths
                .iter()
                .map(|path| ((*path).to_owned(), Bytes::copy_from_slice(contents)))
                .collect(),
            ..Self::default()
        }
    }

    /// Fail fetches of `path` with a transport-level not-found.
    #[must_use]
    pub fn failing(mut self, path: &str) -> Self {
        self.failing.insert(path.to_owned());
        self
    }

    /// Sleep for `delay` before answering each fetch.
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Paths fetched successfully so far, in completion order.
    #[must_use]
    pub fn fetched(&self) -> Vec<String> {
        self.fetched
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl ImageSource for StubImageSource {
    async fn fetch_image(&self, path: &ImagePath) -> Result<Bytes, StoreError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let bytes = self
            .images
            .get(path.as_str())
            .filter(|_| !self.failing.contains(path.as_str()))
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                path: path.as_str().to_owned(),
            })?;
        self.fetched
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(path.as_str().to_owned());
        Ok(bytes)
    }
}
