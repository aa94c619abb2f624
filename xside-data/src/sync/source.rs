//! Inputs of the sync pipeline.

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;
use xside_core::ImagePath;

use crate::blob::{BlobStore, StoreError};
use crate::catalog::{ApiError, CatalogSession, PageRequest};

/// Paginated source of raw catalog item records.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Fetch one page of item records; an empty page ends the listing.
    async fn fetch_page(&self, page: PageRequest) -> Result<Vec<Value>, ApiError>;
}

/// Source of image bytes keyed by image path.
#[async_trait]
pub trait ImageSource: Send + Sync {
    /// Fetch the stored bytes of one image.
    async fn fetch_image(&self, path: &ImagePath) -> Result<Bytes, StoreError>;
}

#[async_trait]
impl CatalogSource for CatalogSession {
    async fn fetch_page(&self, page: PageRequest) -> Result<Vec<Value>, ApiError> {
        let response = self.get_items(None, page).await?;
        page_records(response)
    }
}

#[async_trait]
impl ImageSource for BlobStore {
    async fn fetch_image(&self, path: &ImagePath) -> Result<Bytes, StoreError> {
        Self::fetch_image(self, path).await
    }
}

/// Extract the `data` array of a listing response; `null` counts as empty.
fn page_records(response: Value) -> Result<Vec<Value>, ApiError> {
    match response {
        Value::Object(mut body) => match body.remove("data") {
            Some(Value::Array(records)) => Ok(records),
            Some(Value::Null) => Ok(Vec::new()),
            other => Err(ApiError::Parse {
                url: "api/item/".to_owned(),
                message: format!("expected a data array, found {other:?}"),
            }),
        },
        other => Err(ApiError::Parse {
            url: "api/item/".to_owned(),
            message: format!("expected a listing object, found {other}"),
        }),
    }
}
