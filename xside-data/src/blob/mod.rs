//! Path-addressed blob storage for image assets.
//!
//! [`BlobStore`] wraps any [`ObjectStore`] (S3-compatible buckets in
//! production, [`InMemory`] in tests) and layers optional bzip2 compression
//! on top, applied before upload and reversed after download.

use std::{fmt, io, sync::Arc};

use bytes::Bytes;
use futures_util::TryStreamExt;
use log::debug;
use object_store::{
    ObjectStore, PutPayload, aws::AmazonS3Builder, memory::InMemory, path::Path as ObjectPath,
};
use serde::Deserialize;
use thiserror::Error;
use xside_core::ImagePath;

pub mod codec;

/// Errors raised by blob operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No object exists at the path.
    #[error("blob {path} not found")]
    NotFound {
        /// Requested path.
        path: String,
    },
    /// The path is not a valid object key.
    #[error("invalid blob path {path:?}: {source}")]
    InvalidPath {
        /// Rejected path.
        path: String,
        /// Parser failure.
        #[source]
        source: object_store::path::Error,
    },
    /// The backing store failed.
    #[error("blob transport failed for {path}: {source}")]
    Transport {
        /// Path being accessed.
        path: String,
        /// Backend failure.
        #[source]
        source: object_store::Error,
    },
    /// Compressing or decompressing the payload failed.
    #[error("blob codec failed for {path}: {source}")]
    Codec {
        /// Path being accessed.
        path: String,
        /// Codec failure.
        #[source]
        source: io::Error,
    },
    /// The backend could not be built from configuration.
    #[error("failed to configure blob store: {source}")]
    Configuration {
        /// Builder failure.
        #[source]
        source: object_store::Error,
    },
}

/// Connection settings for an S3-compatible bucket.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct BlobStoreConfig {
    /// Endpoint URL; `None` uses the provider default.
    pub endpoint: Option<String>,
    /// Bucket name.
    pub bucket: String,
    /// Access key identifier.
    pub access_key_id: Option<String>,
    /// Secret access key.
    pub secret_access_key: Option<String>,
    /// Signing region.
    pub region: String,
    /// Whether plain HTTP endpoints are accepted.
    pub allow_http: bool,
}

impl Default for BlobStoreConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            bucket: "xside".to_owned(),
            access_key_id: None,
            secret_access_key: None,
            region: "us-east-1".to_owned(),
            allow_http: false,
        }
    }
}

impl fmt::Debug for BlobStoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlobStoreConfig")
            .field("endpoint", &self.endpoint)
            .field("bucket", &self.bucket)
            .field("access_key_id", &self.access_key_id)
            .field(
                "secret_access_key",
                &self.secret_access_key.as_ref().map(|_| "<redacted>"),
            )
            .field("region", &self.region)
            .field("allow_http", &self.allow_http)
            .finish()
    }
}

impl BlobStoreConfig {
    /// Create a configuration for `bucket` with default settings.
    #[must_use]
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            ..Self::default()
        }
    }

    /// Set the endpoint URL.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Set the access credentials.
    #[must_use]
    pub fn with_credentials(
        mut self,
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
    ) -> Self {
        self.access_key_id = Some(access_key_id.into());
        self.secret_access_key = Some(secret_access_key.into());
        self
    }

    /// Set the signing region.
    #[must_use]
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    /// Allow plain HTTP endpoints.
    #[must_use]
    pub const fn with_allow_http(mut self, allow_http: bool) -> Self {
        self.allow_http = allow_http;
        self
    }
}

/// Blob store client with optional application-level compression.
#[derive(Clone)]
pub struct BlobStore {
    inner: Arc<dyn ObjectStore>,
}

impl fmt::Debug for BlobStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlobStore")
            .field("backend", &self.inner.to_string())
            .finish()
    }
}

impl BlobStore {
    /// Wrap an existing object store.
    #[must_use]
    pub fn new(inner: Arc<dyn ObjectStore>) -> Self {
        Self { inner }
    }

    /// Create a store backed by process memory.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemory::new()))
    }

    /// Build an S3-compatible store from configuration.
    pub fn from_config(config: &BlobStoreConfig) -> Result<Self, StoreError> {
        let mut builder = AmazonS3Builder::new()
            .with_bucket_name(&config.bucket)
            .with_region(&config.region)
            .with_allow_http(config.allow_http);
        if let Some(endpoint) = &config.endpoint {
            builder = builder.with_endpoint(endpoint);
        }
        if let Some(access_key_id) = &config.access_key_id {
            builder = builder.with_access_key_id(access_key_id);
        }
        if let Some(secret_access_key) = &config.secret_access_key {
            builder = builder.with_secret_access_key(secret_access_key);
        }
        let store = builder
            .build()
            .map_err(|source| StoreError::Configuration { source })?;
        Ok(Self::new(Arc::new(store)))
    }

    /// Write `bytes` under `path`, overwriting any existing object.
    pub async fn put(&self, path: &str, bytes: Bytes, compress: bool) -> Result<(), StoreError> {
        let location = parse_path(path)?;
        let payload = if compress {
            Bytes::from(codec::compress(&bytes).map_err(|source| StoreError::Codec {
                path: path.to_owned(),
                source,
            })?)
        } else {
            bytes
        };
        debug!("uploading {} bytes to {path}", payload.len());
        self.inner
            .put(&location, PutPayload::from(payload))
            .await
            .map_err(|source| transport_error(path, source))?;
        Ok(())
    }

    /// Read the object under `path`, decompressing it when asked.
    pub async fn get(&self, path: &str, decompress: bool) -> Result<Bytes, StoreError> {
        let location = parse_path(path)?;
        let bytes = self
            .inner
            .get(&location)
            .await
            .map_err(|source| transport_error(path, source))?
            .bytes()
            .await
            .map_err(|source| transport_error(path, source))?;
        if !decompress {
            return Ok(bytes);
        }
        codec::decompress(&bytes)
            .map(Bytes::from)
            .map_err(|source| StoreError::Codec {
                path: path.to_owned(),
                source,
            })
    }

    /// List every object key starting with `prefix`, in no particular order.
    pub async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        // Object stores list by whole segments; narrow to the enclosing
        // directory and filter on the raw string prefix.
        let directory = prefix.rsplit_once('/').map(|(parent, _)| parent);
        let listing_root = directory.map(parse_path).transpose()?;
        let keys: Vec<String> = self
            .inner
            .list(listing_root.as_ref())
            .map_ok(|meta| meta.location.to_string())
            .try_collect()
            .await
            .map_err(|source| transport_error(prefix, source))?;
        Ok(keys
            .into_iter()
            .filter(|key| key.starts_with(prefix))
            .collect())
    }

    /// Copy `path` to `new_path`, then delete `path`.
    ///
    /// The two steps are not atomic: a failure after the copy leaves the
    /// object at both locations.
    pub async fn move_object(&self, path: &str, new_path: &str) -> Result<(), StoreError> {
        let from = parse_path(path)?;
        let to = parse_path(new_path)?;
        self.inner
            .copy(&from, &to)
            .await
            .map_err(|source| transport_error(path, source))?;
        self.inner
            .delete(&from)
            .await
            .map_err(|source| transport_error(path, source))
    }

    /// Fetch the raw bytes of one image.
    pub async fn fetch_image(&self, path: &ImagePath) -> Result<Bytes, StoreError> {
        self.get(path.as_str(), false).await
    }
}

fn parse_path(path: &str) -> Result<ObjectPath, StoreError> {
    ObjectPath::parse(path).map_err(|source| StoreError::InvalidPath {
        path: path.to_owned(),
        source,
    })
}

fn transport_error(path: &str, source: object_store::Error) -> StoreError {
    match source {
        object_store::Error::NotFound { .. } => StoreError::NotFound {
            path: path.to_owned(),
        },
        other => StoreError::Transport {
            path: path.to_owned(),
            source: other,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};

    #[fixture]
    fn store() -> BlobStore {
        BlobStore::in_memory()
    }

    #[rstest]
    #[case(false)]
    #[case(true)]
    #[tokio::test]
    async fn put_then_get_returns_payload(store: BlobStore, #[case] compress: bool) {
        let payload = Bytes::from_static(b"banner bytes");
        store
            .put("images/c1/a.png", payload.clone(), compress)
            .await
            .expect("put");
        let fetched = store.get("images/c1/a.png", compress).await.expect("get");
        assert_eq!(fetched, payload);
    }

    #[rstest]
    #[tokio::test]
    async fn compressed_objects_are_stored_compressed(store: BlobStore) {
        let payload = Bytes::from(vec![b'z'; 8192]);
        store.put("z.bin", payload.clone(), true).await.expect("put");
        let raw = store.get("z.bin", false).await.expect("raw get");
        assert_ne!(raw, payload);
        assert!(raw.len() < payload.len());
    }

    #[rstest]
    #[tokio::test]
    async fn put_overwrites(store: BlobStore) {
        store.put("a.png", Bytes::from_static(b"one"), false).await.expect("first");
        store.put("a.png", Bytes::from_static(b"two"), false).await.expect("second");
        assert_eq!(store.get("a.png", false).await.expect("get"), "two");
    }

    #[rstest]
    #[tokio::test]
    async fn missing_object_is_not_found(store: BlobStore) {
        let error = store.get("missing.png", false).await.expect_err("missing");
        assert!(matches!(error, StoreError::NotFound { path } if path == "missing.png"));
    }

    #[rstest]
    #[tokio::test]
    async fn list_filters_by_string_prefix(store: BlobStore) {
        for key in ["images/c1/a.png", "images/c1/b.png", "images/c2/a.png", "other.txt"] {
            store.put(key, Bytes::from_static(b"x"), false).await.expect("put");
        }
        let mut found = store.list("images/c1/").await.expect("list");
        found.sort();
        assert_eq!(found, vec!["images/c1/a.png", "images/c1/b.png"]);

        let mut partial = store.list("images/c").await.expect("list partial segment");
        partial.sort();
        assert_eq!(partial.len(), 3);

        assert_eq!(store.list("").await.expect("list all").len(), 4);
    }

    #[rstest]
    #[tokio::test]
    async fn move_copies_then_deletes(store: BlobStore) {
        store.put("old/a.png", Bytes::from_static(b"x"), false).await.expect("put");
        store.move_object("old/a.png", "new/a.png").await.expect("move");
        assert!(matches!(
            store.get("old/a.png", false).await,
            Err(StoreError::NotFound { .. })
        ));
        assert_eq!(store.get("new/a.png", false).await.expect("moved"), "x");
    }

    #[rstest]
    #[tokio::test]
    async fn invalid_paths_are_rejected(store: BlobStore) {
        let error = store
            .put("images/../escape.png", Bytes::new(), false)
            .await
            .expect_err("parent segment");
        assert!(matches!(error, StoreError::InvalidPath { .. }));
    }

    #[rstest]
    fn debug_redacts_secret() {
        let config = BlobStoreConfig::new("bucket").with_credentials("AKIA", "super-secret");
        let rendered = format!("{config:?}");
        assert!(rendered.contains("AKIA"));
        assert!(!rendered.contains("super-secret"));
    }
}
