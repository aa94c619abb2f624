//! Catalog synchronisation.
//!
//! [`SyncPipeline::run`] pulls every item page from a [`CatalogSource`],
//! validates the records, downloads the referenced images from an
//! [`ImageSource`] into a staging directory below the media root, and only
//! then replaces the stored snapshot and installs a fresh projection.
//!
//! A failure or cancellation before images are promoted leaves the
//! previously installed snapshot, the stored catalog and the media root
//! untouched. Promotion precedes the store commit, so a failing commit can
//! leave new files in the media root while the old snapshot stays live.

use std::{collections::HashSet, fmt, io, sync::Arc};

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::fs_utf8;
use futures_util::{StreamExt, stream};
use log::{debug, info, warn};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Mutex;
use xside_core::{CatalogItem, CatalogStore, CatalogStoreError, ImagePath, ItemId, SnapshotHandle};

use crate::blob::{StoreError, codec};
use crate::catalog::{ApiError, DEFAULT_PAGE_SIZE, PageRequest};

mod source;

pub use source::{CatalogSource, ImageSource};

/// Default number of concurrent image downloads.
pub const DEFAULT_IMAGE_CONCURRENCY: usize = 8;

const STAGING_PREFIX: &str = ".staging-";

/// Errors that abort a sync run.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Another run holds the pipeline.
    #[error("a catalog sync is already running")]
    AlreadyRunning,
    /// Listing the catalog failed.
    #[error("catalog listing failed: {0}")]
    Api(#[from] ApiError),
    /// An image could not be downloaded.
    #[error("failed to fetch image {path}: {source}")]
    Image {
        /// Image being fetched.
        path: ImagePath,
        /// Blob store failure.
        #[source]
        source: StoreError,
    },
    /// A downloaded image could not be decompressed.
    #[error("failed to decompress image {path}: {source}")]
    Decompress {
        /// Image being decoded.
        path: ImagePath,
        /// Codec failure.
        #[source]
        source: io::Error,
    },
    /// Staging or promoting media files failed.
    #[error("media directory operation failed at {path}: {source}")]
    Media {
        /// Path being written.
        path: Utf8PathBuf,
        /// Filesystem failure.
        #[source]
        source: io::Error,
    },
    /// Persisting or reloading the snapshot failed.
    #[error("catalog store failed: {0}")]
    Store(#[from] CatalogStoreError),
    /// The blocking task committing the snapshot did not finish.
    #[error("catalog store task did not complete: {0}")]
    StoreTask(#[source] tokio::task::JoinError),
}

/// Tunables for a [`SyncPipeline`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOptions {
    /// Directory holding downloaded images, keyed by image path.
    pub media_root: Utf8PathBuf,
    /// Records requested per catalog page.
    pub page_size: u32,
    /// Upper bound on concurrent image downloads.
    pub image_concurrency: usize,
    /// Whether stored images are bzip2-compressed.
    pub decompress_images: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            media_root: Utf8PathBuf::from("media"),
            page_size: DEFAULT_PAGE_SIZE,
            image_concurrency: DEFAULT_IMAGE_CONCURRENCY,
            decompress_images: false,
        }
    }
}

impl SyncOptions {
    /// Options storing media below `media_root`.
    #[must_use]
    pub fn new(media_root: impl Into<Utf8PathBuf>) -> Self {
        Self {
            media_root: media_root.into(),
            ..Self::default()
        }
    }

    /// Set the catalog page size; zero is raised to one.
    #[must_use]
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Set the download concurrency; zero is raised to one.
    #[must_use]
    pub fn with_image_concurrency(mut self, image_concurrency: usize) -> Self {
        self.image_concurrency = image_concurrency.max(1);
        self
    }

    /// Decompress images after download.
    #[must_use]
    pub const fn with_decompress_images(mut self, decompress_images: bool) -> Self {
        self.decompress_images = decompress_images;
        self
    }
}

/// Outcome of a successful sync run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Non-empty pages read from the catalog.
    pub pages: u32,
    /// Items stored in the new snapshot.
    pub items_imported: usize,
    /// Records dropped as malformed or duplicated.
    pub items_skipped: usize,
    /// Distinct images downloaded.
    pub images_fetched: usize,
}

/// Pulls the remote catalog into the local store and swaps the live snapshot.
pub struct SyncPipeline {
    catalog: Arc<dyn CatalogSource>,
    images: Arc<dyn ImageSource>,
    store: Arc<dyn CatalogStore>,
    snapshot: SnapshotHandle,
    options: SyncOptions,
    running: Mutex<()>,
}

impl fmt::Debug for SyncPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncPipeline")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl SyncPipeline {
    /// Assemble a pipeline that installs its results into `snapshot`.
    #[must_use]
    pub fn new(
        catalog: Arc<dyn CatalogSource>,
        images: Arc<dyn ImageSource>,
        store: Arc<dyn CatalogStore>,
        snapshot: SnapshotHandle,
        options: SyncOptions,
    ) -> Self {
        Self {
            catalog,
            images,
            store,
            snapshot,
            options,
            running: Mutex::new(()),
        }
    }

    /// Options the pipeline runs with.
    #[must_use]
    pub const fn options(&self) -> &SyncOptions {
        &self.options
    }

    /// Handle the pipeline installs new snapshots into.
    #[must_use]
    pub const fn snapshot(&self) -> &SnapshotHandle {
        &self.snapshot
    }

    /// Run one full sync.
    ///
    /// Returns [`SyncError::AlreadyRunning`] without side effects when
    /// another run is in progress. Dropping the returned future before the
    /// images are promoted discards the staged work and installs nothing.
    ///
    /// Images are promoted into the media root before the store commit. If
    /// [`CatalogStore::replace_snapshot`] then fails, files at paths shared
    /// with the previous snapshot may already hold the new content while
    /// the previous snapshot stays installed. The commit and the snapshot
    /// swap run together on a blocking thread and finish even if the future
    /// is dropped meanwhile.
    pub async fn run(&self) -> Result<SyncReport, SyncError> {
        let Ok(_guard) = self.running.try_lock() else {
            return Err(SyncError::AlreadyRunning);
        };

        let (records, pages) = self.fetch_records().await?;
        let (items, items_skipped) = validate_records(records);
        let images = distinct_images(&items);

        let media_root = &self.options.media_root;
        let media_dir = xside_fs::open_or_create_dir(media_root).map_err(|source| {
            SyncError::Media {
                path: media_root.clone(),
                source,
            }
        })?;
        let staging = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempdir_in(media_root.as_std_path())
            .map_err(|source| SyncError::Media {
                path: media_root.clone(),
                source,
            })?;
        let staging_path = Utf8PathBuf::from_path_buf(staging.path().to_path_buf()).map_err(
            |_| SyncError::Media {
                path: media_root.clone(),
                source: io::Error::other("staging directory path is not UTF-8"),
            },
        )?;
        let staging_dir =
            xside_fs::open_or_create_dir(&staging_path).map_err(|source| SyncError::Media {
                path: staging_path.clone(),
                source,
            })?;

        self.stage_images(&images, &staging_dir).await?;
        promote_images(&images, &staging_dir, &media_dir, media_root)?;
        info!("materialised {} images under {media_root}", images.len());

        let items_imported = items.len();
        let store = Arc::clone(&self.store);
        let snapshot = self.snapshot.clone();
        tokio::task::spawn_blocking(move || {
            store.replace_snapshot(&items)?;
            let projection = store.load_projection()?;
            snapshot.install(projection);
            Ok::<_, SyncError>(())
        })
        .await
        .map_err(SyncError::StoreTask)??;

        let report = SyncReport {
            pages,
            items_imported,
            items_skipped,
            images_fetched: images.len(),
        };
        info!(
            "catalog sync installed {} items ({} skipped, {} images, {} pages)",
            report.items_imported, report.items_skipped, report.images_fetched, report.pages
        );
        Ok(report)
    }

    async fn fetch_records(&self) -> Result<(Vec<Value>, u32), SyncError> {
        let mut records = Vec::new();
        let mut page = 0_u32;
        loop {
            let request = PageRequest::page(page).with_page_size(self.options.page_size);
            let batch = self.catalog.fetch_page(request).await?;
            debug!("catalog page {page} returned {} records", batch.len());
            if batch.is_empty() {
                return Ok((records, page));
            }
            records.extend(batch);
            page = page.saturating_add(1);
        }
    }

    /// Download every image into `staging`, failing on the first error.
    async fn stage_images(
        &self,
        images: &[ImagePath],
        staging: &fs_utf8::Dir,
    ) -> Result<(), SyncError> {
        let decompress = self.options.decompress_images;
        let mut downloads = stream::iter(images.iter().map(|path| async move {
            let bytes = self
                .images
                .fetch_image(path)
                .await
                .map_err(|source| SyncError::Image {
                    path: path.clone(),
                    source,
                })?;
            let contents = if decompress {
                codec::decompress(&bytes).map_err(|source| SyncError::Decompress {
                    path: path.clone(),
                    source,
                })?
            } else {
                bytes.to_vec()
            };
            Ok::<_, SyncError>((path, contents))
        }))
        .buffer_unordered(self.options.image_concurrency.max(1));

        while let Some(download) = downloads.next().await {
            let (path, contents) = download?;
            xside_fs::write_creating_parents(staging, path.as_utf8_path(), &contents).map_err(
                |source| SyncError::Media {
                    path: path.as_utf8_path().to_owned(),
                    source,
                },
            )?;
            debug!("staged image {path} ({} bytes)", contents.len());
        }
        Ok(())
    }
}

fn promote_images(
    images: &[ImagePath],
    staging: &fs_utf8::Dir,
    media: &fs_utf8::Dir,
    media_root: &Utf8Path,
) -> Result<(), SyncError> {
    for path in images {
        xside_fs::promote_file(staging, media, path.as_utf8_path()).map_err(|source| {
            SyncError::Media {
                path: media_root.join(path.as_utf8_path()),
                source,
            }
        })?;
    }
    Ok(())
}

/// Decode records into items, dropping malformed ones and later duplicates.
fn validate_records(records: Vec<Value>) -> (Vec<CatalogItem>, usize) {
    let mut seen: HashSet<ItemId> = HashSet::with_capacity(records.len());
    let mut items = Vec::with_capacity(records.len());
    let mut skipped = 0_usize;
    for record in records {
        match CatalogItem::from_value(record) {
            Ok(item) if seen.insert(item.id) => items.push(item),
            Ok(item) => {
                warn!("skipping duplicate catalog item {}", item.id);
                skipped = skipped.saturating_add(1);
            }
            Err(error) => {
                warn!("skipping catalog record: {error}");
                skipped = skipped.saturating_add(1);
            }
        }
    }
    (items, skipped)
}

/// Image paths referenced by `items`, deduplicated in first-seen order.
fn distinct_images(items: &[CatalogItem]) -> Vec<ImagePath> {
    let mut seen = HashSet::new();
    items
        .iter()
        .flat_map(|item| item.images.iter())
        .filter(|path| seen.insert(path.as_str()))
        .cloned()
        .collect()
}
