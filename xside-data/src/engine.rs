//! Wiring of session, blob store, catalog store and selector.

use std::sync::Arc;

use geo::Point;
use log::info;
use serde_json::Value;
use thiserror::Error;
use xside_core::{
    CatalogProjection, CatalogStore, CatalogStoreError, Selection, SelectionError, SnapshotHandle,
    SpatialSelector, SqliteCatalogStore,
};

use crate::blob::{BlobStore, StoreError};
use crate::catalog::{ApiError, CatalogSession, DisplayEvent, SessionBuildError};
use crate::config::EngineConfig;
use crate::sync::{SyncError, SyncPipeline, SyncReport};

/// Errors raised while assembling an [`Engine`].
#[derive(Debug, Error)]
pub enum EngineBuildError {
    /// The catalog session could not be created.
    #[error(transparent)]
    Session(#[from] SessionBuildError),
    /// The blob store could not be configured.
    #[error(transparent)]
    Blob(#[from] StoreError),
    /// The local catalog store could not be opened or read.
    #[error(transparent)]
    Store(#[from] CatalogStoreError),
}

/// Running engine: serves selections from the live snapshot and refreshes
/// it from the catalog service on demand.
#[derive(Debug)]
pub struct Engine {
    session: Arc<CatalogSession>,
    pipeline: SyncPipeline,
    selector: SpatialSelector,
}

impl Engine {
    /// Build an engine from configuration.
    ///
    /// The snapshot persisted by a previous run is loaded immediately, so
    /// selection works before the first sync completes.
    pub fn from_config(config: &EngineConfig) -> Result<Self, EngineBuildError> {
        let session = Arc::new(CatalogSession::new(config.api.to_session_config())?);
        let blobs = BlobStore::from_config(&config.blob_store)?;
        let store = Arc::new(SqliteCatalogStore::open(&config.database)?);
        let projection = store.load_projection()?;
        info!(
            "loaded {} catalog items from {}",
            projection.len(),
            config.database
        );
        let snapshot = SnapshotHandle::new(projection);
        let pipeline = SyncPipeline::new(
            session.clone(),
            Arc::new(blobs),
            store,
            snapshot,
            config.sync_options(),
        );
        Ok(Self {
            session,
            pipeline,
            selector: SpatialSelector::new(config.selection_policy()),
        })
    }

    /// Assemble an engine from prepared parts.
    #[must_use]
    pub const fn new(
        session: Arc<CatalogSession>,
        pipeline: SyncPipeline,
        selector: SpatialSelector,
    ) -> Self {
        Self {
            session,
            pipeline,
            selector,
        }
    }

    /// Pull the remote catalog and swap the live snapshot.
    pub async fn sync_now(&self) -> Result<SyncReport, SyncError> {
        self.pipeline.run().await
    }

    /// Draw an image for `point` from the live snapshot.
    pub fn select(&self, point: Point<f64>) -> Result<Option<Selection>, SelectionError> {
        let projection = self.pipeline.snapshot().current();
        self.selector.select(&projection, point)
    }

    /// Live snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Arc<CatalogProjection> {
        self.pipeline.snapshot().current()
    }

    /// Report a display event to the catalog service.
    pub async fn send_event(&self, event: &DisplayEvent) -> Result<Value, ApiError> {
        self.session.send_event(event).await
    }

    /// Underlying catalog session.
    #[must_use]
    pub fn session(&self) -> &CatalogSession {
        &self.session
    }
}
