//! Facade crate for the xside geo-targeted image selection engine.
//!
//! This crate re-exports the core domain types, the catalog store and the
//! sync and engine wiring from the data crate.

#![forbid(unsafe_code)]

pub use xside_core::{
    AreaGeometry, CatalogItem, CatalogItemError, CatalogProjection, CatalogStore,
    CatalogStoreError, GeometryError, ImagePath, ItemId, ProjectedItem, Selection, SelectionError,
    SelectionPolicy, SnapshotHandle, SpatialSelector,
};

#[cfg(feature = "store-sqlite")]
pub use xside_core::{SnapshotInfo, SqliteCatalogStore};

pub use xside_data::{
    BlobStore, BlobStoreConfig, CatalogApiConfig, CatalogSession, DisplayEvent, Engine,
    EngineBuildError, EngineConfig, EventKind, SyncError, SyncOptions, SyncPipeline, SyncReport,
};
