//! Remote data access and catalog synchronisation for the xside engine.
//!
//! Responsibilities:
//! - Talk to the catalog service (authentication, paginated listings,
//!   display events).
//! - Read image assets from an S3-compatible blob store.
//! - Pull the catalog into the local store and swap the live snapshot.
//!
//! Boundaries:
//! - Do not encode selection rules (live in `xside-core`).
//! - Keep the hot selection path free of network and disk I/O.
//!
//! Invariants:
//! - A sync either installs a complete new snapshot or leaves the previous
//!   one in place.
//! - No global mutable state.

pub mod blob;
pub mod catalog;
pub mod config;
pub mod engine;
pub mod sync;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use blob::{BlobStore, BlobStoreConfig, StoreError};
pub use catalog::{ApiError, AuthError, CatalogApiConfig, CatalogSession, DisplayEvent, EventKind};
pub use config::{ConfigError, EngineConfig};
pub use engine::{Engine, EngineBuildError};
pub use sync::{CatalogSource, ImageSource, SyncError, SyncOptions, SyncPipeline, SyncReport};
