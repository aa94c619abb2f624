//! Persistence for the catalog snapshot.
//!
//! A [`CatalogStore`] holds exactly one snapshot: the full item set written
//! by the last successful sync. Writers replace it wholesale; readers load a
//! [`CatalogProjection`] of it.

#[cfg(feature = "store-sqlite")]
use camino::Utf8PathBuf;
use thiserror::Error;

use crate::{CatalogItem, CatalogProjection, GeometryError, ItemId};

#[cfg(feature = "store-sqlite")]
mod sqlite;

#[cfg(feature = "store-sqlite")]
pub use sqlite::{SnapshotInfo, SqliteCatalogStore};

/// Errors raised while persisting or loading the catalog snapshot.
#[derive(Debug, Error)]
pub enum CatalogStoreError {
    /// Opening the SQLite database failed.
    #[cfg(feature = "store-sqlite")]
    #[error("failed to open catalog database at {path}: {source}")]
    Open {
        /// Location of the SQLite database on disk.
        path: Utf8PathBuf,
        /// Source error returned by `rusqlite`.
        #[source]
        source: rusqlite::Error,
    },
    /// Creating the directory that holds the database failed.
    #[cfg(feature = "store-sqlite")]
    #[error("failed to prepare directory for {path}: {source}")]
    Directory {
        /// Location of the SQLite database on disk.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// Generic SQLite error.
    #[cfg(feature = "store-sqlite")]
    #[error(transparent)]
    Database(#[from] rusqlite::Error),
    /// An item could not be encoded as a document.
    #[error("failed to encode catalog item {id}: {source}")]
    Encode {
        /// Identifier of the item.
        id: ItemId,
        /// Encoder failure.
        #[source]
        source: serde_json::Error,
    },
    /// A stored item's `areas` could not be decoded into polygons.
    #[error("stored catalog item {id} has invalid geometry: {source}")]
    InvalidGeometry {
        /// Identifier of the item.
        id: ItemId,
        /// Validation failure.
        #[source]
        source: GeometryError,
    },
    /// A stored item's `images` could not be decoded into paths.
    #[error("stored catalog item {id} has invalid images: {source}")]
    InvalidImages {
        /// Identifier of the item.
        id: ItemId,
        /// Decoder failure.
        #[source]
        source: serde_json::Error,
    },
    /// The snapshot contained the same id twice.
    #[error("catalog item {id} appears more than once in the snapshot")]
    DuplicateId {
        /// Repeated identifier.
        id: ItemId,
    },
}

/// Storage for the single installed catalog snapshot.
///
/// Implementations must make [`CatalogStore::replace_snapshot`] atomic: on
/// error the previously committed snapshot stays readable and unchanged.
///
/// # Examples
///
/// ```rust
/// use std::sync::Mutex;
/// use xside_core::{CatalogItem, CatalogProjection, CatalogStore, CatalogStoreError};
///
/// #[derive(Default)]
/// struct VecStore(Mutex<Vec<CatalogItem>>);
///
/// impl CatalogStore for VecStore {
///     fn replace_snapshot(&self, items: &[CatalogItem]) -> Result<(), CatalogStoreError> {
///         *self.0.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = items.to_vec();
///         Ok(())
///     }
///
///     fn load_projection(&self) -> Result<CatalogProjection, CatalogStoreError> {
///         let items = self.0.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
///         Ok(CatalogProjection::from_items(&items).unwrap_or_default())
///     }
/// }
///
/// let store = VecStore::default();
/// store.replace_snapshot(&[])?;
/// assert!(store.load_projection()?.is_empty());
/// # Ok::<(), CatalogStoreError>(())
/// ```
pub trait CatalogStore: Send + Sync {
    /// Replace the stored snapshot with `items` in one atomic step.
    fn replace_snapshot(&self, items: &[CatalogItem]) -> Result<(), CatalogStoreError>;

    /// Load the selection projection of the stored snapshot.
    ///
    /// Malformed stored geometry fails the whole load.
    fn load_projection(&self) -> Result<CatalogProjection, CatalogStoreError>;
}
