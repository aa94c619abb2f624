//! Copy-on-write handle to the installed catalog projection.

use std::sync::{Arc, PoisonError, RwLock};

use crate::CatalogProjection;

/// Shared pointer to the current [`CatalogProjection`].
///
/// Readers clone the inner `Arc` and work against that snapshot for as long
/// as they hold it; [`SnapshotHandle::install`] swaps in a new projection
/// without touching the one readers already hold. The lock only guards the
/// pointer swap, so readers never wait on a running sync.
///
/// # Examples
///
/// ```
/// use xside_core::{CatalogProjection, SnapshotHandle};
///
/// let handle = SnapshotHandle::default();
/// let before = handle.current();
/// handle.install(CatalogProjection::default());
/// assert!(before.is_empty());
/// ```
#[derive(Debug, Clone, Default)]
pub struct SnapshotHandle {
    inner: Arc<RwLock<Arc<CatalogProjection>>>,
}

impl SnapshotHandle {
    /// Create a handle serving `projection`.
    #[must_use]
    pub fn new(projection: CatalogProjection) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(projection))),
        }
    }

    /// Borrow the currently installed snapshot.
    #[must_use]
    pub fn current(&self) -> Arc<CatalogProjection> {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    /// Replace the installed snapshot, returning the previous one.
    pub fn install(&self, projection: CatalogProjection) -> Arc<CatalogProjection> {
        let next = Arc::new(projection);
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *guard, next)
    }
}
