//! Test-only builders and an in-memory `CatalogStore` used by unit and
//! behaviour tests.

use std::sync::{
    Mutex, PoisonError,
    atomic::{AtomicBool, Ordering},
};

use serde_json::Map;

use crate::{
    AreaGeometry, CatalogItem, CatalogProjection, CatalogStore, CatalogStoreError, ImagePath,
    ItemId,
};

/// Axis-aligned square area with its lower-left corner at `(min_x, min_y)`.
#[must_use]
#[expect(clippy::float_arithmetic, reason = "corner offsets are float sums")]
pub fn square(min_x: f64, min_y: f64, size: f64) -> AreaGeometry {
    let (max_x, max_y) = (min_x + size, min_y + size);
    AreaGeometry::Polygon(vec![vec![
        vec![min_x, min_y],
        vec![min_x, max_y],
        vec![max_x, max_y],
        vec![max_x, min_y],
        vec![min_x, min_y],
    ]])
}

/// Active catalog item with the given area, weight and image paths.
///
/// # Panics
///
/// Panics when an image path is invalid.
#[must_use]
#[expect(clippy::expect_used, reason = "builders fail fast on bad fixtures")]
pub fn item(id: ItemId, areas: AreaGeometry, max_rate: f64, images: &[&str]) -> CatalogItem {
    CatalogItem {
        id,
        client: "Client1".to_owned(),
        name: format!("TestItem{id}"),
        areas,
        is_active: true,
        max_rate,
        max_daily_spend: None,
        images: images
            .iter()
            .map(|path| ImagePath::new(*path).expect("fixture image path is valid"))
            .collect(),
        extra: Map::new(),
    }
}

/// In-memory `CatalogStore` keeping the snapshot in a vector.
///
/// Replacement can be made to fail once, leaving the stored snapshot as it
/// was, to exercise abort paths.
#[derive(Debug, Default)]
pub struct MemoryCatalogStore {
    items: Mutex<Vec<CatalogItem>>,
    fail_next_replace: AtomicBool,
}

impl MemoryCatalogStore {
    /// Create a store already holding `items`.
    #[must_use]
    pub fn with_items(items: Vec<CatalogItem>) -> Self {
        Self {
            items: Mutex::new(items),
            fail_next_replace: AtomicBool::new(false),
        }
    }

    /// Make the next `replace_snapshot` call fail.
    pub fn fail_next_replace(&self) {
        self.fail_next_replace.store(true, Ordering::SeqCst);
    }

    /// Copy of the stored items.
    #[must_use]
    pub fn items(&self) -> Vec<CatalogItem> {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl CatalogStore for MemoryCatalogStore {
    fn replace_snapshot(&self, items: &[CatalogItem]) -> Result<(), CatalogStoreError> {
        if self.fail_next_replace.swap(false, Ordering::SeqCst) {
            let id = items.first().map_or(0, |first| first.id);
            return Err(CatalogStoreError::DuplicateId { id });
        }
        *self.items.lock().unwrap_or_else(PoisonError::into_inner) = items.to_vec();
        Ok(())
    }

    fn load_projection(&self) -> Result<CatalogProjection, CatalogStoreError> {
        let items = self.items();
        let projected = items
            .iter()
            .map(|stored| {
                crate::ProjectedItem::from_catalog_item(stored).map_err(|source| {
                    CatalogStoreError::InvalidGeometry {
                        id: stored.id,
                        source,
                    }
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(CatalogProjection::new(projected))
    }
}
