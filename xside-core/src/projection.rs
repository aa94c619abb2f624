//! Read-optimised view of the installed catalog snapshot.
//!
//! A [`CatalogProjection`] holds exactly the fields selection needs, with
//! each service area decoded once into polygons. An R\*-tree over the areas'
//! bounding rectangles narrows candidate lookup before the exact
//! point-in-polygon test runs.

use geo::{BoundingRect, MultiPolygon, Point};
use rstar::{AABB, RTree, RTreeObject};

use crate::{CatalogItem, GeometryError, ImagePath, ItemId, area_contains};

/// Selection-relevant view of one catalog item.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectedItem {
    /// Item identifier.
    pub id: ItemId,
    /// Display name, kept for diagnostics.
    pub name: String,
    /// Service area as polygons.
    pub areas: MultiPolygon<f64>,
    /// Selection weight.
    pub max_rate: f64,
    /// Activation flag.
    pub is_active: bool,
    /// Candidate images, in catalog order.
    pub images: Vec<ImagePath>,
}

impl ProjectedItem {
    /// Project a validated catalog item.
    pub fn from_catalog_item(item: &CatalogItem) -> Result<Self, GeometryError> {
        Ok(Self {
            id: item.id,
            name: item.name.clone(),
            areas: item.areas.to_multi_polygon()?,
            max_rate: item.max_rate,
            is_active: item.is_active,
            images: item.images.clone(),
        })
    }

    /// Return whether the item's area contains `point`, boundary included.
    #[must_use]
    pub fn contains(&self, point: Point<f64>) -> bool {
        area_contains(&self.areas, point)
    }
}

/// Envelope of one item's area, pointing back into the item list.
#[derive(Debug, Clone, PartialEq)]
struct AreaEnvelope {
    position: usize,
    envelope: AABB<[f64; 2]>,
}

impl RTreeObject for AreaEnvelope {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// Immutable projection of one catalog snapshot.
///
/// # Examples
///
/// ```
/// use geo::Point;
/// use serde_json::json;
/// use xside_core::{CatalogItem, CatalogProjection};
///
/// let item = CatalogItem::from_value(json!({
///     "id": 1,
///     "areas": {"type": "Polygon", "coordinates": [[[0, 0], [0, 10], [10, 10], [10, 0]]]},
///     "max_rate": 1.0,
///     "images": ["a.png"]
/// }))?;
/// let projection = CatalogProjection::from_items(&[item])?;
/// assert_eq!(projection.candidates_containing(Point::new(5.0, 5.0)).len(), 1);
/// assert!(projection.candidates_containing(Point::new(50.0, 5.0)).is_empty());
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Default)]
pub struct CatalogProjection {
    items: Vec<ProjectedItem>,
    index: RTree<AreaEnvelope>,
}

impl CatalogProjection {
    /// Build a projection; items are ordered by id.
    #[must_use]
    pub fn new(mut items: Vec<ProjectedItem>) -> Self {
        items.sort_by_key(|item| item.id);
        let envelopes = items
            .iter()
            .enumerate()
            .filter_map(|(position, item)| {
                item.areas.bounding_rect().map(|rect| AreaEnvelope {
                    position,
                    envelope: AABB::from_corners(
                        [rect.min().x, rect.min().y],
                        [rect.max().x, rect.max().y],
                    ),
                })
            })
            .collect();
        Self {
            items,
            index: RTree::bulk_load(envelopes),
        }
    }

    /// Project a slice of catalog items.
    pub fn from_items(items: &[CatalogItem]) -> Result<Self, GeometryError> {
        let projected = items
            .iter()
            .map(ProjectedItem::from_catalog_item)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(projected))
    }

    /// Items whose area contains `point`, ordered by id.
    #[must_use]
    pub fn candidates_containing(&self, point: Point<f64>) -> Vec<&ProjectedItem> {
        let query = AABB::from_point([point.x(), point.y()]);
        let mut positions: Vec<usize> = self
            .index
            .locate_in_envelope_intersecting(&query)
            .map(|entry| entry.position)
            .collect();
        // The tree yields entries in traversal order; restore id order.
        positions.sort_unstable();
        positions
            .into_iter()
            .filter_map(|position| self.items.get(position))
            .filter(|item| item.contains(point))
            .collect()
    }

    /// Look up an item by id.
    #[must_use]
    pub fn get(&self, id: ItemId) -> Option<&ProjectedItem> {
        self.items
            .binary_search_by_key(&id, |item| item.id)
            .ok()
            .and_then(|position| self.items.get(position))
    }

    /// All items, ordered by id.
    #[must_use]
    pub fn items(&self) -> &[ProjectedItem] {
        &self.items
    }

    /// Number of items in the snapshot.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the snapshot holds no items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
