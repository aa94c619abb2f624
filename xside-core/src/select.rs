//! Two-stage weighted selection of an image at a GPS position.
//!
//! Selection filters the projection down to items whose area contains the
//! query point, draws one item with probability proportional to its
//! `max_rate`, then draws one of that item's images uniformly.

use geo::Point;
use rand::Rng;
use thiserror::Error;

use crate::{CatalogProjection, ImagePath, ItemId, ProjectedItem};

/// Outcome of a successful selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    /// Identifier of the drawn item.
    pub item_id: ItemId,
    /// Image drawn from that item.
    pub image: ImagePath,
}

/// Reasons a selection could not be made at a covered point.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SelectionError {
    /// Every candidate had zero weight.
    #[error("{candidates} candidate items have zero total weight")]
    DegenerateWeights {
        /// Number of candidates at the point.
        candidates: usize,
    },
    /// The drawn item lists no images.
    #[error("item {item_id} has no images")]
    NoImages {
        /// Identifier of the drawn item.
        item_id: ItemId,
    },
}

/// Filters applied before the weighted draw.
///
/// The default admits every item whose area contains the point; excluding
/// inactive items is opt-in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionPolicy {
    /// Whether items flagged inactive take part in selection.
    pub include_inactive: bool,
}

impl Default for SelectionPolicy {
    fn default() -> Self {
        Self {
            include_inactive: true,
        }
    }
}

impl SelectionPolicy {
    /// Set whether inactive items are eligible.
    #[must_use]
    pub const fn with_include_inactive(mut self, include_inactive: bool) -> Self {
        self.include_inactive = include_inactive;
        self
    }

    const fn admits(self, item: &ProjectedItem) -> bool {
        self.include_inactive || item.is_active
    }
}

/// Draws images from a catalog projection.
///
/// # Examples
///
/// ```
/// use geo::Point;
/// use rand::SeedableRng;
/// use rand::rngs::StdRng;
/// use serde_json::json;
/// use xside_core::{CatalogItem, CatalogProjection, SpatialSelector};
///
/// let item = CatalogItem::from_value(json!({
///     "id": 9,
///     "areas": {"type": "Polygon", "coordinates": [[[0, 0], [0, 10], [10, 10], [10, 0]]]},
///     "max_rate": 5.0,
///     "images": ["ads/9.png"]
/// }))?;
/// let projection = CatalogProjection::from_items(&[item])?;
/// let selector = SpatialSelector::default();
/// let mut rng = StdRng::seed_from_u64(7);
///
/// let hit = selector.select_with_rng(&projection, Point::new(5.0, 5.0), &mut rng)?;
/// assert_eq!(hit.map(|selection| selection.item_id), Some(9));
///
/// let miss = selector.select_with_rng(&projection, Point::new(50.0, 5.0), &mut rng)?;
/// assert!(miss.is_none());
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct SpatialSelector {
    policy: SelectionPolicy,
}

impl SpatialSelector {
    /// Create a selector applying `policy`.
    #[must_use]
    pub const fn new(policy: SelectionPolicy) -> Self {
        Self { policy }
    }

    /// Policy applied by this selector.
    #[must_use]
    pub const fn policy(&self) -> SelectionPolicy {
        self.policy
    }

    /// Select an image at `point` using the thread-local RNG.
    ///
    /// Returns `Ok(None)` when no eligible item covers the point.
    pub fn select(
        &self,
        projection: &CatalogProjection,
        point: Point<f64>,
    ) -> Result<Option<Selection>, SelectionError> {
        self.select_with_rng(projection, point, &mut rand::thread_rng())
    }

    /// Select an image at `point` drawing randomness from `rng`.
    pub fn select_with_rng<R>(
        &self,
        projection: &CatalogProjection,
        point: Point<f64>,
        rng: &mut R,
    ) -> Result<Option<Selection>, SelectionError>
    where
        R: Rng + ?Sized,
    {
        let candidates: Vec<&ProjectedItem> = projection
            .candidates_containing(point)
            .into_iter()
            .filter(|item| self.policy.admits(item))
            .collect();
        if candidates.is_empty() {
            return Ok(None);
        }

        let weights: Vec<f64> = candidates.iter().map(|item| item.max_rate).collect();
        let chosen = weighted_index(&weights, rng)
            .and_then(|position| candidates.get(position))
            .ok_or(SelectionError::DegenerateWeights {
                candidates: candidates.len(),
            })?;

        if chosen.images.is_empty() {
            return Err(SelectionError::NoImages { item_id: chosen.id });
        }
        let image_position = rng.gen_range(0..chosen.images.len());
        let image = chosen
            .images
            .get(image_position)
            .cloned()
            .ok_or(SelectionError::NoImages { item_id: chosen.id })?;
        Ok(Some(Selection {
            item_id: chosen.id,
            image,
        }))
    }
}

/// Draw an index with probability proportional to its weight.
///
/// Negative and non-finite weights count as zero. Returns `None` when no
/// weight is positive, so a zero-weight entry is never drawn. Weights are
/// scaled by the largest one before summing, so the running total stays
/// finite for any mix of finite weights.
///
/// # Examples
///
/// ```
/// use rand::SeedableRng;
/// use rand::rngs::StdRng;
/// use xside_core::weighted_index;
///
/// let mut rng = StdRng::seed_from_u64(1);
/// assert_eq!(weighted_index(&[0.0, 3.0, 0.0], &mut rng), Some(1));
/// assert_eq!(weighted_index(&[0.0, 0.0], &mut rng), None);
/// assert!(weighted_index(&[f64::MAX, f64::MAX], &mut rng).is_some());
/// ```
#[expect(
    clippy::float_arithmetic,
    reason = "cumulative weights are running float sums"
)]
pub fn weighted_index<R>(weights: &[f64], rng: &mut R) -> Option<usize>
where
    R: Rng + ?Sized,
{
    let usable = |weight: f64| weight.is_finite() && weight > 0.0;
    let largest = weights
        .iter()
        .copied()
        .filter(|weight| usable(*weight))
        .fold(0.0_f64, f64::max);
    if largest <= 0.0 {
        return None;
    }
    let mut total = 0.0_f64;
    let cumulative: Vec<f64> = weights
        .iter()
        .map(|weight| {
            if usable(*weight) {
                // Each share is at most 1, so the sum is bounded by the length.
                total += weight / largest;
            }
            total
        })
        .collect();
    let target = rng.gen_range(0.0..total);
    let position = cumulative.partition_point(|bound| *bound <= target);
    // `target < total` keeps the position in bounds; clamp against rounding.
    Some(position.min(weights.len().saturating_sub(1)))
}
