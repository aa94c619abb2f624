//! Core domain types for the xside engine.
//!
//! The crate models geofenced catalog items, validates their service areas,
//! and selects one image to show at a GPS position. Network and blob access
//! live in `xside-data`; this crate stays free of I/O apart from the optional
//! SQLite catalog store.

#![forbid(unsafe_code)]

use serde::{Deserialize, Deserializer, Serialize, de::Error as _};
use serde_json::{Map, Value};
use thiserror::Error;

pub mod geometry;
mod image_path;
pub mod projection;
pub mod select;
pub mod snapshot;
pub mod store;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use geometry::{AreaGeometry, GeometryError, area_contains};
pub use image_path::{ImagePath, ImagePathError};
pub use projection::{CatalogProjection, ProjectedItem};
pub use select::{Selection, SelectionError, SelectionPolicy, SpatialSelector, weighted_index};
pub use snapshot::SnapshotHandle;
pub use store::{CatalogStore, CatalogStoreError};

#[cfg(feature = "store-sqlite")]
pub use store::{SnapshotInfo, SqliteCatalogStore};

/// Identifier of a catalog item, stable across syncs.
pub type ItemId = u64;

/// A geofenced catalog entry as served by the catalog API.
///
/// Unknown document fields are preserved in [`CatalogItem::extra`] so the
/// persisted snapshot carries everything downstream consumers may need.
///
/// # Examples
///
/// ```
/// use serde_json::json;
/// use xside_core::CatalogItem;
///
/// let item = CatalogItem::from_value(json!({
///     "id": 7,
///     "client": "Client1",
///     "name": "Spring sale",
///     "areas": {"type": "Polygon", "coordinates": [[[0, 0], [0, 1], [1, 1], [1, 0], [0, 0]]]},
///     "is_active": true,
///     "max_rate": 12.5,
///     "max_daily_spend": 100.0,
///     "images": ["images/Client1/spring.jpg"]
/// }))?;
/// assert_eq!(item.id, 7);
/// assert_eq!(item.images.len(), 1);
/// # Ok::<(), xside_core::CatalogItemError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogItem {
    /// Unique identifier.
    pub id: ItemId,
    /// Owner or tenant label.
    #[serde(default, deserialize_with = "string_or_number")]
    pub client: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Service area.
    pub areas: AreaGeometry,
    /// Activation flag set by the catalog owner.
    #[serde(default = "default_active")]
    pub is_active: bool,
    /// Non-negative selection weight.
    pub max_rate: f64,
    /// Spend cap carried through for downstream consumers.
    #[serde(default)]
    pub max_daily_spend: Option<f64>,
    /// Candidate images, in catalog order.
    #[serde(default)]
    pub images: Vec<ImagePath>,
    /// Remaining document fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Reasons a raw catalog record is rejected.
#[derive(Debug, Error, PartialEq)]
pub enum CatalogItemError {
    /// The record did not match the item document shape.
    #[error("failed to decode catalog item {id:?}: {message}")]
    Decode {
        /// Identifier, when the record carried a readable one.
        id: Option<ItemId>,
        /// Decoder message from `serde_json`.
        message: String,
    },
    /// The item's area could not be turned into polygons.
    #[error("catalog item {id} has an invalid area: {source}")]
    Geometry {
        /// Identifier of the rejected item.
        id: ItemId,
        /// Validation failure.
        #[source]
        source: GeometryError,
    },
    /// The weight was negative or not finite.
    #[error("catalog item {id} has invalid max_rate {max_rate}")]
    InvalidRate {
        /// Identifier of the rejected item.
        id: ItemId,
        /// Rejected weight.
        max_rate: f64,
    },
}

impl CatalogItem {
    /// Decode and validate a raw catalog record.
    pub fn from_value(value: Value) -> Result<Self, CatalogItemError> {
        let id = value.get("id").and_then(Value::as_u64);
        let item: Self = serde_json::from_value(value).map_err(|err| CatalogItemError::Decode {
            id,
            message: err.to_string(),
        })?;
        item.validate()?;
        Ok(item)
    }

    /// Check the invariants a synced item must satisfy.
    pub fn validate(&self) -> Result<(), CatalogItemError> {
        self.areas
            .to_multi_polygon()
            .map_err(|source| CatalogItemError::Geometry {
                id: self.id,
                source,
            })?;
        if !self.max_rate.is_finite() || self.max_rate < 0.0 {
            return Err(CatalogItemError::InvalidRate {
                id: self.id,
                max_rate: self.max_rate,
            });
        }
        Ok(())
    }
}

const fn default_active() -> bool {
    true
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(text) => Ok(text),
        Value::Number(number) => Ok(number.to_string()),
        Value::Null => Ok(String::new()),
        other => Err(D::Error::custom(format!(
            "expected a string or number, found {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};
    use serde_json::json;

    #[fixture]
    fn record() -> Value {
        json!({
            "id": 3,
            "client": "Client1",
            "name": "TestItem3",
            "areas": {"type": "MultiPolygon", "coordinates": [[[[0, 0], [0, 10], [10, 10], [10, 0], [0, 0]]]]},
            "is_active": true,
            "max_rate": 42.0,
            "max_daily_spend": 100.0,
            "images": ["images/Client1/TestItem3/a.jpg"],
            "created": "2024-01-01"
        })
    }

    #[rstest]
    fn decodes_full_record(record: Value) {
        let item = CatalogItem::from_value(record).expect("valid record");
        assert_eq!(item.id, 3);
        assert_eq!(item.client, "Client1");
        assert_eq!(item.max_daily_spend, Some(100.0));
        assert_eq!(item.extra.get("created"), Some(&json!("2024-01-01")));
    }

    #[rstest]
    fn round_trips_unknown_fields(record: Value) {
        let item = CatalogItem::from_value(record).expect("valid record");
        let encoded = serde_json::to_value(&item).expect("encode");
        assert_eq!(encoded.get("created"), Some(&json!("2024-01-01")));
        assert_eq!(encoded.get("areas").and_then(|a| a.get("type")), Some(&json!("MultiPolygon")));
    }

    #[rstest]
    fn numeric_client_is_accepted(mut record: Value) {
        record["client"] = json!(17);
        let item = CatalogItem::from_value(record).expect("valid record");
        assert_eq!(item.client, "17");
    }

    #[rstest]
    fn missing_optional_fields_use_defaults() {
        let item = CatalogItem::from_value(json!({
            "id": 1,
            "areas": {"type": "Polygon", "coordinates": [[[0, 0], [0, 1], [1, 1]]]},
            "max_rate": 0
        }))
        .expect("minimal record");
        assert!(item.is_active);
        assert!(item.images.is_empty());
        assert_eq!(item.max_daily_spend, None);
    }

    #[rstest]
    fn malformed_area_is_a_geometry_error(mut record: Value) {
        record["areas"] = json!({"type": "Polygon", "coordinates": [[[0, 0], [1, 1]]]});
        let err = CatalogItem::from_value(record).expect_err("degenerate ring");
        assert!(matches!(err, CatalogItemError::Geometry { id: 3, .. }));
    }

    #[rstest]
    fn unsupported_area_type_is_a_decode_error(mut record: Value) {
        record["areas"] = json!({"type": "Point", "coordinates": [0, 0]});
        let err = CatalogItem::from_value(record).expect_err("not an area");
        assert!(matches!(err, CatalogItemError::Decode { id: Some(3), .. }));
    }

    #[rstest]
    #[case(json!(-1.0))]
    fn negative_rate_is_rejected(mut record: Value, #[case] rate: Value) {
        record["max_rate"] = rate;
        let err = CatalogItem::from_value(record).expect_err("negative weight");
        assert!(matches!(err, CatalogItemError::InvalidRate { id: 3, .. }));
    }

    #[rstest]
    fn escaping_image_path_is_rejected(mut record: Value) {
        record["images"] = json!(["../../outside.jpg"]);
        let err = CatalogItem::from_value(record).expect_err("path escapes media root");
        assert!(matches!(err, CatalogItemError::Decode { .. }));
    }
}
