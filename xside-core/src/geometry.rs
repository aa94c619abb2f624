//! Service-area geometry for catalog items.
//!
//! Items arrive with their areas encoded as GeoJSON `Polygon` or
//! `MultiPolygon` objects. [`AreaGeometry`] keeps that wire shape so the
//! document can be stored and re-served unchanged, while
//! [`AreaGeometry::to_multi_polygon`] validates it into a
//! [`geo::MultiPolygon`] ready for containment tests.
//!
//! Positions use GeoJSON axis order: `[longitude, latitude]`, optionally
//! followed by an altitude that is ignored.

use geo::{Coord, Intersects, LineString, MultiPolygon, Point, Polygon};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A GeoJSON position: `[lon, lat]` with an optional trailing altitude.
pub type Position = Vec<f64>;

/// Polygon rings as they appear on the wire; the first ring is the exterior.
pub type PolygonRings = Vec<Vec<Position>>;

/// Service area of a catalog item in GeoJSON form.
///
/// # Examples
///
/// ```
/// use xside_core::AreaGeometry;
///
/// let json = r#"{"type":"Polygon","coordinates":[[[0,0],[0,10],[10,10],[10,0],[0,0]]]}"#;
/// let area: AreaGeometry = serde_json::from_str(json).expect("valid GeoJSON");
/// let polygons = area.to_multi_polygon().expect("valid polygon");
/// assert_eq!(polygons.0.len(), 1);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "coordinates")]
pub enum AreaGeometry {
    /// A single polygon with optional holes.
    Polygon(PolygonRings),
    /// Several polygons, each with optional holes.
    MultiPolygon(Vec<PolygonRings>),
}

/// Errors raised when an item's area cannot be turned into polygons.
#[derive(Debug, Error, PartialEq)]
pub enum GeometryError {
    /// The stored document had no `areas` value at all.
    #[error("area geometry is missing")]
    Missing,
    /// The JSON payload was not a supported GeoJSON polygon geometry.
    #[error("failed to decode area geometry: {message}")]
    Decode {
        /// Decoder message from `serde_json`.
        message: String,
    },
    /// A `MultiPolygon` contained no polygons.
    #[error("area geometry contains no polygons")]
    Empty,
    /// A polygon had no exterior ring.
    #[error("polygon {polygon} has no exterior ring")]
    MissingExterior {
        /// Index of the polygon within the geometry.
        polygon: usize,
    },
    /// A position had fewer than two ordinates or a non-finite ordinate.
    #[error("polygon {polygon} ring {ring} position {position} is not a finite lon/lat pair")]
    InvalidPosition {
        /// Index of the polygon within the geometry.
        polygon: usize,
        /// Index of the ring within the polygon.
        ring: usize,
        /// Index of the position within the ring.
        position: usize,
    },
    /// A ring had fewer than three distinct vertices.
    #[error("polygon {polygon} ring {ring} has {points} distinct points; at least 3 are required")]
    DegenerateRing {
        /// Index of the polygon within the geometry.
        polygon: usize,
        /// Index of the ring within the polygon.
        ring: usize,
        /// Number of distinct vertices found.
        points: usize,
    },
}

impl AreaGeometry {
    /// Parse a GeoJSON geometry from its JSON text.
    pub fn from_json_str(json: &str) -> Result<Self, GeometryError> {
        serde_json::from_str(json).map_err(|err| GeometryError::Decode {
            message: err.to_string(),
        })
    }

    /// Validate the geometry and convert it into polygons.
    ///
    /// Rings are closed automatically when the last position does not repeat
    /// the first.
    pub fn to_multi_polygon(&self) -> Result<MultiPolygon<f64>, GeometryError> {
        let polygons = match self {
            Self::Polygon(rings) => vec![build_polygon(0, rings)?],
            Self::MultiPolygon(parts) => parts
                .iter()
                .enumerate()
                .map(|(index, rings)| build_polygon(index, rings))
                .collect::<Result<Vec<_>, _>>()?,
        };
        if polygons.is_empty() {
            return Err(GeometryError::Empty);
        }
        Ok(MultiPolygon::new(polygons))
    }
}

fn build_polygon(polygon: usize, rings: &[Vec<Position>]) -> Result<Polygon<f64>, GeometryError> {
    let mut built = rings
        .iter()
        .enumerate()
        .map(|(ring, positions)| build_ring(polygon, ring, positions));
    let exterior = built
        .next()
        .ok_or(GeometryError::MissingExterior { polygon })??;
    let interiors = built.collect::<Result<Vec<_>, _>>()?;
    Ok(Polygon::new(exterior, interiors))
}

fn build_ring(
    polygon: usize,
    ring: usize,
    positions: &[Position],
) -> Result<LineString<f64>, GeometryError> {
    let coords = positions
        .iter()
        .enumerate()
        .map(|(position, ordinates)| match ordinates.as_slice() {
            [x, y, ..] if x.is_finite() && y.is_finite() => Ok(Coord { x: *x, y: *y }),
            _ => Err(GeometryError::InvalidPosition {
                polygon,
                ring,
                position,
            }),
        })
        .collect::<Result<Vec<_>, _>>()?;

    let points = distinct_vertices(&coords);
    if points < 3 {
        return Err(GeometryError::DegenerateRing {
            polygon,
            ring,
            points,
        });
    }
    Ok(LineString::from(coords))
}

fn distinct_vertices(coords: &[Coord<f64>]) -> usize {
    let mut seen: Vec<Coord<f64>> = Vec::with_capacity(coords.len());
    for coord in coords {
        if !seen.contains(coord) {
            seen.push(*coord);
        }
    }
    seen.len()
}

/// Return whether `areas` contains `point`.
///
/// Containment is boundary-inclusive: a point lying exactly on an edge or
/// vertex counts as inside. Points inside a hole are outside.
#[must_use]
pub fn area_contains(areas: &MultiPolygon<f64>, point: Point<f64>) -> bool {
    areas.intersects(&point)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};

    #[fixture]
    fn square() -> MultiPolygon<f64> {
        AreaGeometry::Polygon(vec![vec![
            vec![0.0, 0.0],
            vec![0.0, 10.0],
            vec![10.0, 10.0],
            vec![10.0, 0.0],
            vec![0.0, 0.0],
        ]])
        .to_multi_polygon()
        .expect("square is valid")
    }

    #[rstest]
    fn interior_point_is_contained(square: MultiPolygon<f64>) {
        assert!(area_contains(&square, Point::new(5.0, 5.0)));
    }

    #[rstest]
    fn exterior_point_is_not_contained(square: MultiPolygon<f64>) {
        assert!(!area_contains(&square, Point::new(15.0, 15.0)));
    }

    #[rstest]
    #[case(Point::new(0.0, 5.0))] // left edge
    #[case(Point::new(10.0, 5.0))] // right edge
    #[case(Point::new(5.0, 0.0))] // bottom edge
    #[case(Point::new(5.0, 10.0))] // top edge
    #[case(Point::new(0.0, 0.0))] // corner
    fn boundary_points_are_contained(square: MultiPolygon<f64>, #[case] point: Point<f64>) {
        assert!(area_contains(&square, point));
    }

    #[rstest]
    fn hole_excludes_points() {
        let area = AreaGeometry::Polygon(vec![
            vec![vec![0.0, 0.0], vec![0.0, 10.0], vec![10.0, 10.0], vec![10.0, 0.0]],
            vec![vec![4.0, 4.0], vec![4.0, 6.0], vec![6.0, 6.0], vec![6.0, 4.0]],
        ]);
        let polygons = area.to_multi_polygon().expect("valid polygon with hole");
        assert!(!area_contains(&polygons, Point::new(5.0, 5.0)));
        assert!(area_contains(&polygons, Point::new(2.0, 2.0)));
    }

    #[rstest]
    fn parses_multipolygon_json() {
        let json = r#"{"type": "MultiPolygon", "coordinates": [[[[37.536, 55.768],
            [37.532, 55.739], [37.593, 55.738], [37.592, 55.761], [37.536, 55.768]]]]}"#;
        let area = AreaGeometry::from_json_str(json).expect("parse");
        let polygons = area.to_multi_polygon().expect("valid");
        assert!(area_contains(&polygons, Point::new(37.558_538, 55.746_994)));
    }

    #[rstest]
    fn unclosed_rings_are_closed() {
        let area = AreaGeometry::Polygon(vec![vec![
            vec![0.0, 0.0],
            vec![0.0, 1.0],
            vec![1.0, 1.0],
        ]]);
        let polygons = area.to_multi_polygon().expect("valid triangle");
        assert!(area_contains(&polygons, Point::new(0.2, 0.5)));
    }

    #[rstest]
    fn altitude_is_ignored() {
        let area = AreaGeometry::Polygon(vec![vec![
            vec![0.0, 0.0, 100.0],
            vec![0.0, 1.0, 100.0],
            vec![1.0, 1.0, 100.0],
        ]]);
        assert!(area.to_multi_polygon().is_ok());
    }

    #[rstest]
    fn rejects_unsupported_geometry_type() {
        let err = AreaGeometry::from_json_str(r#"{"type":"Point","coordinates":[1,2]}"#)
            .expect_err("points are not areas");
        assert!(matches!(err, GeometryError::Decode { .. }));
    }

    #[rstest]
    fn rejects_empty_multipolygon() {
        let err = AreaGeometry::MultiPolygon(Vec::new())
            .to_multi_polygon()
            .expect_err("empty");
        assert_eq!(err, GeometryError::Empty);
    }

    #[rstest]
    fn rejects_polygon_without_rings() {
        let err = AreaGeometry::Polygon(Vec::new())
            .to_multi_polygon()
            .expect_err("no exterior");
        assert_eq!(err, GeometryError::MissingExterior { polygon: 0 });
    }

    #[rstest]
    #[case(vec![vec![0.0], vec![1.0, 1.0], vec![1.0, 0.0]], 0)]
    #[case(vec![vec![0.0, 0.0], vec![f64::NAN, 1.0], vec![1.0, 0.0]], 1)]
    #[case(vec![vec![0.0, 0.0], vec![1.0, 1.0], vec![f64::INFINITY, 0.0]], 2)]
    fn rejects_invalid_positions(#[case] ring: Vec<Position>, #[case] position: usize) {
        let err = AreaGeometry::Polygon(vec![ring])
            .to_multi_polygon()
            .expect_err("invalid position");
        assert_eq!(
            err,
            GeometryError::InvalidPosition {
                polygon: 0,
                ring: 0,
                position
            }
        );
    }

    #[rstest]
    fn rejects_degenerate_ring() {
        let area = AreaGeometry::MultiPolygon(vec![vec![vec![
            vec![0.0, 0.0],
            vec![1.0, 1.0],
            vec![0.0, 0.0],
        ]]]);
        let err = area.to_multi_polygon().expect_err("two distinct points");
        assert_eq!(
            err,
            GeometryError::DegenerateRing {
                polygon: 0,
                ring: 0,
                points: 2
            }
        );
    }
}
