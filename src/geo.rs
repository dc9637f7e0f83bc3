//! Coordinate transform between Web Mercator and WGS84
//!
//! Spherical Mercator (EPSG:3857, meters) ↔ geographic (EPSG:4326, degrees),
//! applied to single points, arbitrarily nested coordinate arrays and GeoJSON
//! geometries. Also bounding-box extraction by geometry kind.

use std::f64::consts::PI;

use layer_types::{Feature, FeatureCollection, Geometry, Position};
use serde::{Deserialize, Serialize};

/// WGS84 semi-major axis used by EPSG:3857
pub const EARTH_RADIUS: f64 = 6_378_137.0;

/// Latitude at which Web Mercator becomes square
pub const MAX_LATITUDE: f64 = 85.051_128_779_806_59;

/// Half the projected world width in meters
pub const MAX_EXTENT: f64 = PI * EARTH_RADIUS;

// =============================================================================
// Points
// =============================================================================

/// Coordinate frame of a value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frame {
    /// EPSG:3857 meters
    Projected,
    /// EPSG:4326 degrees
    Geographic,
}

/// Conversion direction for nested transforms
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    ToGeographic,
    ToProjected,
}

/// True if the pair lies within longitude/latitude bounds
pub fn is_valid_geographic(lng: f64, lat: f64) -> bool {
    lng.is_finite() && lat.is_finite() && lng.abs() <= 180.0 && lat.abs() <= 90.0
}

/// Exact inverse Mercator, no frame detection
pub fn mercator_to_lon_lat(x: f64, y: f64) -> (f64, f64) {
    let lng = (x / EARTH_RADIUS).to_degrees();
    let lat = (2.0 * (y / EARTH_RADIUS).exp().atan() - PI / 2.0).to_degrees();
    (lng, lat)
}

/// Projected → geographic
///
/// Values already within geographic bounds are returned unchanged, so mixed
/// input can be normalized without a frame tag. Projected points within
/// 180 m / 90 m of the origin are therefore misread as degrees.
pub fn to_geographic(x: f64, y: f64) -> (f64, f64) {
    if is_valid_geographic(x, y) {
        return (x, y);
    }
    mercator_to_lon_lat(x, y)
}

/// Geographic → projected; latitude is clamped to the Mercator limit
pub fn to_projected(lng: f64, lat: f64) -> (f64, f64) {
    let lat = lat.clamp(-MAX_LATITUDE, MAX_LATITUDE);
    let x = lng.to_radians() * EARTH_RADIUS;
    let y = (PI / 4.0 + lat.to_radians() / 2.0).tan().ln() * EARTH_RADIUS;
    (x, y)
}

fn convert(x: f64, y: f64, direction: Direction) -> (f64, f64) {
    match direction {
        Direction::ToGeographic => to_geographic(x, y),
        Direction::ToProjected => to_projected(x, y),
    }
}

/// Transform one position, keeping any elevation/measure values
pub fn transform_position(position: &[f64], direction: Direction) -> Position {
    match position {
        [x, y, rest @ ..] => {
            let (a, b) = convert(*x, *y, direction);
            let mut out = Vec::with_capacity(position.len());
            out.push(a);
            out.push(b);
            out.extend_from_slice(rest);
            out
        }
        _ => position.to_vec(),
    }
}

// =============================================================================
// Nested coordinates
// =============================================================================

/// GeoJSON-style coordinates of any nesting depth
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Coordinates {
    Position(Vec<f64>),
    Nested(Vec<Coordinates>),
}

impl Coordinates {
    /// Every position, depth-first
    pub fn positions(&self) -> Vec<&[f64]> {
        let mut out = Vec::new();
        self.collect_positions(&mut out);
        out
    }

    fn collect_positions<'a>(&'a self, out: &mut Vec<&'a [f64]>) {
        match self {
            Self::Position(p) => out.push(p.as_slice()),
            Self::Nested(items) => items.iter().for_each(|c| c.collect_positions(out)),
        }
    }
}

pub fn transform_coordinates(coordinates: &Coordinates, direction: Direction) -> Coordinates {
    match coordinates {
        Coordinates::Position(p) => Coordinates::Position(transform_position(p, direction)),
        Coordinates::Nested(items) => Coordinates::Nested(
            items
                .iter()
                .map(|c| transform_coordinates(c, direction))
                .collect(),
        ),
    }
}

fn map_line(line: &[Position], direction: Direction) -> Vec<Position> {
    line.iter().map(|p| transform_position(p, direction)).collect()
}

fn map_rings(rings: &[Vec<Position>], direction: Direction) -> Vec<Vec<Position>> {
    rings.iter().map(|r| map_line(r, direction)).collect()
}

pub fn transform_geometry(geometry: &Geometry, direction: Direction) -> Geometry {
    match geometry {
        Geometry::Point { coordinates } => Geometry::Point {
            coordinates: transform_position(coordinates, direction),
        },
        Geometry::MultiPoint { coordinates } => Geometry::MultiPoint {
            coordinates: map_line(coordinates, direction),
        },
        Geometry::LineString { coordinates } => Geometry::LineString {
            coordinates: map_line(coordinates, direction),
        },
        Geometry::MultiLineString { coordinates } => Geometry::MultiLineString {
            coordinates: map_rings(coordinates, direction),
        },
        Geometry::Polygon { coordinates } => Geometry::Polygon {
            coordinates: map_rings(coordinates, direction),
        },
        Geometry::MultiPolygon { coordinates } => Geometry::MultiPolygon {
            coordinates: coordinates
                .iter()
                .map(|polygon| map_rings(polygon, direction))
                .collect(),
        },
        Geometry::GeometryCollection { geometries } => Geometry::GeometryCollection {
            geometries: geometries
                .iter()
                .map(|g| transform_geometry(g, direction))
                .collect(),
        },
    }
}

pub fn transform_feature_collection(
    collection: &FeatureCollection,
    direction: Direction,
) -> FeatureCollection {
    let features = collection
        .features
        .iter()
        .map(|feature| Feature {
            geometry: feature
                .geometry
                .as_ref()
                .map(|g| transform_geometry(g, direction)),
            ..feature.clone()
        })
        .collect();

    FeatureCollection {
        features,
        bbox: collection.bbox.as_ref().and_then(|b| {
            let bbox = BoundingBox::from_slice(b, frame_before(direction))?;
            Some(bbox.to_frame(frame_after(direction)).to_array().to_vec())
        }),
        ..collection.clone()
    }
}

fn frame_before(direction: Direction) -> Frame {
    match direction {
        Direction::ToGeographic => Frame::Projected,
        Direction::ToProjected => Frame::Geographic,
    }
}

fn frame_after(direction: Direction) -> Frame {
    match direction {
        Direction::ToGeographic => Frame::Geographic,
        Direction::ToProjected => Frame::Projected,
    }
}

// =============================================================================
// Bounding boxes
// =============================================================================

/// Axis-aligned box in one frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
    pub frame: Frame,
}

impl BoundingBox {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64, frame: Frame) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
            frame,
        }
    }

    /// From `[minX, minY, maxX, maxY]`; `None` for fewer than four values
    pub fn from_slice(values: &[f64], frame: Frame) -> Option<Self> {
        match values {
            [min_x, min_y, max_x, max_y, ..] => Some(Self::new(*min_x, *min_y, *max_x, *max_y, frame)),
            _ => None,
        }
    }

    pub fn to_array(&self) -> [f64; 4] {
        [self.min_x, self.min_y, self.max_x, self.max_y]
    }

    pub fn to_geographic(&self) -> Self {
        self.to_frame(Frame::Geographic)
    }

    pub fn to_projected(&self) -> Self {
        self.to_frame(Frame::Projected)
    }

    pub fn to_frame(&self, frame: Frame) -> Self {
        if self.frame == frame {
            return *self;
        }
        let (min, max) = match frame {
            Frame::Geographic => (
                mercator_to_lon_lat(self.min_x, self.min_y),
                mercator_to_lon_lat(self.max_x, self.max_y),
            ),
            Frame::Projected => (
                to_projected(self.min_x, self.min_y),
                to_projected(self.max_x, self.max_y),
            ),
        };
        Self::new(min.0, min.1, max.0, max.1, frame)
    }

    pub fn center(&self) -> (f64, f64) {
        (
            (self.min_x + self.max_x) / 2.0,
            (self.min_y + self.max_y) / 2.0,
        )
    }

    pub fn union(&self, other: &BoundingBox) -> Self {
        let other = other.to_frame(self.frame);
        Self::new(
            self.min_x.min(other.min_x),
            self.min_y.min(other.min_y),
            self.max_x.max(other.max_x),
            self.max_y.max(other.max_y),
            self.frame,
        )
    }
}

/// Min/max over positions; `None` when empty
fn reduce<'a>(positions: impl IntoIterator<Item = &'a [f64]>) -> Option<[f64; 4]> {
    let mut bbox: Option<[f64; 4]> = None;
    for position in positions {
        let [x, y, ..] = position else {
            continue;
        };
        bbox = Some(match bbox {
            None => [*x, *y, *x, *y],
            Some([min_x, min_y, max_x, max_y]) => {
                [min_x.min(*x), min_y.min(*y), max_x.max(*x), max_y.max(*y)]
            }
        });
    }
    bbox
}

fn merge(a: Option<[f64; 4]>, b: Option<[f64; 4]>) -> Option<[f64; 4]> {
    match (a, b) {
        (Some(a), Some(b)) => Some([a[0].min(b[0]), a[1].min(b[1]), a[2].max(b[2]), a[3].max(b[3])]),
        (a, None) => a,
        (None, b) => b,
    }
}

/// `[minX, minY, maxX, maxY]` of a geometry
///
/// Polygons contribute their outer ring only; holes cannot extend the box.
pub fn geometry_bbox(geometry: &Geometry) -> Option<[f64; 4]> {
    match geometry {
        Geometry::Point { coordinates } => reduce([coordinates.as_slice()]),
        Geometry::MultiPoint { coordinates } | Geometry::LineString { coordinates } => {
            reduce(coordinates.iter().map(Vec::as_slice))
        }
        Geometry::MultiLineString { coordinates } => {
            reduce(coordinates.iter().flatten().map(Vec::as_slice))
        }
        Geometry::Polygon { coordinates } => {
            reduce(coordinates.first().into_iter().flatten().map(Vec::as_slice))
        }
        Geometry::MultiPolygon { coordinates } => reduce(
            coordinates
                .iter()
                .filter_map(|polygon| polygon.first())
                .flatten()
                .map(Vec::as_slice),
        ),
        Geometry::GeometryCollection { geometries } => geometries
            .iter()
            .map(geometry_bbox)
            .fold(None, merge),
    }
}

/// Union of all feature geometry boxes
pub fn feature_collection_bbox(collection: &FeatureCollection) -> Option<[f64; 4]> {
    collection
        .features
        .iter()
        .filter_map(|f| f.geometry.as_ref())
        .map(geometry_bbox)
        .fold(None, merge)
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn prop_projection_round_trip(lng in -180.0f64..=180.0, lat in -85.0f64..=85.0) {
            let (x, y) = to_projected(lng, lat);
            prop_assert!(x.abs() <= MAX_EXTENT + 1e-6);
            let (lng2, lat2) = mercator_to_lon_lat(x, y);
            prop_assert!((lng - lng2).abs() < 1e-6);
            prop_assert!((lat - lat2).abs() < 1e-6);
        }

        #[test]
        fn prop_projected_round_trip(
            x in prop_oneof![-0.999 * MAX_EXTENT..-181.0, 181.0..0.999 * MAX_EXTENT],
            y in prop_oneof![-0.999 * MAX_EXTENT..-181.0, 181.0..0.999 * MAX_EXTENT],
        ) {
            let (lng, lat) = to_geographic(x, y);
            prop_assert!(is_valid_geographic(lng, lat));
            let (x2, y2) = to_projected(lng, lat);
            prop_assert!((x - x2).abs() < 1e-6, "x {} -> {}", x, x2);
            prop_assert!((y - y2).abs() < 1e-6, "y {} -> {}", y, y2);
        }

        #[test]
        fn prop_latitude_is_clamped(lat in -90.0f64..=90.0) {
            let (_, y) = to_projected(0.0, lat);
            prop_assert!(y.abs() <= MAX_EXTENT + 1e-3);
        }
    }
}
