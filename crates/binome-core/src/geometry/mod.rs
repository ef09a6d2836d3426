//! Point-in-zone tests.
//!
//! Polygons and rectangles are evaluated in the planar projection
//! (`lng` as x, `lat` as y) with an inclusive bounding-box prefilter followed
//! by an even-odd ray cast. Circles use the haversine great-circle distance.
//!
//! Boundary rule: edges follow the half-open convention of the ray cast, so a
//! point on the southern or western side of an axis-aligned rectangle is
//! inside while a point on its northern or eastern side is outside. The rule
//! is the same on every call; no shape is special-cased.
//!
//! Malformed shapes never panic. They simply contain nothing.

use serde::{Deserialize, Serialize};

use crate::models::Zone;

/// Mean Earth radius (IUGG) in meters.
pub const EARTH_RADIUS_METERS: f64 = 6_371_008.8;

/// A WGS84 coordinate in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    #[must_use]
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Both components are finite and within WGS84 ranges.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }

    fn is_finite(&self) -> bool {
        self.lat.is_finite() && self.lng.is_finite()
    }
}

/// Axis-aligned bounds of a ring, inclusive on every side.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub south: f64,
    pub west: f64,
    pub north: f64,
    pub east: f64,
}

impl BoundingBox {
    #[must_use]
    pub fn contains(&self, point: LatLng) -> bool {
        point.lat >= self.south
            && point.lat <= self.north
            && point.lng >= self.west
            && point.lng <= self.east
    }
}

/// Geometric extent of a zone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Shape {
    /// Great-circle disc.
    Circle {
        center: LatLng,
        #[serde(rename = "radiusMeters")]
        radius_meters: f64,
    },
    /// Ordered ring, implicitly closed (the last vertex connects to the first).
    Polygon { vertices: Vec<LatLng> },
    /// Axis-aligned box given by two opposite corners.
    Rectangle {
        #[serde(rename = "southWest")]
        south_west: LatLng,
        #[serde(rename = "northEast")]
        north_east: LatLng,
    },
}

impl Shape {
    /// Ring used for containment tests. Circles have no ring.
    #[must_use]
    pub fn ring(&self) -> Option<Vec<LatLng>> {
        match self {
            Self::Circle { .. } => None,
            Self::Polygon { vertices } => Some(vertices.clone()),
            Self::Rectangle {
                south_west,
                north_east,
            } => Some(vec![
                LatLng::new(south_west.lat, south_west.lng),
                LatLng::new(south_west.lat, north_east.lng),
                LatLng::new(north_east.lat, north_east.lng),
                LatLng::new(north_east.lat, south_west.lng),
            ]),
        }
    }

    /// Check the shape is well-formed enough to contain anything.
    ///
    /// Returns a human-readable reason when it is not.
    pub fn check(&self) -> Result<(), String> {
        match self {
            Self::Circle {
                center,
                radius_meters,
            } => {
                if !center.is_valid() {
                    return Err("circle center is not a valid coordinate".to_string());
                }
                if !radius_meters.is_finite() || *radius_meters <= 0.0 {
                    return Err("circle radius must be a positive number of meters".to_string());
                }
                Ok(())
            }
            Self::Polygon { vertices } => {
                if vertices.len() < 3 {
                    return Err("polygon needs at least three vertices".to_string());
                }
                if vertices.iter().any(|vertex| !vertex.is_valid()) {
                    return Err("polygon contains an invalid vertex".to_string());
                }
                Ok(())
            }
            Self::Rectangle {
                south_west,
                north_east,
            } => {
                if !south_west.is_valid() || !north_east.is_valid() {
                    return Err("rectangle corner is not a valid coordinate".to_string());
                }
                if south_west.lat >= north_east.lat || south_west.lng >= north_east.lng {
                    return Err("rectangle must have its south-west corner strictly below and left of its north-east corner".to_string());
                }
                Ok(())
            }
        }
    }

    /// Whether `point` lies inside this shape.
    #[must_use]
    pub fn contains(&self, point: LatLng) -> bool {
        match self {
            Self::Circle {
                center,
                radius_meters,
            } => point_in_circle(point, *center, *radius_meters),
            Self::Polygon { vertices } => point_in_polygon(point, vertices),
            Self::Rectangle { .. } => {
                self.check().is_ok()
                    && self
                        .ring()
                        .is_some_and(|ring| point_in_polygon(point, &ring))
            }
        }
    }
}

/// Whether `point` lies inside `zone`.
#[must_use]
pub fn point_in_zone(point: LatLng, zone: &Zone) -> bool {
    zone.shape.contains(point)
}

/// Zones whose shape contains `point`, in input order.
pub fn zones_containing<'a>(point: LatLng, zones: &'a [Zone]) -> Vec<&'a Zone> {
    zones
        .iter()
        .filter(|zone| point_in_zone(point, zone))
        .collect()
}

/// Even-odd point-in-polygon test.
///
/// Casts a ray from `point` towards increasing longitude and counts the ring
/// edges it crosses. Rings with fewer than three vertices contain nothing.
#[must_use]
pub fn point_in_polygon(point: LatLng, ring: &[LatLng]) -> bool {
    if ring.len() < 3 || !point.is_finite() {
        return false;
    }
    let Some(bounds) = bounding_box(ring) else {
        return false;
    };
    if !bounds.contains(point) {
        return false;
    }

    let mut inside = false;
    let mut previous = ring[ring.len() - 1];
    for &current in ring {
        let straddles = (current.lat > point.lat) != (previous.lat > point.lat);
        if straddles {
            let crossing_lng = (previous.lng - current.lng) * (point.lat - current.lat)
                / (previous.lat - current.lat)
                + current.lng;
            if point.lng < crossing_lng {
                inside = !inside;
            }
        }
        previous = current;
    }
    inside
}

/// Whether `point` is within `radius_meters` of `center`. Ties count as inside.
#[must_use]
pub fn point_in_circle(point: LatLng, center: LatLng, radius_meters: f64) -> bool {
    if !radius_meters.is_finite() || radius_meters <= 0.0 {
        return false;
    }
    if !point.is_finite() || !center.is_finite() {
        return false;
    }
    distance_meters(point, center) <= radius_meters
}

/// Haversine great-circle distance in meters.
#[must_use]
pub fn distance_meters(a: LatLng, b: LatLng) -> f64 {
    let lat_a = a.lat.to_radians();
    let lat_b = b.lat.to_radians();
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat_a.cos() * lat_b.cos() * (d_lng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_METERS * h.sqrt().min(1.0).asin()
}

/// Inclusive bounds of a ring, or `None` when it has no finite vertex.
#[must_use]
pub fn bounding_box(ring: &[LatLng]) -> Option<BoundingBox> {
    let mut vertices = ring.iter().filter(|vertex| vertex.is_finite());
    let first = vertices.next()?;
    let mut bounds = BoundingBox {
        south: first.lat,
        west: first.lng,
        north: first.lat,
        east: first.lng,
    };
    for vertex in vertices {
        bounds.south = bounds.south.min(vertex.lat);
        bounds.north = bounds.north.max(vertex.lat);
        bounds.west = bounds.west.min(vertex.lng);
        bounds.east = bounds.east.max(vertex.lng);
    }
    Some(bounds)
}
