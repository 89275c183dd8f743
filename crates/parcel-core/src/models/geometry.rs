//! Geometry types shared by every parcel crate.
//!
//! Raw geometries come out of the format parsers with arbitrary winding and
//! optional Z values. Canonical geometries are always MultiPolygons of 2D
//! `[lng, lat]` positions; conversion to the computational `geo` types lives in
//! `parcel-geo`.

use serde::{Deserialize, Serialize};

use crate::error::{ParcelError, Result};

pub const MIN_LNG: f64 = -180.0;
pub const MAX_LNG: f64 = 180.0;
pub const MIN_LAT: f64 = -90.0;
pub const MAX_LAT: f64 = 90.0;

/// A 2D position as `[lng, lat]`
pub type Position = [f64; 2];

/// A closed ring of positions
pub type Ring = Vec<Position>;

/// Position as decoded from a source file, possibly carrying an altitude
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawPosition {
    pub x: f64,
    pub y: f64,
    pub z: Option<f64>,
}

impl RawPosition {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y, z: None }
    }

    pub fn with_z(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z: Some(z) }
    }
}

pub type RawRing = Vec<RawPosition>;

/// Polygonal geometry as produced by a parser: arbitrary winding, maybe 3D
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RawGeometry {
    Polygon(Vec<RawRing>),
    MultiPolygon(Vec<Vec<RawRing>>),
}

impl RawGeometry {
    pub fn type_name(&self) -> &'static str {
        match self {
            RawGeometry::Polygon(_) => "Polygon",
            RawGeometry::MultiPolygon(_) => "MultiPolygon",
        }
    }

    /// True when no ring carries a single position
    pub fn is_empty(&self) -> bool {
        match self {
            RawGeometry::Polygon(rings) => rings.iter().all(|r| r.is_empty()),
            RawGeometry::MultiPolygon(polygons) => {
                polygons.iter().flatten().all(|r| r.is_empty())
            }
        }
    }

    pub fn has_z(&self) -> bool {
        let mut rings: Box<dyn Iterator<Item = &RawRing>> = match self {
            RawGeometry::Polygon(rings) => Box::new(rings.iter()),
            RawGeometry::MultiPolygon(polygons) => Box::new(polygons.iter().flatten()),
        };
        rings.any(|ring| ring.iter().any(|p| p.z.is_some()))
    }
}

/// MultiPolygon geometry in canonical shape.
///
/// Ring 0 of each polygon is the exterior, subsequent rings are holes.
/// Serializes as a GeoJSON MultiPolygon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "MultiPolygon")]
pub struct CanonicalGeometry {
    pub coordinates: Vec<Vec<Ring>>,
}

impl CanonicalGeometry {
    pub fn new(coordinates: Vec<Vec<Ring>>) -> Self {
        Self { coordinates }
    }

    pub fn polygons(&self) -> &[Vec<Ring>] {
        &self.coordinates
    }

    pub fn polygon_count(&self) -> usize {
        self.coordinates.len()
    }

    pub fn ring_count(&self) -> usize {
        self.coordinates.iter().map(|p| p.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.coordinates.iter().flatten().all(|ring| ring.is_empty())
    }

    /// Iterate over every position of every ring
    pub fn positions(&self) -> impl Iterator<Item = &Position> {
        self.coordinates.iter().flatten().flatten()
    }

    /// Axis-aligned extent as `(min_lng, min_lat, max_lng, max_lat)`
    pub fn extent(&self) -> Option<(f64, f64, f64, f64)> {
        let mut positions = self.positions();
        let first = positions.next()?;
        let init = (first[0], first[1], first[0], first[1]);
        Some(positions.fold(init, |(min_x, min_y, max_x, max_y), p| {
            (min_x.min(p[0]), min_y.min(p[1]), max_x.max(p[0]), max_y.max(p[1]))
        }))
    }

    /// Convert to a GeoJSON value
    pub fn to_geojson(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    /// Parse from a GeoJSON MultiPolygon value
    pub fn from_geojson(value: &serde_json::Value) -> Option<Self> {
        serde_json::from_value(value.clone()).ok()
    }
}

impl From<&CanonicalGeometry> for RawGeometry {
    fn from(geometry: &CanonicalGeometry) -> Self {
        RawGeometry::MultiPolygon(
            geometry
                .coordinates
                .iter()
                .map(|polygon| {
                    polygon
                        .iter()
                        .map(|ring| ring.iter().map(|p| RawPosition::new(p[0], p[1])).collect())
                        .collect()
                })
                .collect(),
        )
    }
}

/// Latitude/longitude pair used for centroids
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

/// Whether a position lies within WGS84 bounds
pub fn within_wgs84(position: &Position) -> bool {
    (MIN_LNG..=MAX_LNG).contains(&position[0]) && (MIN_LAT..=MAX_LAT).contains(&position[1])
}

/// Bounding box query in WGS84 degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub min_lng: f64,
    pub min_lat: f64,
    pub max_lng: f64,
    pub max_lat: f64,
}

impl BBox {
    /// Create a bounding box, clamped to WGS84 bounds.
    ///
    /// Rejects non-finite values and boxes whose minimum is not strictly below
    /// the maximum on either axis, before and after clamping.
    pub fn new(min_lng: f64, min_lat: f64, max_lng: f64, max_lat: f64) -> Result<Self> {
        let input = format!("{},{},{},{}", min_lng, min_lat, max_lng, max_lat);
        let invalid = |reason: &str| ParcelError::InvalidBBox {
            input: input.clone(),
            reason: reason.to_string(),
        };

        if ![min_lng, min_lat, max_lng, max_lat].iter().all(|v| v.is_finite()) {
            return Err(invalid("values must be finite numbers"));
        }
        if min_lng >= max_lng {
            return Err(invalid("minLng must be less than maxLng"));
        }
        if min_lat >= max_lat {
            return Err(invalid("minLat must be less than maxLat"));
        }

        let clamped = Self {
            min_lng: min_lng.clamp(MIN_LNG, MAX_LNG),
            min_lat: min_lat.clamp(MIN_LAT, MAX_LAT),
            max_lng: max_lng.clamp(MIN_LNG, MAX_LNG),
            max_lat: max_lat.clamp(MIN_LAT, MAX_LAT),
        };

        if clamped.min_lng >= clamped.max_lng || clamped.min_lat >= clamped.max_lat {
            return Err(invalid("box lies entirely outside WGS84 bounds"));
        }

        Ok(clamped)
    }

    /// Parse a `minLng,minLat,maxLng,maxLat` query parameter
    pub fn parse(input: &str) -> Result<Self> {
        let invalid = |reason: String| ParcelError::InvalidBBox {
            input: input.to_string(),
            reason,
        };

        let parts: Vec<&str> = input.split(',').map(str::trim).collect();
        if parts.len() != 4 {
            return Err(invalid(format!("expected 4 comma-separated numbers, found {}", parts.len())));
        }

        let mut values = [0.0f64; 4];
        for (slot, part) in values.iter_mut().zip(&parts) {
            *slot = part
                .parse::<f64>()
                .map_err(|_| invalid(format!("'{}' is not a number", part)))?;
        }

        Self::new(values[0], values[1], values[2], values[3]).map_err(|e| match e {
            ParcelError::InvalidBBox { reason, .. } => invalid(reason),
            other => other,
        })
    }

    /// The whole WGS84 extent
    pub fn world() -> Self {
        Self {
            min_lng: MIN_LNG,
            min_lat: MIN_LAT,
            max_lng: MAX_LNG,
            max_lat: MAX_LAT,
        }
    }

    pub fn width(&self) -> f64 {
        self.max_lng - self.min_lng
    }

    pub fn height(&self) -> f64 {
        self.max_lat - self.min_lat
    }

    pub fn contains_position(&self, position: &Position) -> bool {
        position[0] >= self.min_lng
            && position[0] <= self.max_lng
            && position[1] >= self.min_lat
            && position[1] <= self.max_lat
    }

    /// Approximate surface in square kilometres (equirectangular)
    pub fn approx_area_km2(&self) -> f64 {
        const KM_PER_DEG_LAT: f64 = 110.574;
        const KM_PER_DEG_LNG_EQUATOR: f64 = 111.320;

        let mid_lat = ((self.min_lat + self.max_lat) / 2.0).to_radians();
        let width_km = self.width() * KM_PER_DEG_LNG_EQUATOR * mid_lat.cos().abs();
        let height_km = self.height() * KM_PER_DEG_LAT;
        width_km * height_km
    }
}
