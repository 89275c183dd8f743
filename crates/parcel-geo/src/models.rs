//! Geometry models for parcel-geo.
//!
//! Re-exports the canonical types from `parcel-core` and provides the
//! conversions to and from the `geo` crate. Everything that needs a
//! computational-geometry routine goes through these functions.

use geo::{Coord, LineString, MultiPolygon, Polygon, Rect};

pub use parcel_core::models::{BBox, CanonicalGeometry, LatLng, Position, Ring};

/// Convert a ring of positions to a `geo` line string
pub fn to_geo_ring(ring: &[Position]) -> LineString<f64> {
    LineString::new(ring.iter().map(|p| Coord { x: p[0], y: p[1] }).collect())
}

/// Convert canonical polygon rings to a `geo` polygon
pub fn to_geo_polygon(rings: &[Ring]) -> Polygon<f64> {
    match rings.split_first() {
        Some((exterior, interiors)) => Polygon::new(
            to_geo_ring(exterior),
            interiors.iter().map(|r| to_geo_ring(r)).collect(),
        ),
        None => Polygon::new(LineString::new(vec![]), vec![]),
    }
}

/// Convert a canonical geometry to a `geo` MultiPolygon
pub fn to_geo_multipolygon(geom: &CanonicalGeometry) -> MultiPolygon<f64> {
    MultiPolygon::new(geom.polygons().iter().map(|p| to_geo_polygon(p)).collect())
}

/// Convert a `geo` MultiPolygon back to canonical shape (no re-orientation)
pub fn from_geo_multipolygon(mp: &MultiPolygon<f64>) -> CanonicalGeometry {
    CanonicalGeometry::new(
        mp.iter()
            .map(|polygon| {
                std::iter::once(polygon.exterior())
                    .chain(polygon.interiors())
                    .map(|ring| ring.coords().map(|c| [c.x, c.y]).collect())
                    .collect()
            })
            .collect(),
    )
}

/// Query box as a `geo` rectangle
pub fn bbox_to_rect(bbox: &BBox) -> Rect<f64> {
    Rect::new(
        Coord { x: bbox.min_lng, y: bbox.min_lat },
        Coord { x: bbox.max_lng, y: bbox.max_lat },
    )
}

/// Shoelace signed area; positive for counter-clockwise rings
pub fn signed_area(ring: &[Position]) -> f64 {
    if ring.len() < 3 {
        return 0.0;
    }

    let n = ring.len();
    let mut area = 0.0;
    for i in 0..n {
        let j = (i + 1) % n;
        area += ring[i][0] * ring[j][1];
        area -= ring[j][0] * ring[i][1];
    }
    area / 2.0
}

/// Check if a ring is counter-clockwise (positive signed area)
pub fn is_ccw(ring: &[Position]) -> bool {
    signed_area(ring) > 0.0
}

/// Extension trait for canonical geometries with geo-crate operations
pub trait GeometryExt {
    fn to_geo(&self) -> MultiPolygon<f64>;

    /// Extent as a query box, `None` for empty geometries
    fn bounds(&self) -> Option<BBox>;
}

impl GeometryExt for CanonicalGeometry {
    fn to_geo(&self) -> MultiPolygon<f64> {
        to_geo_multipolygon(self)
    }

    fn bounds(&self) -> Option<BBox> {
        let (min_lng, min_lat, max_lng, max_lat) = self.extent()?;
        Some(BBox {
            min_lng,
            min_lat,
            max_lng,
            max_lat,
        })
    }
}
