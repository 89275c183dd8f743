//! Geometry metrics: geodesic area, point-on-surface centroid and zoom
//! simplification for map display.

use geo::{Area, GeodesicArea, InteriorPoint};

use crate::models::{to_geo_multipolygon, to_geo_polygon, CanonicalGeometry, LatLng, Position, Ring};
use crate::models::GeometryExt;
use crate::normalize::MIN_RING_POSITIONS;

const SQUARE_METRES_PER_HECTARE: f64 = 10_000.0;

/// Base simplification tolerance in degrees
pub const BASE_TOLERANCE_DEG: f64 = 0.00005;

/// Above this extent, geometries are simplified even past the zoom threshold
pub const LARGE_EXTENT_KM2: f64 = 10_000.0;

pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Geodesic area on the WGS84 ellipsoid in hectares, rounded to 4 decimals
pub fn area_ha(geom: &CanonicalGeometry) -> f64 {
    let square_metres = to_geo_multipolygon(geom).geodesic_area_unsigned();
    round_to(square_metres / SQUARE_METRES_PER_HECTARE, 4)
}

/// Point on surface, rounded to 6 decimals
pub fn centroid(geom: &CanonicalGeometry) -> Option<LatLng> {
    point_on_surface(geom).map(|p| LatLng::new(round_to(p[1], 6), round_to(p[0], 6)))
}

/// A point guaranteed to lie inside or on the geometry.
///
/// Takes the largest part, picks a horizontal scan line between the two
/// vertex latitudes nearest its vertical centre, and returns the midpoint of
/// the widest interior slice along that line. Falls back to the `geo`
/// interior point, then to the first vertex.
pub fn point_on_surface(geom: &CanonicalGeometry) -> Option<Position> {
    let largest = geom.polygons().iter().max_by(|a, b| {
        to_geo_polygon(a)
            .unsigned_area()
            .total_cmp(&to_geo_polygon(b).unsigned_area())
    })?;

    if let Some(point) = widest_slice_midpoint(largest) {
        return Some(point);
    }

    tracing::debug!("Scan-line point on surface failed, using interior point");
    to_geo_multipolygon(geom)
        .interior_point()
        .map(|p| [p.x(), p.y()])
        .or_else(|| geom.positions().next().copied())
}

fn widest_slice_midpoint(polygon: &[Ring]) -> Option<Position> {
    let ys: Vec<f64> = polygon.iter().flatten().map(|p| p[1]).collect();
    let min_y = ys.iter().copied().reduce(f64::min)?;
    let max_y = ys.iter().copied().reduce(f64::max)?;
    if max_y <= min_y {
        return None;
    }
    let centre = (min_y + max_y) / 2.0;

    // No vertex lies strictly between lo and hi, so the scan line never hits one
    let lo = ys.iter().copied().filter(|y| *y <= centre).fold(min_y, f64::max);
    let hi = ys.iter().copied().filter(|y| *y > centre).fold(max_y, f64::min);
    let scan_y = (lo + hi) / 2.0;

    let mut crossings: Vec<f64> = Vec::new();
    for ring in polygon {
        for edge in ring.windows(2) {
            let (a, b) = (edge[0], edge[1]);
            if (a[1] > scan_y) != (b[1] > scan_y) {
                crossings.push(a[0] + (scan_y - a[1]) * (b[0] - a[0]) / (b[1] - a[1]));
            }
        }
    }
    crossings.sort_by(f64::total_cmp);

    crossings
        .chunks_exact(2)
        .map(|pair| (pair[0], pair[1]))
        .max_by(|a, b| (a.1 - a.0).total_cmp(&(b.1 - b.0)))
        .filter(|(left, right)| right > left)
        .map(|(left, right)| [(left + right) / 2.0, scan_y])
}

/// Simplification tolerance in degrees for a zoom level, `None` when the
/// geometry should be returned unchanged
pub fn tolerance_for_zoom(geom: &CanonicalGeometry, zoom: u8, threshold: u8) -> Option<f64> {
    if zoom <= threshold {
        return Some(BASE_TOLERANCE_DEG * 2f64.powi(i32::from(threshold - zoom)));
    }

    let extent_km2 = geom.bounds().map(|b| b.approx_area_km2()).unwrap_or(0.0);
    (extent_km2 > LARGE_EXTENT_KM2).then_some(BASE_TOLERANCE_DEG)
}

/// Vertex-reduced copy for map display at `zoom`.
///
/// Read path only: stored area and centroid are always computed from the
/// full geometry. Rings never drop below 4 positions and no ring is removed.
pub fn simplify_for_zoom(geom: &CanonicalGeometry, zoom: u8, threshold: u8) -> CanonicalGeometry {
    let Some(tolerance) = tolerance_for_zoom(geom, zoom, threshold) else {
        return geom.clone();
    };

    CanonicalGeometry::new(
        geom.polygons()
            .iter()
            .map(|polygon| {
                polygon
                    .iter()
                    .map(|ring| simplify_ring(ring, tolerance))
                    .collect()
            })
            .collect(),
    )
}

/// Simplify a closed ring, keeping at least [`MIN_RING_POSITIONS`] positions.
///
/// The ring is split at the vertex farthest from its start so both halves
/// have distinct endpoints.
fn simplify_ring(ring: &Ring, tolerance: f64) -> Ring {
    let closed = ring.len() > 1 && ring.first() == ring.last();
    if ring.len() <= MIN_RING_POSITIONS || !closed {
        return ring.clone();
    }

    let start = ring[0];
    let last = ring.len() - 1;
    let distance_from_start = |i: &usize| {
        let p = ring[*i];
        (p[0] - start[0]).powi(2) + (p[1] - start[1]).powi(2)
    };
    let Some(far) = (1..last).max_by(|a, b| distance_from_start(a).total_cmp(&distance_from_start(b))) else {
        return ring.clone();
    };

    let mut simplified = douglas_peucker(&ring[..=far], tolerance);
    simplified.pop();
    simplified.extend(douglas_peucker(&ring[far..], tolerance));
    if simplified.len() >= MIN_RING_POSITIONS {
        return simplified;
    }

    // Collapsed to start, far, start: add the vertex farthest from that chord
    let chord_distance = |i: &usize| segment_distance(&ring[*i], &start, &ring[far]);
    let Some(extra) = (1..last)
        .filter(|i| *i != far)
        .max_by(|a, b| chord_distance(a).total_cmp(&chord_distance(b)))
    else {
        return ring.clone();
    };

    let mut indices = [0, far, extra, last];
    indices.sort_unstable();
    indices.iter().map(|i| ring[*i]).collect()
}

/// Douglas-Peucker over a polyline; first and last positions are always kept
pub fn douglas_peucker(points: &[Position], tolerance: f64) -> Vec<Position> {
    if points.len() < 3 {
        return points.to_vec();
    }

    let mut keep = vec![false; points.len()];
    keep[0] = true;
    keep[points.len() - 1] = true;

    let mut stack = vec![(0, points.len() - 1)];
    while let Some((start, end)) = stack.pop() {
        if end <= start + 1 {
            continue;
        }

        let (index, distance) = (start + 1..end)
            .map(|i| (i, segment_distance(&points[i], &points[start], &points[end])))
            .fold((start, 0.0), |best, candidate| {
                if candidate.1 > best.1 {
                    candidate
                } else {
                    best
                }
            });

        if distance > tolerance {
            keep[index] = true;
            stack.push((start, index));
            stack.push((index, end));
        }
    }

    points
        .iter()
        .zip(keep)
        .filter_map(|(p, kept)| kept.then_some(*p))
        .collect()
}

/// Planar distance from `p` to the segment `a`-`b`
fn segment_distance(p: &Position, a: &Position, b: &Position) -> f64 {
    let (dx, dy) = (b[0] - a[0], b[1] - a[1]);
    let length_sq = dx * dx + dy * dy;
    if length_sq == 0.0 {
        return ((p[0] - a[0]).powi(2) + (p[1] - a[1]).powi(2)).sqrt();
    }

    let t = (((p[0] - a[0]) * dx + (p[1] - a[1]) * dy) / length_sq).clamp(0.0, 1.0);
    let (x, y) = (a[0] + t * dx, a[1] + t * dy);
    ((p[0] - x).powi(2) + (p[1] - y).powi(2)).sqrt()
}
