//! Self-intersection detection, repair and area plausibility checks.

use geo::algorithm::line_intersection::{line_intersection, LineIntersection};
use geo::{BooleanOps, Coord, Line, MultiPolygon};
use parcel_core::models::{FeatureIssue, IssueCode};

use crate::models::{from_geo_multipolygon, to_geo_multipolygon, CanonicalGeometry, Position, Ring};
use crate::normalize::orient_polygons;

/// A crossing between two non-adjacent segments of one polygon
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Kink {
    pub polygon: usize,
    pub location: Position,
}

/// Find every self-intersection of every polygon.
///
/// All segments of all rings of a polygon are tested against each other;
/// consecutive segments of the same ring (which share a vertex) are skipped.
pub fn find_kinks(geom: &CanonicalGeometry) -> Vec<Kink> {
    let mut kinks = Vec::new();

    for (polygon_index, polygon) in geom.polygons().iter().enumerate() {
        let segments = polygon_segments(polygon);

        for (i, a) in segments.iter().enumerate() {
            for b in &segments[i + 1..] {
                if a.is_adjacent(b) || !a.envelopes_overlap(b) {
                    continue;
                }

                let location = match line_intersection(a.line, b.line) {
                    Some(LineIntersection::SinglePoint { intersection, .. }) => intersection,
                    Some(LineIntersection::Collinear { intersection }) => intersection.start,
                    None => continue,
                };
                kinks.push(Kink {
                    polygon: polygon_index,
                    location: [location.x, location.y],
                });
            }
        }
    }

    kinks
}

pub fn has_kinks(geom: &CanonicalGeometry) -> bool {
    !find_kinks(geom).is_empty()
}

struct Segment {
    ring: usize,
    index: usize,
    ring_len: usize,
    line: Line<f64>,
}

impl Segment {
    fn is_adjacent(&self, other: &Segment) -> bool {
        if self.ring != other.ring {
            return false;
        }
        let diff = self.index.abs_diff(other.index);
        // First and last segments of a closed ring share the closing vertex
        diff <= 1 || diff == self.ring_len - 1
    }

    fn envelopes_overlap(&self, other: &Segment) -> bool {
        let (a, b) = (self.line, other.line);
        a.start.x.min(a.end.x) <= b.start.x.max(b.end.x)
            && b.start.x.min(b.end.x) <= a.start.x.max(a.end.x)
            && a.start.y.min(a.end.y) <= b.start.y.max(b.end.y)
            && b.start.y.min(b.end.y) <= a.start.y.max(a.end.y)
    }
}

fn polygon_segments(polygon: &[Ring]) -> Vec<Segment> {
    let mut segments = Vec::new();
    for (ring_index, ring) in polygon.iter().enumerate() {
        let ring_len = ring.len().saturating_sub(1);
        for (index, pair) in ring.windows(2).enumerate() {
            let start = Coord { x: pair[0][0], y: pair[0][1] };
            let end = Coord { x: pair[1][0], y: pair[1][1] };
            if start == end {
                continue;
            }
            segments.push(Segment {
                ring: ring_index,
                index,
                ring_len,
                line: Line::new(start, end),
            });
        }
    }
    segments
}

/// Best-effort repair of a self-intersecting geometry.
///
/// The geometry is unioned with an empty set, which rebuilds valid rings from
/// the boundary (the boolean-ops equivalent of a zero-width buffer). Returns
/// `None` unless the result is non-empty and free of kinks.
pub fn repair(geom: &CanonicalGeometry) -> Option<CanonicalGeometry> {
    let rebuilt = to_geo_multipolygon(geom).union(&MultiPolygon::<f64>::new(vec![]));
    let mut repaired = from_geo_multipolygon(&rebuilt);
    repaired.coordinates.retain(|p| p.first().is_some_and(|ring| ring.len() >= 4));
    orient_polygons(&mut repaired.coordinates);

    if repaired.polygon_count() == 0 || repaired.is_empty() {
        tracing::debug!("Repair produced an empty geometry");
        return None;
    }
    if has_kinks(&repaired) {
        tracing::debug!("Repair left self-intersections in place");
        return None;
    }
    Some(repaired)
}

/// Area plausibility warning, if any
pub fn check_area(area_ha: f64, min_area_ha: f64, max_area_ha: f64) -> Option<FeatureIssue> {
    let details = serde_json::json!({
        "area_ha": area_ha,
        "min_area_ha": min_area_ha,
        "max_area_ha": max_area_ha,
    });

    if area_ha < min_area_ha {
        Some(
            FeatureIssue::new(
                IssueCode::AreaBelowMinimum,
                format!("Area {} ha is below the minimum of {} ha", area_ha, min_area_ha),
            )
            .with_details(details),
        )
    } else if area_ha > max_area_ha {
        Some(
            FeatureIssue::new(
                IssueCode::AreaAboveMaximum,
                format!("Area {} ha is above the maximum of {} ha", area_ha, max_area_ha),
            )
            .with_details(details),
        )
    } else {
        None
    }
}
