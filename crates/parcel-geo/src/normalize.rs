//! Geometry normalizer.
//!
//! Turns a parser's [`RawGeometry`] into a [`CanonicalGeometry`]: wrapped as a
//! MultiPolygon, 2D only, rings closed, exterior counter-clockwise and holes
//! clockwise. [`normalize_feature`] additionally runs the per-feature checks
//! (finite values, WGS84 bounds, projected-coordinate heuristic,
//! self-intersection with best-effort repair) and records them in a
//! [`FeatureValidation`].

use parcel_core::models::{
    within_wgs84, FeatureIssue, FeatureValidation, IssueCode, RawGeometry, RawRing,
};

use crate::models::{signed_area, CanonicalGeometry, Position, Ring};
use crate::validation::{find_kinks, repair};

/// Minimum positions of a closed ring
pub const MIN_RING_POSITIONS: usize = 4;

/// Number of offending positions echoed back as a sample
const SAMPLE_SIZE: usize = 5;

/// Context a feature is normalized in
#[derive(Debug, Clone, Copy, Default)]
pub struct NormalizeOptions {
    /// Whether the source declared its coordinate system (a `.prj`, or a
    /// format that is WGS84 by definition)
    pub has_projection_file: bool,
}

/// Canonical geometry together with its validation outcome
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedFeature {
    pub geometry: CanonicalGeometry,
    pub validation: FeatureValidation,
}

impl NormalizedFeature {
    fn rejected(geometry: CanonicalGeometry, issue: FeatureIssue, mut validation: FeatureValidation) -> Self {
        validation.add_error(issue);
        Self {
            geometry,
            validation,
        }
    }
}

/// Wrap a bare polygon as a single-member MultiPolygon, rings untouched
pub fn wrap_polygon(rings: Vec<RawRing>) -> Vec<Vec<RawRing>> {
    vec![rings]
}

fn wrap(raw: &RawGeometry) -> Vec<Vec<RawRing>> {
    match raw {
        RawGeometry::Polygon(rings) => wrap_polygon(rings.clone()),
        RawGeometry::MultiPolygon(polygons) => polygons.clone(),
    }
}

/// Drop any Z component
pub fn strip_z(polygons: &[Vec<RawRing>]) -> Vec<Vec<Ring>> {
    polygons
        .iter()
        .map(|rings| {
            rings
                .iter()
                .map(|ring| ring.iter().map(|p| [p.x, p.y]).collect())
                .collect()
        })
        .collect()
}

/// Append the first position when the ring is open; returns whether it did
pub fn close_ring(ring: &mut Ring) -> bool {
    match (ring.first().copied(), ring.last()) {
        (Some(first), Some(last)) if first != *last => {
            ring.push(first);
            true
        }
        _ => false,
    }
}

/// Exterior rings counter-clockwise, holes clockwise.
///
/// Rings with zero signed area are left as they are, which keeps the
/// operation idempotent.
pub fn orient_polygons(polygons: &mut [Vec<Ring>]) {
    for polygon in polygons.iter_mut() {
        for (i, ring) in polygon.iter_mut().enumerate() {
            let area = signed_area(ring);
            let wrong = if i == 0 { area < 0.0 } else { area > 0.0 };
            if wrong {
                ring.reverse();
            }
        }
    }
}

/// Close rings and discard degenerate ones. Returns (closed, dropped) counts.
fn close_and_prune(polygons: &mut Vec<Vec<Ring>>) -> (usize, usize) {
    let mut closed = 0;
    let mut dropped = 0;

    for polygon in polygons.iter_mut() {
        for ring in polygon.iter_mut() {
            if close_ring(ring) {
                closed += 1;
            }
        }
        if polygon.first().is_some_and(|ring| ring.len() < MIN_RING_POSITIONS) {
            // Without an exterior, the holes go too
            dropped += polygon.len();
            polygon.clear();
            continue;
        }
        let before = polygon.len();
        polygon.retain(|ring| ring.len() >= MIN_RING_POSITIONS);
        dropped += before - polygon.len();
    }
    polygons.retain(|polygon| !polygon.is_empty());

    (closed, dropped)
}

/// Shape normalization without diagnostics: wrap, strip Z, close, orient
pub fn normalize(raw: &RawGeometry) -> CanonicalGeometry {
    let mut polygons = strip_z(&wrap(raw));
    close_and_prune(&mut polygons);
    orient_polygons(&mut polygons);
    CanonicalGeometry::new(polygons)
}

/// Normalize one feature's geometry and validate it
pub fn normalize_feature(raw: &RawGeometry, options: &NormalizeOptions) -> NormalizedFeature {
    let mut validation = FeatureValidation::valid();
    let mut polygons = strip_z(&wrap(raw));

    let (closed, dropped) = close_and_prune(&mut polygons);
    if closed > 0 {
        validation.add_warning(
            FeatureIssue::new(
                IssueCode::RingClosed,
                format!("{} unclosed ring(s) were closed", closed),
            )
            .with_details(serde_json::json!({ "rings": closed })),
        );
    }

    if polygons.is_empty() {
        return NormalizedFeature::rejected(
            CanonicalGeometry::new(polygons),
            FeatureIssue::new(IssueCode::EmptyGeometry, "Geometry has no ring with at least 4 positions")
                .with_details(serde_json::json!({ "dropped_rings": dropped })),
            validation,
        );
    }

    let non_finite = polygons
        .iter()
        .flatten()
        .flatten()
        .filter(|p| !p[0].is_finite() || !p[1].is_finite())
        .count();
    if non_finite > 0 {
        return NormalizedFeature::rejected(
            CanonicalGeometry::new(polygons),
            FeatureIssue::new(
                IssueCode::MalformedGeometry,
                format!("{} coordinate(s) are not finite numbers", non_finite),
            ),
            validation,
        );
    }

    orient_polygons(&mut polygons);
    let geometry = CanonicalGeometry::new(polygons);

    let out_of_bounds: Vec<Position> = geometry
        .positions()
        .filter(|p| !within_wgs84(p))
        .copied()
        .collect();
    if !out_of_bounds.is_empty() {
        let sample: Vec<Position> = out_of_bounds.iter().take(SAMPLE_SIZE).copied().collect();

        if !options.has_projection_file {
            validation.add_warning(
                FeatureIssue::new(
                    IssueCode::LikelyProjected,
                    "Coordinates exceed WGS84 bounds and no projection file was supplied; they look like projected (metre) values",
                )
                .with_details(serde_json::json!({ "sample": sample })),
            );
        }

        return NormalizedFeature::rejected(
            geometry,
            FeatureIssue::new(
                IssueCode::OutOfBounds,
                format!(
                    "{} coordinate(s) outside WGS84 bounds, e.g. [{}, {}]",
                    out_of_bounds.len(),
                    sample[0][0],
                    sample[0][1]
                ),
            )
            .with_details(serde_json::json!({
                "count": out_of_bounds.len(),
                "points": out_of_bounds,
            })),
            validation,
        );
    }

    let kinks = find_kinks(&geometry);
    if kinks.is_empty() {
        return NormalizedFeature {
            geometry,
            validation,
        };
    }

    let locations: Vec<Position> = kinks.iter().take(SAMPLE_SIZE).map(|k| k.location).collect();
    let details = serde_json::json!({ "kinks": kinks.len(), "locations": locations });

    match repair(&geometry) {
        Some(repaired) => {
            tracing::debug!(kinks = kinks.len(), "Repaired self-intersecting geometry");
            validation.add_warning(
                FeatureIssue::new(
                    IssueCode::SelfIntersectionRepaired,
                    format!("{} self-intersection(s) found; the geometry was repaired", kinks.len()),
                )
                .with_details(details),
            );
            NormalizedFeature {
                geometry: repaired,
                validation,
            }
        }
        None => {
            validation.add_warning(
                FeatureIssue::new(
                    IssueCode::SelfIntersection,
                    format!(
                        "{} self-intersection(s) found and could not be repaired",
                        kinks.len()
                    ),
                )
                .with_details(details),
            );
            NormalizedFeature {
                geometry,
                validation,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parcel_core::models::RawPosition;

    fn raw_ring(points: &[[f64; 2]]) -> RawRing {
        points.iter().map(|p| RawPosition::new(p[0], p[1])).collect()
    }

    const CW_SQUARE: [[f64; 2]; 5] = [[0.0, 0.0], [0.0, 1.0], [1.0, 1.0], [1.0, 0.0], [0.0, 0.0]];

    #[test]
    fn test_polygon_is_wrapped_and_oriented() {
        let geom = normalize(&RawGeometry::Polygon(vec![raw_ring(&CW_SQUARE)]));
        assert_eq!(geom.polygon_count(), 1);
        assert!(crate::models::is_ccw(&geom.coordinates[0][0]));
    }

    #[test]
    fn test_holes_are_clockwise() {
        let hole_ccw = [[0.2, 0.2], [0.4, 0.2], [0.4, 0.4], [0.2, 0.4], [0.2, 0.2]];
        let geom = normalize(&RawGeometry::Polygon(vec![raw_ring(&CW_SQUARE), raw_ring(&hole_ccw)]));
        assert!(signed_area(&geom.coordinates[0][1]) < 0.0);
    }

    #[test]
    fn test_z_is_stripped() {
        let ring: RawRing = CW_SQUARE.iter().map(|p| RawPosition::with_z(p[0], p[1], 250.0)).collect();
        let geom = normalize(&RawGeometry::Polygon(vec![ring]));
        assert_eq!(geom.coordinates[0][0].len(), 5);
    }

    #[test]
    fn test_open_ring_is_closed_with_warning() {
        let open = raw_ring(&CW_SQUARE[..4]);
        let normalized = normalize_feature(&RawGeometry::Polygon(vec![open]), &NormalizeOptions::default());

        assert!(normalized.validation.ok);
        assert!(normalized.validation.has_warning(IssueCode::RingClosed));
        let ring = &normalized.geometry.coordinates[0][0];
        assert_eq!(ring.first(), ring.last());
    }

    #[test]
    fn test_degenerate_ring_is_empty_geometry() {
        let line = raw_ring(&[[0.0, 0.0], [1.0, 1.0]]);
        let normalized = normalize_feature(&RawGeometry::Polygon(vec![line]), &NormalizeOptions::default());

        assert!(!normalized.validation.ok);
        assert!(normalized.validation.has_error(IssueCode::EmptyGeometry));
    }

    #[test]
    fn test_non_finite_is_malformed() {
        let mut points = CW_SQUARE;
        points[2] = [f64::NAN, 1.0];
        let normalized = normalize_feature(
            &RawGeometry::Polygon(vec![raw_ring(&points)]),
            &NormalizeOptions::default(),
        );
        assert!(normalized.validation.has_error(IssueCode::MalformedGeometry));
    }

    #[test]
    fn test_out_of_bounds_collects_every_point() {
        let utm = [
            [500000.0, 750000.0],
            [500100.0, 750000.0],
            [500100.0, 750100.0],
            [500000.0, 750100.0],
            [500000.0, 750000.0],
        ];
        let raw = RawGeometry::Polygon(vec![raw_ring(&utm)]);

        let without_prj = normalize_feature(&raw, &NormalizeOptions { has_projection_file: false });
        assert!(!without_prj.validation.ok);
        assert!(without_prj.validation.has_warning(IssueCode::LikelyProjected));
        let issue = &without_prj.validation.errors[0];
        assert_eq!(issue.code, IssueCode::OutOfBounds);
        assert_eq!(issue.details["count"], 5);

        let with_prj = normalize_feature(&raw, &NormalizeOptions { has_projection_file: true });
        assert!(with_prj.validation.has_error(IssueCode::OutOfBounds));
        assert!(!with_prj.validation.has_warning(IssueCode::LikelyProjected));
    }

    #[test]
    fn test_self_intersection_is_flagged_not_discarded() {
        let bowtie = [[0.0, 0.0], [1.0, 1.0], [1.0, 0.0], [0.0, 1.0], [0.0, 0.0]];
        let normalized = normalize_feature(
            &RawGeometry::Polygon(vec![raw_ring(&bowtie)]),
            &NormalizeOptions::default(),
        );

        assert!(normalized.validation.ok);
        assert!(
            normalized.validation.has_warning(IssueCode::SelfIntersectionRepaired)
                || normalized.validation.has_warning(IssueCode::SelfIntersection)
        );
        assert!(!normalized.geometry.is_empty());
    }
}
