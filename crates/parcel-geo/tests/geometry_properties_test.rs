//! Property tests for normalization, hashing, metrics and the bbox filter
//!
//! Random polygons are star-shaped around a centre (evenly spaced angles,
//! random radii) so they are always simple.

use geo::{GeodesicArea, Intersects, LineString, Polygon};
use std::collections::HashSet;
use parcel_core::models::{BBox, RawGeometry, RawPosition, RawRing};
use parcel_geo::canonical::{feature_hash, serialize};
use parcel_geo::metrics::{area_ha, centroid};
use parcel_geo::models::{to_geo_multipolygon, CanonicalGeometry, Position, Ring};
use parcel_geo::normalize::{normalize, wrap_polygon};
use parcel_geo::spatial::filter_by_bbox;
use proptest::prelude::*;

fn star_ring(cx: f64, cy: f64, scale: f64, radii: &[f64]) -> Vec<Position> {
    let n = radii.len() as f64;
    radii
        .iter()
        .enumerate()
        .map(|(i, r)| {
            let angle = std::f64::consts::TAU * i as f64 / n;
            [cx + scale * r * angle.cos(), cy + scale * r * angle.sin()]
        })
        .collect()
}

fn closed(mut ring: Vec<Position>) -> Ring {
    if let Some(first) = ring.first().copied() {
        ring.push(first);
    }
    ring
}

fn raw_ring(ring: &[Position]) -> RawRing {
    ring.iter().map(|p| RawPosition::new(p[0], p[1])).collect()
}

fn star_polygon() -> impl Strategy<Value = Vec<Position>> {
    (
        -60.0f64..60.0,
        -60.0f64..60.0,
        prop::collection::vec(0.3f64..1.0, 3..12),
    )
        .prop_map(|(cx, cy, radii)| star_ring(cx, cy, 0.01, &radii))
}

/// Outer star with a smaller star hole around the same centre
fn holed_star() -> impl Strategy<Value = (Vec<Position>, Vec<Position>)> {
    (
        -60.0f64..60.0,
        -60.0f64..60.0,
        prop::collection::vec(0.6f64..1.0, 4..12),
        prop::collection::vec(0.1f64..0.25, 3..8),
    )
        .prop_map(|(cx, cy, outer, inner)| {
            (star_ring(cx, cy, 0.01, &outer), star_ring(cx, cy, 0.01, &inner))
        })
}

/// Two disjoint stars side by side
fn two_part_star() -> impl Strategy<Value = (Vec<Position>, Vec<Position>)> {
    (
        -60.0f64..60.0,
        -60.0f64..60.0,
        prop::collection::vec(0.3f64..1.0, 3..12),
        prop::collection::vec(0.3f64..1.0, 3..12),
    )
        .prop_map(|(cx, cy, a, b)| {
            (star_ring(cx, cy, 0.01, &a), star_ring(cx + 0.05, cy, 0.01, &b))
        })
}

fn reference_area_ha(ring: &[Position]) -> f64 {
    let exterior: LineString<f64> = closed(ring.to_vec())
        .into_iter()
        .map(|p| (p[0], p[1]))
        .collect::<Vec<_>>()
        .into();
    Polygon::new(exterior, vec![]).geodesic_area_unsigned() / 10_000.0
}

fn assert_centroid_inside(geom: &CanonicalGeometry) -> Result<(), TestCaseError> {
    let c = centroid(geom).expect("non-empty geometry has a centroid");
    let point = geo::Point::new(c.lng, c.lat);
    prop_assert!(to_geo_multipolygon(geom).intersects(&point));
    Ok(())
}

fn small_square() -> impl Strategy<Value = CanonicalGeometry> {
    (-20.0f64..20.0, -20.0f64..20.0, 0.01f64..2.0).prop_map(|(x, y, size)| {
        CanonicalGeometry::new(vec![vec![vec![
            [x, y],
            [x + size, y],
            [x + size, y + size],
            [x, y + size],
            [x, y],
        ]]])
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn prop_centroid_lies_inside(ring in star_polygon()) {
        let geom = normalize(&RawGeometry::Polygon(vec![raw_ring(&ring)]));
        assert_centroid_inside(&geom)?;
    }

    #[test]
    fn prop_centroid_avoids_hole((outer, hole) in holed_star()) {
        let geom = normalize(&RawGeometry::Polygon(vec![raw_ring(&outer), raw_ring(&hole)]));
        prop_assert_eq!(geom.polygons()[0].len(), 2);
        assert_centroid_inside(&geom)?;
    }

    #[test]
    fn prop_centroid_of_multipart_lies_inside((a, b) in two_part_star()) {
        let geom = normalize(&RawGeometry::MultiPolygon(vec![
            vec![raw_ring(&a)],
            vec![raw_ring(&b)],
        ]));
        prop_assert_eq!(geom.polygons().len(), 2);
        assert_centroid_inside(&geom)?;
    }

    #[test]
    fn prop_area_matches_geodesic_reference(ring in star_polygon(), reverse in any::<bool>()) {
        let mut input = ring.clone();
        if reverse {
            input.reverse();
        }
        let geom = normalize(&RawGeometry::Polygon(vec![raw_ring(&input)]));
        let reference = reference_area_ha(&ring);
        prop_assert!(
            (area_ha(&geom) - reference).abs() <= 1e-4,
            "area {} vs reference {}",
            area_ha(&geom),
            reference
        );
    }

    #[test]
    fn prop_distinct_canonical_forms_hash_apart(rings in prop::collection::vec(star_polygon(), 2..16)) {
        let geoms: Vec<CanonicalGeometry> = rings
            .into_iter()
            .map(|ring| CanonicalGeometry::new(vec![vec![closed(ring)]]))
            .collect();

        let forms: HashSet<String> = geoms.iter().map(serialize).collect();
        let hashes: HashSet<String> = geoms.iter().map(feature_hash).collect();
        prop_assert_eq!(forms.len(), hashes.len());
    }

    #[test]
    fn prop_area_positive_finite_rounded(ring in star_polygon()) {
        let geom = normalize(&RawGeometry::Polygon(vec![raw_ring(&ring)]));
        let area = area_ha(&geom);

        prop_assert!(area.is_finite());
        prop_assert!(area > 0.0);
        prop_assert!(((area * 10_000.0).round() / 10_000.0 - area).abs() < 1e-9);
    }

    #[test]
    fn prop_normalize_is_idempotent(ring in star_polygon(), reverse in any::<bool>()) {
        let mut ring = ring;
        if reverse {
            ring.reverse();
        }
        let once = normalize(&RawGeometry::Polygon(vec![raw_ring(&ring)]));
        let twice = normalize(&RawGeometry::from(&once));
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn prop_wrap_round_trip(ring in star_polygon()) {
        let rings = vec![raw_ring(&closed(ring))];
        let wrapped = wrap_polygon(rings.clone());
        prop_assert_eq!(wrapped.len(), 1);
        prop_assert_eq!(&wrapped[0], &rings);
    }

    #[test]
    fn prop_hash_ignores_start_vertex_and_direction(
        ring in star_polygon(),
        shift in 0usize..12,
        reverse in any::<bool>(),
    ) {
        let base = CanonicalGeometry::new(vec![vec![closed(ring.clone())]]);

        let mut rotated = ring.clone();
        let len = rotated.len();
        rotated.rotate_left(shift % len);
        if reverse {
            rotated.reverse();
        }
        let variant = CanonicalGeometry::new(vec![vec![closed(rotated)]]);

        prop_assert_eq!(feature_hash(&base), feature_hash(&variant));
    }

    #[test]
    fn prop_hash_ignores_part_order(a in star_polygon(), b in star_polygon()) {
        let first = CanonicalGeometry::new(vec![vec![closed(a.clone())], vec![closed(b.clone())]]);
        let second = CanonicalGeometry::new(vec![vec![closed(b)], vec![closed(a)]]);
        prop_assert_eq!(feature_hash(&first), feature_hash(&second));
    }

    #[test]
    fn prop_bbox_filter_is_order_independent(
        geoms in prop::collection::vec(small_square(), 1..20),
        (x, y, w, h) in (-25.0f64..25.0, -25.0f64..25.0, 0.001f64..15.0, 0.001f64..15.0),
    ) {
        let bbox = BBox::new(x, y, x + w, y + h).expect("valid box");

        let forward = filter_by_bbox(&geoms, &bbox);
        let reversed: Vec<CanonicalGeometry> = geoms.iter().rev().cloned().collect();
        let mut backward: Vec<usize> = filter_by_bbox(&reversed, &bbox)
            .into_iter()
            .map(|j| geoms.len() - 1 - j)
            .collect();
        backward.sort_unstable();

        prop_assert_eq!(forward, backward);
    }

    #[test]
    fn prop_world_box_matches_everything(geoms in prop::collection::vec(small_square(), 1..10)) {
        let all: Vec<usize> = (0..geoms.len()).collect();
        prop_assert_eq!(filter_by_bbox(&geoms, &BBox::world()), all);
    }
}
