//! Hash-stable canonical form and content hash.
//!
//! The hash form rounds every coordinate to 8 decimals, re-orients rings,
//! starts each ring at its smallest vertex and sorts holes and polygons, so
//! the same real-world boundary hashes identically whatever order or jitter
//! the source file encoded it with.

use sha2::{Digest, Sha256};
use std::cmp::Ordering;
use std::fmt::Write;

use crate::models::{CanonicalGeometry, Position, Ring};
use crate::normalize::orient_polygons;

/// Decimal places kept for hashing (~1.1 mm at the equator)
pub const HASH_PRECISION: u32 = 8;

const SCALE: f64 = 1e8;

/// Round to [`HASH_PRECISION`] decimals; negative zero becomes zero
pub fn round_coordinate(value: f64) -> f64 {
    let rounded = (value * SCALE).round() / SCALE;
    if rounded == 0.0 {
        0.0
    } else {
        rounded
    }
}

fn cmp_position(a: &Position, b: &Position) -> Ordering {
    a[0].total_cmp(&b[0]).then_with(|| a[1].total_cmp(&b[1]))
}

fn cmp_ring(a: &Ring, b: &Ring) -> Ordering {
    a.iter()
        .zip(b.iter())
        .map(|(p, q)| cmp_position(p, q))
        .find(|o| o.is_ne())
        .unwrap_or_else(|| a.len().cmp(&b.len()))
}

/// Rotate a closed ring so it starts at its lexicographically smallest vertex
fn rotate_to_min_vertex(ring: &mut Ring) {
    let closed = ring.len() > 1 && ring.first() == ring.last();
    if closed {
        ring.pop();
    }

    let start = ring
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| cmp_position(a, b))
        .map(|(i, _)| i)
        .unwrap_or(0);
    ring.rotate_left(start);

    if closed {
        if let Some(first) = ring.first().copied() {
            ring.push(first);
        }
    }
}

/// Canonical form used for hashing
pub fn canonicalize_for_hash(geom: &CanonicalGeometry) -> CanonicalGeometry {
    let mut polygons: Vec<Vec<Ring>> = geom
        .polygons()
        .iter()
        .map(|polygon| {
            polygon
                .iter()
                .map(|ring| {
                    ring.iter()
                        .map(|p| [round_coordinate(p[0]), round_coordinate(p[1])])
                        .collect()
                })
                .collect()
        })
        .collect();

    orient_polygons(&mut polygons);

    for polygon in polygons.iter_mut() {
        polygon.iter_mut().for_each(rotate_to_min_vertex);
        if polygon.len() > 2 {
            polygon[1..].sort_by(cmp_ring);
        }
    }
    polygons.sort_by(|a, b| match (a.first(), b.first()) {
        (Some(ra), Some(rb)) => cmp_ring(ra, rb).then_with(|| a.len().cmp(&b.len())),
        _ => a.len().cmp(&b.len()),
    });

    CanonicalGeometry::new(polygons)
}

/// Stable textual form: `MP(P(R(lng lat,...),...),...)` with 8 decimals
pub fn serialize(geom: &CanonicalGeometry) -> String {
    let mut out = String::from("MP(");
    for (pi, polygon) in geom.polygons().iter().enumerate() {
        if pi > 0 {
            out.push(',');
        }
        out.push_str("P(");
        for (ri, ring) in polygon.iter().enumerate() {
            if ri > 0 {
                out.push(',');
            }
            out.push_str("R(");
            for (i, p) in ring.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                let _ = write!(out, "{:.8} {:.8}", p[0], p[1]);
            }
            out.push(')');
        }
        out.push(')');
    }
    out.push(')');
    out
}

/// SHA-256 of the serialized hash form, as 64 lowercase hex characters
pub fn feature_hash(geom: &CanonicalGeometry) -> String {
    let canonical = canonicalize_for_hash(geom);
    let digest = Sha256::digest(serialize(&canonical).as_bytes());
    hex::encode(digest)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(x: f64, y: f64, size: f64) -> Ring {
        vec![
            [x, y],
            [x + size, y],
            [x + size, y + size],
            [x, y + size],
            [x, y],
        ]
    }

    #[test]
    fn test_hash_shape() {
        let hash = feature_hash(&CanonicalGeometry::new(vec![vec![square(0.0, 0.0, 1.0)]]));
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_rounding_and_negative_zero() {
        assert_eq!(round_coordinate(1.123456789), 1.12345679);
        assert_eq!(round_coordinate(-0.0).to_bits(), 0.0f64.to_bits());
        assert_eq!(round_coordinate(-0.000000001).to_bits(), 0.0f64.to_bits());
    }

    #[test]
    fn test_start_vertex_and_direction_do_not_matter() {
        let a = CanonicalGeometry::new(vec![vec![square(-5.0, 7.0, 0.01)]]);

        let mut rotated = square(-5.0, 7.0, 0.01);
        rotated.pop();
        rotated.rotate_left(2);
        rotated.push(rotated[0]);
        rotated.reverse();
        let b = CanonicalGeometry::new(vec![vec![rotated]]);

        assert_eq!(feature_hash(&a), feature_hash(&b));
    }

    #[test]
    fn test_polygon_and_hole_order_do_not_matter() {
        let outer = square(0.0, 0.0, 10.0);
        let hole_a: Ring = square(1.0, 1.0, 1.0).into_iter().rev().collect();
        let hole_b: Ring = square(5.0, 5.0, 1.0).into_iter().rev().collect();
        let other = square(20.0, 20.0, 1.0);

        let a = CanonicalGeometry::new(vec![
            vec![outer.clone(), hole_a.clone(), hole_b.clone()],
            vec![other.clone()],
        ]);
        let b = CanonicalGeometry::new(vec![vec![other], vec![outer, hole_b, hole_a]]);

        assert_eq!(feature_hash(&a), feature_hash(&b));
    }

    #[test]
    fn test_jitter_below_precision_is_ignored() {
        let a = CanonicalGeometry::new(vec![vec![square(-5.0, 7.0, 0.01)]]);
        let jittered: Ring = square(-5.0, 7.0, 0.01)
            .into_iter()
            .map(|p| [p[0] + 1e-11, p[1] - 1e-11])
            .collect();
        let b = CanonicalGeometry::new(vec![vec![jittered]]);

        assert_eq!(feature_hash(&a), feature_hash(&b));
    }

    #[test]
    fn test_distinct_shapes_differ() {
        let a = CanonicalGeometry::new(vec![vec![square(0.0, 0.0, 1.0)]]);
        let b = CanonicalGeometry::new(vec![vec![square(0.0, 0.0, 1.00000002)]]);
        assert_ne!(feature_hash(&a), feature_hash(&b));
    }

    #[test]
    fn test_serialize_form() {
        let geom = CanonicalGeometry::new(vec![vec![vec![[1.0, 2.0], [3.0, 4.0]]]]);
        assert_eq!(
            serialize(&geom),
            "MP(P(R(1.00000000 2.00000000,3.00000000 4.00000000)))"
        );
    }
}
