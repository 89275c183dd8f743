//! Bounding-box spatial filter and envelope index.

use geo::algorithm::intersects::Intersects;
use rstar::{RTree, RTreeObject, AABB};

use crate::models::{bbox_to_rect, to_geo_multipolygon, BBox, CanonicalGeometry, GeometryExt};

/// True geometric intersection between a geometry and a query box.
///
/// A geometry that only partially overlaps the box matches; an empty
/// geometry never does.
pub fn intersects(geometry: &CanonicalGeometry, bbox: &BBox) -> bool {
    if geometry.is_empty() {
        return false;
    }

    let Some(bounds) = geometry.bounds() else {
        return false;
    };
    let disjoint = bounds.max_lng < bbox.min_lng
        || bounds.min_lng > bbox.max_lng
        || bounds.max_lat < bbox.min_lat
        || bounds.min_lat > bbox.max_lat;
    if disjoint {
        return false;
    }

    to_geo_multipolygon(geometry).intersects(&bbox_to_rect(bbox).to_polygon())
}

/// Indices of the geometries intersecting `bbox`, in input order
pub fn filter_by_bbox(geometries: &[CanonicalGeometry], bbox: &BBox) -> Vec<usize> {
    geometries
        .iter()
        .enumerate()
        .filter_map(|(i, geom)| intersects(geom, bbox).then_some(i))
        .collect()
}

/// Geometry envelope entry in a [`SpatialIndex`]
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedEnvelope<K> {
    pub key: K,
    envelope: AABB<[f64; 2]>,
}

impl<K> IndexedEnvelope<K> {
    /// Returns `None` for empty geometries, which can never match a box
    pub fn new(key: K, geometry: &CanonicalGeometry) -> Option<Self> {
        let bounds = geometry.bounds()?;
        Some(Self {
            key,
            envelope: AABB::from_corners(
                [bounds.min_lng, bounds.min_lat],
                [bounds.max_lng, bounds.max_lat],
            ),
        })
    }
}

impl<K> RTreeObject for IndexedEnvelope<K> {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// R-tree over geometry envelopes, used to pre-filter bbox candidates
#[derive(Debug, Clone)]
pub struct SpatialIndex<K> {
    tree: RTree<IndexedEnvelope<K>>,
}

impl<K: PartialEq + Clone> SpatialIndex<K> {
    pub fn new() -> Self {
        Self { tree: RTree::new() }
    }

    pub fn from_geometries<'a>(geometries: impl IntoIterator<Item = (K, &'a CanonicalGeometry)>) -> Self {
        let entries: Vec<IndexedEnvelope<K>> = geometries
            .into_iter()
            .filter_map(|(key, geom)| IndexedEnvelope::new(key, geom))
            .collect();
        Self {
            tree: RTree::bulk_load(entries),
        }
    }

    pub fn insert(&mut self, key: K, geometry: &CanonicalGeometry) {
        if let Some(entry) = IndexedEnvelope::new(key, geometry) {
            self.tree.insert(entry);
        }
    }

    /// Remove the entry for `key`, if indexed
    pub fn remove(&mut self, key: &K) -> bool {
        let to_remove = self.tree.iter().find(|e| &e.key == key).cloned();
        match to_remove {
            Some(entry) => self.tree.remove(&entry).is_some(),
            None => false,
        }
    }

    /// Keys whose envelope intersects the box; exact testing is up to the caller
    pub fn candidates(&self, bbox: &BBox) -> Vec<K> {
        let query = AABB::from_corners([bbox.min_lng, bbox.min_lat], [bbox.max_lng, bbox.max_lat]);
        self.tree
            .locate_in_envelope_intersecting(&query)
            .map(|e| e.key.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }
}

impl<K: PartialEq + Clone> Default for SpatialIndex<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Ring;

    fn square(x: f64, y: f64, size: f64) -> CanonicalGeometry {
        let ring: Ring = vec![
            [x, y],
            [x + size, y],
            [x + size, y + size],
            [x, y + size],
            [x, y],
        ];
        CanonicalGeometry::new(vec![vec![ring]])
    }

    fn bbox(min_lng: f64, min_lat: f64, max_lng: f64, max_lat: f64) -> BBox {
        BBox::new(min_lng, min_lat, max_lng, max_lat).unwrap()
    }

    #[test]
    fn test_inside_outside_straddling() {
        let query = bbox(0.0, 0.0, 10.0, 10.0);
        assert!(intersects(&square(2.0, 2.0, 1.0), &query));
        assert!(!intersects(&square(20.0, 20.0, 1.0), &query));
        assert!(intersects(&square(9.5, 9.5, 1.0), &query));
    }

    #[test]
    fn test_box_inside_large_parcel() {
        assert!(intersects(&square(0.0, 0.0, 10.0), &bbox(4.0, 4.0, 5.0, 5.0)));
    }

    #[test]
    fn test_envelope_overlap_is_not_enough() {
        // L-shaped parcel whose envelope covers the box but whose area does not
        let l_shape = CanonicalGeometry::new(vec![vec![vec![
            [0.0, 0.0],
            [10.0, 0.0],
            [10.0, 1.0],
            [1.0, 1.0],
            [1.0, 10.0],
            [0.0, 10.0],
            [0.0, 0.0],
        ]]]);
        assert!(!intersects(&l_shape, &bbox(5.0, 5.0, 6.0, 6.0)));
    }

    #[test]
    fn test_tiny_box() {
        let parcel = square(0.0, 0.0, 1.0);
        assert!(intersects(&parcel, &bbox(0.5, 0.5, 0.5000001, 0.5000001)));
        assert!(!intersects(&parcel, &bbox(2.0, 2.0, 2.0000001, 2.0000001)));
    }

    #[test]
    fn test_world_box_and_empty_geometry() {
        assert!(intersects(&square(179.0, 89.0, 1.0), &BBox::world()));
        assert!(!intersects(&CanonicalGeometry::new(vec![]), &BBox::world()));
    }

    #[test]
    fn test_filter_by_bbox_keeps_input_order() {
        let geoms = vec![square(5.0, 5.0, 1.0), square(50.0, 50.0, 1.0), square(1.0, 1.0, 1.0)];
        assert_eq!(filter_by_bbox(&geoms, &bbox(0.0, 0.0, 10.0, 10.0)), vec![0, 2]);
    }

    #[test]
    fn test_spatial_index_candidates() {
        let a = square(0.0, 0.0, 1.0);
        let b = square(20.0, 20.0, 1.0);
        let mut index = SpatialIndex::from_geometries(vec![(1u64, &a), (2u64, &b)]);
        assert_eq!(index.len(), 2);

        assert_eq!(index.candidates(&bbox(0.5, 0.5, 5.0, 5.0)), vec![1]);
        assert!(index.remove(&1));
        assert!(index.candidates(&bbox(0.5, 0.5, 5.0, 5.0)).is_empty());
        assert!(!index.remove(&1));
    }
}
