//! The R-tree prefilter must never change what a bbox listing returns

use parcel_core::models::{BBox, CanonicalGeometry, ConformityStatus, LatLng, NewParcel, ParcelSource};
use parcel_geo::spatial::filter_by_bbox;
use parcel_store::{MemoryStore, ParcelFilter, ParcelStore};
use proptest::prelude::*;

fn square(x: f64, y: f64, size: f64) -> CanonicalGeometry {
    CanonicalGeometry::new(vec![vec![vec![
        [x, y],
        [x + size, y],
        [x + size, y + size],
        [x, y + size],
        [x, y],
    ]]])
}

fn parcel(geometry: CanonicalGeometry, n: usize) -> NewParcel {
    NewParcel {
        planteur_id: None,
        label: None,
        code: None,
        village: None,
        geometry,
        area_ha: 1.0,
        centroid: LatLng::new(0.0, 0.0),
        feature_hash: format!("hash-{}", n),
        certifications: vec![],
        conformity_status: ConformityStatus::default(),
        risk_flags: vec![],
        source: ParcelSource::Manual,
        import_file_id: None,
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_listing_matches_exact_filter(
        squares in prop::collection::vec((-10.0f64..10.0, -10.0f64..10.0, 0.01f64..3.0), 1..25),
        (x, y, w, h) in (-12.0f64..12.0, -12.0f64..12.0, 0.01f64..8.0, 0.01f64..8.0),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let geometries: Vec<CanonicalGeometry> =
            squares.iter().map(|(x, y, s)| square(*x, *y, *s)).collect();
        let bbox = BBox::new(x, y, x + w, y + h).unwrap();

        let listed = runtime.block_on(async {
            let store = MemoryStore::new();
            for (n, geometry) in geometries.iter().enumerate() {
                store.insert_parcel(parcel(geometry.clone(), n)).await.unwrap();
            }
            store
                .list_parcels(&ParcelFilter { bbox: Some(bbox), ..Default::default() })
                .await
                .unwrap()
        });

        // ids are assigned from 1 in insertion order
        let expected: Vec<u64> = filter_by_bbox(&geometries, &bbox)
            .into_iter()
            .map(|i| i as u64 + 1)
            .collect();
        let actual: Vec<u64> = listed.iter().map(|p| p.id.0).collect();
        prop_assert_eq!(actual, expected);
    }
}
