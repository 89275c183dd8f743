//! Integration tests for the zipped shapefile reader
//!
//! Archives are assembled in memory from shapefiles written to a temp dir.

mod common;

use common::{shapefile_members, shapefile_zip, square, zip_members, FixtureFeature, WGS84_PRJ};
use parcel_core::formats::shapefile::ShapefileZipReader;
use parcel_core::formats::{codes, FormatReader};
use parcel_core::models::RawGeometry;

#[test]
fn test_reads_polygons_and_attributes() {
    let bytes = shapefile_zip(
        &[
            FixtureFeature::polygon("Kouassi", square(-5.5, 6.8, 0.01)),
            FixtureFeature::polygon("Yao", square(-5.4, 6.8, 0.01)),
        ],
        Some(WGS84_PRJ),
    );

    let output = ShapefileZipReader::default().read(&bytes).unwrap();

    assert_eq!(output.features.len(), 2);
    assert!(output.errors.is_empty());
    assert!(output.warnings.is_empty());
    assert!(output.has_projection_file);
    assert_eq!(output.available_attribute_fields, vec!["NAME"]);

    assert_eq!(output.features[0].source_index, 0);
    assert_eq!(output.features[0].attributes.text("NAME"), Some("Kouassi".to_string()));
    assert_eq!(output.features[1].attributes.text("NAME"), Some("Yao".to_string()));
    match &output.features[0].geometry {
        RawGeometry::Polygon(rings) => {
            assert_eq!(rings.len(), 1);
            assert_eq!(rings[0].len(), 5);
        }
        other => panic!("expected a polygon, got {:?}", other),
    }
}

#[test]
fn test_missing_prj_warns_and_assumes_wgs84() {
    let bytes = shapefile_zip(&[FixtureFeature::polygon("A", square(-5.5, 6.8, 0.01))], None);

    let output = ShapefileZipReader::default().read(&bytes).unwrap();

    assert_eq!(output.features.len(), 1);
    assert!(!output.has_projection_file);
    let warning = output
        .warnings
        .iter()
        .find(|w| w.code == codes::MISSING_PROJECTION_FILE)
        .expect("missing projection warning");
    assert!(warning.message.contains("assuming WGS84"));
    assert!(warning.feature_index.is_none());
}

#[test]
fn test_projected_prj_is_advisory() {
    let utm = r#"PROJCS["WGS_1984_UTM_Zone_30N",GEOGCS["GCS_WGS_1984"],PROJECTION["Transverse_Mercator"]]"#;
    let bytes = shapefile_zip(&[FixtureFeature::polygon("A", square(-5.5, 6.8, 0.01))], Some(utm));

    let output = ShapefileZipReader::default().read(&bytes).unwrap();

    assert!(output.has_projection_file);
    assert!(output.has_warning(codes::PROJECTED_CRS_DECLARED));
    assert_eq!(output.features.len(), 1);
}

#[test]
fn test_missing_members_is_fatal() {
    let members: Vec<(String, Vec<u8>)> =
        shapefile_members(&[FixtureFeature::polygon("A", square(0.0, 0.0, 0.01))])
            .into_iter()
            .filter(|(ext, _)| *ext == "shp")
            .map(|(ext, bytes)| (format!("parcels.{}", ext), bytes))
            .collect();

    let err = ShapefileZipReader::default().read(&zip_members(&members)).unwrap_err();

    assert_eq!(err.code(), "MISSING_ARCHIVE_MEMBERS");
    assert!(err.is_file_fatal());
    let details = err.details();
    assert_eq!(details["missing"], serde_json::json!([".shx", ".dbf"]));
    assert_eq!(details["found"], serde_json::json!(["parcels.shp"]));
}

#[test]
fn test_archive_without_shapefile_is_fatal() {
    let bytes = zip_members(&[("readme.txt".to_string(), b"hello".to_vec())]);

    let err = ShapefileZipReader::default().read(&bytes).unwrap_err();
    assert_eq!(err.code(), "MISSING_ARCHIVE_MEMBERS");
    assert_eq!(err.details()["missing"], serde_json::json!([".shp", ".shx", ".dbf"]));
}

#[test]
fn test_attribute_count_mismatch_synthesizes_empty_records() {
    let three = shapefile_members(&[
        FixtureFeature::polygon("A", square(0.0, 0.0, 0.01)),
        FixtureFeature::polygon("B", square(0.1, 0.0, 0.01)),
        FixtureFeature::polygon("C", square(0.2, 0.0, 0.01)),
    ]);
    let one = shapefile_members(&[FixtureFeature::polygon("A", square(0.0, 0.0, 0.01))]);

    // Geometry from the three-feature file, attributes from the one-feature file
    let mut members: Vec<(String, Vec<u8>)> = three
        .into_iter()
        .filter(|(ext, _)| *ext != "dbf")
        .map(|(ext, bytes)| (format!("parcels.{}", ext), bytes))
        .collect();
    let dbf = one.into_iter().find(|(ext, _)| *ext == "dbf").unwrap().1;
    members.push(("parcels.dbf".to_string(), dbf));

    let output = ShapefileZipReader::default().read(&zip_members(&members)).unwrap();

    assert_eq!(output.features.len(), 3);
    let warning = output
        .warnings
        .iter()
        .find(|w| w.code == codes::ATTRIBUTE_COUNT_MISMATCH)
        .expect("count mismatch warning");
    assert_eq!(warning.details["shapes"], 3);
    assert_eq!(warning.details["records"], 1);

    assert_eq!(output.features[0].attributes.text("NAME"), Some("A".to_string()));
    assert!(output.features[1].attributes.is_empty());
    assert!(output.features[2].attributes.is_empty());
}

#[test]
fn test_multipart_and_holes() {
    let bytes = shapefile_zip(
        &[
            FixtureFeature::multipolygon(
                "two parts",
                vec![vec![square(0.0, 0.0, 0.01)], vec![square(0.1, 0.0, 0.01)]],
            ),
            FixtureFeature::multipolygon(
                "with hole",
                vec![vec![square(1.0, 1.0, 0.1), square(1.02, 1.02, 0.02)]],
            ),
        ],
        Some(WGS84_PRJ),
    );

    let output = ShapefileZipReader::default().read(&bytes).unwrap();
    assert_eq!(output.features.len(), 2);

    match &output.features[0].geometry {
        RawGeometry::MultiPolygon(polygons) => {
            assert_eq!(polygons.len(), 2);
            assert!(polygons.iter().all(|p| p.len() == 1));
        }
        other => panic!("expected a multipolygon, got {:?}", other),
    }
    match &output.features[1].geometry {
        RawGeometry::Polygon(rings) => assert_eq!(rings.len(), 2),
        other => panic!("expected a polygon with a hole, got {:?}", other),
    }
}

#[test]
fn test_companions_matched_case_insensitively_and_junk_ignored() {
    let mut members: Vec<(String, Vec<u8>)> =
        shapefile_members(&[FixtureFeature::polygon("A", square(0.0, 0.0, 0.01))])
            .into_iter()
            .map(|(ext, bytes)| (format!("Data/PARCELS.{}", ext.to_uppercase()), bytes))
            .collect();
    members.push(("__MACOSX/Data/._PARCELS.SHP".to_string(), vec![0u8; 8]));
    members.push(("Data/.DS_Store".to_string(), vec![0u8; 8]));

    let output = ShapefileZipReader::default().read(&zip_members(&members)).unwrap();

    assert_eq!(output.features.len(), 1);
    assert!(!output.has_warning(codes::MULTIPLE_SHAPEFILES));
}

#[test]
fn test_multiple_shapefiles_reads_first() {
    let mut members = Vec::new();
    for (stem, name) in [("b_second", "B"), ("a_first", "A")] {
        for (ext, bytes) in shapefile_members(&[FixtureFeature::polygon(name, square(0.0, 0.0, 0.01))]) {
            members.push((format!("{}.{}", stem, ext), bytes));
        }
    }

    let output = ShapefileZipReader::default().read(&zip_members(&members)).unwrap();

    assert!(output.has_warning(codes::MULTIPLE_SHAPEFILES));
    assert_eq!(output.features[0].attributes.text("NAME"), Some("A".to_string()));
}

#[test]
fn test_validate_reports_missing_prj() {
    let bytes = shapefile_zip(&[FixtureFeature::polygon("A", square(0.0, 0.0, 0.01))], None);
    let validation = ShapefileZipReader::default().validate(&bytes);

    assert!(validation.is_valid());
    assert!(validation.has_warnings());
}
