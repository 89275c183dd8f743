//! Shapefile ZIP fixtures built on the fly.
#![allow(dead_code)]

use shapefile::dbase::{FieldName, FieldValue, Record, TableWriterBuilder};
use shapefile::{Point, Polygon, PolygonRing, Writer};
use std::io::Write;

pub const WGS84_PRJ: &str = r#"GEOGCS["GCS_WGS_1984",DATUM["D_WGS_1984",SPHEROID["WGS_1984",6378137.0,298.257223563]],PRIMEM["Greenwich",0.0],UNIT["Degree",0.0174532925199433]]"#;

/// One shapefile record: a name attribute and polygon parts (outer ring first, then holes)
pub struct FixtureFeature {
    pub name: String,
    pub parts: Vec<Vec<Vec<[f64; 2]>>>,
}

impl FixtureFeature {
    pub fn polygon(name: &str, exterior: Vec<[f64; 2]>) -> Self {
        Self {
            name: name.to_string(),
            parts: vec![vec![exterior]],
        }
    }

    pub fn multipolygon(name: &str, parts: Vec<Vec<Vec<[f64; 2]>>>) -> Self {
        Self {
            name: name.to_string(),
            parts,
        }
    }
}

/// Closed square ring with its south-west corner at (lng, lat)
pub fn square(lng: f64, lat: f64, size: f64) -> Vec<[f64; 2]> {
    vec![
        [lng, lat],
        [lng, lat + size],
        [lng + size, lat + size],
        [lng + size, lat],
        [lng, lat],
    ]
}

fn points(ring: &[[f64; 2]]) -> Vec<Point> {
    ring.iter().map(|p| Point::new(p[0], p[1])).collect()
}

/// Write `.shp`, `.shx` and `.dbf` members and return them as (extension, bytes)
pub fn shapefile_members(features: &[FixtureFeature]) -> Vec<(&'static str, Vec<u8>)> {
    let dir = tempfile::tempdir().unwrap();
    let shp_path = dir.path().join("parcels.shp");

    {
        let table = TableWriterBuilder::new()
            .add_character_field(FieldName::try_from("NAME").unwrap(), 50);
        let mut writer = Writer::from_path(&shp_path, table).unwrap();

        for feature in features {
            let mut rings = Vec::new();
            for part in &feature.parts {
                for (i, ring) in part.iter().enumerate() {
                    if i == 0 {
                        rings.push(PolygonRing::Outer(points(ring)));
                    } else {
                        rings.push(PolygonRing::Inner(points(ring)));
                    }
                }
            }
            let polygon = Polygon::with_rings(rings);

            let mut record = Record::default();
            record.insert(
                "NAME".to_string(),
                FieldValue::Character(Some(feature.name.clone())),
            );
            writer.write_shape_and_record(&polygon, &record).unwrap();
        }
    }

    ["shp", "shx", "dbf"]
        .into_iter()
        .map(|ext| {
            let bytes = std::fs::read(dir.path().join(format!("parcels.{}", ext))).unwrap();
            (ext, bytes)
        })
        .collect()
}

/// Pack named members into an in-memory ZIP archive
pub fn zip_members(members: &[(String, Vec<u8>)]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);

    for (name, bytes) in members {
        writer.start_file(name.as_str(), options).unwrap();
        writer.write_all(bytes).unwrap();
    }

    writer.finish().unwrap().into_inner()
}

/// Shapefile ZIP with the standard members under `plots/`, plus an optional `.prj`
pub fn shapefile_zip(features: &[FixtureFeature], prj: Option<&str>) -> Vec<u8> {
    let mut members: Vec<(String, Vec<u8>)> = shapefile_members(features)
        .into_iter()
        .map(|(ext, bytes)| (format!("plots/parcels.{}", ext), bytes))
        .collect();

    if let Some(wkt) = prj {
        members.push(("plots/parcels.prj".to_string(), wkt.as_bytes().to_vec()));
    }

    zip_members(&members)
}
