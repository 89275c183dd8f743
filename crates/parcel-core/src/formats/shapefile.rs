//! Zipped shapefile reader
//!
//! A shapefile upload is a ZIP archive holding the geometry (`.shp`), index
//! (`.shx`) and attribute (`.dbf`) members, plus an optional projection
//! (`.prj`). Geometry and attributes are decoded independently so that a
//! truncated attribute table only costs the attributes, not the shapes.

use shapefile::dbase::FieldValue as DbaseFieldValue;
use shapefile::{PolygonRing, Shape, ShapeReader};
use std::io::{Cursor, Read};

use crate::config::DEFAULT_MAX_UPLOAD_MB;
use crate::error::{ParcelError, Result};
use crate::formats::validation::FormatValidator;
use crate::formats::{codes, FormatReader, FormatValidation, ParseIssue, ParseOutput};
use crate::models::{
    AttributeMap, AttributeValue, IssueCode, RawFeature, RawGeometry, RawPosition, RawRing,
    SourceFormat,
};

const FORMAT_NAME: &str = "Shapefile";
const SHP_FILE_CODE: i32 = 9994;
const BYTES_PER_MB: u64 = 1024 * 1024;

/// Shapefile-in-ZIP format reader
///
/// Every archive member is extracted up to `max_extracted_mb`; a member
/// inflating past that is rejected as `FILE_TOO_LARGE`.
#[derive(Debug, Clone, Copy)]
pub struct ShapefileZipReader {
    max_extracted_mb: u64,
}

impl ShapefileZipReader {
    pub fn new(max_extracted_mb: u64) -> Self {
        Self { max_extracted_mb }
    }
}

impl Default for ShapefileZipReader {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_UPLOAD_MB)
    }
}

impl FormatReader for ShapefileZipReader {
    fn read(&self, bytes: &[u8]) -> Result<ParseOutput> {
        let members = ArchiveMembers::open(bytes)?;
        let mut output = ParseOutput::default();

        if members.shp_candidates.len() > 1 {
            tracing::warn!(
                candidates = members.shp_candidates.len(),
                chosen = %members.shp_candidates[0],
                "Archive holds several shapefiles, reading the first"
            );
            output.warnings.push(
                ParseIssue::file(
                    codes::MULTIPLE_SHAPEFILES,
                    format!(
                        "Archive contains {} shapefiles; only '{}' was read",
                        members.shp_candidates.len(),
                        members.shp_candidates[0]
                    ),
                )
                .with_details(serde_json::json!({ "shapefiles": members.shp_candidates })),
            );
        }

        let shx = members.read_member(bytes, self.max_extracted_mb, &members.shx)?;
        check_file_code(&shx, ".shx")?;
        let shp = members.read_member(bytes, self.max_extracted_mb, &members.shp)?;
        check_file_code(&shp, ".shp")?;
        let dbf = members.read_member(bytes, self.max_extracted_mb, &members.dbf)?;

        match &members.prj {
            Some(prj_name) => {
                output.has_projection_file = true;
                let prj = members.read_member(bytes, self.max_extracted_mb, prj_name)?;
                let wkt = String::from_utf8_lossy(&prj);
                if is_projected_wkt(&wkt) {
                    output.warnings.push(
                        ParseIssue::file(
                            codes::PROJECTED_CRS_DECLARED,
                            "The .prj file declares a projected coordinate system; coordinates are read as WGS84 degrees",
                        )
                        .with_details(serde_json::json!({ "wkt": wkt.trim() })),
                    );
                }
            }
            None => {
                output.warnings.push(ParseIssue::file(
                    codes::MISSING_PROJECTION_FILE,
                    "No .prj file found in the archive; assuming WGS84 (EPSG:4326)",
                ));
            }
        }

        let shapes = read_shapes(shp)?;
        let (fields, records) = read_records(dbf)?;
        output.available_attribute_fields = fields;

        if shapes.len() != records.len() {
            tracing::warn!(
                shapes = shapes.len(),
                records = records.len(),
                "Shape and attribute record counts differ"
            );
            output.warnings.push(
                ParseIssue::file(
                    codes::ATTRIBUTE_COUNT_MISMATCH,
                    format!(
                        "{} shapes but {} attribute records; missing records are treated as empty",
                        shapes.len(),
                        records.len()
                    ),
                )
                .with_details(serde_json::json!({
                    "shapes": shapes.len(),
                    "records": records.len(),
                })),
            );
        }

        let mut records = records.into_iter();
        for (index, shape) in shapes.into_iter().enumerate() {
            let attributes = records.next().unwrap_or_default();
            match convert_shape(shape) {
                Ok(geometry) => output.features.push(RawFeature::new(geometry, attributes, index)),
                Err((code, message)) => output.errors.push(ParseIssue::feature(index, code, message)),
            }
        }

        tracing::debug!(
            features = output.features.len(),
            errors = output.errors.len(),
            shp = %members.shp,
            "Decoded shapefile archive"
        );

        Ok(output.finish())
    }

    fn supported_extensions(&self) -> &[&str] {
        &["zip"]
    }

    fn format_name(&self) -> &str {
        FORMAT_NAME
    }

    fn source_format(&self) -> SourceFormat {
        SourceFormat::Shapefile
    }

    fn validate(&self, bytes: &[u8]) -> FormatValidation {
        let mut validation = FormatValidator::validate_zip_structure(bytes);
        if !validation.is_valid() {
            return validation;
        }

        match ArchiveMembers::open(bytes) {
            Ok(members) if members.prj.is_none() => validation
                .warnings
                .push("Optional .prj file not found (WGS84 will be assumed)".to_string()),
            Ok(_) => {}
            Err(e) => validation.errors.push(e.to_string()),
        }

        validation
    }
}

/// Names of the members that make up the chosen shapefile
#[derive(Debug)]
struct ArchiveMembers {
    shp: String,
    shx: String,
    dbf: String,
    prj: Option<String>,
    shp_candidates: Vec<String>,
}

impl ArchiveMembers {
    fn open(bytes: &[u8]) -> Result<Self> {
        let archive = open_archive(bytes)?;
        let names: Vec<String> = archive
            .file_names()
            .filter(|name| is_visible_member(name))
            .map(str::to_string)
            .collect();

        let mut shp_candidates: Vec<String> =
            names.iter().filter(|n| has_extension(n, "shp")).cloned().collect();
        shp_candidates.sort();

        let missing_all = || ParcelError::MissingArchiveMembers {
            missing: vec![".shp".to_string(), ".shx".to_string(), ".dbf".to_string()],
            found: sorted(&names),
        };
        let shp = shp_candidates.first().cloned().ok_or_else(missing_all)?;
        let stem = member_stem(&shp);

        let companion = |ext: &str| {
            names
                .iter()
                .find(|n| has_extension(n, ext) && member_stem(n) == stem)
                .cloned()
        };

        let shx = companion("shx");
        let dbf = companion("dbf");
        let prj = companion("prj");

        let missing: Vec<String> = [("shx", &shx), ("dbf", &dbf)]
            .iter()
            .filter(|(_, found)| found.is_none())
            .map(|(ext, _)| format!(".{}", ext))
            .collect();

        match (shx, dbf) {
            (Some(shx), Some(dbf)) => Ok(Self {
                shp,
                shx,
                dbf,
                prj,
                shp_candidates,
            }),
            _ => Err(ParcelError::MissingArchiveMembers {
                missing,
                found: sorted(&names),
            }),
        }
    }

    /// Extract one member, never inflating more than `max_mb`
    fn read_member(&self, bytes: &[u8], max_mb: u64, name: &str) -> Result<Vec<u8>> {
        let mut archive = open_archive(bytes)?;
        let entry = archive.by_name(name).map_err(|e| corrupt(format!("{}: {}", name, e)))?;

        let limit = max_mb.saturating_mul(BYTES_PER_MB);
        let mut buf = Vec::new();
        entry
            .take(limit.saturating_add(1))
            .read_to_end(&mut buf)
            .map_err(|e| corrupt(format!("Failed to extract {}: {}", name, e)))?;

        if buf.len() as u64 > limit {
            tracing::warn!(member = name, max_mb, "Archive member inflates past the size limit");
            return Err(ParcelError::FileTooLarge {
                size_mb: (buf.len() as u64).div_ceil(BYTES_PER_MB),
                max_mb,
            });
        }
        Ok(buf)
    }
}

fn open_archive(bytes: &[u8]) -> Result<zip::ZipArchive<Cursor<&[u8]>>> {
    zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| corrupt(format!("Not a readable ZIP archive: {}", e)))
}

fn corrupt(reason: impl Into<String>) -> ParcelError {
    ParcelError::CorruptFile {
        format: FORMAT_NAME.to_string(),
        reason: reason.into(),
    }
}

fn sorted(names: &[String]) -> Vec<String> {
    let mut names = names.to_vec();
    names.sort();
    names
}

/// Skip directories, macOS resource forks and hidden files
fn is_visible_member(name: &str) -> bool {
    if name.ends_with('/') || name.starts_with("__MACOSX/") || name.contains("/__MACOSX/") {
        return false;
    }
    let base = name.rsplit('/').next().unwrap_or(name);
    !base.is_empty() && !base.starts_with('.')
}

fn has_extension(name: &str, ext: &str) -> bool {
    std::path::Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case(ext))
        .unwrap_or(false)
}

/// Lowercased path without extension, used to pair companion members
fn member_stem(name: &str) -> String {
    match name.rfind('.') {
        Some(dot) => name[..dot].to_lowercase(),
        None => name.to_lowercase(),
    }
}

/// Both `.shp` and `.shx` start with the big-endian file code 9994
fn check_file_code(bytes: &[u8], member: &str) -> Result<()> {
    if bytes.len() < 100 {
        return Err(corrupt(format!("{} is truncated ({} bytes)", member, bytes.len())));
    }
    let code = i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    if code != SHP_FILE_CODE {
        return Err(corrupt(format!("{} has an invalid file code ({})", member, code)));
    }
    Ok(())
}

/// Whether a `.prj` WKT string declares a projected CRS
fn is_projected_wkt(wkt: &str) -> bool {
    let upper = wkt.trim_start().to_uppercase();
    upper.starts_with("PROJCS") || upper.starts_with("PROJCRS")
}

fn read_shapes(shp: Vec<u8>) -> Result<Vec<Shape>> {
    let mut reader = ShapeReader::new(Cursor::new(shp))
        .map_err(|e| corrupt(format!("Failed to open .shp: {}", e)))?;

    reader
        .iter_shapes()
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| corrupt(format!("Failed to read shape: {}", e)))
}

/// Read attribute records, stopping at the first unreadable row
fn read_records(dbf: Vec<u8>) -> Result<(Vec<String>, Vec<AttributeMap>)> {
    let mut reader = shapefile::dbase::Reader::new(Cursor::new(dbf))
        .map_err(|e| corrupt(format!("Failed to open .dbf: {}", e)))?;

    let fields: Vec<String> = reader
        .fields()
        .iter()
        .map(|f| f.name().to_string())
        .filter(|name| name != "DeletionFlag")
        .collect();

    let mut records = Vec::new();
    for (row, result) in reader.iter_records().enumerate() {
        match result {
            Ok(record) => records.push(
                record
                    .into_iter()
                    .map(|(name, value)| (name, convert_dbase_value(value)))
                    .collect(),
            ),
            Err(e) => {
                tracing::warn!(row, error = %e, "Attribute table is unreadable past this row");
                break;
            }
        }
    }

    Ok((fields, records))
}

/// Convert dBase field value to an attribute value
fn convert_dbase_value(value: DbaseFieldValue) -> AttributeValue {
    match value {
        DbaseFieldValue::Character(Some(s)) => AttributeValue::Text(s),
        DbaseFieldValue::Numeric(Some(n)) => AttributeValue::Number(n),
        DbaseFieldValue::Logical(Some(b)) => AttributeValue::Bool(b),
        DbaseFieldValue::Date(Some(date)) => AttributeValue::Text(format!(
            "{:04}-{:02}-{:02}",
            date.year(),
            date.month(),
            date.day()
        )),
        DbaseFieldValue::Float(Some(f)) => AttributeValue::Number(f as f64),
        DbaseFieldValue::Integer(i) => AttributeValue::Number(i as f64),
        DbaseFieldValue::Currency(c) => AttributeValue::Number(c),
        DbaseFieldValue::DateTime(dt) => AttributeValue::Text(format!(
            "{:04}-{:02}-{:02}",
            dt.date().year(),
            dt.date().month(),
            dt.date().day()
        )),
        DbaseFieldValue::Double(d) => AttributeValue::Number(d),
        DbaseFieldValue::Memo(s) => AttributeValue::Text(s),
        DbaseFieldValue::Character(None)
        | DbaseFieldValue::Numeric(None)
        | DbaseFieldValue::Logical(None)
        | DbaseFieldValue::Date(None)
        | DbaseFieldValue::Float(None) => AttributeValue::Null,
    }
}

type FeatureFailure = (IssueCode, String);

/// Convert a decoded shape into a raw polygonal geometry
fn convert_shape(shape: Shape) -> std::result::Result<RawGeometry, FeatureFailure> {
    let polygons = match shape {
        Shape::Polygon(polygon) => group_rings(polygon.rings(), |p| RawPosition::new(p.x, p.y)),
        Shape::PolygonM(polygon) => group_rings(polygon.rings(), |p| RawPosition::new(p.x, p.y)),
        Shape::PolygonZ(polygon) => {
            group_rings(polygon.rings(), |p| RawPosition::with_z(p.x, p.y, p.z))
        }
        Shape::NullShape => {
            return Err((IssueCode::EmptyGeometry, "Shape has no geometry".to_string()))
        }
        other => {
            return Err((
                IssueCode::UnsupportedGeometry,
                format!(
                    "{} geometry is not supported; only polygons can be imported",
                    shape_type_name(&other)
                ),
            ))
        }
    };

    match polygons.len() {
        0 => Err((IssueCode::EmptyGeometry, "Polygon has no rings".to_string())),
        1 => Ok(RawGeometry::Polygon(polygons.into_iter().flatten().collect())),
        _ => Ok(RawGeometry::MultiPolygon(polygons)),
    }
}

/// Each outer ring opens a new polygon; inner rings attach to the latest one
fn group_rings<P>(
    rings: &[PolygonRing<P>],
    to_raw: impl Fn(&P) -> RawPosition,
) -> Vec<Vec<RawRing>> {
    let mut polygons: Vec<Vec<RawRing>> = Vec::new();

    for ring in rings {
        let positions: RawRing = ring.points().iter().map(&to_raw).collect();
        let is_inner = matches!(ring, PolygonRing::Inner(_));
        match polygons.last_mut() {
            Some(current) if is_inner => current.push(positions),
            _ => polygons.push(vec![positions]),
        }
    }

    polygons
}

fn shape_type_name(shape: &Shape) -> &'static str {
    match shape {
        Shape::NullShape => "Null",
        Shape::Point(_) | Shape::PointM(_) | Shape::PointZ(_) => "Point",
        Shape::Polyline(_) | Shape::PolylineM(_) | Shape::PolylineZ(_) => "Polyline",
        Shape::Polygon(_) | Shape::PolygonM(_) | Shape::PolygonZ(_) => "Polygon",
        Shape::Multipoint(_) | Shape::MultipointM(_) | Shape::MultipointZ(_) => "Multipoint",
        Shape::Multipatch(_) => "Multipatch",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supported_extensions() {
        let reader = ShapefileZipReader::default();
        assert_eq!(reader.supported_extensions(), &["zip"]);
        assert_eq!(reader.format_name(), "Shapefile");
    }

    #[test]
    fn test_member_filtering() {
        assert!(is_visible_member("plots/parcelles.shp"));
        assert!(!is_visible_member("__MACOSX/plots/._parcelles.shp"));
        assert!(!is_visible_member("plots/.hidden.shp"));
        assert!(!is_visible_member("plots/"));
    }

    #[test]
    fn test_member_stem_is_case_insensitive() {
        assert_eq!(member_stem("Data/Plots.SHP"), member_stem("data/plots.dbf"));
        assert!(has_extension("a/b/PLOTS.Shx", "shx"));
        assert!(!has_extension("plots", "shx"));
    }

    #[test]
    fn test_projected_wkt_detection() {
        assert!(is_projected_wkt(
            r#"PROJCS["WGS_1984_UTM_Zone_30N",GEOGCS["GCS_WGS_1984"]]"#
        ));
        assert!(!is_projected_wkt(r#"GEOGCS["GCS_WGS_1984",DATUM["D_WGS_1984"]]"#));
    }

    #[test]
    fn test_garbage_is_corrupt() {
        let err = ShapefileZipReader::default().read(b"definitely not a zip").unwrap_err();
        assert_eq!(err.code(), "CORRUPT_FILE");
        assert!(err.is_file_fatal());
    }

    #[test]
    fn test_member_inflating_past_limit_is_too_large() {
        use std::io::Write;

        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated);
        for (name, size) in [("plots.shx", 3 * BYTES_PER_MB as usize), ("plots.shp", 100), ("plots.dbf", 100)] {
            writer.start_file(name, options).unwrap();
            writer.write_all(&vec![0u8; size]).unwrap();
        }
        let bytes = writer.finish().unwrap().into_inner();
        assert!(bytes.len() < BYTES_PER_MB as usize);

        let err = ShapefileZipReader::new(1).read(&bytes).unwrap_err();
        assert_eq!(err.code(), "FILE_TOO_LARGE");
        assert_eq!(err.details()["max_mb"], 1);
        assert!(err.is_file_fatal());
    }

    #[test]
    fn test_check_file_code() {
        let mut header = vec![0u8; 100];
        header[..4].copy_from_slice(&9994i32.to_be_bytes());
        assert!(check_file_code(&header, ".shp").is_ok());

        header[3] = 0;
        assert!(check_file_code(&header, ".shp").is_err());
        assert!(check_file_code(&[0u8; 10], ".shx").is_err());
    }
}
