//! GeoJSON format reader implementation
//!
//! Accepts a FeatureCollection, a single Feature or a bare Geometry. Each
//! feature's geometry is decoded on its own so one malformed geometry does not
//! abort the whole file.

use serde_json::Value as JsonValue;

use crate::error::{ParcelError, Result};
use crate::formats::validation::FormatValidator;
use crate::formats::{codes, FormatReader, FormatValidation, ParseIssue, ParseOutput};
use crate::models::{
    AttributeMap, AttributeValue, IssueCode, RawFeature, RawGeometry, RawPosition, RawRing,
    SourceFormat,
};

const FORMAT_NAME: &str = "GeoJSON";
const WGS84_EPSG: u32 = 4326;

/// GeoJSON format reader
pub struct GeoJsonReader;

impl FormatReader for GeoJsonReader {
    fn read(&self, bytes: &[u8]) -> Result<ParseOutput> {
        let root: JsonValue = serde_json::from_slice(bytes).map_err(|e| ParcelError::CorruptFile {
            format: FORMAT_NAME.to_string(),
            reason: format!("Failed to parse JSON: {}", e),
        })?;

        // only a legacy crs member counts as projection metadata
        let mut output = ParseOutput {
            has_projection_file: root.get("crs").is_some(),
            ..Default::default()
        };

        if let Some(epsg) = root.get("crs").and_then(extract_epsg_from_crs) {
            if epsg != WGS84_EPSG {
                tracing::warn!(epsg, "Ignoring legacy GeoJSON crs member");
                output.warnings.push(
                    ParseIssue::file(
                        codes::DECLARED_CRS_IGNORED,
                        format!(
                            "The file declares EPSG:{}; GeoJSON coordinates are read as WGS84",
                            epsg
                        ),
                    )
                    .with_details(serde_json::json!({ "declared_epsg": epsg })),
                );
            }
        }

        match root.get("type").and_then(JsonValue::as_str) {
            Some("FeatureCollection") => {
                let features = root
                    .get("features")
                    .and_then(JsonValue::as_array)
                    .ok_or_else(|| ParcelError::CorruptFile {
                        format: FORMAT_NAME.to_string(),
                        reason: "FeatureCollection has no 'features' array".to_string(),
                    })?;
                for (index, feature) in features.iter().enumerate() {
                    self.read_feature(feature, index, &mut output);
                }
            }
            Some("Feature") => self.read_feature(&root, 0, &mut output),
            Some(_) => self.push_geometry(Some(&root), AttributeMap::new(), 0, &mut output),
            None => {
                return Err(ParcelError::CorruptFile {
                    format: FORMAT_NAME.to_string(),
                    reason: "Missing 'type' member".to_string(),
                })
            }
        }

        Ok(output.finish())
    }

    fn supported_extensions(&self) -> &[&str] {
        &["geojson", "json"]
    }

    fn format_name(&self) -> &str {
        FORMAT_NAME
    }

    fn source_format(&self) -> SourceFormat {
        SourceFormat::GeoJson
    }

    fn validate(&self, bytes: &[u8]) -> FormatValidation {
        let mut validation = FormatValidator::validate_json_structure(bytes);

        if validation.is_valid() {
            if let Err(e) = String::from_utf8_lossy(bytes).parse::<geojson::GeoJson>() {
                validation.warnings.push(format!("Not strictly valid GeoJSON: {}", e));
            }
        }

        validation
    }
}

impl GeoJsonReader {
    fn read_feature(&self, feature: &JsonValue, index: usize, output: &mut ParseOutput) {
        let attributes: AttributeMap = feature
            .get("properties")
            .and_then(JsonValue::as_object)
            .map(|props| {
                props
                    .iter()
                    .map(|(k, v)| (k.clone(), AttributeValue::from_json(v)))
                    .collect()
            })
            .unwrap_or_default();

        self.push_geometry(feature.get("geometry"), attributes, index, output);
    }

    fn push_geometry(
        &self,
        geometry: Option<&JsonValue>,
        attributes: AttributeMap,
        index: usize,
        output: &mut ParseOutput,
    ) {
        match convert_geometry(geometry) {
            Ok(geometry) => output.features.push(RawFeature::new(geometry, attributes, index)),
            Err((code, message)) => output.errors.push(ParseIssue::feature(index, code, message)),
        }
    }
}

type FeatureFailure = (IssueCode, String);

fn convert_geometry(value: Option<&JsonValue>) -> std::result::Result<RawGeometry, FeatureFailure> {
    let value = match value {
        None | Some(JsonValue::Null) => {
            return Err((IssueCode::EmptyGeometry, "Feature has no geometry".to_string()))
        }
        Some(value) => value,
    };

    let geometry: geojson::Geometry = serde_json::from_value(value.clone())
        .map_err(|e| (IssueCode::MalformedGeometry, format!("Invalid geometry: {}", e)))?;

    match geometry.value {
        geojson::Value::Polygon(rings) => Ok(RawGeometry::Polygon(convert_rings(&rings)?)),
        geojson::Value::MultiPolygon(polygons) => Ok(RawGeometry::MultiPolygon(
            polygons
                .iter()
                .map(|rings| convert_rings(rings))
                .collect::<std::result::Result<_, _>>()?,
        )),
        other => Err((
            IssueCode::UnsupportedGeometry,
            format!(
                "{} geometry is not supported; only polygons can be imported",
                geometry_type_name(&other)
            ),
        )),
    }
}

fn geometry_type_name(value: &geojson::Value) -> &'static str {
    match value {
        geojson::Value::Point(_) => "Point",
        geojson::Value::MultiPoint(_) => "MultiPoint",
        geojson::Value::LineString(_) => "LineString",
        geojson::Value::MultiLineString(_) => "MultiLineString",
        geojson::Value::Polygon(_) => "Polygon",
        geojson::Value::MultiPolygon(_) => "MultiPolygon",
        geojson::Value::GeometryCollection(_) => "GeometryCollection",
    }
}

fn convert_rings(rings: &[Vec<Vec<f64>>]) -> std::result::Result<Vec<RawRing>, FeatureFailure> {
    rings
        .iter()
        .map(|ring| ring.iter().map(|p| convert_position(p)).collect())
        .collect()
}

fn convert_position(position: &[f64]) -> std::result::Result<RawPosition, FeatureFailure> {
    match position {
        [x, y] => Ok(RawPosition::new(*x, *y)),
        [x, y, z, ..] => Ok(RawPosition::with_z(*x, *y, *z)),
        _ => Err((
            IssueCode::MalformedGeometry,
            format!("Position has {} values; at least 2 are required", position.len()),
        )),
    }
}

/// Extract EPSG code from a legacy `crs` member
fn extract_epsg_from_crs(crs: &JsonValue) -> Option<u32> {
    let name = crs.get("properties")?.get("name")?.as_str()?;
    if name.ends_with("CRS84") {
        return Some(WGS84_EPSG);
    }
    // "EPSG:4326" or "urn:ogc:def:crs:EPSG::4326"
    name.rsplit(':').next()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(lng: f64, lat: f64) -> JsonValue {
        serde_json::json!([[
            [lng, lat],
            [lng + 0.01, lat],
            [lng + 0.01, lat + 0.01],
            [lng, lat + 0.01],
            [lng, lat]
        ]])
    }

    #[test]
    fn test_feature_collection() {
        let doc = serde_json::json!({
            "type": "FeatureCollection",
            "features": [
                {
                    "type": "Feature",
                    "properties": { "name": "A", "surface": 1.5 },
                    "geometry": { "type": "Polygon", "coordinates": square(-5.0, 7.0) }
                },
                {
                    "type": "Feature",
                    "properties": { "name": "B" },
                    "geometry": { "type": "MultiPolygon", "coordinates": [square(-5.1, 7.0), square(-5.2, 7.0)] }
                }
            ]
        });

        let output = GeoJsonReader.read(doc.to_string().as_bytes()).unwrap();
        assert_eq!(output.features.len(), 2);
        assert!(output.errors.is_empty());
        assert_eq!(output.available_attribute_fields, vec!["name", "surface"]);
        assert_eq!(output.features[0].attributes.text("surface"), Some("1.5".to_string()));
        assert!(matches!(&output.features[1].geometry, RawGeometry::MultiPolygon(p) if p.len() == 2));
    }

    #[test]
    fn test_non_polygon_and_null_geometries_are_per_feature() {
        let doc = serde_json::json!({
            "type": "FeatureCollection",
            "features": [
                { "type": "Feature", "properties": {}, "geometry": { "type": "Point", "coordinates": [1.0, 2.0] } },
                { "type": "Feature", "properties": {}, "geometry": null },
                { "type": "Feature", "properties": {}, "geometry": { "type": "Polygon", "coordinates": square(1.0, 2.0) } }
            ]
        });

        let output = GeoJsonReader.read(doc.to_string().as_bytes()).unwrap();
        assert_eq!(output.features.len(), 1);
        assert_eq!(output.features[0].source_index, 2);

        let codes: Vec<&str> = output.errors.iter().map(|e| e.code.as_str()).collect();
        assert_eq!(codes, vec!["UNSUPPORTED_GEOMETRY", "EMPTY_GEOMETRY"]);
        assert_eq!(output.errors[1].feature_index, Some(1));
    }

    #[test]
    fn test_short_position_is_malformed() {
        let doc = serde_json::json!({
            "type": "Feature",
            "properties": null,
            "geometry": { "type": "Polygon", "coordinates": [[[1.0, 2.0], [3.0], [1.0, 2.0]]] }
        });

        let output = GeoJsonReader.read(doc.to_string().as_bytes()).unwrap();
        assert!(output.features.is_empty());
        assert_eq!(output.errors[0].code, "MALFORMED_GEOMETRY");
        assert!(output.has_warning(codes::NO_FEATURES));
    }

    #[test]
    fn test_bare_geometry() {
        let doc = serde_json::json!({ "type": "Polygon", "coordinates": square(0.0, 0.0) });
        let output = GeoJsonReader.read(doc.to_string().as_bytes()).unwrap();
        assert_eq!(output.features.len(), 1);
        assert!(output.features[0].attributes.is_empty());
        assert!(!output.has_projection_file);
    }

    #[test]
    fn test_declared_crs_is_ignored_with_warning() {
        let doc = serde_json::json!({
            "type": "FeatureCollection",
            "crs": { "type": "name", "properties": { "name": "urn:ogc:def:crs:EPSG::32630" } },
            "features": []
        });

        let output = GeoJsonReader.read(doc.to_string().as_bytes()).unwrap();
        assert!(output.has_warning(codes::DECLARED_CRS_IGNORED));
        assert!(output.has_projection_file);

        let wgs84 = serde_json::json!({
            "type": "FeatureCollection",
            "crs": { "type": "name", "properties": { "name": "urn:ogc:def:crs:OGC:1.3:CRS84" } },
            "features": []
        });
        let output = GeoJsonReader.read(wgs84.to_string().as_bytes()).unwrap();
        assert!(!output.has_warning(codes::DECLARED_CRS_IGNORED));
    }

    #[test]
    fn test_invalid_json_is_corrupt() {
        let err = GeoJsonReader.read(b"{ not json").unwrap_err();
        assert_eq!(err.code(), "CORRUPT_FILE");
        assert!(!GeoJsonReader.validate(b"{ not json").is_valid());
    }

    #[test]
    fn test_extract_epsg_from_crs() {
        let crs = serde_json::json!({ "properties": { "name": "EPSG:3857" } });
        assert_eq!(extract_epsg_from_crs(&crs), Some(3857));
        assert_eq!(extract_epsg_from_crs(&serde_json::json!({})), None);
    }
}
