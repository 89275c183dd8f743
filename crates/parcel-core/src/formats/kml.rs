//! KML (Keyhole Markup Language) format reader implementation
//!
//! Placemarks are collected recursively through documents and folders. Only
//! polygonal placemarks become features; everything else is reported per
//! placemark and skipped.

use kml::types::{Element, Geometry, LinearRing, Placemark};
use kml::Kml;

use crate::error::{ParcelError, Result};
use crate::formats::validation::FormatValidator;
use crate::formats::{FormatReader, FormatValidation, ParseIssue, ParseOutput};
use crate::models::{
    AttributeMap, IssueCode, RawFeature, RawGeometry, RawPosition, RawRing, SourceFormat,
};

const FORMAT_NAME: &str = "KML";

/// KML format reader
pub struct KmlReader;

impl FormatReader for KmlReader {
    fn read(&self, bytes: &[u8]) -> Result<ParseOutput> {
        let content = std::str::from_utf8(bytes).map_err(|e| ParcelError::CorruptFile {
            format: FORMAT_NAME.to_string(),
            reason: format!("File is not valid UTF-8: {}", e),
        })?;

        FormatValidator::validation_to_result(
            &FormatValidator::validate_xml_structure(bytes),
            FORMAT_NAME,
        )?;

        let kml: Kml = content.parse().map_err(|e| ParcelError::CorruptFile {
            format: FORMAT_NAME.to_string(),
            reason: format!("Failed to parse KML: {}", e),
        })?;

        // KML carries no projection metadata; out-of-range values read as projected
        let mut output = ParseOutput::default();
        let mut counter = 0;
        self.extract_features_recursive(&kml, &mut output, &mut counter, &[]);

        tracing::debug!(
            placemarks = counter,
            features = output.features.len(),
            "Decoded KML document"
        );

        Ok(output.finish())
    }

    fn supported_extensions(&self) -> &[&str] {
        &["kml"]
    }

    fn format_name(&self) -> &str {
        FORMAT_NAME
    }

    fn source_format(&self) -> SourceFormat {
        SourceFormat::Kml
    }

    fn validate(&self, bytes: &[u8]) -> FormatValidation {
        let utf8 = FormatValidator::validate_utf8(bytes);
        if !utf8.is_valid() {
            return utf8;
        }

        let mut validation = FormatValidator::validate_xml_structure(bytes);

        // If XML is valid, try to parse as KML
        if validation.is_valid() {
            if let Err(e) = String::from_utf8_lossy(bytes).parse::<Kml>() {
                validation.errors.push(format!("Invalid KML: {}", e));
            }
        }

        validation
    }
}

impl KmlReader {
    /// Recursively extract placemarks, tracking the folder hierarchy
    fn extract_features_recursive(
        &self,
        kml: &Kml,
        output: &mut ParseOutput,
        counter: &mut usize,
        folder_path: &[String],
    ) {
        match kml {
            Kml::KmlDocument(doc) => {
                for element in &doc.elements {
                    self.extract_features_recursive(element, output, counter, folder_path);
                }
            }
            Kml::Document { elements, .. } => {
                for element in elements {
                    self.extract_features_recursive(element, output, counter, folder_path);
                }
            }
            Kml::Folder { attrs, elements } => {
                let mut path = folder_path.to_vec();
                let name = attrs.get("name").cloned().or_else(|| {
                    elements.iter().find_map(|e| match e {
                        Kml::Element(el) if el.name == "name" => el.content.clone(),
                        _ => None,
                    })
                });
                if let Some(name) = name {
                    path.push(name.trim().to_string());
                }

                for element in elements {
                    self.extract_features_recursive(element, output, counter, &path);
                }
            }
            Kml::Placemark(placemark) => {
                let index = *counter;
                *counter += 1;

                let attributes = self.placemark_attributes(placemark, folder_path);
                match placemark.geometry.as_ref().map(convert_geometry) {
                    Some(Ok(geometry)) => {
                        output.features.push(RawFeature::new(geometry, attributes, index))
                    }
                    Some(Err((code, message))) => {
                        output.errors.push(ParseIssue::feature(index, code, message))
                    }
                    None => output.errors.push(ParseIssue::feature(
                        index,
                        IssueCode::EmptyGeometry,
                        "Placemark has no geometry",
                    )),
                }
            }
            _ => {
                // Styles, overlays and network links carry no parcels
            }
        }
    }

    /// Name, description, folder path and extended data of a placemark
    fn placemark_attributes(&self, placemark: &Placemark, folder_path: &[String]) -> AttributeMap {
        let mut attributes = AttributeMap::new();

        if let Some(name) = &placemark.name {
            attributes.insert("name", name.trim());
        }

        if let Some(desc) = &placemark.description {
            attributes.insert("description", desc.trim());
        }

        if !folder_path.is_empty() {
            attributes.insert("folder_path", folder_path.join("/"));
        }

        for child in &placemark.children {
            if child.name == "ExtendedData" {
                collect_extended_data(child, &mut attributes);
            }
        }

        attributes
    }
}

/// `<Data name="..."><value>` and `<SimpleData name="...">` entries
fn collect_extended_data(element: &Element, attributes: &mut AttributeMap) {
    for child in &element.children {
        match child.name.as_str() {
            "Data" => {
                if let Some(key) = child.attrs.get("name") {
                    let value = child
                        .children
                        .iter()
                        .find(|c| c.name == "value")
                        .and_then(|c| c.content.clone())
                        .unwrap_or_default();
                    attributes.insert(key.clone(), value.trim());
                }
            }
            "SimpleData" => {
                if let Some(key) = child.attrs.get("name") {
                    let value = child.content.clone().unwrap_or_default();
                    attributes.insert(key.clone(), value.trim());
                }
            }
            // SchemaData wraps SimpleData
            _ => collect_extended_data(child, attributes),
        }
    }
}

type FeatureFailure = (IssueCode, String);

fn convert_geometry(geometry: &Geometry) -> std::result::Result<RawGeometry, FeatureFailure> {
    match geometry {
        Geometry::Polygon(polygon) => {
            let mut rings = vec![convert_ring(&polygon.outer)];
            rings.extend(polygon.inner.iter().map(convert_ring));
            Ok(RawGeometry::Polygon(rings))
        }
        Geometry::MultiGeometry(multi) => {
            let mut polygons = Vec::with_capacity(multi.geometries.len());
            for part in &multi.geometries {
                match convert_geometry(part)? {
                    RawGeometry::Polygon(rings) => polygons.push(rings),
                    RawGeometry::MultiPolygon(parts) => polygons.extend(parts),
                }
            }
            if polygons.is_empty() {
                return Err((IssueCode::EmptyGeometry, "MultiGeometry is empty".to_string()));
            }
            Ok(RawGeometry::MultiPolygon(polygons))
        }
        other => Err((
            IssueCode::UnsupportedGeometry,
            format!(
                "{} geometry is not supported; only polygons can be imported",
                geometry_type_name(other)
            ),
        )),
    }
}

fn convert_ring(ring: &LinearRing) -> RawRing {
    ring.coords
        .iter()
        .map(|coord| RawPosition {
            x: coord.x,
            y: coord.y,
            z: coord.z,
        })
        .collect()
}

fn geometry_type_name(geometry: &Geometry) -> &'static str {
    match geometry {
        Geometry::Point(_) => "Point",
        Geometry::LineString(_) => "LineString",
        Geometry::LinearRing(_) => "LinearRing",
        Geometry::Polygon(_) => "Polygon",
        Geometry::MultiGeometry(_) => "MultiGeometry",
        _ => "Unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SQUARE: &str = "-5.0,7.0,0 -4.99,7.0,0 -4.99,7.01,0 -5.0,7.01,0 -5.0,7.0,0";

    fn wrap(body: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<kml xmlns="http://www.opengis.net/kml/2.2">
  <Document>
{}
  </Document>
</kml>"#,
            body
        )
    }

    fn polygon_placemark(name: &str) -> String {
        format!(
            r#"<Placemark>
  <name>{}</name>
  <Polygon><outerBoundaryIs><LinearRing><coordinates>{}</coordinates></LinearRing></outerBoundaryIs></Polygon>
</Placemark>"#,
            name, SQUARE
        )
    }

    #[test]
    fn test_kml_polygon_with_altitude() {
        let kml = wrap(&polygon_placemark("Parcelle A"));
        let output = KmlReader.read(kml.as_bytes()).unwrap();

        assert_eq!(output.features.len(), 1);
        assert!(output.errors.is_empty());
        assert!(!output.has_projection_file);

        let feature = &output.features[0];
        assert_eq!(feature.attributes.text("name"), Some("Parcelle A".to_string()));
        assert!(feature.geometry.has_z());
        match &feature.geometry {
            RawGeometry::Polygon(rings) => assert_eq!(rings[0].len(), 5),
            other => panic!("unexpected geometry {:?}", other),
        }
    }

    #[test]
    fn test_kml_point_is_per_feature_error() {
        let body = format!(
            r#"{}
<Placemark><name>Well</name><Point><coordinates>-5.0,7.0</coordinates></Point></Placemark>"#,
            polygon_placemark("Parcelle A")
        );
        let output = KmlReader.read(wrap(&body).as_bytes()).unwrap();

        assert_eq!(output.features.len(), 1);
        assert_eq!(output.errors.len(), 1);
        assert_eq!(output.errors[0].code, "UNSUPPORTED_GEOMETRY");
        assert_eq!(output.errors[0].feature_index, Some(1));
    }

    #[test]
    fn test_kml_extended_data() {
        let body = format!(
            r#"<Placemark>
  <name>P1</name>
  <ExtendedData>
    <Data name="planteur"><value>Kouame Yao</value></Data>
    <SchemaData schemaUrl="plots"><SimpleData name="village">Gagnoa</SimpleData></SchemaData>
  </ExtendedData>
  <Polygon><outerBoundaryIs><LinearRing><coordinates>{}</coordinates></LinearRing></outerBoundaryIs></Polygon>
</Placemark>"#,
            SQUARE
        );
        let output = KmlReader.read(wrap(&body).as_bytes()).unwrap();

        let attributes = &output.features[0].attributes;
        assert_eq!(attributes.text("planteur"), Some("Kouame Yao".to_string()));
        assert_eq!(attributes.text("village"), Some("Gagnoa".to_string()));
        assert!(output.available_attribute_fields.contains(&"planteur".to_string()));
    }

    #[test]
    fn test_kml_empty_document_warns() {
        let output = KmlReader.read(wrap("").as_bytes()).unwrap();
        assert!(output.features.is_empty());
        assert!(output.has_warning(crate::formats::codes::NO_FEATURES));
    }

    #[test]
    fn test_kml_invalid_is_corrupt() {
        let err = KmlReader.read(b"<kml><Document></kml>").unwrap_err();
        assert_eq!(err.code(), "CORRUPT_FILE");

        assert!(!KmlReader.validate(b"<kml><Document></kml>").is_valid());
    }
}
