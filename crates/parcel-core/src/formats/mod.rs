//! Format abstraction layer for parcel boundary files
//!
//! Each supported upload format implements the `FormatReader` trait, which turns
//! raw bytes into [`RawFeature`]s plus file-level diagnostics. The
//! `FormatRegistry` detects the format from a file name and dispatches to the
//! appropriate reader.

use serde::{Deserialize, Serialize};

use crate::error::{ParcelError, Result};
use crate::models::{IssueCode, RawFeature, SourceFormat};

pub mod geojson;
pub mod kml;
pub mod shapefile;
pub mod validation;

/// File-level diagnostic codes
pub mod codes {
    pub const MISSING_PROJECTION_FILE: &str = "MISSING_PROJECTION_FILE";
    pub const PROJECTED_CRS_DECLARED: &str = "PROJECTED_CRS_DECLARED";
    pub const ATTRIBUTE_COUNT_MISMATCH: &str = "ATTRIBUTE_COUNT_MISMATCH";
    pub const MULTIPLE_SHAPEFILES: &str = "MULTIPLE_SHAPEFILES";
    pub const DECLARED_CRS_IGNORED: &str = "DECLARED_CRS_IGNORED";
    pub const NO_FEATURES: &str = "NO_FEATURES";
    pub const LIKELY_PROJECTED: &str = "LIKELY_PROJECTED";
}

/// Format reader trait that all format implementations must implement
pub trait FormatReader: Send + Sync {
    /// Decode raw file bytes.
    ///
    /// Returns `Err` only for file-level fatal problems; per-feature problems
    /// are reported in [`ParseOutput::errors`].
    fn read(&self, bytes: &[u8]) -> Result<ParseOutput>;

    /// Get supported file extensions (e.g., ["kml"])
    fn supported_extensions(&self) -> &[&str];

    /// Get human-readable format name (e.g., "Shapefile", "GeoJSON")
    fn format_name(&self) -> &str;

    fn source_format(&self) -> SourceFormat;

    /// Validate file structure without full read
    fn validate(&self, _bytes: &[u8]) -> FormatValidation {
        FormatValidation::default()
    }
}

/// Result of format validation
#[derive(Debug, Clone, Default)]
pub struct FormatValidation {
    /// Validation errors that prevent reading
    pub errors: Vec<String>,

    /// Warnings that don't prevent reading but indicate potential issues
    pub warnings: Vec<String>,
}

impl FormatValidation {
    /// Check if validation passed (no errors)
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Check if there are any warnings
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// A diagnostic produced while decoding a file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParseIssue {
    pub code: String,
    pub message: String,
    /// Source index of the affected feature; `None` for file-level issues
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feature_index: Option<usize>,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub details: serde_json::Value,
}

impl ParseIssue {
    pub fn file(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            feature_index: None,
            details: serde_json::Value::Null,
        }
    }

    pub fn feature(index: usize, code: IssueCode, message: impl Into<String>) -> Self {
        Self {
            code: code.as_str().to_string(),
            message: message.into(),
            feature_index: Some(index),
            details: serde_json::Value::Null,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }
}

/// Everything a format reader extracted from one file
#[derive(Debug, Clone, Default)]
pub struct ParseOutput {
    pub features: Vec<RawFeature>,
    pub errors: Vec<ParseIssue>,
    pub warnings: Vec<ParseIssue>,
    /// Sorted, unique attribute field names seen across all features
    pub available_attribute_fields: Vec<String>,
    pub has_projection_file: bool,
}

impl ParseOutput {
    pub fn has_warning(&self, code: &str) -> bool {
        self.warnings.iter().any(|w| w.code == code)
    }

    /// Collect attribute field names and flag an empty feature set
    pub(crate) fn finish(mut self) -> Self {
        let mut fields: Vec<String> = self
            .features
            .iter()
            .flat_map(|f| f.attributes.keys().cloned())
            .chain(self.available_attribute_fields.drain(..))
            .collect();
        fields.sort();
        fields.dedup();
        self.available_attribute_fields = fields;

        if self.features.is_empty() {
            self.warnings.push(ParseIssue::file(
                codes::NO_FEATURES,
                "The file contains no usable polygon features",
            ));
        }

        self
    }
}

/// Central registry for format readers
///
/// The registry maintains a collection of format readers and provides
/// format detection based on file extensions.
pub struct FormatRegistry {
    readers: Vec<Box<dyn FormatReader>>,
}

impl FormatRegistry {
    /// Create a new empty format registry
    pub fn new() -> Self {
        Self {
            readers: Vec::new(),
        }
    }

    /// Registry with the shapefile, KML and GeoJSON readers
    pub fn with_defaults() -> Self {
        Self::with_upload_limit(crate::config::DEFAULT_MAX_UPLOAD_MB)
    }

    /// Default readers, with archive extraction capped at `max_upload_mb`
    pub fn with_upload_limit(max_upload_mb: u64) -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(shapefile::ShapefileZipReader::new(max_upload_mb)));
        registry.register(Box::new(kml::KmlReader));
        registry.register(Box::new(geojson::GeoJsonReader));
        registry
    }

    /// Register a format reader
    pub fn register(&mut self, reader: Box<dyn FormatReader>) {
        self.readers.push(reader);
    }

    /// Detect format from a file name and return the appropriate reader
    pub fn detect_format(&self, filename: &str) -> Result<&dyn FormatReader> {
        let extension = std::path::Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .ok_or_else(|| ParcelError::UnsupportedFormat {
                extension: "none".to_string(),
                supported: self.supported_formats(),
            })?;

        self.readers
            .iter()
            .find(|r| r.supported_extensions().contains(&extension.as_str()))
            .map(|r| r.as_ref())
            .ok_or_else(|| ParcelError::UnsupportedFormat {
                extension,
                supported: self.supported_formats(),
            })
    }

    /// Reader for an already-known source format
    pub fn reader_for(&self, format: SourceFormat) -> Result<&dyn FormatReader> {
        self.readers
            .iter()
            .find(|r| r.source_format() == format)
            .map(|r| r.as_ref())
            .ok_or_else(|| ParcelError::UnsupportedFormat {
                extension: format.to_string(),
                supported: self.supported_formats(),
            })
    }

    /// Get list of all supported format extensions
    pub fn supported_formats(&self) -> Vec<String> {
        self.readers
            .iter()
            .flat_map(|r| r.supported_extensions())
            .map(|s| s.to_string())
            .collect()
    }

    /// Get all registered readers
    pub fn readers(&self) -> &[Box<dyn FormatReader>] {
        &self.readers
    }
}

impl Default for FormatRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
