//! Error types for parcel import
//!
//! Every variant carries a stable machine-readable code (see [`ParcelError::code`])
//! and structured details so a calling layer can render precise guidance.

use serde::Serialize;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParcelError {
    // File-level fatal errors
    #[error("Archive is missing required members: {}", missing.join(", "))]
    MissingArchiveMembers {
        missing: Vec<String>,
        found: Vec<String>,
    },

    #[error("Unreadable {format} file: {reason}")]
    CorruptFile { format: String, reason: String },

    #[error("Unsupported file format '{extension}'. Supported: {}", supported.join(", "))]
    UnsupportedFormat {
        extension: String,
        supported: Vec<String>,
    },

    #[error("File size ({size_mb} MB) exceeds the maximum allowed size ({max_mb} MB)")]
    FileTooLarge { size_mb: u64, max_mb: u64 },

    #[error("Parsing was cancelled")]
    Cancelled,

    // Apply-time rejections
    #[error("Cannot {action} an import file in status '{from}'")]
    InvalidTransition { from: String, action: String },

    #[error("Field '{field}' is required for apply mode '{mode}'")]
    MissingField { field: String, mode: String },

    #[error("Unknown apply mode '{mode}'. Use assign, orphan or auto_create")]
    InvalidMode { mode: String },

    #[error("Farmer {id} not found")]
    FarmerNotFound { id: u64 },

    #[error("Nothing to apply: {duplicates} duplicate and {invalid} invalid features, none accepted")]
    NothingToApply {
        duplicates: usize,
        invalid: usize,
        missing_farmer: usize,
    },

    #[error("Coordinates look projected and no projection file was supplied; confirmation required")]
    ProjectionUnconfirmed {
        affected_features: Vec<usize>,
        sample: Vec<[f64; 2]>,
    },

    #[error("Invalid certification '{value}'")]
    InvalidCertification { value: String },

    #[error("Certification '{value}' is listed more than once")]
    DuplicateCertification { value: String },

    #[error("Invalid conformity status '{value}'")]
    InvalidConformity { value: String },

    #[error("Invalid bounding box '{input}': {reason}")]
    InvalidBBox { input: String, reason: String },

    #[error("{entity} {id} not found")]
    NotFound { entity: String, id: String },

    // Configuration errors
    #[error("Missing required configuration: {key}")]
    ConfigMissing { key: String },

    #[error("Invalid configuration value for {key}: {reason}")]
    ConfigInvalid { key: String, reason: String },

    // Storage collaborator errors
    #[error("Storage error: {0}")]
    Storage(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl ParcelError {
    /// Stable machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            ParcelError::MissingArchiveMembers { .. } => "MISSING_ARCHIVE_MEMBERS",
            ParcelError::CorruptFile { .. } => "CORRUPT_FILE",
            ParcelError::UnsupportedFormat { .. } => "UNSUPPORTED_FORMAT",
            ParcelError::FileTooLarge { .. } => "FILE_TOO_LARGE",
            ParcelError::Cancelled => "PARSE_CANCELLED",
            ParcelError::InvalidTransition { .. } => "INVALID_TRANSITION",
            ParcelError::MissingField { .. } => "MISSING_FIELD",
            ParcelError::InvalidMode { .. } => "INVALID_MODE",
            ParcelError::FarmerNotFound { .. } => "FARMER_NOT_FOUND",
            ParcelError::NothingToApply { .. } => "NOTHING_TO_APPLY",
            ParcelError::ProjectionUnconfirmed { .. } => "PROJECTION_UNCONFIRMED",
            ParcelError::InvalidCertification { .. } => "INVALID_CERTIFICATION",
            ParcelError::DuplicateCertification { .. } => "DUPLICATE_CERTIFICATION",
            ParcelError::InvalidConformity { .. } => "INVALID_CONFORMITY",
            ParcelError::InvalidBBox { .. } => "INVALID_BBOX",
            ParcelError::NotFound { .. } => "NOT_FOUND",
            ParcelError::ConfigMissing { .. } => "CONFIG_MISSING",
            ParcelError::ConfigInvalid { .. } => "CONFIG_INVALID",
            ParcelError::Storage(_) => "STORAGE",
            ParcelError::Io(_) => "IO",
            ParcelError::Serialization(_) => "SERIALIZATION",
        }
    }

    /// Structured details for the calling layer
    pub fn details(&self) -> serde_json::Value {
        match self {
            ParcelError::MissingArchiveMembers { missing, found } => {
                json!({ "missing": missing, "found": found })
            }
            ParcelError::CorruptFile { format, reason } => {
                json!({ "format": format, "reason": reason })
            }
            ParcelError::UnsupportedFormat { extension, supported } => {
                json!({ "extension": extension, "supported": supported })
            }
            ParcelError::FileTooLarge { size_mb, max_mb } => {
                json!({ "size_mb": size_mb, "max_mb": max_mb })
            }
            ParcelError::InvalidTransition { from, action } => {
                json!({ "status": from, "action": action })
            }
            ParcelError::MissingField { field, mode } => json!({ "field": field, "mode": mode }),
            ParcelError::InvalidMode { mode } => json!({ "mode": mode }),
            ParcelError::FarmerNotFound { id } => json!({ "planteur_id": id }),
            ParcelError::NothingToApply { duplicates, invalid, missing_farmer } => json!({
                "skipped_duplicates": duplicates,
                "skipped_invalid": invalid,
                "skipped_missing_farmer": missing_farmer,
            }),
            ParcelError::ProjectionUnconfirmed { affected_features, sample } => json!({
                "affected_features": affected_features,
                "affected_count": affected_features.len(),
                "sample_coordinates": sample,
            }),
            ParcelError::InvalidCertification { value }
            | ParcelError::DuplicateCertification { value }
            | ParcelError::InvalidConformity { value } => json!({ "value": value }),
            ParcelError::InvalidBBox { input, reason } => {
                json!({ "input": input, "reason": reason })
            }
            ParcelError::NotFound { entity, id } => json!({ "entity": entity, "id": id }),
            ParcelError::ConfigMissing { key } => json!({ "key": key }),
            ParcelError::ConfigInvalid { key, reason } => json!({ "key": key, "reason": reason }),
            ParcelError::Cancelled
            | ParcelError::Storage(_)
            | ParcelError::Io(_)
            | ParcelError::Serialization(_) => serde_json::Value::Null,
        }
    }

    /// Whether this error aborts a whole parse run (as opposed to an apply-time rejection)
    pub fn is_file_fatal(&self) -> bool {
        matches!(
            self,
            ParcelError::MissingArchiveMembers { .. }
                | ParcelError::CorruptFile { .. }
                | ParcelError::UnsupportedFormat { .. }
                | ParcelError::FileTooLarge { .. }
        )
    }

    pub fn report(&self) -> ErrorReport {
        ErrorReport::from(self)
    }
}

/// Serializable form of an error: code, message and details
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorReport {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "serde_json::Value::is_null")]
    pub details: serde_json::Value,
}

impl From<&ParcelError> for ErrorReport {
    fn from(err: &ParcelError) -> Self {
        Self {
            code: err.code().to_string(),
            message: err.to_string(),
            details: err.details(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ParcelError>;
