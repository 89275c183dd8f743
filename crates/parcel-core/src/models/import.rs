//! Import file lifecycle and apply requests.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{ParcelError, Result};
use crate::models::parcel::{
    ensure_unique_certifications, parse_certifications, Certification, ConformityStatus,
    CooperativeId, FarmerId, ParcelId, SupplierId,
};

/// Unique identifier for an uploaded import file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImportFileId(pub Uuid);

impl ImportFileId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ImportFileId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ImportFileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Supported source formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    Shapefile,
    Kml,
    GeoJson,
}

impl SourceFormat {
    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            SourceFormat::Shapefile => &["zip"],
            SourceFormat::Kml => &["kml"],
            SourceFormat::GeoJson => &["geojson", "json"],
        }
    }

    /// Detect the format from a file name's extension (case-insensitive)
    pub fn from_filename(filename: &str) -> Result<Self> {
        let extension = std::path::Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();

        [SourceFormat::Shapefile, SourceFormat::Kml, SourceFormat::GeoJson]
            .into_iter()
            .find(|format| format.extensions().contains(&extension.as_str()))
            .ok_or_else(|| ParcelError::UnsupportedFormat {
                extension,
                supported: vec![
                    "zip".to_string(),
                    "kml".to_string(),
                    "geojson".to_string(),
                    "json".to_string(),
                ],
            })
    }
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceFormat::Shapefile => f.write_str("shapefile"),
            SourceFormat::Kml => f.write_str("kml"),
            SourceFormat::GeoJson => f.write_str("geojson"),
        }
    }
}

/// Lifecycle status of an import file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportStatus {
    Uploaded,
    Parsed,
    Failed,
    Applied,
}

/// Events driving the import lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportAction {
    ParseSucceeded,
    ParseFailed,
    Apply,
}

impl ImportAction {
    fn verb(&self) -> &'static str {
        match self {
            ImportAction::ParseSucceeded | ImportAction::ParseFailed => "parse",
            ImportAction::Apply => "apply",
        }
    }
}

impl ImportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportStatus::Uploaded => "uploaded",
            ImportStatus::Parsed => "parsed",
            ImportStatus::Failed => "failed",
            ImportStatus::Applied => "applied",
        }
    }

    /// The single guarded transition table of the lifecycle
    pub fn transition(self, action: ImportAction) -> Result<ImportStatus> {
        use ImportAction::*;
        use ImportStatus::*;

        match (self, action) {
            (Uploaded, ParseSucceeded) | (Parsed, ParseSucceeded) => Ok(Parsed),
            (Uploaded, ParseFailed) => Ok(Failed),
            (Parsed, Apply) => Ok(Applied),
            (from, action) => Err(ParcelError::InvalidTransition {
                from: from.as_str().to_string(),
                action: action.verb().to_string(),
            }),
        }
    }

    pub fn can_parse(&self) -> bool {
        self.transition(ImportAction::ParseSucceeded).is_ok()
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ImportStatus::Failed | ImportStatus::Applied)
    }
}

impl fmt::Display for ImportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An uploaded geometry file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportFile {
    pub id: ImportFileId,
    pub cooperative_id: CooperativeId,
    pub filename: String,
    pub format: SourceFormat,
    pub status: ImportStatus,
    pub has_projection_file: bool,
    pub uploaded_at: DateTime<Utc>,
    pub parsed_at: Option<DateTime<Utc>>,
    pub applied_at: Option<DateTime<Utc>>,
    pub feature_count: usize,
}

impl ImportFile {
    pub fn new(cooperative_id: CooperativeId, filename: impl Into<String>, format: SourceFormat) -> Self {
        Self {
            id: ImportFileId::new(),
            cooperative_id,
            filename: filename.into(),
            format,
            status: ImportStatus::Uploaded,
            has_projection_file: false,
            uploaded_at: Utc::now(),
            parsed_at: None,
            applied_at: None,
            feature_count: 0,
        }
    }
}

/// Attribute fields used to populate parcel columns on apply
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldMapping {
    pub label_field: Option<String>,
    pub code_field: Option<String>,
    pub village_field: Option<String>,
    pub conformity_field: Option<String>,
}

/// Values applied to every created parcel
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImportDefaults {
    pub conformity_status: ConformityStatus,
    pub certifications: Vec<Certification>,
    pub auto_detect_conformity: bool,
}

impl ImportDefaults {
    pub fn new(
        conformity_status: ConformityStatus,
        certifications: Vec<Certification>,
        auto_detect_conformity: bool,
    ) -> Result<Self> {
        ensure_unique_certifications(&certifications)?;
        Ok(Self {
            conformity_status,
            certifications,
            auto_detect_conformity,
        })
    }
}

/// How accepted features become owned parcels
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ApplyMode {
    Assign {
        planteur_id: FarmerId,
    },
    Orphan,
    AutoCreate {
        farmer_name_field: String,
        default_supplier_id: Option<SupplierId>,
    },
}

impl ApplyMode {
    pub fn name(&self) -> &'static str {
        match self {
            ApplyMode::Assign { .. } => "assign",
            ApplyMode::Orphan => "orphan",
            ApplyMode::AutoCreate { .. } => "auto_create",
        }
    }
}

/// A validated apply request
#[derive(Debug, Clone, PartialEq)]
pub struct ApplyRequest {
    pub mode: ApplyMode,
    pub field_mapping: FieldMapping,
    pub defaults: ImportDefaults,
    pub confirm_projected_coordinates: bool,
}

impl ApplyRequest {
    pub fn new(mode: ApplyMode) -> Self {
        Self {
            mode,
            field_mapping: FieldMapping::default(),
            defaults: ImportDefaults::default(),
            confirm_projected_coordinates: false,
        }
    }

    pub fn with_field_mapping(mut self, field_mapping: FieldMapping) -> Self {
        self.field_mapping = field_mapping;
        self
    }

    pub fn with_defaults(mut self, defaults: ImportDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn confirm_projected(mut self) -> Self {
        self.confirm_projected_coordinates = true;
        self
    }
}

/// Wire form of the defaults block, with unchecked string values
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportDefaultsBody {
    pub conformity_status: Option<String>,
    pub certifications: Vec<String>,
    pub auto_detect_conformity: bool,
}

/// Wire form of an apply request, as received from a calling layer
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplyRequestBody {
    pub mode: String,
    pub planteur_id: Option<u64>,
    pub farmer_name_field: Option<String>,
    pub default_supplier_id: Option<Uuid>,
    pub field_mapping: FieldMapping,
    pub defaults: ImportDefaultsBody,
    pub confirm_projected_coordinates: bool,
}

impl TryFrom<ApplyRequestBody> for ApplyRequest {
    type Error = ParcelError;

    fn try_from(body: ApplyRequestBody) -> Result<Self> {
        let missing = |field: &str| ParcelError::MissingField {
            field: field.to_string(),
            mode: body.mode.clone(),
        };

        let mode = match body.mode.as_str() {
            "assign" => ApplyMode::Assign {
                planteur_id: FarmerId(body.planteur_id.ok_or_else(|| missing("planteur_id"))?),
            },
            "orphan" => ApplyMode::Orphan,
            "auto_create" => {
                let field = body
                    .farmer_name_field
                    .as_deref()
                    .map(str::trim)
                    .filter(|f| !f.is_empty())
                    .ok_or_else(|| missing("farmer_name_field"))?;
                ApplyMode::AutoCreate {
                    farmer_name_field: field.to_string(),
                    default_supplier_id: body.default_supplier_id.map(SupplierId),
                }
            }
            other => return Err(ParcelError::InvalidMode { mode: other.to_string() }),
        };

        let conformity_status = match body.defaults.conformity_status.as_deref() {
            Some(value) => ConformityStatus::from_str(value)?,
            None => ConformityStatus::default(),
        };
        let certifications = parse_certifications(&body.defaults.certifications)?;

        Ok(ApplyRequest {
            mode,
            field_mapping: body.field_mapping,
            defaults: ImportDefaults::new(
                conformity_status,
                certifications,
                body.defaults.auto_detect_conformity,
            )?,
            confirm_projected_coordinates: body.confirm_projected_coordinates,
        })
    }
}

/// Outcome of a successful apply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplyResult {
    pub import_file_id: ImportFileId,
    pub mode: String,
    pub created_parcels: usize,
    pub created_parcel_ids: Vec<ParcelId>,
    pub created_farmers: Vec<FarmerId>,
    pub skipped_duplicates: usize,
    pub skipped_invalid: usize,
    pub skipped_missing_farmer: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_table() {
        use ImportAction::*;
        use ImportStatus::*;

        assert_eq!(Uploaded.transition(ParseSucceeded).unwrap(), Parsed);
        assert_eq!(Uploaded.transition(ParseFailed).unwrap(), Failed);
        assert_eq!(Parsed.transition(ParseSucceeded).unwrap(), Parsed);
        assert_eq!(Parsed.transition(Apply).unwrap(), Applied);

        for (from, action) in [
            (Uploaded, Apply),
            (Applied, Apply),
            (Failed, Apply),
            (Applied, ParseSucceeded),
            (Failed, ParseSucceeded),
            (Parsed, ParseFailed),
        ] {
            let err = from.transition(action).unwrap_err();
            assert_eq!(err.code(), "INVALID_TRANSITION", "{:?} + {:?}", from, action);
        }
    }

    #[test]
    fn test_source_format_detection() {
        assert_eq!(SourceFormat::from_filename("plots.ZIP").unwrap(), SourceFormat::Shapefile);
        assert_eq!(SourceFormat::from_filename("a/b/c.kml").unwrap(), SourceFormat::Kml);
        assert_eq!(SourceFormat::from_filename("x.json").unwrap(), SourceFormat::GeoJson);

        let err = SourceFormat::from_filename("plots.gpx").unwrap_err();
        assert_eq!(err.code(), "UNSUPPORTED_FORMAT");
    }

    #[test]
    fn test_apply_body_assign_requires_farmer() {
        let body = ApplyRequestBody {
            mode: "assign".to_string(),
            ..Default::default()
        };
        let err = ApplyRequest::try_from(body).unwrap_err();
        assert_eq!(err.code(), "MISSING_FIELD");
        assert_eq!(err.details()["field"], "planteur_id");
    }

    #[test]
    fn test_apply_body_auto_create_requires_field() {
        let body = ApplyRequestBody {
            mode: "auto_create".to_string(),
            farmer_name_field: Some("  ".to_string()),
            ..Default::default()
        };
        assert_eq!(ApplyRequest::try_from(body).unwrap_err().code(), "MISSING_FIELD");
    }

    #[test]
    fn test_apply_body_rejects_unknown_mode() {
        let body = ApplyRequestBody {
            mode: "merge".to_string(),
            ..Default::default()
        };
        assert_eq!(ApplyRequest::try_from(body).unwrap_err().code(), "INVALID_MODE");
    }

    #[test]
    fn test_apply_body_from_json() {
        let body: ApplyRequestBody = serde_json::from_value(serde_json::json!({
            "mode": "assign",
            "planteur_id": 7,
            "field_mapping": { "label_field": "NAME" },
            "defaults": { "certifications": ["utz", "bio"], "conformity_status": "in_progress" }
        }))
        .unwrap();

        let request = ApplyRequest::try_from(body).unwrap();
        assert_eq!(request.mode, ApplyMode::Assign { planteur_id: FarmerId(7) });
        assert_eq!(request.field_mapping.label_field.as_deref(), Some("NAME"));
        assert_eq!(request.defaults.conformity_status, ConformityStatus::InProgress);
        assert_eq!(request.defaults.certifications, vec![Certification::Utz, Certification::Bio]);
        assert!(!request.confirm_projected_coordinates);
    }

    #[test]
    fn test_apply_body_rejects_bad_defaults() {
        let mut body = ApplyRequestBody {
            mode: "orphan".to_string(),
            ..Default::default()
        };
        body.defaults.certifications = vec!["utz".to_string(), "utz".to_string()];
        assert_eq!(
            ApplyRequest::try_from(body.clone()).unwrap_err().code(),
            "DUPLICATE_CERTIFICATION"
        );

        body.defaults.certifications = vec!["UTZ".to_string()];
        assert_eq!(
            ApplyRequest::try_from(body.clone()).unwrap_err().code(),
            "INVALID_CERTIFICATION"
        );

        body.defaults.certifications.clear();
        body.defaults.conformity_status = Some("unknown".to_string());
        assert_eq!(ApplyRequest::try_from(body).unwrap_err().code(), "INVALID_CONFORMITY");
    }
}
