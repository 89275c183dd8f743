//! Features as they move through the import pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::attributes::AttributeMap;
use crate::models::geometry::{CanonicalGeometry, LatLng, RawGeometry};
use crate::models::parcel::{ParcelId, RiskFlag};

/// A decoded feature, before normalization
#[derive(Debug, Clone, PartialEq)]
pub struct RawFeature {
    pub geometry: RawGeometry,
    pub attributes: AttributeMap,
    /// Zero-based position of the feature in its source file
    pub source_index: usize,
}

impl RawFeature {
    pub fn new(geometry: RawGeometry, attributes: AttributeMap, source_index: usize) -> Self {
        Self {
            geometry,
            attributes,
            source_index,
        }
    }
}

/// Per-feature issue codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueCode {
    EmptyGeometry,
    UnsupportedGeometry,
    MalformedGeometry,
    OutOfBounds,
    LikelyProjected,
    SelfIntersection,
    SelfIntersectionRepaired,
    RingClosed,
    AreaBelowMinimum,
    AreaAboveMaximum,
}

impl IssueCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueCode::EmptyGeometry => "EMPTY_GEOMETRY",
            IssueCode::UnsupportedGeometry => "UNSUPPORTED_GEOMETRY",
            IssueCode::MalformedGeometry => "MALFORMED_GEOMETRY",
            IssueCode::OutOfBounds => "OUT_OF_BOUNDS",
            IssueCode::LikelyProjected => "LIKELY_PROJECTED",
            IssueCode::SelfIntersection => "SELF_INTERSECTION",
            IssueCode::SelfIntersectionRepaired => "SELF_INTERSECTION_REPAIRED",
            IssueCode::RingClosed => "RING_CLOSED",
            IssueCode::AreaBelowMinimum => "AREA_BELOW_MINIMUM",
            IssueCode::AreaAboveMaximum => "AREA_ABOVE_MAXIMUM",
        }
    }

    /// Risk flag recorded on the parcel when this issue is a warning
    pub fn risk_flag(&self) -> Option<RiskFlag> {
        match self {
            IssueCode::SelfIntersection => Some(RiskFlag::SelfIntersection),
            IssueCode::SelfIntersectionRepaired => Some(RiskFlag::SelfIntersectionRepaired),
            IssueCode::AreaBelowMinimum => Some(RiskFlag::AreaBelowMinimum),
            IssueCode::AreaAboveMaximum => Some(RiskFlag::AreaAboveMaximum),
            IssueCode::LikelyProjected => Some(RiskFlag::LikelyProjectedCoordinates),
            _ => None,
        }
    }
}

impl fmt::Display for IssueCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single validation finding on one feature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureIssue {
    pub code: IssueCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub details: serde_json::Value,
}

impl FeatureIssue {
    pub fn new(code: IssueCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: serde_json::Value::Null,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }
}

/// Validation outcome of one feature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureValidation {
    pub ok: bool,
    pub errors: Vec<FeatureIssue>,
    pub warnings: Vec<FeatureIssue>,
}

impl Default for FeatureValidation {
    fn default() -> Self {
        Self::valid()
    }
}

impl FeatureValidation {
    pub fn valid() -> Self {
        Self {
            ok: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn add_error(&mut self, issue: FeatureIssue) {
        self.ok = false;
        self.errors.push(issue);
    }

    pub fn add_warning(&mut self, issue: FeatureIssue) {
        self.warnings.push(issue);
    }

    pub fn has_warning(&self, code: IssueCode) -> bool {
        self.warnings.iter().any(|w| w.code == code)
    }

    pub fn has_error(&self, code: IssueCode) -> bool {
        self.errors.iter().any(|e| e.code == code)
    }

    /// Risk flags derived from warnings, sorted and unique
    pub fn risk_flags(&self) -> Vec<RiskFlag> {
        let mut flags: Vec<RiskFlag> =
            self.warnings.iter().filter_map(|w| w.code.risk_flag()).collect();
        flags.sort();
        flags.dedup();
        flags
    }
}

/// A normalized, hashed and measured feature awaiting apply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedFeature {
    pub temp_id: String,
    pub label: Option<String>,
    pub geometry: CanonicalGeometry,
    pub area_ha: f64,
    /// `None` only when the geometry failed the WGS84 bounds check
    pub centroid: Option<LatLng>,
    pub feature_hash: String,
    pub validation: FeatureValidation,
    pub is_duplicate: bool,
    pub existing_parcel_id: Option<ParcelId>,
    /// Temp id of an earlier feature of the same run with an equal hash
    pub duplicate_of: Option<String>,
    pub attributes: AttributeMap,
    pub source_index: usize,
}

impl ParsedFeature {
    /// Valid and not a duplicate
    pub fn is_accepted(&self) -> bool {
        self.validation.ok && !self.is_duplicate
    }

    pub fn temp_id_for(position: usize) -> String {
        format!("feature-{:04}", position + 1)
    }
}
