//! Parcels, farmers and their closed vocabularies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{ParcelError, Result};
use crate::models::geometry::{CanonicalGeometry, LatLng};
use crate::models::import::ImportFileId;

/// Unique identifier for a stored parcel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ParcelId(pub u64);

impl fmt::Display for ParcelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a farmer (planteur)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FarmerId(pub u64);

impl fmt::Display for FarmerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Cooperative owning an import
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CooperativeId(pub Uuid);

/// Supplier a farmer delivers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SupplierId(pub Uuid);

/// Certification whitelist (closed set, case-sensitive)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Certification {
    RainforestAlliance,
    Utz,
    Fairtrade,
    Bio,
    Organic,
    Other,
}

impl Certification {
    pub const ALL: [Certification; 6] = [
        Certification::RainforestAlliance,
        Certification::Utz,
        Certification::Fairtrade,
        Certification::Bio,
        Certification::Organic,
        Certification::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Certification::RainforestAlliance => "rainforest_alliance",
            Certification::Utz => "utz",
            Certification::Fairtrade => "fairtrade",
            Certification::Bio => "bio",
            Certification::Organic => "organic",
            Certification::Other => "other",
        }
    }
}

impl fmt::Display for Certification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Certification {
    type Err = ParcelError;

    fn from_str(s: &str) -> Result<Self> {
        Certification::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| ParcelError::InvalidCertification { value: s.to_string() })
    }
}

/// Validate a certification list: every value whitelisted, none repeated.
///
/// Input order is preserved.
pub fn parse_certifications<S: AsRef<str>>(values: &[S]) -> Result<Vec<Certification>> {
    let mut seen = HashSet::new();
    values
        .iter()
        .map(|value| {
            let cert: Certification = value.as_ref().parse()?;
            if !seen.insert(cert) {
                return Err(ParcelError::DuplicateCertification {
                    value: value.as_ref().to_string(),
                });
            }
            Ok(cert)
        })
        .collect()
}

/// Check an already-typed list for repeats
pub fn ensure_unique_certifications(certifications: &[Certification]) -> Result<()> {
    let mut seen = HashSet::new();
    for cert in certifications {
        if !seen.insert(*cert) {
            return Err(ParcelError::DuplicateCertification { value: cert.to_string() });
        }
    }
    Ok(())
}

/// Conformity status (closed set)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConformityStatus {
    Compliant,
    NonCompliant,
    InProgress,
    #[default]
    MissingInformation,
}

impl ConformityStatus {
    pub const ALL: [ConformityStatus; 4] = [
        ConformityStatus::Compliant,
        ConformityStatus::NonCompliant,
        ConformityStatus::InProgress,
        ConformityStatus::MissingInformation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ConformityStatus::Compliant => "compliant",
            ConformityStatus::NonCompliant => "non_compliant",
            ConformityStatus::InProgress => "in_progress",
            ConformityStatus::MissingInformation => "missing_information",
        }
    }

    /// Tolerant matching of free-text attribute values
    pub fn detect(raw: &str) -> Option<Self> {
        let normalized: String = raw
            .trim()
            .to_lowercase()
            .chars()
            .map(|c| if c == ' ' || c == '-' { '_' } else { c })
            .collect();

        match normalized.as_str() {
            "yes" | "true" | "ok" | "conforme" => Some(ConformityStatus::Compliant),
            "no" | "false" | "non_conforme" => Some(ConformityStatus::NonCompliant),
            "noncompliant" => Some(ConformityStatus::NonCompliant),
            "pending" | "en_cours" => Some(ConformityStatus::InProgress),
            other => other.parse().ok(),
        }
    }
}

impl fmt::Display for ConformityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConformityStatus {
    type Err = ParcelError;

    fn from_str(s: &str) -> Result<Self> {
        ConformityStatus::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| ParcelError::InvalidConformity { value: s.to_string() })
    }
}

/// Risk flags raised from validation warnings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskFlag {
    SelfIntersection,
    SelfIntersectionRepaired,
    AreaBelowMinimum,
    AreaAboveMaximum,
    LikelyProjectedCoordinates,
}

/// How a parcel entered the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParcelSource {
    #[default]
    Import,
    Manual,
}

/// A stored land-boundary record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parcel {
    pub id: ParcelId,
    /// Owning farmer; `None` for orphan parcels
    pub planteur_id: Option<FarmerId>,
    pub label: Option<String>,
    pub code: Option<String>,
    pub village: Option<String>,
    pub geometry: CanonicalGeometry,
    pub area_ha: f64,
    pub centroid: LatLng,
    pub feature_hash: String,
    pub certifications: Vec<Certification>,
    pub conformity_status: ConformityStatus,
    pub risk_flags: Vec<RiskFlag>,
    pub source: ParcelSource,
    pub import_file_id: Option<ImportFileId>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Parcel {
    pub fn is_orphan(&self) -> bool {
        self.planteur_id.is_none()
    }
}

/// Parcel data before the store assigns an id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewParcel {
    pub planteur_id: Option<FarmerId>,
    pub label: Option<String>,
    pub code: Option<String>,
    pub village: Option<String>,
    pub geometry: CanonicalGeometry,
    pub area_ha: f64,
    pub centroid: LatLng,
    pub feature_hash: String,
    pub certifications: Vec<Certification>,
    pub conformity_status: ConformityStatus,
    pub risk_flags: Vec<RiskFlag>,
    pub source: ParcelSource,
    pub import_file_id: Option<ImportFileId>,
}

impl NewParcel {
    /// Materialize with a store-assigned id; new parcels are always active
    pub fn into_parcel(self, id: ParcelId, created_at: DateTime<Utc>) -> Parcel {
        Parcel {
            id,
            planteur_id: self.planteur_id,
            label: self.label,
            code: self.code,
            village: self.village,
            geometry: self.geometry,
            area_ha: self.area_ha,
            centroid: self.centroid,
            feature_hash: self.feature_hash,
            certifications: self.certifications,
            conformity_status: self.conformity_status,
            risk_flags: self.risk_flags,
            source: self.source,
            import_file_id: self.import_file_id,
            is_active: true,
            created_at,
        }
    }
}

/// A farmer record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Farmer {
    pub id: FarmerId,
    pub cooperative_id: CooperativeId,
    pub name: String,
    pub supplier_id: Option<SupplierId>,
    pub created_at: DateTime<Utc>,
}

/// Farmer data before the store assigns an id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewFarmer {
    pub cooperative_id: CooperativeId,
    pub name: String,
    pub supplier_id: Option<SupplierId>,
}
