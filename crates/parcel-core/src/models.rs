pub mod attributes;
pub mod feature;
pub mod geometry;
pub mod import;
pub mod parcel;

pub use attributes::{AttributeMap, AttributeValue};
pub use feature::{FeatureIssue, FeatureValidation, IssueCode, ParsedFeature, RawFeature};
pub use geometry::{
    within_wgs84, BBox, CanonicalGeometry, LatLng, Position, RawGeometry, RawPosition, RawRing,
    Ring,
};
pub use import::{
    ApplyMode, ApplyRequest, ApplyRequestBody, ApplyResult, FieldMapping, ImportAction,
    ImportDefaults, ImportDefaultsBody, ImportFile, ImportFileId, ImportStatus, SourceFormat,
};
pub use parcel::{
    ensure_unique_certifications, parse_certifications, Certification, ConformityStatus,
    CooperativeId, Farmer, FarmerId, NewFarmer, NewParcel, Parcel, ParcelId, ParcelSource,
    RiskFlag, SupplierId,
};
