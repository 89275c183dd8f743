//! Parcel Import - Parse pipeline, duplicate detection and import sessions
//!
//! The [`pipeline`] turns an uploaded file into a canonically ordered list of
//! [`ParsedFeature`](parcel_core::models::ParsedFeature)s. An
//! [`ImportSession`](session::ImportSession) drives one file through
//! upload, parse, preview and apply against the storage ports of
//! `parcel-store`; [`service::ParcelService`] covers the parcel operations
//! that follow an import.

pub mod duplicates;
pub mod pipeline;
pub mod service;
pub mod session;

pub use duplicates::{is_duplicate, ActiveHashIndex, DuplicateCheck};
pub use pipeline::{CancellationToken, ParsePipeline, ParseReport};
pub use service::{ParcelQuery, ParcelService};
pub use session::{FeatureStatus, ImportSession, PreviewRow, PreviewSummary};
