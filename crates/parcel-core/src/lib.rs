//! Parcel Core - Domain models, format parsers and configuration
//!
//! This crate contains the domain types shared by the parcel import system:
//! raw and canonical geometries, typed attribute records, import lifecycle,
//! the error taxonomy, layered configuration and the shapefile/KML/GeoJSON
//! readers.

pub mod config;
pub mod error;
pub mod formats;
pub mod models;

pub use error::{ErrorReport, ParcelError, Result};
