//! Parcel Geo - Normalization, hashing, metrics and spatial operations
//!
//! This crate turns raw parser geometries into canonical MultiPolygons and
//! derives everything computed from them: content hashes, geodesic area,
//! point-on-surface centroids, zoom simplification, self-intersection
//! diagnostics and bounding-box filtering.

pub mod canonical;
pub mod metrics;
pub mod models;
pub mod normalize;
pub mod spatial;
pub mod validation;
