//! Parse pipeline: reader output to canonically ordered parsed features.
//!
//! Per-feature work (normalization, metrics, hashing) is independent and runs
//! on a rayon parallel iterator when `parallel_parse` is enabled. Results are
//! sorted by `(feature_hash, attributes, geometry, source_index)` so a
//! re-parse of the same file is identical whatever order the reader produced.

use parcel_core::config::ImportSettings;
use parcel_core::error::{ParcelError, Result};
use parcel_core::formats::validation::FormatValidator;
use parcel_core::formats::{codes, FormatReader, FormatRegistry, ParseIssue, ParseOutput};
use parcel_core::models::{
    within_wgs84, CanonicalGeometry, IssueCode, ParsedFeature, Position, RawFeature, SourceFormat,
};
use parcel_geo::canonical::feature_hash;
use parcel_geo::metrics::{self, round_to};
use parcel_geo::normalize::{normalize_feature, NormalizeOptions, NormalizedFeature};
use parcel_geo::validation::check_area;
use rayon::prelude::*;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::duplicates::mark_batch_duplicates;

/// Offending positions echoed back when projected coordinates are suspected
const PROJECTED_SAMPLE_SIZE: usize = 5;

/// Cooperative cancellation flag shared with the caller
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// `Err(Cancelled)` once [`cancel`](Self::cancel) has been called
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(ParcelError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Everything a parse run produced
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParseReport {
    pub format: SourceFormat,
    /// Parsed features in canonical order
    pub features: Vec<ParsedFeature>,
    /// Per-feature reader rejections (unsupported or empty geometry)
    pub errors: Vec<ParseIssue>,
    /// File-level advisories
    pub warnings: Vec<ParseIssue>,
    pub available_attribute_fields: Vec<String>,
    pub has_projection_file: bool,
}

impl ParseReport {
    pub fn has_warning(&self, code: &str) -> bool {
        self.warnings.iter().any(|w| w.code == code)
    }

    pub fn valid_count(&self) -> usize {
        self.features.iter().filter(|f| f.validation.ok).count()
    }

    pub fn invalid_count(&self) -> usize {
        self.features.iter().filter(|f| !f.validation.ok).count()
    }

    /// Valid features flagged as duplicates
    pub fn duplicate_count(&self) -> usize {
        self.features
            .iter()
            .filter(|f| f.validation.ok && f.is_duplicate)
            .count()
    }

    pub fn accepted_count(&self) -> usize {
        self.features.iter().filter(|f| f.is_accepted()).count()
    }

    /// Features the reader could not turn into geometry at all
    pub fn rejected_count(&self) -> usize {
        self.errors.iter().filter(|e| e.feature_index.is_some()).count()
    }

    pub fn accepted_area_ha(&self) -> f64 {
        round_to(
            self.features
                .iter()
                .filter(|f| f.is_accepted())
                .map(|f| f.area_ha)
                .sum(),
            4,
        )
    }

    /// Source indices of features whose coordinates look projected
    pub fn likely_projected_features(&self) -> Vec<usize> {
        let mut indices: Vec<usize> = self
            .features
            .iter()
            .filter(|f| f.validation.has_warning(IssueCode::LikelyProjected))
            .map(|f| f.source_index)
            .collect();
        indices.sort_unstable();
        indices
    }

    /// A few out-of-bounds positions from the likely-projected features
    pub fn projected_sample(&self) -> Vec<Position> {
        self.features
            .iter()
            .filter(|f| f.validation.has_warning(IssueCode::LikelyProjected))
            .flat_map(|f| f.geometry.positions())
            .filter(|p| !within_wgs84(p))
            .take(PROJECTED_SAMPLE_SIZE)
            .copied()
            .collect()
    }

    pub fn feature(&self, temp_id: &str) -> Option<&ParsedFeature> {
        self.features.iter().find(|f| f.temp_id == temp_id)
    }
}

/// Reader dispatch plus per-feature processing
pub struct ParsePipeline {
    registry: FormatRegistry,
    settings: ImportSettings,
}

impl ParsePipeline {
    pub fn new(settings: ImportSettings) -> Self {
        Self::with_registry(FormatRegistry::with_upload_limit(settings.max_upload_mb), settings)
    }

    pub fn with_registry(registry: FormatRegistry, settings: ImportSettings) -> Self {
        Self { registry, settings }
    }

    pub fn settings(&self) -> &ImportSettings {
        &self.settings
    }

    pub fn registry(&self) -> &FormatRegistry {
        &self.registry
    }

    /// Parse a file, detecting its format from the file name
    pub fn parse(&self, filename: &str, bytes: &[u8], cancel: &CancellationToken) -> Result<ParseReport> {
        FormatValidator::check_upload_size(bytes.len(), self.settings.max_upload_mb)?;
        let reader = self.registry.detect_format(filename)?;
        self.run(reader, bytes, cancel)
    }

    /// Parse a file whose format is already known
    pub fn parse_format(
        &self,
        format: SourceFormat,
        bytes: &[u8],
        cancel: &CancellationToken,
    ) -> Result<ParseReport> {
        FormatValidator::check_upload_size(bytes.len(), self.settings.max_upload_mb)?;
        let reader = self.registry.reader_for(format)?;
        self.run(reader, bytes, cancel)
    }

    fn run(&self, reader: &dyn FormatReader, bytes: &[u8], cancel: &CancellationToken) -> Result<ParseReport> {
        cancel.check()?;
        tracing::debug!(format = reader.format_name(), size = bytes.len(), "Reading import file");

        let output = reader.read(bytes)?;
        self.process(reader.source_format(), output, cancel)
    }

    /// Normalize, measure and hash reader output, then order it canonically
    pub fn process(
        &self,
        format: SourceFormat,
        output: ParseOutput,
        cancel: &CancellationToken,
    ) -> Result<ParseReport> {
        cancel.check()?;

        let options = NormalizeOptions {
            has_projection_file: output.has_projection_file,
        };
        let settings = &self.settings;

        let mut features: Vec<ParsedFeature> = if settings.parallel_parse {
            output
                .features
                .into_par_iter()
                .map(|raw| {
                    cancel.check()?;
                    Ok(process_feature(raw, &options, settings))
                })
                .collect::<Result<Vec<_>>>()?
        } else {
            output
                .features
                .into_iter()
                .map(|raw| {
                    cancel.check()?;
                    Ok(process_feature(raw, &options, settings))
                })
                .collect::<Result<Vec<_>>>()?
        };

        // full-precision geometry separates equal hashes before input position does
        features.sort_by_cached_key(|f| {
            (
                f.feature_hash.clone(),
                f.attributes.canonical_text(),
                geometry_text(&f.geometry),
                f.source_index,
            )
        });
        for (position, feature) in features.iter_mut().enumerate() {
            feature.temp_id = ParsedFeature::temp_id_for(position);
        }
        let batch_duplicates = mark_batch_duplicates(&mut features);

        let mut report = ParseReport {
            format,
            features,
            errors: output.errors,
            warnings: output.warnings,
            available_attribute_fields: output.available_attribute_fields,
            has_projection_file: output.has_projection_file,
        };

        let projected = report.likely_projected_features();
        if !projected.is_empty() {
            tracing::warn!(features = projected.len(), "Coordinates look projected");
            let sample = report.projected_sample();
            report.warnings.push(
                ParseIssue::file(
                    codes::LIKELY_PROJECTED,
                    format!(
                        "{} feature(s) have coordinates outside WGS84 bounds and the file declares no projection; confirm before applying",
                        projected.len()
                    ),
                )
                .with_details(serde_json::json!({
                    "affected_features": projected,
                    "sample_coordinates": sample,
                })),
            );
        }

        tracing::info!(
            format = %format,
            feature_count = report.features.len(),
            valid = report.valid_count(),
            invalid = report.invalid_count(),
            rejected = report.rejected_count(),
            batch_duplicates,
            "Parsed import file"
        );

        Ok(report)
    }
}

fn process_feature(raw: RawFeature, options: &NormalizeOptions, settings: &ImportSettings) -> ParsedFeature {
    let NormalizedFeature {
        geometry,
        mut validation,
    } = normalize_feature(&raw.geometry, options);

    let (area_ha, centroid) = if validation.ok {
        let area = metrics::area_ha(&geometry);
        if let Some(issue) = check_area(area, settings.min_area_ha, settings.max_area_ha) {
            validation.add_warning(issue);
        }
        (area, metrics::centroid(&geometry))
    } else {
        (0.0, None)
    };

    let feature_hash = feature_hash(&geometry);
    tracing::debug!(
        source_index = raw.source_index,
        hash = %feature_hash,
        ok = validation.ok,
        "Processed feature"
    );

    ParsedFeature {
        temp_id: String::new(),
        label: raw.attributes.derive_label(),
        geometry,
        area_ha,
        centroid,
        feature_hash,
        validation,
        is_duplicate: false,
        existing_parcel_id: None,
        duplicate_of: None,
        attributes: raw.attributes,
        source_index: raw.source_index,
    }
}

/// Normalized coordinates at full precision, for ordering only
fn geometry_text(geometry: &CanonicalGeometry) -> String {
    geometry
        .polygons()
        .iter()
        .flatten()
        .flatten()
        .map(|p| format!("{:?},{:?}", p[0], p[1]))
        .collect::<Vec<_>>()
        .join(";")
}
