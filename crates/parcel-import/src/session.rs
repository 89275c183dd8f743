//! Import session: one uploaded file driven through parse, preview and apply.
//!
//! The session is plain data. Its [`ImportFile`] status only moves through
//! [`ImportStatus::transition`], and every step is a separate call the caller
//! can retry: a cancelled parse leaves the file `uploaded`, a failed apply
//! leaves it `parsed`.

use chrono::Utc;
use parcel_core::config::ImportSettings;
use parcel_core::error::{ParcelError, Result};
use parcel_core::formats::validation::FormatValidator;
use parcel_core::formats::ParseIssue;
use parcel_core::models::{
    ensure_unique_certifications, ApplyMode, ApplyRequest, ApplyResult, AttributeMap,
    ConformityStatus, CooperativeId, FarmerId, FieldMapping, ImportAction, ImportDefaults,
    ImportFile, ImportFileId, ImportStatus, LatLng, NewFarmer, NewParcel, ParcelSource,
    ParsedFeature, SourceFormat, SupplierId,
};
use parcel_store::{ImportStore, Transaction};
use serde::Serialize;
use std::collections::HashMap;

use crate::duplicates::{is_duplicate, mark_stored_duplicates, ActiveHashIndex};
use crate::pipeline::{CancellationToken, ParsePipeline, ParseReport};

/// Review state of one parsed feature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureStatus {
    Valid,
    Invalid,
    Duplicate,
}

/// One line of an import preview
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreviewRow {
    pub temp_id: String,
    pub label: Option<String>,
    pub area_ha: f64,
    pub centroid: Option<LatLng>,
    pub status: FeatureStatus,
    /// Error and warning codes
    pub issues: Vec<String>,
}

/// Counts and rows shown to the user between parse and apply
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreviewSummary {
    pub import_file_id: ImportFileId,
    pub filename: String,
    pub format: SourceFormat,
    pub status: ImportStatus,
    pub total: usize,
    pub valid: usize,
    pub invalid: usize,
    pub rejected: usize,
    pub duplicates: usize,
    pub accepted: usize,
    pub accepted_area_ha: f64,
    pub warnings: Vec<ParseIssue>,
    pub available_attribute_fields: Vec<String>,
    pub rows: Vec<PreviewRow>,
}

/// An uploaded file and everything pending until it is applied
#[derive(Debug, Clone)]
pub struct ImportSession {
    file: ImportFile,
    bytes: Vec<u8>,
    report: Option<ParseReport>,
    field_mapping: FieldMapping,
    defaults: ImportDefaults,
}

impl ImportSession {
    /// Register an upload.
    ///
    /// The format is taken from the file name and the size limit is enforced
    /// here, before anything is stored.
    pub async fn upload<S: ImportStore>(
        store: &S,
        settings: &ImportSettings,
        cooperative_id: CooperativeId,
        filename: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Result<Self> {
        let filename = filename.into();
        let format = SourceFormat::from_filename(&filename)?;
        FormatValidator::check_upload_size(bytes.len(), settings.max_upload_mb)?;

        let file = ImportFile::new(cooperative_id, filename, format);
        store.save_import_file(&file).await?;

        tracing::info!(
            import_file_id = %file.id,
            format = %format,
            size = bytes.len(),
            "Registered upload"
        );

        Ok(Self {
            file,
            bytes,
            report: None,
            field_mapping: FieldMapping::default(),
            defaults: ImportDefaults {
                conformity_status: settings.default_conformity,
                ..ImportDefaults::default()
            },
        })
    }

    pub fn file(&self) -> &ImportFile {
        &self.file
    }

    pub fn status(&self) -> ImportStatus {
        self.file.status
    }

    pub fn report(&self) -> Option<&ParseReport> {
        self.report.as_ref()
    }

    pub fn field_mapping(&self) -> &FieldMapping {
        &self.field_mapping
    }

    pub fn defaults(&self) -> &ImportDefaults {
        &self.defaults
    }

    /// Parse (or re-parse) the uploaded bytes and flag stored duplicates.
    ///
    /// A file-level fatal error moves an `uploaded` file to `failed`.
    /// Cancellation and storage errors leave the status untouched.
    pub async fn parse<S: ImportStore>(
        &mut self,
        pipeline: &ParsePipeline,
        store: &S,
        cancel: &CancellationToken,
    ) -> Result<&ParseReport> {
        let parsed = self.file.status.transition(ImportAction::ParseSucceeded)?;

        let mut report = match pipeline.parse_format(self.file.format, &self.bytes, cancel) {
            Ok(report) => report,
            Err(ParcelError::Cancelled) => {
                tracing::info!(import_file_id = %self.file.id, "Parse cancelled");
                return Err(ParcelError::Cancelled);
            }
            Err(e) => {
                tracing::warn!(import_file_id = %self.file.id, code = e.code(), "Parse failed: {}", e);
                if let Ok(failed) = self.file.status.transition(ImportAction::ParseFailed) {
                    let mut file = self.file.clone();
                    file.status = failed;
                    store.save_import_file(&file).await?;
                    self.file = file;
                }
                return Err(e);
            }
        };

        let active = ActiveHashIndex::load(
            store,
            report
                .features
                .iter()
                .filter(|f| f.validation.ok)
                .map(|f| f.feature_hash.as_str()),
        )
        .await?;
        let stored_duplicates = mark_stored_duplicates(&mut report.features, &active);

        let mut file = self.file.clone();
        file.status = parsed;
        file.parsed_at = Some(Utc::now());
        file.has_projection_file = report.has_projection_file;
        file.feature_count = report.features.len();
        store.save_import_file(&file).await?;
        self.file = file;

        tracing::info!(
            import_file_id = %self.file.id,
            feature_count = report.features.len(),
            stored_duplicates,
            "Import file parsed"
        );

        Ok(self.report.insert(report))
    }

    /// Summary of the parsed features, labelled with the current mapping
    pub fn preview(&self) -> Result<PreviewSummary> {
        let report = self.parsed_report("preview")?;
        let label_field = self.field_mapping.label_field.as_deref();

        let rows = report
            .features
            .iter()
            .map(|f| PreviewRow {
                temp_id: f.temp_id.clone(),
                label: f.attributes.mapped_text(label_field).or_else(|| f.label.clone()),
                area_ha: f.area_ha,
                centroid: f.centroid,
                status: if !f.validation.ok {
                    FeatureStatus::Invalid
                } else if f.is_duplicate {
                    FeatureStatus::Duplicate
                } else {
                    FeatureStatus::Valid
                },
                issues: f
                    .validation
                    .errors
                    .iter()
                    .chain(&f.validation.warnings)
                    .map(|i| i.code.as_str().to_string())
                    .collect(),
            })
            .collect();

        Ok(PreviewSummary {
            import_file_id: self.file.id,
            filename: self.file.filename.clone(),
            format: self.file.format,
            status: self.file.status,
            total: report.features.len(),
            valid: report.valid_count(),
            invalid: report.invalid_count(),
            rejected: report.rejected_count(),
            duplicates: report.duplicate_count(),
            accepted: report.accepted_count(),
            accepted_area_ha: report.accepted_area_ha(),
            warnings: report.warnings.clone(),
            available_attribute_fields: report.available_attribute_fields.clone(),
            rows,
        })
    }

    /// Replace the pending field mapping
    pub fn set_field_mapping(&mut self, mapping: FieldMapping) {
        if let Some(report) = &self.report {
            let mapped = [
                &mapping.label_field,
                &mapping.code_field,
                &mapping.village_field,
                &mapping.conformity_field,
            ];
            for field in mapped.into_iter().flatten() {
                if !report.available_attribute_fields.contains(field) {
                    tracing::warn!(field = %field, "Mapped field does not occur in the parsed file");
                }
            }
        }
        self.field_mapping = mapping;
    }

    /// Replace the pending defaults
    pub fn set_defaults(&mut self, defaults: ImportDefaults) -> Result<()> {
        ensure_unique_certifications(&defaults.certifications)?;
        self.defaults = defaults;
        Ok(())
    }

    /// Apply request prefilled with the session's mapping and defaults
    pub fn apply_request(&self, mode: ApplyMode) -> ApplyRequest {
        ApplyRequest::new(mode)
            .with_field_mapping(self.field_mapping.clone())
            .with_defaults(self.defaults.clone())
    }

    /// Materialize the accepted features as parcels.
    ///
    /// Pre-checks run in order: status, projected-coordinate confirmation,
    /// farmer existence (assign), then at least one feature to apply. All
    /// writes share one store transaction; on any error it is rolled back and
    /// the file stays `parsed`.
    pub async fn apply<S: ImportStore>(&mut self, store: &S, request: ApplyRequest) -> Result<ApplyResult> {
        let applied = self.file.status.transition(ImportAction::Apply)?;
        let report = self.parsed_report("apply")?;
        ensure_unique_certifications(&request.defaults.certifications)?;

        let projected = report.likely_projected_features();
        if !report.has_projection_file && !projected.is_empty() && !request.confirm_projected_coordinates {
            return Err(ParcelError::ProjectionUnconfirmed {
                affected_features: projected,
                sample: report.projected_sample(),
            });
        }

        if let ApplyMode::Assign { planteur_id } = &request.mode {
            if store.get_farmer(*planteur_id).await?.is_none() {
                return Err(ParcelError::FarmerNotFound { id: planteur_id.0 });
            }
        }

        let tx = store.begin_transaction().await?;
        match execute_apply(store, &self.file, report, &request, applied).await {
            Ok((result, file)) => {
                Box::new(tx).commit().await?;
                self.file = file;
                tracing::info!(
                    import_file_id = %self.file.id,
                    mode = %result.mode,
                    created_parcels = result.created_parcels,
                    created_farmers = result.created_farmers.len(),
                    skipped_duplicates = result.skipped_duplicates,
                    skipped_invalid = result.skipped_invalid,
                    skipped_missing_farmer = result.skipped_missing_farmer,
                    "Import applied"
                );
                Ok(result)
            }
            Err(e) => {
                if let Err(rollback_err) = Box::new(tx).rollback().await {
                    tracing::error!(error = %rollback_err, "Rollback after failed apply also failed");
                }
                tracing::warn!(import_file_id = %self.file.id, code = e.code(), "Apply rejected: {}", e);
                Err(e)
            }
        }
    }

    fn parsed_report(&self, action: &str) -> Result<&ParseReport> {
        self.report.as_ref().ok_or_else(|| ParcelError::InvalidTransition {
            from: self.file.status.as_str().to_string(),
            action: action.to_string(),
        })
    }
}

/// Writes of one apply; the caller owns the transaction
async fn execute_apply<S: ImportStore>(
    store: &S,
    file: &ImportFile,
    report: &ParseReport,
    request: &ApplyRequest,
    applied: ImportStatus,
) -> Result<(ApplyResult, ImportFile)> {
    // duplicates are checked again; the store may have changed since parse
    let active = ActiveHashIndex::load(
        store,
        report
            .features
            .iter()
            .filter(|f| f.is_accepted())
            .map(|f| f.feature_hash.as_str()),
    )
    .await?;

    let mut skipped_invalid = report.rejected_count();
    let mut skipped_duplicates = 0;
    let mut accepted: Vec<(&ParsedFeature, LatLng)> = Vec::new();
    for feature in &report.features {
        match feature.centroid {
            Some(centroid) if feature.validation.ok => {
                // parse-time store matches are stale; only in-file repeats carry over
                let repeated = feature.duplicate_of.is_some();
                if repeated || is_duplicate(&feature.feature_hash, &active).is_duplicate {
                    skipped_duplicates += 1;
                } else {
                    accepted.push((feature, centroid));
                }
            }
            _ => skipped_invalid += 1,
        }
    }

    let mut skipped_missing_farmer = 0;
    let owned: Vec<(&ParsedFeature, LatLng, Owner)> = match &request.mode {
        ApplyMode::Assign { planteur_id } => accepted
            .into_iter()
            .map(|(f, c)| (f, c, Owner::Existing(*planteur_id)))
            .collect(),
        ApplyMode::Orphan => accepted.into_iter().map(|(f, c)| (f, c, Owner::None)).collect(),
        ApplyMode::AutoCreate {
            farmer_name_field, ..
        } => accepted
            .into_iter()
            .filter_map(|(f, c)| match f.attributes.text(farmer_name_field) {
                Some(name) => Some((f, c, Owner::Named(name))),
                None => {
                    skipped_missing_farmer += 1;
                    None
                }
            })
            .collect(),
    };

    if owned.is_empty() {
        return Err(ParcelError::NothingToApply {
            duplicates: skipped_duplicates,
            invalid: skipped_invalid,
            missing_farmer: skipped_missing_farmer,
        });
    }

    let mut farmers = FarmerResolver::load(store, file.cooperative_id, &request.mode).await?;
    let mut created_parcel_ids = Vec::with_capacity(owned.len());
    for (feature, centroid, owner) in owned {
        let planteur_id = match owner {
            Owner::Existing(id) => Some(id),
            Owner::None => None,
            Owner::Named(name) => Some(farmers.resolve(store, &name).await?),
        };
        let parcel = new_parcel(feature, centroid, planteur_id, request, file.id);
        created_parcel_ids.push(store.insert_parcel(parcel).await?);
    }

    let mut file = file.clone();
    file.status = applied;
    file.applied_at = Some(Utc::now());
    store.save_import_file(&file).await?;

    let result = ApplyResult {
        import_file_id: file.id,
        mode: request.mode.name().to_string(),
        created_parcels: created_parcel_ids.len(),
        created_parcel_ids,
        created_farmers: farmers.created,
        skipped_duplicates,
        skipped_invalid,
        skipped_missing_farmer,
    };
    Ok((result, file))
}

enum Owner {
    Existing(FarmerId),
    Named(String),
    None,
}

/// Case-insensitive farmer lookup that creates missing farmers on demand
struct FarmerResolver {
    cooperative_id: CooperativeId,
    supplier_id: Option<SupplierId>,
    by_name: HashMap<String, FarmerId>,
    created: Vec<FarmerId>,
}

impl FarmerResolver {
    async fn load<S: ImportStore>(store: &S, cooperative_id: CooperativeId, mode: &ApplyMode) -> Result<Self> {
        let mut resolver = Self {
            cooperative_id,
            supplier_id: None,
            by_name: HashMap::new(),
            created: Vec::new(),
        };

        if let ApplyMode::AutoCreate {
            default_supplier_id, ..
        } = mode
        {
            resolver.supplier_id = *default_supplier_id;
            for farmer in store.list_farmers(cooperative_id).await? {
                resolver
                    .by_name
                    .entry(farmer_key(&farmer.name))
                    .or_insert(farmer.id);
            }
        }

        Ok(resolver)
    }

    async fn resolve<S: ImportStore>(&mut self, store: &S, name: &str) -> Result<FarmerId> {
        let key = farmer_key(name);
        if let Some(id) = self.by_name.get(&key) {
            return Ok(*id);
        }

        let id = store
            .create_farmer(NewFarmer {
                cooperative_id: self.cooperative_id,
                name: name.trim().to_string(),
                supplier_id: self.supplier_id,
            })
            .await?;
        tracing::debug!(farmer_id = %id, name = name.trim(), "Created farmer");

        self.by_name.insert(key, id);
        self.created.push(id);
        Ok(id)
    }
}

fn farmer_key(name: &str) -> String {
    name.trim().to_lowercase()
}

fn new_parcel(
    feature: &ParsedFeature,
    centroid: LatLng,
    planteur_id: Option<FarmerId>,
    request: &ApplyRequest,
    import_file_id: ImportFileId,
) -> NewParcel {
    let mapping = &request.field_mapping;
    let attributes = &feature.attributes;

    NewParcel {
        planteur_id,
        label: attributes
            .mapped_text(mapping.label_field.as_deref())
            .or_else(|| feature.label.clone()),
        code: attributes.mapped_text(mapping.code_field.as_deref()),
        village: attributes.mapped_text(mapping.village_field.as_deref()),
        geometry: feature.geometry.clone(),
        area_ha: feature.area_ha,
        centroid,
        feature_hash: feature.feature_hash.clone(),
        certifications: request.defaults.certifications.clone(),
        conformity_status: resolve_conformity(attributes, mapping, &request.defaults),
        risk_flags: feature.validation.risk_flags(),
        source: ParcelSource::Import,
        import_file_id: Some(import_file_id),
    }
}

/// Mapped conformity value when recognised, else the default
pub fn resolve_conformity(
    attributes: &AttributeMap,
    mapping: &FieldMapping,
    defaults: &ImportDefaults,
) -> ConformityStatus {
    let Some(raw) = attributes.mapped_text(mapping.conformity_field.as_deref()) else {
        return defaults.conformity_status;
    };

    raw.parse::<ConformityStatus>()
        .ok()
        .or_else(|| {
            if defaults.auto_detect_conformity {
                ConformityStatus::detect(&raw)
            } else {
                None
            }
        })
        .unwrap_or(defaults.conformity_status)
}
