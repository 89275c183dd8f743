//! Import command implementation

use super::{new_cooperative, parse_file};
use crate::cli::{ImportArgs, MappingArgs, ModeArg};
use crate::output::OutputWriter;
use anyhow::Result;
use parcel_core::config::LayeredConfig;
use parcel_core::models::{
    ApplyMode, ApplyRequest, ApplyRequestBody, CooperativeId, FieldMapping, ImportDefaultsBody,
    NewFarmer,
};
use parcel_core::ParcelError;
use parcel_import::ParsePipeline;
use parcel_store::{FarmerStore, MemoryStore};
use std::path::Path;

pub async fn execute(args: ImportArgs, config: &LayeredConfig, output: &OutputWriter) -> Result<()> {
    let settings = config.settings();
    let request = build_request(&args, &settings.default_conformity.to_string())?;

    let store = MemoryStore::new();
    let pipeline = ParsePipeline::new(settings);
    let cooperative_id = new_cooperative();

    for name in &args.farmers {
        let id = store
            .create_farmer(NewFarmer {
                cooperative_id,
                name: name.clone(),
                supplier_id: None,
            })
            .await?;
        tracing::debug!(farmer_id = %id, name = %name, "Registered farmer");
    }

    if let Some(existing) = &args.existing {
        let seeded = seed_existing(&store, &pipeline, cooperative_id, existing, output).await?;
        output.info(format!("Loaded {} existing parcels from {}", seeded, existing.display()));
    }

    let mut session = parse_file(&store, &pipeline, cooperative_id, &args.path, output).await?;
    session.set_field_mapping(request.field_mapping.clone());
    session.set_defaults(request.defaults.clone())?;

    let result = session.apply(&store, request).await?;

    if output.is_json() {
        return output.result(&result);
    }

    output.success(format!(
        "Imported {} parcels from {} ({} mode)",
        result.created_parcels,
        session.file().filename,
        result.mode
    ));
    output.kv("Skipped duplicates", result.skipped_duplicates);
    output.kv("Skipped invalid", result.skipped_invalid);
    if result.skipped_missing_farmer > 0 {
        output.kv("Skipped without farmer", result.skipped_missing_farmer);
    }
    if !result.created_farmers.is_empty() {
        output.kv("Farmers created", result.created_farmers.len());
    }

    Ok(())
}

/// Validate flags through the same wire form other callers use
fn build_request(args: &ImportArgs, default_conformity: &str) -> Result<ApplyRequest, ParcelError> {
    let MappingArgs {
        label_field,
        code_field,
        village_field,
        conformity_field,
    } = &args.mapping;

    let body = ApplyRequestBody {
        mode: match args.mode {
            ModeArg::Assign => "assign",
            ModeArg::Orphan => "orphan",
            ModeArg::AutoCreate => "auto_create",
        }
        .to_string(),
        planteur_id: args.farmer_id,
        farmer_name_field: args.farmer_field.clone(),
        default_supplier_id: None,
        field_mapping: FieldMapping {
            label_field: label_field.clone(),
            code_field: code_field.clone(),
            village_field: village_field.clone(),
            conformity_field: conformity_field.clone(),
        },
        defaults: ImportDefaultsBody {
            conformity_status: Some(
                args.conformity
                    .clone()
                    .unwrap_or_else(|| default_conformity.to_string()),
            ),
            certifications: args.certifications.clone(),
            auto_detect_conformity: args.auto_detect_conformity,
        },
        confirm_projected_coordinates: args.confirm_projected,
    };

    ApplyRequest::try_from(body)
}

/// Apply a previous export as orphan parcels so the import deduplicates against it
async fn seed_existing(
    store: &MemoryStore,
    pipeline: &ParsePipeline,
    cooperative_id: CooperativeId,
    path: &Path,
    output: &OutputWriter,
) -> Result<usize> {
    let mut session = parse_file(store, pipeline, cooperative_id, path, output).await?;
    let request = session.apply_request(ApplyMode::Orphan).confirm_projected();

    match session.apply(store, request).await {
        Ok(result) => Ok(result.created_parcels),
        Err(ParcelError::NothingToApply { .. }) => Ok(0),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Commands};
    use clap::Parser;

    fn import_args(argv: &[&str]) -> ImportArgs {
        let mut full = vec!["parcel", "import", "plots.geojson"];
        full.extend_from_slice(argv);
        match Cli::parse_from(full).command {
            Commands::Import(args) => args,
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_build_request_modes() {
        let request = build_request(&import_args(&["--mode", "orphan"]), "missing_information").unwrap();
        assert_eq!(request.mode, ApplyMode::Orphan);

        let err = build_request(&import_args(&["--mode", "assign"]), "missing_information").unwrap_err();
        assert_eq!(err.code(), "MISSING_FIELD");

        let err = build_request(&import_args(&["--mode", "auto-create"]), "missing_information").unwrap_err();
        assert_eq!(err.code(), "MISSING_FIELD");

        let request = build_request(
            &import_args(&["--mode", "auto-create", "--farmer-field", "PLANTEUR"]),
            "missing_information",
        )
        .unwrap();
        assert_eq!(request.mode.name(), "auto_create");
    }

    #[test]
    fn test_build_request_defaults() {
        let args = import_args(&[
            "--mode",
            "orphan",
            "--certification",
            "utz",
            "--certification",
            "bio",
            "--code-field",
            "CODE",
            "--confirm-projected",
        ]);
        let request = build_request(&args, "in_progress").unwrap();
        assert_eq!(request.defaults.certifications.len(), 2);
        assert_eq!(request.defaults.conformity_status.as_str(), "in_progress");
        assert_eq!(request.field_mapping.code_field.as_deref(), Some("CODE"));
        assert!(request.confirm_projected_coordinates);

        let args = import_args(&["--mode", "orphan", "--certification", "utz", "--certification", "utz"]);
        assert_eq!(build_request(&args, "in_progress").unwrap_err().code(), "DUPLICATE_CERTIFICATION");

        let args = import_args(&["--mode", "orphan", "--conformity", "maybe"]);
        assert_eq!(build_request(&args, "in_progress").unwrap_err().code(), "INVALID_CONFORMITY");
    }
}
