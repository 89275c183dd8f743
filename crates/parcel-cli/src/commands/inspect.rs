//! Inspect command implementation

use super::{new_cooperative, parse_file};
use crate::cli::InspectArgs;
use crate::output::OutputWriter;
use anyhow::Result;
use parcel_core::config::LayeredConfig;
use parcel_core::models::FieldMapping;
use parcel_import::session::FeatureStatus;
use parcel_import::{ParsePipeline, PreviewRow};
use parcel_store::MemoryStore;
use tabled::Tabled;

const PREVIEW_ROWS: usize = 20;

#[derive(Tabled)]
struct FeatureRow {
    #[tabled(rename = "ID")]
    temp_id: String,
    #[tabled(rename = "Label")]
    label: String,
    #[tabled(rename = "Area (ha)")]
    area_ha: String,
    #[tabled(rename = "Centroid")]
    centroid: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Issues")]
    issues: String,
}

impl From<&PreviewRow> for FeatureRow {
    fn from(row: &PreviewRow) -> Self {
        Self {
            temp_id: row.temp_id.clone(),
            label: row.label.clone().unwrap_or_else(|| "-".to_string()),
            area_ha: format!("{:.4}", row.area_ha),
            centroid: row
                .centroid
                .map(|c| format!("{:.5}, {:.5}", c.lat, c.lng))
                .unwrap_or_else(|| "-".to_string()),
            status: match row.status {
                FeatureStatus::Valid => "valid",
                FeatureStatus::Invalid => "invalid",
                FeatureStatus::Duplicate => "duplicate",
            }
            .to_string(),
            issues: row.issues.join(", "),
        }
    }
}

pub async fn execute(args: InspectArgs, config: &LayeredConfig, output: &OutputWriter) -> Result<()> {
    let store = MemoryStore::new();
    let pipeline = ParsePipeline::new(config.settings());

    let mut session = parse_file(&store, &pipeline, new_cooperative(), &args.path, output).await?;
    session.set_field_mapping(FieldMapping {
        label_field: args.label_field,
        ..FieldMapping::default()
    });
    let preview = session.preview()?;

    if output.is_json() {
        return output.result(&preview);
    }

    output.section(format!("{} ({})", preview.filename, preview.format));
    output.kv("Features", preview.total);
    output.kv("Valid", preview.valid);
    output.kv("Invalid", preview.invalid);
    output.kv("Rejected by reader", preview.rejected);
    output.kv("Duplicates", preview.duplicates);
    output.kv("Accepted", preview.accepted);
    output.kv("Accepted area", format!("{:.4} ha", preview.accepted_area_ha));
    if !preview.available_attribute_fields.is_empty() {
        output.kv("Attributes", preview.available_attribute_fields.join(", "));
    }

    let shown = if args.all { preview.rows.len() } else { PREVIEW_ROWS };
    output.table(preview.rows.iter().take(shown).map(FeatureRow::from).collect());
    if preview.rows.len() > shown {
        output.info(format!(
            "{} more features; use --all to list them",
            preview.rows.len() - shown
        ));
    }

    if let Some(report) = session.report() {
        for error in &report.errors {
            output.warning(format!(
                "feature {}: {} {}",
                error.feature_index.map(|i| i.to_string()).unwrap_or_default(),
                error.code,
                error.message
            ));
        }
    }

    Ok(())
}
