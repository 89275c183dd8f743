//! Bbox command implementation

use super::{new_cooperative, parse_file};
use crate::cli::BboxArgs;
use crate::output::OutputWriter;
use anyhow::Result;
use parcel_core::config::LayeredConfig;
use parcel_core::models::{ApplyMode, BBox};
use parcel_import::{ParcelQuery, ParcelService, ParsePipeline};
use parcel_store::MemoryStore;
use serde::Serialize;
use std::sync::Arc;
use tabled::Tabled;

#[derive(Tabled)]
struct ParcelRow {
    #[tabled(rename = "ID")]
    id: u64,
    #[tabled(rename = "Label")]
    label: String,
    #[tabled(rename = "Area (ha)")]
    area_ha: String,
    #[tabled(rename = "Vertices")]
    vertices: usize,
}

#[derive(Serialize)]
struct BboxOutput {
    bbox: BBox,
    zoom: Option<u8>,
    parcels: Vec<serde_json::Value>,
}

pub async fn execute(args: BboxArgs, config: &LayeredConfig, output: &OutputWriter) -> Result<()> {
    let bbox = BBox::parse(&args.bbox)?;
    let settings = config.settings();
    let zoom_threshold = settings.simplify_zoom_threshold;

    let store = Arc::new(MemoryStore::new());
    let pipeline = ParsePipeline::new(settings);
    let mut session = parse_file(&store, &pipeline, new_cooperative(), &args.path, output).await?;
    let request = session.apply_request(ApplyMode::Orphan).confirm_projected();
    session.apply(store.as_ref(), request).await?;

    let service = ParcelService::new(store, zoom_threshold);
    let parcels = service
        .list_parcels(&ParcelQuery {
            bbox: Some(bbox),
            zoom: args.zoom,
            ..Default::default()
        })
        .await?;

    if output.is_json() {
        return output.result(BboxOutput {
            bbox,
            zoom: args.zoom,
            parcels: parcels
                .iter()
                .map(|p| {
                    serde_json::json!({
                        "id": p.id,
                        "label": p.label,
                        "area_ha": p.area_ha,
                        "centroid": p.centroid,
                        "feature_hash": p.feature_hash,
                        "geometry": p.geometry.to_geojson(),
                    })
                })
                .collect(),
        });
    }

    output.section(format!("{} parcels intersect {}", parcels.len(), args.bbox));
    output.table(
        parcels
            .iter()
            .map(|p| ParcelRow {
                id: p.id.0,
                label: p.label.clone().unwrap_or_else(|| "-".to_string()),
                area_ha: format!("{:.4}", p.area_ha),
                vertices: p.geometry.positions().count(),
            })
            .collect(),
    );

    Ok(())
}
