//! Parcel operations that follow an import

use parcel_core::error::{ParcelError, Result};
use parcel_core::models::{BBox, FarmerId, Parcel, ParcelId};
use parcel_geo::metrics::simplify_for_zoom;
use parcel_store::{ImportStore, ParcelFilter};
use std::sync::Arc;

/// Read-path query for parcels
#[derive(Debug, Clone, Default)]
pub struct ParcelQuery {
    pub bbox: Option<BBox>,
    pub planteur_id: Option<FarmerId>,
    pub include_inactive: bool,
    /// Map zoom; low zooms get simplified geometry
    pub zoom: Option<u8>,
}

/// Parcel service over a store
pub struct ParcelService<S: ImportStore> {
    store: Arc<S>,
    zoom_threshold: u8,
}

impl<S: ImportStore> ParcelService<S> {
    pub fn new(store: Arc<S>, zoom_threshold: u8) -> Self {
        Self {
            store,
            zoom_threshold,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Parcels matching the query, ordered by id
    pub async fn list_parcels(&self, query: &ParcelQuery) -> Result<Vec<Parcel>> {
        let filter = ParcelFilter {
            bbox: query.bbox,
            planteur_id: query.planteur_id,
            include_inactive: query.include_inactive,
        };
        let mut parcels = self.store.list_parcels(&filter).await?;

        if let Some(zoom) = query.zoom {
            for parcel in &mut parcels {
                parcel.geometry = simplify_for_zoom(&parcel.geometry, zoom, self.zoom_threshold);
            }
        }

        tracing::debug!(
            count = parcels.len(),
            bbox = ?query.bbox,
            zoom = ?query.zoom,
            "Listed parcels"
        );
        Ok(parcels)
    }

    /// Retire a parcel. Its hash stops counting for duplicate detection.
    pub async fn archive_parcel(&self, id: ParcelId) -> Result<()> {
        self.store.set_active(id, false).await?;
        tracing::info!(parcel_id = %id, "Archived parcel");
        Ok(())
    }

    /// Give an orphan parcel its owner
    pub async fn assign_orphan_parcel(&self, id: ParcelId, farmer: FarmerId) -> Result<Parcel> {
        let parcel = self
            .store
            .get_parcel(id)
            .await?
            .ok_or_else(|| ParcelError::NotFound {
                entity: "parcel".to_string(),
                id: id.to_string(),
            })?;

        if !parcel.is_orphan() {
            return Err(ParcelError::InvalidTransition {
                from: "assigned".to_string(),
                action: "assign".to_string(),
            });
        }
        if self.store.get_farmer(farmer).await?.is_none() {
            return Err(ParcelError::FarmerNotFound { id: farmer.0 });
        }

        self.store.assign_farmer(id, farmer).await?;
        tracing::info!(parcel_id = %id, farmer_id = %farmer, "Assigned orphan parcel");

        Ok(Parcel {
            planteur_id: Some(farmer),
            ..parcel
        })
    }
}
