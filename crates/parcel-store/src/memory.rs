//! In-memory storage implementation for the CLI and tests.
//!
//! All state lives behind one `RwLock`, so every port call sees a consistent
//! view. Transactions snapshot the state on begin and restore it on rollback.

use async_trait::async_trait;
use chrono::Utc;
use parcel_core::error::{ParcelError, Result};
use parcel_core::models::{
    CooperativeId, Farmer, FarmerId, ImportFile, ImportFileId, NewFarmer, NewParcel, Parcel,
    ParcelId,
};
use parcel_geo::spatial::{intersects, SpatialIndex};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::ports::{
    FarmerStore, HashRecord, ImportFileStore, ParcelFilter, ParcelStore, Transaction,
    Transactional,
};

#[derive(Debug, Clone)]
struct MemoryState {
    parcels: BTreeMap<ParcelId, Parcel>,
    farmers: BTreeMap<FarmerId, Farmer>,
    import_files: HashMap<ImportFileId, ImportFile>,
    index: SpatialIndex<ParcelId>,
    next_parcel_id: u64,
    next_farmer_id: u64,
}

impl Default for MemoryState {
    fn default() -> Self {
        Self {
            parcels: BTreeMap::new(),
            farmers: BTreeMap::new(),
            import_files: HashMap::new(),
            index: SpatialIndex::new(),
            next_parcel_id: 1,
            next_farmer_id: 1,
        }
    }
}

/// In-memory implementation of every store port
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<MemoryState>>,
}

impl MemoryStore {
    /// Create a new, empty in-memory store
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryState>> {
        self.state
            .read()
            .map_err(|_| ParcelError::Storage("memory store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryState>> {
        self.state
            .write()
            .map_err(|_| ParcelError::Storage("memory store lock poisoned".to_string()))
    }

    /// Number of stored parcels, archived ones included
    pub fn parcel_count(&self) -> Result<usize> {
        Ok(self.read()?.parcels.len())
    }

    pub fn farmer_count(&self) -> Result<usize> {
        Ok(self.read()?.farmers.len())
    }

    fn create_snapshot(&self) -> Result<MemoryState> {
        Ok(self.read()?.clone())
    }

    fn restore_snapshot(&self, snapshot: MemoryState) -> Result<()> {
        *self.write()? = snapshot;
        Ok(())
    }
}

/// Transaction for MemoryStore
pub struct MemoryTransaction {
    snapshot: MemoryState,
    store: MemoryStore,
}

#[async_trait]
impl Transaction for MemoryTransaction {
    async fn commit(self: Box<Self>) -> Result<()> {
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        let this = *self;
        this.store.restore_snapshot(this.snapshot)?;
        tracing::debug!("Rolled back memory store transaction");
        Ok(())
    }
}

#[async_trait]
impl Transactional for MemoryStore {
    type Tx = MemoryTransaction;

    async fn begin_transaction(&self) -> Result<Self::Tx> {
        Ok(MemoryTransaction {
            snapshot: self.create_snapshot()?,
            store: self.clone(),
        })
    }
}

fn parcel_not_found(id: ParcelId) -> ParcelError {
    ParcelError::NotFound {
        entity: "Parcel".to_string(),
        id: id.to_string(),
    }
}

#[async_trait]
impl ParcelStore for MemoryStore {
    async fn insert_parcel(&self, parcel: NewParcel) -> Result<ParcelId> {
        let mut state = self.write()?;

        let id = ParcelId(state.next_parcel_id);
        state.next_parcel_id += 1;

        let parcel = parcel.into_parcel(id, Utc::now());
        state.index.insert(id, &parcel.geometry);
        state.parcels.insert(id, parcel);
        Ok(id)
    }

    async fn get_parcel(&self, id: ParcelId) -> Result<Option<Parcel>> {
        Ok(self.read()?.parcels.get(&id).cloned())
    }

    async fn list_parcels(&self, filter: &ParcelFilter) -> Result<Vec<Parcel>> {
        let state = self.read()?;

        let keep = |parcel: &&Parcel| {
            (filter.include_inactive || parcel.is_active)
                && filter.planteur_id.map_or(true, |farmer| parcel.planteur_id == Some(farmer))
        };

        let mut parcels: Vec<Parcel> = match &filter.bbox {
            Some(bbox) => state
                .index
                .candidates(bbox)
                .into_iter()
                .filter_map(|id| state.parcels.get(&id))
                .filter(keep)
                .filter(|parcel| intersects(&parcel.geometry, bbox))
                .cloned()
                .collect(),
            None => state.parcels.values().filter(keep).cloned().collect(),
        };

        parcels.sort_by_key(|p| p.id);
        Ok(parcels)
    }

    async fn active_hashes(&self, hashes: &[String]) -> Result<Vec<HashRecord>> {
        let wanted: HashSet<&str> = hashes.iter().map(String::as_str).collect();
        let state = self.read()?;

        Ok(state
            .parcels
            .values()
            .filter(|p| p.is_active && wanted.contains(p.feature_hash.as_str()))
            .map(|p| HashRecord {
                feature_hash: p.feature_hash.clone(),
                parcel_id: p.id,
                is_active: p.is_active,
            })
            .collect())
    }

    async fn set_active(&self, id: ParcelId, active: bool) -> Result<()> {
        let mut state = self.write()?;
        let parcel = state.parcels.get_mut(&id).ok_or_else(|| parcel_not_found(id))?;
        parcel.is_active = active;
        Ok(())
    }

    async fn assign_farmer(&self, id: ParcelId, farmer: FarmerId) -> Result<()> {
        let mut state = self.write()?;
        if !state.farmers.contains_key(&farmer) {
            return Err(ParcelError::FarmerNotFound { id: farmer.0 });
        }
        let parcel = state.parcels.get_mut(&id).ok_or_else(|| parcel_not_found(id))?;
        parcel.planteur_id = Some(farmer);
        Ok(())
    }
}

#[async_trait]
impl FarmerStore for MemoryStore {
    async fn create_farmer(&self, farmer: NewFarmer) -> Result<FarmerId> {
        let mut state = self.write()?;

        let id = FarmerId(state.next_farmer_id);
        state.next_farmer_id += 1;

        state.farmers.insert(
            id,
            Farmer {
                id,
                cooperative_id: farmer.cooperative_id,
                name: farmer.name,
                supplier_id: farmer.supplier_id,
                created_at: Utc::now(),
            },
        );
        Ok(id)
    }

    async fn get_farmer(&self, id: FarmerId) -> Result<Option<Farmer>> {
        Ok(self.read()?.farmers.get(&id).cloned())
    }

    async fn list_farmers(&self, cooperative_id: CooperativeId) -> Result<Vec<Farmer>> {
        Ok(self
            .read()?
            .farmers
            .values()
            .filter(|f| f.cooperative_id == cooperative_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ImportFileStore for MemoryStore {
    async fn save_import_file(&self, file: &ImportFile) -> Result<()> {
        self.write()?.import_files.insert(file.id, file.clone());
        Ok(())
    }

    async fn get_import_file(&self, id: ImportFileId) -> Result<Option<ImportFile>> {
        Ok(self.read()?.import_files.get(&id).cloned())
    }
}
