use async_trait::async_trait;
use parcel_core::error::Result;
use parcel_core::models::{
    BBox, CooperativeId, Farmer, FarmerId, ImportFile, ImportFileId, NewFarmer, NewParcel, Parcel,
    ParcelId,
};

/// Stored hash of one parcel, as seen by duplicate detection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashRecord {
    pub feature_hash: String,
    pub parcel_id: ParcelId,
    pub is_active: bool,
}

/// Criteria for listing parcels
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParcelFilter {
    /// Only parcels whose geometry intersects this box
    pub bbox: Option<BBox>,
    pub planteur_id: Option<FarmerId>,
    /// Archived parcels are excluded unless set
    pub include_inactive: bool,
}

/// Port for parcel storage operations
#[async_trait]
pub trait ParcelStore: Send + Sync {
    /// Store a new parcel and return its assigned id
    async fn insert_parcel(&self, parcel: NewParcel) -> Result<ParcelId>;

    /// Retrieve a parcel by ID
    async fn get_parcel(&self, id: ParcelId) -> Result<Option<Parcel>>;

    /// List parcels matching the filter, ordered by id
    async fn list_parcels(&self, filter: &ParcelFilter) -> Result<Vec<Parcel>>;

    /// Batch lookup of the active parcels carrying any of the given hashes
    async fn active_hashes(&self, hashes: &[String]) -> Result<Vec<HashRecord>>;

    /// Activate or archive a parcel
    async fn set_active(&self, id: ParcelId, active: bool) -> Result<()>;

    /// Attach a parcel to a farmer
    async fn assign_farmer(&self, id: ParcelId, farmer: FarmerId) -> Result<()>;
}

/// Port for farmer (planteur) records
#[async_trait]
pub trait FarmerStore: Send + Sync {
    async fn create_farmer(&self, farmer: NewFarmer) -> Result<FarmerId>;

    async fn get_farmer(&self, id: FarmerId) -> Result<Option<Farmer>>;

    /// All farmers of a cooperative, ordered by id
    async fn list_farmers(&self, cooperative_id: CooperativeId) -> Result<Vec<Farmer>>;
}

/// Port for import file records
#[async_trait]
pub trait ImportFileStore: Send + Sync {
    /// Insert or replace an import file record
    async fn save_import_file(&self, file: &ImportFile) -> Result<()>;

    async fn get_import_file(&self, id: ImportFileId) -> Result<Option<ImportFile>>;
}

/// A unit of work that is either committed or rolled back as a whole
#[async_trait]
pub trait Transaction: Send {
    async fn commit(self: Box<Self>) -> Result<()>;

    async fn rollback(self: Box<Self>) -> Result<()>;
}

/// Stores that can group writes into a [`Transaction`]
#[async_trait]
pub trait Transactional: Send + Sync {
    type Tx: Transaction + 'static;

    async fn begin_transaction(&self) -> Result<Self::Tx>;
}

/// Everything an import session needs from its storage collaborator
pub trait ImportStore: ParcelStore + FarmerStore + ImportFileStore + Transactional {}

impl<T> ImportStore for T where T: ParcelStore + FarmerStore + ImportFileStore + Transactional {}
