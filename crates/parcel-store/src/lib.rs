//! Parcel Store - Storage ports and adapters
//!
//! This crate defines the storage ports the import session talks to and an
//! in-memory adapter used by the CLI and the test suites.

pub mod memory;
pub mod ports;

pub use memory::MemoryStore;
pub use ports::{
    FarmerStore, HashRecord, ImportFileStore, ImportStore, ParcelFilter, ParcelStore, Transaction,
    Transactional,
};
