//! Duplicate detection by feature hash.
//!
//! Matching is hash equality against the set of *active* parcels, across all
//! farmers. Archived parcels never match.

use parcel_core::error::Result;
use parcel_core::models::{ParcelId, ParsedFeature};
use parcel_store::{HashRecord, ParcelStore};
use std::collections::{BTreeSet, HashMap};

/// Lookup table from feature hash to the active parcel carrying it
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActiveHashIndex {
    by_hash: HashMap<String, ParcelId>,
}

impl ActiveHashIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from stored records.
    ///
    /// Inactive records are discarded. When several active parcels share a
    /// hash the smallest id is kept, so the result does not depend on record
    /// order.
    pub fn from_records(records: impl IntoIterator<Item = HashRecord>) -> Self {
        let mut by_hash: HashMap<String, ParcelId> = HashMap::new();
        for record in records.into_iter().filter(|r| r.is_active) {
            by_hash
                .entry(record.feature_hash)
                .and_modify(|id| *id = (*id).min(record.parcel_id))
                .or_insert(record.parcel_id);
        }
        Self { by_hash }
    }

    /// Fetch the index for `hashes` with one batch call to the store
    pub async fn load<S>(store: &S, hashes: impl IntoIterator<Item = &str>) -> Result<Self>
    where
        S: ParcelStore + ?Sized,
    {
        let unique: BTreeSet<&str> = hashes.into_iter().collect();
        if unique.is_empty() {
            return Ok(Self::new());
        }

        let wanted: Vec<String> = unique.into_iter().map(str::to_string).collect();
        let records = store.active_hashes(&wanted).await?;
        tracing::debug!(requested = wanted.len(), matched = records.len(), "Loaded active hashes");
        Ok(Self::from_records(records))
    }

    pub fn get(&self, hash: &str) -> Option<ParcelId> {
        self.by_hash.get(hash).copied()
    }

    pub fn len(&self) -> usize {
        self.by_hash.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_hash.is_empty()
    }
}

/// Outcome of one duplicate lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DuplicateCheck {
    pub is_duplicate: bool,
    pub existing_parcel_id: Option<ParcelId>,
}

pub fn is_duplicate(feature_hash: &str, active: &ActiveHashIndex) -> DuplicateCheck {
    let existing_parcel_id = active.get(feature_hash);
    DuplicateCheck {
        is_duplicate: existing_parcel_id.is_some(),
        existing_parcel_id,
    }
}

/// Flag valid features whose hash belongs to an active parcel.
///
/// Returns how many features were flagged.
pub fn mark_stored_duplicates(features: &mut [ParsedFeature], active: &ActiveHashIndex) -> usize {
    let mut flagged = 0;
    for feature in features.iter_mut().filter(|f| f.validation.ok) {
        let check = is_duplicate(&feature.feature_hash, active);
        if check.is_duplicate {
            feature.is_duplicate = true;
            feature.existing_parcel_id = check.existing_parcel_id;
            flagged += 1;
        }
    }
    flagged
}

/// Flag valid features repeating the hash of an earlier valid feature.
///
/// `features` must already be in canonical order; the first occurrence stays
/// unflagged and later ones point at its temp id.
pub fn mark_batch_duplicates(features: &mut [ParsedFeature]) -> usize {
    let mut first_seen: HashMap<String, String> = HashMap::new();
    let mut flagged = 0;

    for feature in features.iter_mut().filter(|f| f.validation.ok) {
        match first_seen.get(&feature.feature_hash) {
            Some(first) => {
                feature.is_duplicate = true;
                feature.duplicate_of = Some(first.clone());
                flagged += 1;
            }
            None => {
                first_seen.insert(feature.feature_hash.clone(), feature.temp_id.clone());
            }
        }
    }
    flagged
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn record(hash: &str, id: u64, is_active: bool) -> HashRecord {
        HashRecord {
            feature_hash: hash.to_string(),
            parcel_id: ParcelId(id),
            is_active,
        }
    }

    #[test]
    fn test_match_and_miss() {
        let index = ActiveHashIndex::from_records(vec![record("aa", 3, true)]);

        let hit = is_duplicate("aa", &index);
        assert!(hit.is_duplicate);
        assert_eq!(hit.existing_parcel_id, Some(ParcelId(3)));

        let miss = is_duplicate("bb", &index);
        assert!(!miss.is_duplicate);
        assert_eq!(miss.existing_parcel_id, None);
    }

    #[test]
    fn test_inactive_never_matches() {
        let index = ActiveHashIndex::from_records(vec![record("aa", 1, false)]);
        assert!(index.is_empty());
        assert!(!is_duplicate("aa", &index).is_duplicate);
    }

    #[test]
    fn test_empty_index_never_matches() {
        assert!(!is_duplicate("aa", &ActiveHashIndex::new()).is_duplicate);
    }

    #[test]
    fn test_smallest_active_id_wins() {
        let index = ActiveHashIndex::from_records(vec![
            record("aa", 9, true),
            record("aa", 2, false),
            record("aa", 4, true),
        ]);
        assert_eq!(index.get("aa"), Some(ParcelId(4)));
    }

    proptest! {
        #[test]
        fn prop_index_is_order_independent(
            records in prop::collection::vec(("[a-c]", 1u64..20, any::<bool>()), 0..30),
            probe in "[a-d]",
        ) {
            let forward: Vec<HashRecord> =
                records.iter().map(|(h, id, a)| record(h, *id, *a)).collect();
            let mut backward = forward.clone();
            backward.reverse();

            let a = ActiveHashIndex::from_records(forward.clone());
            let b = ActiveHashIndex::from_records(backward);
            prop_assert_eq!(&a, &b);

            let expected = forward.iter().any(|r| r.is_active && r.feature_hash == probe);
            prop_assert_eq!(is_duplicate(&probe, &a).is_duplicate, expected);
        }
    }
}
