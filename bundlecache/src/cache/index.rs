//! In-memory map from bundle GUID to cache record.

use std::collections::HashMap;

use super::error::{CacheError, CacheResult};
use super::record::CacheRecord;

/// Index of verified cache records.
///
/// Only mutated from the scheduling thread. Disk side effects live in
/// [`super::CacheStore`]; this type is pure bookkeeping.
#[derive(Debug, Default)]
pub struct CacheIndex {
    records: HashMap<String, CacheRecord>,
}

impl CacheIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, guid: &str) -> bool {
        self.records.contains_key(guid)
    }

    pub fn get(&self, guid: &str) -> Option<&CacheRecord> {
        self.records.get(guid)
    }

    /// Add a record.
    ///
    /// # Errors
    ///
    /// Fails when the GUID is already present; callers remove the old
    /// record first when replacing a file.
    pub fn insert(&mut self, record: CacheRecord) -> CacheResult<()> {
        if self.records.contains_key(&record.bundle_guid) {
            return Err(CacheError::DuplicateRecord(record.bundle_guid));
        }
        self.records.insert(record.bundle_guid.clone(), record);
        Ok(())
    }

    pub fn remove(&mut self, guid: &str) -> Option<CacheRecord> {
        self.records.remove(guid)
    }

    /// GUIDs of all records, sorted for stable iteration.
    pub fn guids(&self) -> Vec<String> {
        let mut guids: Vec<String> = self.records.keys().cloned().collect();
        guids.sort();
        guids
    }

    pub fn iter(&self) -> impl Iterator<Item = &CacheRecord> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Drop every record, returning them.
    pub fn drain(&mut self) -> Vec<CacheRecord> {
        self.records.drain().map(|(_, r)| r).collect()
    }
}
