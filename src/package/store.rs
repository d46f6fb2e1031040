//! Concurrent package store

use crate::error::{CacheError, CacheResult};
use crate::package::record::PackageRecord;
use crate::signal::MutationSignal;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::debug;

/// Package id → record and package id → access token maps
///
/// Access tokens live in their own map because they are refreshed on a
/// different cadence than full records. Every key is non-zero.
#[derive(Debug)]
pub struct PackageStore {
    records: DashMap<u32, PackageRecord>,
    access_tokens: DashMap<u32, u64>,
    signal: MutationSignal,
}

impl PackageStore {
    /// Create an empty store raising mutations on `signal`
    pub fn new(signal: MutationSignal) -> Self {
        Self {
            records: DashMap::new(),
            access_tokens: DashMap::new(),
            signal,
        }
    }

    /// Return the candidates that grant `group_id`
    ///
    /// Zero candidates and ids not present in the store are skipped. At most
    /// `limit` ids are returned; `None` means unlimited. Order carries no
    /// meaning.
    pub fn lookup_by_group(
        &self,
        group_id: u32,
        candidates: impl IntoIterator<Item = u32>,
        limit: Option<usize>,
    ) -> CacheResult<HashSet<u32>> {
        if group_id == 0 {
            return Err(CacheError::invalid_argument("group_id", "must be non-zero"));
        }

        let mut found = HashSet::new();
        if limit == Some(0) {
            return Ok(found);
        }

        for package_id in candidates {
            if package_id == 0 || found.contains(&package_id) {
                continue;
            }

            let grants = self
                .records
                .get(&package_id)
                .is_some_and(|record| record.contains_group(group_id));

            if grants {
                found.insert(package_id);
                if limit.is_some_and(|limit| found.len() >= limit) {
                    break;
                }
            }
        }

        Ok(found)
    }

    /// Store access tokens, raising a single mutation if any value changed
    pub fn upsert_access_tokens(&self, tokens: &HashMap<u32, u64>) -> CacheResult<()> {
        if tokens.is_empty() {
            return Err(CacheError::invalid_argument("tokens", "must not be empty"));
        }
        if tokens.contains_key(&0) {
            return Err(CacheError::invalid_argument(
                "tokens",
                "package id must be non-zero",
            ));
        }

        let mut changed = 0usize;
        for (&package_id, &token) in tokens {
            match self.access_tokens.entry(package_id) {
                Entry::Occupied(mut entry) => {
                    if *entry.get() != token {
                        entry.insert(token);
                        changed += 1;
                    }
                }
                Entry::Vacant(entry) => {
                    entry.insert(token);
                    changed += 1;
                }
            }
        }

        if changed > 0 {
            debug!("Updated {} package access token(s)", changed);
            self.signal.raise();
        }

        Ok(())
    }

    /// Overwrite records wholesale, raising a single mutation
    pub fn upsert_records(&self, records: HashMap<u32, PackageRecord>) -> CacheResult<()> {
        if records.contains_key(&0) {
            return Err(CacheError::invalid_argument(
                "records",
                "package id must be non-zero",
            ));
        }
        if records.is_empty() {
            return Ok(());
        }

        let count = records.len();
        for (package_id, record) in records {
            self.records.insert(package_id, record);
        }

        debug!("Stored {} package record(s)", count);
        self.signal.raise();
        Ok(())
    }

    /// Get a copy of a stored record
    pub fn get(&self, package_id: u32) -> Option<PackageRecord> {
        self.records.get(&package_id).map(|r| r.value().clone())
    }

    /// Get the stored access token for a package
    pub fn access_token(&self, package_id: u32) -> Option<u64> {
        self.access_tokens.get(&package_id).map(|t| *t.value())
    }

    /// All package ids with a stored record
    pub fn package_ids(&self) -> Vec<u32> {
        self.records.iter().map(|r| *r.key()).collect()
    }

    /// Number of stored records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no record is stored
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of stored access tokens
    pub fn access_token_count(&self) -> usize {
        self.access_tokens.len()
    }

    /// Ordered copy of all records
    pub fn snapshot_records(&self) -> BTreeMap<u32, PackageRecord> {
        self.records
            .iter()
            .map(|r| (*r.key(), r.value().clone()))
            .collect()
    }

    /// Ordered copy of all access tokens
    pub fn snapshot_access_tokens(&self) -> BTreeMap<u32, u64> {
        self.access_tokens
            .iter()
            .map(|t| (*t.key(), *t.value()))
            .collect()
    }

    /// Fill the store from persisted data without raising mutations
    pub(crate) fn restore(
        &self,
        records: BTreeMap<u32, PackageRecord>,
        access_tokens: BTreeMap<u32, u64>,
    ) {
        for (package_id, record) in records.into_iter().filter(|(id, _)| *id != 0) {
            self.records.insert(package_id, record);
        }
        for (package_id, token) in access_tokens.into_iter().filter(|(id, _)| *id != 0) {
            self.access_tokens.insert(package_id, token);
        }
    }
}
