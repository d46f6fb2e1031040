//! Fetch collaborator interface

use crate::package::PackageRecord;
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};

/// Source of authoritative package records
///
/// Implemented by whatever owns a live connection. Timeouts and retries
/// are the implementor's concern; the coordinator calls it at most once
/// per refresh.
#[async_trait]
pub trait PackageFetcher: Send + Sync {
    /// Fetch records for `ids`
    ///
    /// `None` or an empty map signals failure.
    async fn fetch_package_data(&self, ids: &BTreeSet<u32>)
        -> Option<HashMap<u32, PackageRecord>>;
}
