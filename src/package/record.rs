//! Package record data

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Cached metadata for one package
///
/// The package id is the key under which the record is stored and is not
/// part of the serialized form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageRecord {
    /// Group (app) ids granted by this package
    #[serde(rename = "appIDs", default)]
    pub app_ids: BTreeSet<u32>,

    /// Change number the record was fetched at
    #[serde(rename = "changeNumber")]
    pub change_number: u32,

    /// When the record must be refetched regardless of change number
    #[serde(rename = "validUntil")]
    pub valid_until: DateTime<Utc>,

    /// Access token used to request this package
    #[serde(rename = "accessToken", default)]
    pub access_token: u64,
}

impl PackageRecord {
    /// Create a new record
    pub fn new(
        app_ids: impl IntoIterator<Item = u32>,
        change_number: u32,
        valid_until: DateTime<Utc>,
    ) -> Self {
        Self {
            app_ids: app_ids.into_iter().collect(),
            change_number,
            valid_until,
            access_token: 0,
        }
    }

    /// Set the access token
    pub fn with_access_token(mut self, access_token: u64) -> Self {
        self.access_token = access_token;
        self
    }

    /// Whether the record has expired at `now`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.valid_until <= now
    }

    /// Whether the record must be refetched to satisfy `requested_change`
    pub fn is_stale_for(&self, requested_change: u32, now: DateTime<Utc>) -> bool {
        self.change_number < requested_change || self.is_expired_at(now)
    }

    /// Whether the package grants the given group
    pub fn contains_group(&self, group_id: u32) -> bool {
        self.app_ids.contains(&group_id)
    }
}
