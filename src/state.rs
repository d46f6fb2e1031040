//! Process-wide cache state and its persisted document form

use crate::error::CacheResult;
use crate::package::{PackageRecord, PackageStore};
use crate::refresh::{ChangeWatermark, PackageFetcher, RefreshCoordinator, RefreshOutcome};
use crate::server_list::ServerList;
use crate::signal::MutationSignal;
use dashmap::{DashMap, DashSet};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, RwLock};
use tracing::debug;
use uuid::Uuid;

fn is_zero(value: &u32) -> bool {
    *value == 0
}

/// Serialized form of [`GlobalCacheState`]
///
/// Empty and zero fields are omitted; the file path is never part of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateDocument {
    pub identifier: Uuid,

    #[serde(rename = "cellID", default, skip_serializing_if = "is_zero")]
    pub cell_id: u32,

    #[serde(rename = "lastChangeNumber", default, skip_serializing_if = "is_zero")]
    pub last_change_number: u32,

    #[serde(rename = "badBotIDs", default, skip_serializing_if = "BTreeSet::is_empty")]
    pub bad_bot_ids: BTreeSet<u64>,

    #[serde(
        rename = "cardCountsPerGame",
        default,
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub card_counts_per_game: BTreeMap<u32, u8>,

    #[serde(
        rename = "packagesAccessTokens",
        default,
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub packages_access_tokens: BTreeMap<u32, u64>,

    #[serde(
        rename = "packagesData",
        default,
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub packages_data: BTreeMap<u32, PackageRecord>,

    #[serde(rename = "serverList", default, skip_serializing_if = "ServerList::is_empty")]
    pub server_list: ServerList,
}

/// Top-level cache aggregate
///
/// Created once per deployment and kept for the life of the process. Every
/// container shares one [`MutationSignal`] so a single saver can follow all
/// of them.
pub struct GlobalCacheState {
    identifier: Uuid,
    cell_id: AtomicU32,
    watermark: Arc<ChangeWatermark>,
    bad_bot_ids: DashSet<u64>,
    card_counts_per_game: DashMap<u32, u8>,
    server_list: RwLock<ServerList>,
    packages: Arc<PackageStore>,
    coordinator: RefreshCoordinator,
    signal: MutationSignal,
}

impl GlobalCacheState {
    /// Create an empty state with a fresh random identifier
    pub fn new() -> Self {
        Self::with_identifier(Uuid::new_v4())
    }

    fn with_identifier(identifier: Uuid) -> Self {
        let signal = MutationSignal::new();
        let watermark = Arc::new(ChangeWatermark::new(signal.clone()));
        let packages = Arc::new(PackageStore::new(signal.clone()));
        let coordinator = RefreshCoordinator::new(Arc::clone(&packages), Arc::clone(&watermark));

        Self {
            identifier,
            cell_id: AtomicU32::new(0),
            watermark,
            bad_bot_ids: DashSet::new(),
            card_counts_per_game: DashMap::new(),
            server_list: RwLock::new(ServerList::default()),
            packages,
            coordinator,
            signal,
        }
    }

    /// Rebuild state from its persisted document without raising mutations
    pub fn from_document(document: StateDocument) -> Self {
        let state = Self::with_identifier(document.identifier);

        state.cell_id.store(document.cell_id, Ordering::Release);
        state.watermark.restore(document.last_change_number);
        for bot_id in document.bad_bot_ids {
            state.bad_bot_ids.insert(bot_id);
        }
        for (app_id, count) in document.card_counts_per_game {
            state.card_counts_per_game.insert(app_id, count);
        }
        state
            .packages
            .restore(document.packages_data, document.packages_access_tokens);
        *state.server_list_mut() = document.server_list;

        state
    }

    /// Snapshot the whole state into its document form
    pub fn to_document(&self) -> StateDocument {
        StateDocument {
            identifier: self.identifier,
            cell_id: self.cell_id(),
            last_change_number: self.last_change_number(),
            bad_bot_ids: self.bad_bot_ids.iter().map(|id| *id).collect(),
            card_counts_per_game: self
                .card_counts_per_game
                .iter()
                .map(|entry| (*entry.key(), *entry.value()))
                .collect(),
            packages_access_tokens: self.packages.snapshot_access_tokens(),
            packages_data: self.packages.snapshot_records(),
            server_list: self.server_list(),
        }
    }

    /// Opaque instance identity
    pub fn identifier(&self) -> Uuid {
        self.identifier
    }

    /// Signal raised on every persisted change
    pub fn signal(&self) -> &MutationSignal {
        &self.signal
    }

    /// Package records and access tokens
    pub fn packages(&self) -> &PackageStore {
        &self.packages
    }

    /// Refresh coordinator over [`packages`](Self::packages)
    pub fn coordinator(&self) -> &RefreshCoordinator {
        &self.coordinator
    }

    /// Forward a change feed notification to the coordinator
    pub async fn on_change_number_update(
        &self,
        version: u32,
        fetcher: Option<&dyn PackageFetcher>,
    ) -> CacheResult<Option<RefreshOutcome>> {
        self.coordinator.on_change_notification(version, fetcher).await
    }

    pub fn cell_id(&self) -> u32 {
        self.cell_id.load(Ordering::Acquire)
    }

    /// Update the cell id; returns whether it changed
    pub fn set_cell_id(&self, cell_id: u32) -> bool {
        if self.cell_id.swap(cell_id, Ordering::AcqRel) == cell_id {
            return false;
        }

        debug!("Cell id set to {}", cell_id);
        self.signal.raise();
        true
    }

    pub fn last_change_number(&self) -> u32 {
        self.watermark.get()
    }

    /// Overwrite the last seen change number; returns whether it changed
    pub fn set_last_change_number(&self, change_number: u32) -> bool {
        self.watermark.set(change_number)
    }

    /// Mark a bot as bad; returns whether it was newly added
    pub fn add_bad_bot(&self, bot_id: u64) -> bool {
        let added = self.bad_bot_ids.insert(bot_id);
        if added {
            self.signal.raise();
        }
        added
    }

    /// Clear a bot's bad mark; returns whether it was present
    pub fn remove_bad_bot(&self, bot_id: u64) -> bool {
        let removed = self.bad_bot_ids.remove(&bot_id).is_some();
        if removed {
            self.signal.raise();
        }
        removed
    }

    pub fn is_bad_bot(&self, bot_id: u64) -> bool {
        self.bad_bot_ids.contains(&bot_id)
    }

    /// Number of trading cards dropped by a game, if known
    pub fn card_count(&self, app_id: u32) -> Option<u8> {
        self.card_counts_per_game.get(&app_id).map(|c| *c)
    }

    /// Record a game's card count; returns whether it changed
    pub fn set_card_count(&self, app_id: u32, count: u8) -> bool {
        let previous = self.card_counts_per_game.insert(app_id, count);
        if previous == Some(count) {
            return false;
        }

        self.signal.raise();
        true
    }

    /// Copy of the known server list
    pub fn server_list(&self) -> ServerList {
        self.server_list
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Replace the server list; returns whether the endpoints changed
    pub fn set_server_list(&self, list: ServerList) -> bool {
        let mut current = self.server_list_mut();
        if current.same_servers(&list) {
            return false;
        }

        debug!("Server list updated with {} endpoint(s)", list.servers.len());
        *current = list;
        drop(current);

        self.signal.raise();
        true
    }

    fn server_list_mut(&self) -> std::sync::RwLockWriteGuard<'_, ServerList> {
        self.server_list
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for GlobalCacheState {
    fn default() -> Self {
        Self::new()
    }
}
