//! Single-flight refresh coordination

use crate::error::{CacheError, CacheResult};
use crate::package::{PackageRecord, PackageStore};
use crate::refresh::fetcher::PackageFetcher;
use crate::refresh::watermark::ChangeWatermark;
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Result of a single refresh call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Nothing requested was stale, no fetch was made
    UpToDate,
    /// The fetcher returned no data, the store was left untouched
    FetchFailed,
    /// `count` records were written to the store
    Refreshed { count: usize },
}

/// Serializes refreshes and decides what needs fetching
///
/// All refreshes share one gate. The fetch channel behind it is a single
/// connection, so finer-grained locking would buy nothing.
pub struct RefreshCoordinator {
    store: Arc<PackageStore>,
    watermark: Arc<ChangeWatermark>,
    gate: Mutex<()>,
    clock: Clock,
}

impl RefreshCoordinator {
    /// Create a coordinator over `store` gated by `watermark`
    pub fn new(store: Arc<PackageStore>, watermark: Arc<ChangeWatermark>) -> Self {
        Self {
            store,
            watermark,
            gate: Mutex::new(()),
            clock: Arc::new(Utc::now),
        }
    }

    /// Replace the wall clock used for expiry checks
    pub fn with_clock(
        mut self,
        clock: impl Fn() -> DateTime<Utc> + Send + Sync + 'static,
    ) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Handle a change number reported by the change feed
    ///
    /// Returns `None` when the notification was ignored or no refresh was
    /// attempted.
    pub async fn on_change_notification(
        &self,
        current_version: u32,
        fetcher: Option<&dyn PackageFetcher>,
    ) -> CacheResult<Option<RefreshOutcome>> {
        if current_version == 0 {
            return Err(CacheError::invalid_argument(
                "current_version",
                "must be non-zero",
            ));
        }

        if !self.watermark.advance(current_version) {
            debug!(
                "Ignoring change number {} (last seen {})",
                current_version,
                self.watermark.get()
            );
            return Ok(None);
        }

        let Some(fetcher) = fetcher else {
            debug!("No fetcher available, skipping refresh for {}", current_version);
            return Ok(None);
        };

        let requested: HashMap<u32, u32> = self
            .store
            .package_ids()
            .into_iter()
            .map(|package_id| (package_id, current_version))
            .collect();

        if requested.is_empty() {
            return Ok(None);
        }

        self.refresh(Some(fetcher), &requested).await.map(Some)
    }

    /// Bring the requested packages up to at least the given change numbers
    ///
    /// Waits for any refresh already in progress, then fetches only the
    /// packages that are missing, behind or expired.
    pub async fn refresh(
        &self,
        fetcher: Option<&dyn PackageFetcher>,
        requested: &HashMap<u32, u32>,
    ) -> CacheResult<RefreshOutcome> {
        let fetcher =
            fetcher.ok_or_else(|| CacheError::invalid_argument("fetcher", "must be present"))?;
        if requested.is_empty() {
            return Err(CacheError::invalid_argument("requested", "must not be empty"));
        }

        let _guard = self.gate.lock().await;

        let stale = self.stale_subset(requested);
        if stale.is_empty() {
            debug!("All {} requested package(s) are fresh", requested.len());
            return Ok(RefreshOutcome::UpToDate);
        }

        debug!("Fetching {} stale package(s)", stale.len());
        let fetched = match fetcher.fetch_package_data(&stale).await {
            Some(fetched) if !fetched.is_empty() => fetched,
            _ => {
                warn!("{}", CacheError::FetchFailure { requested: stale.len() });
                return Ok(RefreshOutcome::FetchFailed);
            }
        };

        let accepted = self.accept_newer(fetched);
        let count = accepted.len();
        self.store.upsert_records(accepted)?;

        info!("Refreshed {} package(s)", count);
        Ok(RefreshOutcome::Refreshed { count })
    }

    fn stale_subset(&self, requested: &HashMap<u32, u32>) -> BTreeSet<u32> {
        let now = (self.clock)();
        let mut stale = BTreeSet::new();

        for (&package_id, &change_number) in requested {
            if package_id == 0 {
                continue;
            }
            let is_stale = self
                .store
                .get(package_id)
                .map_or(true, |record| record.is_stale_for(change_number, now));
            if is_stale {
                stale.insert(package_id);
            }
        }

        stale
    }

    /// Drop fetched records that would move a stored change number back
    fn accept_newer(
        &self,
        fetched: HashMap<u32, PackageRecord>,
    ) -> HashMap<u32, PackageRecord> {
        fetched
            .into_iter()
            .filter(|(package_id, record)| {
                if *package_id == 0 {
                    return false;
                }
                match self.store.get(*package_id) {
                    Some(stored) if stored.change_number > record.change_number => {
                        debug!(
                            "Discarding package {} at change {} (stored {})",
                            package_id, record.change_number, stored.change_number
                        );
                        false
                    }
                    _ => true,
                }
            })
            .collect()
    }
}
