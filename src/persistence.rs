//! Loading and saving the cache database
//!
//! The database is one JSON document per deployment. A single background
//! saver follows the state's mutation signal and writes once per quiet
//! period, so a burst of changes costs one write.

use crate::error::{CacheError, CacheResult};
use crate::state::{GlobalCacheState, StateDocument};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{sleep, sleep_until, Instant};
use tracing::{debug, error, info, warn};

/// Upper bound on how long a steady stream of changes can defer a save,
/// as a multiple of the debounce period
const MAX_DEFER_FACTOR: u32 = 8;

/// Owns the bound database path and writes the state to it
pub struct PersistenceController {
    state: Arc<GlobalCacheState>,
    path: Option<PathBuf>,
    save_lock: Mutex<()>,
    saves_completed: AtomicU64,
    saved_generation: AtomicU64,
}

impl PersistenceController {
    /// Wrap `state`, saving to `path` if one is given
    ///
    /// Mutations already raised on `state` count as persisted.
    pub fn new(state: Arc<GlobalCacheState>, path: Option<PathBuf>) -> Self {
        let saved_generation = AtomicU64::new(state.signal().generation());
        Self {
            state,
            path,
            save_lock: Mutex::new(()),
            saves_completed: AtomicU64::new(0),
            saved_generation,
        }
    }

    /// Load the database at `path`, or create a fresh one if none exists
    ///
    /// A fresh database is written in the background; a failure there is
    /// only logged. An existing file that is empty or does not parse is an
    /// error and no state is produced.
    pub async fn create_or_load(path: impl Into<PathBuf>) -> CacheResult<Arc<Self>> {
        let path = path.into();

        let exists = fs::try_exists(&path).await.map_err(|e| {
            CacheError::io(format!("checking database {}", path.display()), e)
        })?;

        if !exists {
            info!("No database at {}, creating a new one", path.display());
            let controller = Arc::new(Self::new(Arc::new(GlobalCacheState::new()), Some(path)));

            let initial = Arc::clone(&controller);
            tokio::spawn(async move {
                initial.save_logged().await;
            });

            return Ok(controller);
        }

        let state = Self::load(&path).await.inspect_err(|e| {
            error!("{}", e);
        })?;

        debug!(
            "Loaded database {} ({} packages)",
            path.display(),
            state.packages().len()
        );
        Ok(Arc::new(Self::new(Arc::new(state), Some(path))))
    }

    async fn load(path: &Path) -> CacheResult<GlobalCacheState> {
        let content = fs::read(path)
            .await
            .map_err(|e| CacheError::io(format!("reading database {}", path.display()), e))?;

        if content.is_empty() {
            return Err(CacheError::EmptyFile(path.to_path_buf()));
        }

        let document: Option<StateDocument> =
            serde_json::from_slice(&content).map_err(|e| CacheError::DeserializationFailure {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        let document = document.ok_or_else(|| CacheError::DeserializationFailure {
            path: path.to_path_buf(),
            reason: "document is null".to_string(),
        })?;

        Ok(GlobalCacheState::from_document(document))
    }

    /// The cached state
    pub fn state(&self) -> &Arc<GlobalCacheState> {
        &self.state
    }

    /// The bound database path, if any
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Number of saves that reached disk
    pub fn saves_completed(&self) -> u64 {
        self.saves_completed.load(Ordering::Acquire)
    }

    /// Whether mutations were raised since the last completed save
    pub fn has_unsaved_changes(&self) -> bool {
        self.state.signal().generation() != self.saved_generation.load(Ordering::Acquire)
    }

    /// Write the whole state to the bound path
    ///
    /// Does nothing when no path is bound. Saves never interleave; the
    /// document is written to a sibling temporary file and renamed over the
    /// database so a crash mid-write leaves the previous version intact.
    pub async fn save(&self) -> CacheResult<()> {
        let Some(path) = self.path.as_deref() else {
            return Ok(());
        };

        let _guard = self.save_lock.lock().await;

        // Read before snapshotting so a concurrent mutation stays unsaved
        let generation = self.state.signal().generation();
        let content = serde_json::to_string_pretty(&self.state.to_document())?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| CacheError::io("creating database directory", e))?;
        }

        let temp = temp_path(path);
        fs::write(&temp, content)
            .await
            .map_err(|e| CacheError::io(format!("writing database {}", temp.display()), e))?;
        fs::rename(&temp, path)
            .await
            .map_err(|e| CacheError::io(format!("replacing database {}", path.display()), e))?;

        self.saved_generation.fetch_max(generation, Ordering::AcqRel);
        self.saves_completed.fetch_add(1, Ordering::AcqRel);
        debug!("Saved database to {}", path.display());
        Ok(())
    }

    async fn save_logged(&self) {
        if let Err(e) = self.save().await {
            error!("Failed to save database: {}", e);
        }
    }

    /// Start the background saver
    ///
    /// After a change the saver waits until no further change arrives for
    /// `debounce`, then saves once. A steady stream of changes is flushed at
    /// least every `debounce * 8`. Changes raised before the saver started
    /// are picked up immediately.
    pub fn spawn_saver(self: &Arc<Self>, debounce: Duration) -> SaverHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let mut listener = self.state.signal().subscribe();
        let controller = Arc::clone(self);

        let task = tokio::spawn(async move {
            let mut pending = controller.has_unsaved_changes();
            loop {
                if !pending {
                    tokio::select! {
                        _ = listener.changed() => {}
                        _ = shutdown_rx.changed() => break,
                    }
                }
                pending = false;

                let deadline = Instant::now() + debounce.saturating_mul(MAX_DEFER_FACTOR);
                let mut stopping = false;
                loop {
                    tokio::select! {
                        _ = sleep(debounce) => break,
                        _ = sleep_until(deadline) => break,
                        _ = listener.changed() => {}
                        _ = shutdown_rx.changed() => {
                            stopping = true;
                            break;
                        }
                    }
                }

                controller.save_logged().await;
                if stopping {
                    return;
                }
            }

            if controller.has_unsaved_changes() {
                controller.save_logged().await;
            }
        });

        SaverHandle {
            shutdown: shutdown_tx,
            task,
        }
    }
}

/// Handle to the background saver
///
/// Call [`shutdown`](Self::shutdown) before the runtime exits. A dropped
/// handle leaves the task detached and its final flush may never run.
pub struct SaverHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SaverHandle {
    /// Stop the saver, flushing any change it has not written yet
    pub async fn shutdown(self) {
        // Err only means the task already exited
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            warn!("Database saver ended abnormally: {}", e);
        }
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::PackageRecord;
    use chrono::{Duration as ChronoDuration, Utc};
    use std::collections::HashMap;
    use tempfile::TempDir;

    async fn wait_for_file(path: &Path) {
        for _ in 0..100 {
            if path.exists() {
                return;
            }
            sleep(Duration::from_millis(10)).await;
        }
        panic!("{} was never written", path.display());
    }

    async fn bound(dir: &TempDir) -> Arc<PersistenceController> {
        let path = dir.path().join("cache.json");
        let seed = PersistenceController::new(Arc::new(GlobalCacheState::new()), Some(path.clone()));
        seed.save().await.unwrap();
        PersistenceController::create_or_load(path).await.unwrap()
    }

    #[tokio::test]
    async fn creates_fresh_database_when_missing() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("cache.json");

        let controller = PersistenceController::create_or_load(&path).await.unwrap();
        wait_for_file(&path).await;

        let reloaded = PersistenceController::create_or_load(&path).await.unwrap();
        assert_eq!(
            reloaded.state().identifier(),
            controller.state().identifier()
        );
        assert_eq!(controller.path(), Some(path.as_path()));
    }

    #[tokio::test]
    async fn empty_file_is_rejected() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("cache.json");
        std::fs::write(&path, b"").unwrap();

        let err = PersistenceController::create_or_load(&path)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, CacheError::EmptyFile(_)));
        assert!(err.is_no_database());
    }

    #[tokio::test]
    async fn malformed_file_is_rejected() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("cache.json");

        for content in ["{not json", "null", "{}"] {
            std::fs::write(&path, content).unwrap();
            let err = PersistenceController::create_or_load(&path)
                .await
                .err()
                .unwrap();
            assert!(
                matches!(err, CacheError::DeserializationFailure { .. }),
                "unexpected error for {:?}: {}",
                content,
                err
            );
        }
    }

    #[tokio::test]
    async fn save_then_load_roundtrip() {
        let temp = TempDir::new().unwrap();
        let controller = bound(&temp).await;
        let state = controller.state();

        state.set_cell_id(9);
        state.set_last_change_number(1234);
        state.add_bad_bot(42);
        state.set_card_count(570, 3);
        state
            .packages()
            .upsert_access_tokens(&HashMap::from([(200, 999)]))
            .unwrap();
        state
            .packages()
            .upsert_records(HashMap::from([(
                100,
                PackageRecord::new([1, 2, 3], 5, Utc::now() + ChronoDuration::days(1)),
            )]))
            .unwrap();
        controller.save().await.unwrap();

        let path = controller.path().unwrap().to_path_buf();
        let reloaded = PersistenceController::create_or_load(&path).await.unwrap();

        assert_eq!(reloaded.state().to_document(), state.to_document());
        assert!(!temp_path(&path).exists());
    }

    #[tokio::test]
    async fn save_without_path_is_noop() {
        let controller = PersistenceController::new(Arc::new(GlobalCacheState::new()), None);
        controller.save().await.unwrap();
        assert_eq!(controller.saves_completed(), 0);
    }

    #[tokio::test]
    async fn saver_coalesces_bursts() {
        let temp = TempDir::new().unwrap();
        let controller = bound(&temp).await;
        let saver = controller.spawn_saver(Duration::from_millis(50));

        for bot_id in 1..=20 {
            controller.state().add_bad_bot(bot_id);
        }
        sleep(Duration::from_millis(300)).await;

        assert_eq!(controller.saves_completed(), 1);
        saver.shutdown().await;
        assert_eq!(controller.saves_completed(), 1);
    }

    #[tokio::test]
    async fn shutdown_flushes_pending_changes() {
        let temp = TempDir::new().unwrap();
        let controller = bound(&temp).await;
        let saver = controller.spawn_saver(Duration::from_secs(60));

        controller.state().set_cell_id(77);
        saver.shutdown().await;

        let path = controller.path().unwrap().to_path_buf();
        let reloaded = PersistenceController::create_or_load(&path).await.unwrap();
        assert_eq!(reloaded.state().cell_id(), 77);
    }

    #[tokio::test]
    async fn idle_saver_does_not_write() {
        let temp = TempDir::new().unwrap();
        let controller = bound(&temp).await;
        let saver = controller.spawn_saver(Duration::from_millis(10));

        sleep(Duration::from_millis(50)).await;
        saver.shutdown().await;

        assert_eq!(controller.saves_completed(), 0);
    }

    #[tokio::test]
    async fn saver_picks_up_changes_made_before_start() {
        let temp = TempDir::new().unwrap();
        let controller = bound(&temp).await;

        controller.state().set_cell_id(77);
        assert!(controller.has_unsaved_changes());

        let saver = controller.spawn_saver(Duration::from_millis(10));
        sleep(Duration::from_millis(100)).await;
        saver.shutdown().await;

        assert_eq!(controller.saves_completed(), 1);
        assert!(!controller.has_unsaved_changes());
        let path = controller.path().unwrap().to_path_buf();
        let reloaded = PersistenceController::create_or_load(&path).await.unwrap();
        assert_eq!(reloaded.state().cell_id(), 77);
    }

    #[tokio::test]
    async fn shutdown_flushes_changes_made_before_start() {
        let temp = TempDir::new().unwrap();
        let controller = bound(&temp).await;

        controller.state().add_bad_bot(9);
        let saver = controller.spawn_saver(Duration::from_secs(60));
        saver.shutdown().await;

        let path = controller.path().unwrap().to_path_buf();
        let reloaded = PersistenceController::create_or_load(&path).await.unwrap();
        assert!(reloaded.state().is_bad_bot(9));
    }

    #[tokio::test]
    async fn unreadable_location_is_not_treated_as_missing() {
        let temp = TempDir::new().unwrap();
        let blocker = temp.path().join("not-a-dir");
        std::fs::write(&blocker, b"keep").unwrap();

        let result = PersistenceController::create_or_load(blocker.join("cache.json")).await;

        assert!(matches!(result, Err(CacheError::Io { .. })));
        assert_eq!(std::fs::read(&blocker).unwrap(), b"keep");
    }

    #[test]
    fn temp_path_is_sibling() {
        let path = Path::new("/var/lib/pkgcache/cache.json");
        assert_eq!(
            temp_path(path),
            PathBuf::from("/var/lib/pkgcache/cache.json.tmp")
        );
    }
}
