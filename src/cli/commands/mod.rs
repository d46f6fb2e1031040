//! CLI command implementations

pub mod config;
pub mod lookup;
pub mod show;

pub use config::execute as config;
pub use lookup::execute as lookup;
pub use show::execute as show;

use crate::config::{Config, ConfigManager};
use crate::error::{CacheError, CacheResult};
use crate::persistence::{PersistenceController, SaverHandle};
use crate::state::GlobalCacheState;
use std::path::Path;
use std::sync::Arc;
use tokio::fs;
use tracing::debug;

/// The configured database with its background saver running
struct Database {
    controller: Arc<PersistenceController>,
    saver: SaverHandle,
}

impl Database {
    /// Open the configured database, creating and writing it if missing
    async fn open(config: &Config) -> CacheResult<Self> {
        let path = ConfigManager::database_path(config);
        let existed = fs::try_exists(&path).await.map_err(|e| {
            CacheError::io(format!("checking database {}", path.display()), e)
        })?;

        let controller = PersistenceController::create_or_load(&path).await?;
        if !existed {
            // The background initial save may not finish before we exit
            controller.save().await?;
            debug!("Created database at {}", path.display());
        }

        let saver = controller.spawn_saver(config.database.save_debounce());
        Ok(Self { controller, saver })
    }

    fn state(&self) -> &GlobalCacheState {
        self.controller.state()
    }

    fn path(&self) -> Option<&Path> {
        self.controller.path()
    }

    /// Stop the saver, writing any change made while the database was open
    async fn close(self) {
        self.saver.shutdown().await;
    }
}
