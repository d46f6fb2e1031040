//! pkgcache - Persisted package metadata cache
//!
//! Keeps package records in memory for instant membership queries,
//! refreshes them through a single-flight coordinator only when they are
//! missing, outdated or expired, and persists the whole cache to one JSON
//! document per deployment.

pub mod cli;
pub mod config;
pub mod error;
pub mod package;
pub mod persistence;
pub mod refresh;
pub mod server_list;
pub mod signal;
pub mod state;

pub use error::{CacheError, CacheResult};
pub use package::{PackageRecord, PackageStore};
pub use persistence::{PersistenceController, SaverHandle};
pub use refresh::{ChangeWatermark, PackageFetcher, RefreshCoordinator, RefreshOutcome};
pub use state::GlobalCacheState;
