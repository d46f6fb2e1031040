//! Coordinated refresh of package records
//!
//! A change feed reports the latest global change number. The watermark
//! drops notifications that do not move it forward; the coordinator then
//! fetches only the packages that are actually stale, one refresh at a time.
//!
//! # Refresh States
//!
//! | State | Description |
//! |-------|-------------|
//! | Idle | Gate free, next caller proceeds immediately |
//! | Refreshing | Gate held, later callers wait their turn |

pub mod coordinator;
pub mod fetcher;
pub mod watermark;

pub use coordinator::{RefreshCoordinator, RefreshOutcome};
pub use fetcher::PackageFetcher;
pub use watermark::ChangeWatermark;
