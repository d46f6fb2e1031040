//! Package records and the concurrent store holding them
//!
//! A package groups entitlements under a numeric id. Each record carries
//! the group (app) ids it grants, the change number it was fetched at and
//! the moment it stops being trustworthy.

pub mod record;
pub mod store;

pub use record::PackageRecord;
pub use store::PackageStore;
