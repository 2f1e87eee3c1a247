//! lanmedia-catalog: the persisted media catalog and the tasks that fill it.
//!
//! - [`store`]: [`Catalog`], the on-disk document, schema version, mutation
//!   counter and persisted update id
//! - [`scanner`]: breadth-first directory scan into the catalog
//! - [`watch`]: live filesystem watch thread
//! - [`error`]: [`CatalogError`]

pub mod error;
pub mod scanner;
pub mod store;
pub mod watch;

pub use error::CatalogError;
pub use scanner::{rescan_all, scan_directory, ScanSummary};
pub use store::{Catalog, MediaItem, Upsert, CATALOG_VERSION};
pub use watch::WatchHandle;
