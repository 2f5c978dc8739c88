//! Catalog engine over a document store
//!
//! # Modules
//!
//! - [`types`]: Apps, versions and computed aggregates
//! - [`space`]: Space partitions, collections and their index definitions
//! - [`finders`]: App and version lookups, latest and last-N resolution
//! - [`query`]: Filtered, sorted and paginated app listings

pub mod finders;
pub mod query;
pub mod space;
pub mod types;

pub use finders::Catalog;
pub use query::{AppsListOptions, END_OF_LIST, FilterField, Sort, SortField};
pub use space::{Collection, Space};
pub use types::{App, AppVersions, Label, Version};
