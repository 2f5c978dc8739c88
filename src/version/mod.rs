//! Version channel classification and ordering
//!
//! Pure functions with no I/O. Everything that decides which version is
//! "latest" or "previous" lives here so the store views and the catalog
//! engine agree on one order.
//!
//! # Modules
//!
//! - [`channel`]: The `Channel` enumeration and its stability order
//! - [`classifier`]: Channel detection, ordering keys, slug/version validation
//! - [`history`]: Last N majors × M minors window selection

pub mod channel;
pub mod classifier;
pub mod history;

pub use channel::Channel;
pub use classifier::{Classification, OrderingKey, classify};
