pub mod cache;
pub mod catalog;
pub mod config;
pub mod error;
pub mod store;
pub mod version;
