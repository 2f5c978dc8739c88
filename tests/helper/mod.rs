//! Shared fixtures for integration tests

mod seed;

pub use seed::*;
