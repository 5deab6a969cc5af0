//! Configuration module for image scans
//!
//! This module provides the `ScanConfig` struct, its type-safe builder and the
//! one-shot environment loader used at process startup.

// Sub-modules
pub mod builder;
pub mod env;
pub mod getters;
pub mod methods;
pub mod types;

// Re-exports for public API
pub use builder::{ScanConfigBuilder, WithStorageDir};
pub use types::ScanConfig;
