//! # waypost-core
//!
//! Configuration types shared across the Waypost crates.

pub mod config;

pub use config::{
    ActivityConfig, AuditConfig, ConfigError, LoggingConfig, StorageBackend, StorageConfig,
    WaypostConfig,
};
