//! Configuration Module
//!
//! Configuration loading for the recorder.

mod settings;

pub use settings::{ConfigError, IngestConfig, SnapshotSettings, StorageBackend, parse_duration};
