//! Configuration Module
//!
//! Environment-driven configuration for the relay.

mod settings;

pub use settings::{
    ConfigError, DEFAULT_INGEST_SUBJECT, IngestSettings, InputSettings, PersistenceSettings,
    RelayConfig, ServerSettings,
};
