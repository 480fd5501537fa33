//! Relay Configuration Settings
//!
//! Configuration types for the relay, loaded from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use reqwest::Url;

use crate::infrastructure::protocol::command::CommandType;
use crate::infrastructure::protocol::{DecoderConfig, DuplicateKeyPolicy};
use crate::infrastructure::source::InputSource;

/// Default ingest subject.
pub const DEFAULT_INGEST_SUBJECT: &str = "marketorders.ingest";

/// Ingestion endpoint settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestSettings {
    /// Base URLs of the ingestion endpoints.
    pub destinations: Vec<Url>,
    /// Subject appended to each base URL.
    pub subject: String,
    /// Per-destination publish timeout.
    pub publish_timeout: Duration,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            destinations: Vec::new(),
            subject: DEFAULT_INGEST_SUBJECT.to_string(),
            publish_timeout: Duration::from_millis(5000),
        }
    }
}

/// Local order persistence settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistenceSettings {
    /// Whether each order is also written locally.
    pub enabled: bool,
    /// JSON-lines output file.
    pub path: PathBuf,
}

impl Default for PersistenceSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            path: PathBuf::from("market_orders.jsonl"),
        }
    }
}

/// Byte-stream input settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputSettings {
    /// Where the ordered byte stream is read from.
    pub source: InputSource,
    /// Bytes requested per read.
    pub read_chunk_size: usize,
    /// Chunks buffered between source and processor.
    pub channel_capacity: usize,
}

impl Default for InputSettings {
    fn default() -> Self {
        Self {
            source: InputSource::Stdin,
            read_chunk_size: 4096,
            channel_capacity: 256,
        }
    }
}

/// Server port settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    /// Health check HTTP port (0 = disabled).
    pub health_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { health_port: 8083 }
    }
}

/// Complete relay configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    /// Whether the pipeline runs at all.
    pub enabled: bool,
    /// Ingestion endpoints.
    pub ingest: IngestSettings,
    /// Local persistence.
    pub persistence: PersistenceSettings,
    /// Byte-stream input.
    pub input: InputSettings,
    /// Frame decoder limits.
    pub decoder: DecoderConfig,
    /// Server ports.
    pub server: ServerSettings,
}

impl RelayConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing or a value is invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing or a value is invalid.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = &lookup;

        let enabled = parse_bool(env, "RELAY_ENABLED", true);

        let ingest_defaults = IngestSettings::default();
        let destinations = if enabled {
            parse_destinations(env)?
        } else {
            Vec::new()
        };
        let subject = env("RELAY_INGEST_SUBJECT")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or(ingest_defaults.subject);
        let ingest = IngestSettings {
            destinations,
            subject,
            publish_timeout: parse_duration_millis(
                env,
                "RELAY_PUBLISH_TIMEOUT_MS",
                ingest_defaults.publish_timeout,
            ),
        };
        if ingest.publish_timeout.is_zero() {
            return Err(invalid_value(
                env,
                "RELAY_PUBLISH_TIMEOUT_MS",
                "publish timeout must be at least 1ms",
            ));
        }

        let persistence_defaults = PersistenceSettings::default();
        let persistence = PersistenceSettings {
            enabled: parse_bool(env, "RELAY_PERSISTENCE_ENABLED", persistence_defaults.enabled),
            path: env("RELAY_PERSISTENCE_PATH")
                .filter(|p| !p.trim().is_empty())
                .map_or(persistence_defaults.path, PathBuf::from),
        };

        let input_defaults = InputSettings::default();
        let input = InputSettings {
            source: env("RELAY_INPUT").map_or(input_defaults.source, |v| InputSource::parse(&v)),
            read_chunk_size: parse_usize(
                env,
                "RELAY_READ_CHUNK_SIZE",
                input_defaults.read_chunk_size,
            )
            .max(1),
            channel_capacity: parse_usize(
                env,
                "RELAY_CHUNK_CHANNEL_CAPACITY",
                input_defaults.channel_capacity,
            )
            .max(1),
        };

        let decoder_defaults = DecoderConfig::default();
        let duplicate_keys = match env("RELAY_DUPLICATE_KEYS") {
            Some(value) => DuplicateKeyPolicy::from_str_case_insensitive(value.trim()).ok_or_else(
                || ConfigError::InvalidValue {
                    key: "RELAY_DUPLICATE_KEYS".to_string(),
                    value: value.clone(),
                    reason: "expected `last` or `first`".to_string(),
                },
            )?,
            None => decoder_defaults.duplicate_keys,
        };
        let decoder = DecoderConfig {
            max_command_length: parse_usize(
                env,
                "RELAY_MAX_COMMAND_LENGTH",
                decoder_defaults.max_command_length,
            ),
            max_message_length: parse_usize(
                env,
                "RELAY_MAX_MESSAGE_LENGTH",
                decoder_defaults.max_message_length,
            ),
            max_pending_fragments: parse_usize(
                env,
                "RELAY_MAX_PENDING_FRAGMENTS",
                decoder_defaults.max_pending_fragments,
            )
            .max(1),
            duplicate_keys,
            ..decoder_defaults
        };
        let min_command_length = CommandType::SendFragment.min_length();
        if decoder.max_command_length < min_command_length {
            return Err(invalid_value(
                env,
                "RELAY_MAX_COMMAND_LENGTH",
                &format!("must be at least {min_command_length} to admit fragment commands"),
            ));
        }

        let server = ServerSettings {
            health_port: parse_u16(env, "RELAY_HEALTH_PORT", ServerSettings::default().health_port),
        };

        Ok(Self {
            enabled,
            ingest,
            persistence,
            input,
            decoder,
            server,
        })
    }

    /// Decoder configuration for every stream.
    #[must_use]
    pub fn decoder_config(&self) -> DecoderConfig {
        self.decoder.clone()
    }

    /// Whether the health server should be started.
    #[must_use]
    pub const fn health_enabled(&self) -> bool {
        self.server.health_port != 0
    }
}

/// Configuration error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Environment variable has a value that cannot be used.
    #[error("invalid value {value:?} for {key}: {reason}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// Offending value.
        value: String,
        /// What was expected.
        reason: String,
    },
}

fn parse_destinations(env: &dyn Fn(&str) -> Option<String>) -> Result<Vec<Url>, ConfigError> {
    const KEY: &str = "RELAY_INGEST_DESTINATIONS";

    let raw = env(KEY).ok_or_else(|| ConfigError::MissingEnvVar(KEY.to_string()))?;
    let entries: Vec<&str> = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    if entries.is_empty() {
        return Err(ConfigError::EmptyValue(KEY.to_string()));
    }

    entries
        .into_iter()
        .map(|entry| {
            let invalid = |reason: String| ConfigError::InvalidValue {
                key: KEY.to_string(),
                value: entry.to_string(),
                reason,
            };
            let url = Url::parse(entry).map_err(|e| invalid(e.to_string()))?;
            match url.scheme() {
                "http" | "https" => Ok(url),
                scheme => Err(invalid(format!("unsupported scheme `{scheme}`"))),
            }
        })
        .collect()
}

fn invalid_value(env: &dyn Fn(&str) -> Option<String>, key: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: env(key).unwrap_or_default(),
        reason: reason.to_string(),
    }
}

fn parse_bool(env: &dyn Fn(&str) -> Option<String>, key: &str, default: bool) -> bool {
    env(key).map_or(default, |v| match v.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => true,
        "false" | "0" | "no" | "off" => false,
        _ => default,
    })
}

fn parse_u16(env: &dyn Fn(&str) -> Option<String>, key: &str, default: u16) -> u16 {
    env(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_usize(env: &dyn Fn(&str) -> Option<String>, key: &str, default: usize) -> usize {
    env(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_duration_millis(
    env: &dyn Fn(&str) -> Option<String>,
    key: &str,
    default: Duration,
) -> Duration {
    env(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map_or(default, Duration::from_millis)
}
