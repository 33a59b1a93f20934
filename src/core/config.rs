//! Configuration for the entity sync core
//!
//! Settings are layered: built-in defaults, then an optional TOML file, then
//! `ES_`-prefixed environment variables (`ES_LOGGING__LEVEL=debug`).

use crate::core::error::{Error, Result};
use crate::storage::StoreDefinition;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "ES";

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Logging configuration
    pub logging: LoggingConfig,

    /// Remote synchronisation settings shared by all stores
    pub sync: SyncConfig,

    /// Metrics configuration
    pub metrics: MetricsConfig,

    /// One entry per entity kind
    pub stores: Vec<StoreDefinition>,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (json, pretty)
    pub format: String,
}

/// Synchronisation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Default timeout applied to every remote call
    #[serde(with = "duration")]
    pub request_timeout: Duration,

    /// Event published when a retrieval fails
    pub error_event: String,
}

/// Metrics configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Collect Prometheus metrics
    pub enabled: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            error_event: crate::bus::events::ERROR.to_string(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl Config {
    /// Load configuration from defaults, an optional file, and the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let defaults = config::Config::try_from(&Config::default())
            .map_err(|e| Error::config(format!("Failed to build defaults: {}", e)))?;

        let mut builder = config::Config::builder().add_source(defaults);

        if let Some(path) = path {
            builder = builder.add_source(
                config::File::from(path)
                    .format(config::FileFormat::Toml)
                    .required(true),
            );
        }

        let config: Config = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()
            .and_then(|built| built.try_deserialize())
            .map_err(|e| Error::config(format!("Failed to load configuration: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file, without environment overrides
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)
            .map_err(|e| Error::config(format!("Failed to parse config file: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Timeout for a store, falling back to the shared default
    pub fn timeout_for(&self, definition: &StoreDefinition) -> Duration {
        definition.timeout.unwrap_or(self.sync.request_timeout)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        match self.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => return Err(Error::config(format!("Invalid log level: {}", other))),
        }

        match self.logging.format.as_str() {
            "pretty" | "json" => {}
            other => return Err(Error::config(format!("Invalid log format: {}", other))),
        }

        if self.sync.request_timeout.is_zero() {
            return Err(Error::config("Request timeout must be greater than zero"));
        }

        if self.sync.error_event.is_empty() {
            return Err(Error::config("Error event name must not be empty"));
        }

        let mut seen = HashSet::new();
        for store in &self.stores {
            if store.singular.is_empty() || store.plural.is_empty() {
                return Err(Error::config("Store object types must not be empty"));
            }
            if !seen.insert(store.plural.as_str()) {
                return Err(Error::config(format!("Duplicate store: {}", store.plural)));
            }
            if store.timeout.is_some_and(|t| t.is_zero()) {
                return Err(Error::config(format!("Zero timeout for store {}", store.plural)));
            }
        }

        Ok(())
    }
}

/// Serde adapter for human-readable durations ("250ms", "10s", "5m", "1h")
pub mod duration {
    use serde::de::{self, Deserializer, Visitor};
    use serde::Serializer;
    use std::fmt;
    use std::time::Duration;

    /// Serialize as milliseconds with a unit suffix
    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("{}ms", value.as_millis()))
    }

    /// Deserialize from a suffixed string or a raw number of seconds
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        deserializer.deserialize_any(DurationVisitor)
    }

    struct DurationVisitor;

    impl<'de> Visitor<'de> for DurationVisitor {
        type Value = Duration;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a duration string like '30s' or '5m'")
        }

        fn visit_str<E: de::Error>(self, value: &str) -> Result<Duration, E> {
            parse_duration(value).map_err(E::custom)
        }

        fn visit_u64<E: de::Error>(self, value: u64) -> Result<Duration, E> {
            Ok(Duration::from_secs(value))
        }

        fn visit_i64<E: de::Error>(self, value: i64) -> Result<Duration, E> {
            u64::try_from(value)
                .map(Duration::from_secs)
                .map_err(|_| E::custom("duration must not be negative"))
        }
    }

    /// Parse a duration such as "250ms", "10s", "5m", "1h" or "30"
    pub fn parse_duration(s: &str) -> Result<Duration, String> {
        let s = s.trim();
        let parse = |digits: &str| -> Result<u64, String> {
            digits.trim().parse().map_err(|_| format!("Invalid duration: {}", s))
        };

        if let Some(ms) = s.strip_suffix("ms") {
            Ok(Duration::from_millis(parse(ms)?))
        } else if let Some(secs) = s.strip_suffix('s') {
            Ok(Duration::from_secs(parse(secs)?))
        } else if let Some(mins) = s.strip_suffix('m') {
            Ok(Duration::from_secs(parse(mins)? * 60))
        } else if let Some(hours) = s.strip_suffix('h') {
            Ok(Duration::from_secs(parse(hours)? * 3600))
        } else {
            Ok(Duration::from_secs(parse(s)?))
        }
    }

    /// Same adapter for `Option<Duration>`
    pub mod option {
        use serde::{Deserialize, Deserializer, Serializer};
        use std::time::Duration;

        #[derive(Deserialize)]
        struct Wrapped(#[serde(with = "super")] Duration);

        /// Serialize `Some` as a suffixed string, `None` as unit
        pub fn serialize<S: Serializer>(
            value: &Option<Duration>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(d) => super::serialize(d, serializer),
                None => serializer.serialize_none(),
            }
        }

        /// Deserialize an optional duration
        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<Duration>, D::Error> {
            Ok(Option::<Wrapped>::deserialize(deserializer)?.map(|Wrapped(d)| d))
        }
    }
}
