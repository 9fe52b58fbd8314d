//! Tracker configuration and schema versions.
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::constants::{
    DEFAULT_STORAGE_NAMESPACE, DEFAULT_TICK_INTERVAL_MS, MAX_TICK_INTERVAL_MS,
    MIN_TICK_INTERVAL_MS, STORAGE_SUFFIX_V1, STORAGE_SUFFIX_V2, V1_ACCUMULATION_WINDOW,
    V1_HISTORY_CAPACITY, V2_ACCUMULATION_WINDOW, V2_HISTORY_CAPACITY,
};
use crate::selector::SortDirection;

/// Persisted sample format.
///
/// Versions never read each other's data: each one owns its own storage
/// identifier, and bumping the version orphans the old blob instead of
/// migrating it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SchemaVersion {
    /// Raw per-tick deltas.
    V1,
    /// Windowed rate samples.
    #[default]
    V2,
}

/// Sampling parameters fixed by a schema version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplingParams {
    /// Ticks accumulated into one rate sample.
    pub accumulation_window: u32,
    /// Samples retained per activity.
    pub history_capacity: usize,
}

impl SchemaVersion {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::V1 => "v1",
            Self::V2 => "v2",
        }
    }

    #[must_use]
    pub const fn params(self) -> SamplingParams {
        match self {
            Self::V1 => SamplingParams {
                accumulation_window: V1_ACCUMULATION_WINDOW,
                history_capacity: V1_HISTORY_CAPACITY,
            },
            Self::V2 => SamplingParams {
                accumulation_window: V2_ACCUMULATION_WINDOW,
                history_capacity: V2_HISTORY_CAPACITY,
            },
        }
    }

    const fn storage_suffix(self) -> &'static str {
        match self {
            Self::V1 => STORAGE_SUFFIX_V1,
            Self::V2 => STORAGE_SUFFIX_V2,
        }
    }

    /// Storage identifier for this version under the given namespace.
    #[must_use]
    pub fn storage_key(self, namespace: &str) -> String {
        format!("{namespace}.{}", self.storage_suffix())
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SchemaVersion {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "v1" => Ok(Self::V1),
            "v2" => Ok(Self::V2),
            _ => Err(()),
        }
    }
}

/// Errors raised when tracker configuration invariants are violated.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{field} must be between {min} and {max} (got {value})")]
    RangeViolation {
        field: &'static str,
        min: u64,
        max: u64,
        value: u64,
    },
    #[error("storage namespace must be non-empty and free of whitespace (got '{0}')")]
    Namespace(String),
}

/// Runtime configuration for a tracker session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerConfig {
    #[serde(default)]
    pub schema: SchemaVersion,
    #[serde(default = "TrackerConfig::default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    #[serde(default)]
    pub sort: SortDirection,
    #[serde(default = "TrackerConfig::default_storage_namespace")]
    pub storage_namespace: String,
}

impl TrackerConfig {
    const fn default_tick_interval_ms() -> u64 {
        DEFAULT_TICK_INTERVAL_MS
    }

    fn default_storage_namespace() -> String {
        DEFAULT_STORAGE_NAMESPACE.to_string()
    }

    /// Parse a configuration from JSON, filling missing fields with defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    #[must_use]
    pub fn with_schema(mut self, schema: SchemaVersion) -> Self {
        self.schema = schema;
        self
    }

    #[must_use]
    pub const fn params(&self) -> SamplingParams {
        self.schema.params()
    }

    #[must_use]
    pub fn storage_key(&self) -> String {
        self.schema.storage_key(&self.storage_namespace)
    }

    /// Validate configuration ranges.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` describing the first violated constraint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_TICK_INTERVAL_MS..=MAX_TICK_INTERVAL_MS).contains(&self.tick_interval_ms) {
            return Err(ConfigError::RangeViolation {
                field: "tick_interval_ms",
                min: MIN_TICK_INTERVAL_MS,
                max: MAX_TICK_INTERVAL_MS,
                value: self.tick_interval_ms,
            });
        }
        if self.storage_namespace.is_empty()
            || self.storage_namespace.chars().any(char::is_whitespace)
        {
            return Err(ConfigError::Namespace(self.storage_namespace.clone()));
        }
        Ok(())
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            schema: SchemaVersion::default(),
            tick_interval_ms: Self::default_tick_interval_ms(),
            sort: SortDirection::default(),
            storage_namespace: Self::default_storage_namespace(),
        }
    }
}
