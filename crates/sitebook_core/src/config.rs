//! Policy configuration for naming, resolution and duplicate detection.
//!
//! # Responsibility
//! - Hold every tunable policy value in one serde-loadable struct.
//! - Validate values before components are constructed from them.
//!
//! # Invariants
//! - Every field has a default; a config file only overrides what it sets.
//! - `validate()` must pass before the config reaches a component.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

/// Tunables shared by the name generator, resolver and lifecycle manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SitebookConfig {
    /// Default radius for duplicate detection, kilometres.
    pub duplicate_radius_km: f64,
    /// Minimum similarity for a query token to count as matching a name
    /// segment, and minimum total score for a partial match.
    pub partial_match_threshold: f64,
    /// Candidates scoring within this distance of the best are ambiguous.
    pub ambiguity_margin: f64,
    /// Maximum remembered references per session.
    pub history_limit: usize,
    /// Upper bound on `-N` suffix probing before the timestamp fallback.
    pub unique_suffix_ceiling: u32,
    /// Maximum cached reverse-geocode results.
    pub geocode_cache_capacity: u64,
    /// Domain suffix appended to every canonical name.
    pub name_suffix: String,
}

impl Default for SitebookConfig {
    fn default() -> Self {
        Self {
            duplicate_radius_km: 5.0,
            partial_match_threshold: 0.75,
            ambiguity_margin: 0.15,
            history_limit: 10,
            unique_suffix_ceiling: 1000,
            geocode_cache_capacity: 1024,
            name_suffix: "wind-farm".to_string(),
        }
    }
}

/// Configuration load or validation failure.
#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, source: std::io::Error },
    Parse(toml::de::Error),
    InvalidValue { field: &'static str, message: String },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "cannot read config `{}`: {source}", path.display())
            }
            Self::Parse(err) => write!(f, "invalid config syntax: {err}"),
            Self::InvalidValue { field, message } => write!(f, "invalid `{field}`: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse(err) => Some(err),
            Self::InvalidValue { .. } => None,
        }
    }
}

impl SitebookConfig {
    /// Parses TOML text and validates the result.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.duplicate_radius_km.is_finite() && self.duplicate_radius_km > 0.0) {
            return Err(invalid("duplicate_radius_km", "must be a positive number"));
        }
        if !(self.partial_match_threshold > 0.0 && self.partial_match_threshold <= 1.0) {
            return Err(invalid("partial_match_threshold", "must be within (0, 1]"));
        }
        if !(self.ambiguity_margin.is_finite() && self.ambiguity_margin >= 0.0) {
            return Err(invalid("ambiguity_margin", "must be zero or positive"));
        }
        if self.history_limit == 0 {
            return Err(invalid("history_limit", "must be at least 1"));
        }
        if self.unique_suffix_ceiling < 2 {
            return Err(invalid("unique_suffix_ceiling", "must be at least 2"));
        }
        if self.geocode_cache_capacity == 0 {
            return Err(invalid("geocode_cache_capacity", "must be at least 1"));
        }
        let suffix = self.name_suffix.as_str();
        if suffix.is_empty()
            || suffix.starts_with('-')
            || suffix.ends_with('-')
            || !suffix
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        {
            return Err(invalid(
                "name_suffix",
                "must be a non-empty slug of [a-z0-9-] without edge hyphens",
            ));
        }
        Ok(())
    }
}

fn invalid(field: &'static str, message: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field,
        message: message.to_string(),
    }
}
