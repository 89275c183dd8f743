use crate::error::{ParcelError, Result};
use crate::models::parcel::ConformityStatus;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::Path;

/// Configuration source for tracking where values come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Default value
    Default,
    /// Loaded from config file
    File,
    /// Loaded from environment variable
    Environment,
    /// Provided via CLI argument
    Cli,
}

impl ConfigSource {
    /// Returns the precedence level (higher = higher priority)
    pub fn precedence(&self) -> u8 {
        match self {
            ConfigSource::Default => 0,
            ConfigSource::File => 1,
            ConfigSource::Environment => 2,
            ConfigSource::Cli => 3,
        }
    }
}

/// A configuration value with its source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigValue<T> {
    pub value: T,
    pub source: ConfigSource,
}

impl<T> ConfigValue<T> {
    pub fn new(value: T, source: ConfigSource) -> Self {
        Self { value, source }
    }

    /// Update the value if the new source has higher precedence
    pub fn update(&mut self, value: T, source: ConfigSource) {
        if source.precedence() > self.source.precedence() {
            self.value = value;
            self.source = source;
        }
    }
}

/// Resolved settings consumed by the import pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct ImportSettings {
    pub default_conformity: ConformityStatus,
    pub min_area_ha: f64,
    pub max_area_ha: f64,
    pub max_upload_mb: u64,
    pub simplify_zoom_threshold: u8,
    pub parallel_parse: bool,
}

impl Default for ImportSettings {
    fn default() -> Self {
        LayeredConfig::with_defaults().settings()
    }
}

impl ImportSettings {
    pub fn max_upload_bytes(&self) -> u64 {
        self.max_upload_mb.saturating_mul(1024 * 1024)
    }
}

/// Layered configuration for parcel import
#[derive(Debug, Clone)]
pub struct LayeredConfig {
    pub default_conformity: ConfigValue<ConformityStatus>,
    pub min_area_ha: ConfigValue<f64>,
    pub max_area_ha: ConfigValue<f64>,
    pub max_upload_mb: ConfigValue<u64>,
    pub simplify_zoom_threshold: ConfigValue<u8>,
    pub parallel_parse: ConfigValue<bool>,
}

impl LayeredConfig {
    /// Create a new configuration with default values
    pub fn with_defaults() -> Self {
        Self {
            default_conformity: ConfigValue::new(
                ConformityStatus::MissingInformation,
                ConfigSource::Default,
            ),
            min_area_ha: ConfigValue::new(0.01, ConfigSource::Default),
            max_area_ha: ConfigValue::new(1000.0, ConfigSource::Default),
            max_upload_mb: ConfigValue::new(DEFAULT_MAX_UPLOAD_MB, ConfigSource::Default),
            simplify_zoom_threshold: ConfigValue::new(10, ConfigSource::Default),
            parallel_parse: ConfigValue::new(true, ConfigSource::Default),
        }
    }

    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self> {
        let content =
            fs::read_to_string(path.as_ref()).map_err(|e| ParcelError::ConfigInvalid {
                key: "file".to_string(),
                reason: format!("Failed to read config file: {}", e),
            })?;

        let file_config: FileConfig =
            toml::from_str(&content).map_err(|e| ParcelError::ConfigInvalid {
                key: "file".to_string(),
                reason: format!("Failed to parse TOML: {}", e),
            })?;

        if let Some(conformity) = file_config.default_conformity {
            self.default_conformity.update(conformity, ConfigSource::File);
        }

        if let Some(min_area) = file_config.min_area_ha {
            self.min_area_ha.update(min_area, ConfigSource::File);
        }

        if let Some(max_area) = file_config.max_area_ha {
            self.max_area_ha.update(max_area, ConfigSource::File);
        }

        if let Some(max_upload) = file_config.max_upload_mb {
            self.max_upload_mb.update(max_upload, ConfigSource::File);
        }

        if let Some(zoom) = file_config.simplify_zoom_threshold {
            self.simplify_zoom_threshold.update(zoom, ConfigSource::File);
        }

        if let Some(parallel) = file_config.parallel_parse {
            self.parallel_parse.update(parallel, ConfigSource::File);
        }

        self.validate()?;
        Ok(self)
    }

    /// Load configuration from environment variables
    pub fn load_from_env(self) -> Self {
        self.load_from_vars(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable lookup.
    ///
    /// Invalid values are logged and ignored.
    pub fn load_from_vars<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        // PARCEL_DEFAULT_CONFORMITY
        if let Some(raw) = lookup("PARCEL_DEFAULT_CONFORMITY") {
            match raw.parse::<ConformityStatus>() {
                Ok(status) => self.default_conformity.update(status, ConfigSource::Environment),
                Err(_) => tracing::warn!(
                    "Invalid PARCEL_DEFAULT_CONFORMITY value '{}': expected compliant, non_compliant, in_progress or missing_information",
                    raw
                ),
            }
        }

        // PARCEL_MIN_AREA_HA
        if let Some(raw) = lookup("PARCEL_MIN_AREA_HA") {
            match parse_area(&raw) {
                Some(area) => self.min_area_ha.update(area, ConfigSource::Environment),
                None => tracing::warn!(
                    "Invalid PARCEL_MIN_AREA_HA value '{}': expected a non-negative number",
                    raw
                ),
            }
        }

        // PARCEL_MAX_AREA_HA
        if let Some(raw) = lookup("PARCEL_MAX_AREA_HA") {
            match parse_area(&raw) {
                Some(area) => self.max_area_ha.update(area, ConfigSource::Environment),
                None => tracing::warn!(
                    "Invalid PARCEL_MAX_AREA_HA value '{}': expected a non-negative number",
                    raw
                ),
            }
        }

        // PARCEL_MAX_UPLOAD_MB
        if let Some(raw) = lookup("PARCEL_MAX_UPLOAD_MB") {
            match raw.trim().parse::<u64>() {
                Ok(mb) if mb > 0 => self.max_upload_mb.update(mb, ConfigSource::Environment),
                _ => tracing::warn!(
                    "Invalid PARCEL_MAX_UPLOAD_MB value '{}': expected a positive integer",
                    raw
                ),
            }
        }

        // PARCEL_SIMPLIFY_ZOOM
        if let Some(raw) = lookup("PARCEL_SIMPLIFY_ZOOM") {
            match raw.trim().parse::<u8>() {
                Ok(zoom) if zoom <= MAX_ZOOM => {
                    self.simplify_zoom_threshold.update(zoom, ConfigSource::Environment)
                }
                _ => tracing::warn!(
                    "Invalid PARCEL_SIMPLIFY_ZOOM value '{}': expected an integer between 0 and {}",
                    raw,
                    MAX_ZOOM
                ),
            }
        }

        // PARCEL_PARALLEL_PARSE
        if let Some(raw) = lookup("PARCEL_PARALLEL_PARSE") {
            match parse_bool(&raw) {
                Some(parallel) => self.parallel_parse.update(parallel, ConfigSource::Environment),
                None => tracing::warn!(
                    "Invalid PARCEL_PARALLEL_PARSE value '{}': expected true or false",
                    raw
                ),
            }
        }

        self
    }

    /// Update configuration from CLI arguments
    pub fn update_from_cli(&mut self, overrides: CliConfigOverrides) {
        if let Some(conformity) = overrides.default_conformity {
            self.default_conformity.update(conformity, ConfigSource::Cli);
        }

        if let Some(min_area) = overrides.min_area_ha {
            self.min_area_ha.update(min_area, ConfigSource::Cli);
        }

        if let Some(max_area) = overrides.max_area_ha {
            self.max_area_ha.update(max_area, ConfigSource::Cli);
        }

        if let Some(max_upload) = overrides.max_upload_mb {
            self.max_upload_mb.update(max_upload, ConfigSource::Cli);
        }

        if let Some(zoom) = overrides.simplify_zoom_threshold {
            self.simplify_zoom_threshold.update(zoom, ConfigSource::Cli);
        }

        if let Some(parallel) = overrides.parallel_parse {
            self.parallel_parse.update(parallel, ConfigSource::Cli);
        }
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<()> {
        if !self.min_area_ha.value.is_finite() || self.min_area_ha.value < 0.0 {
            return Err(ParcelError::ConfigInvalid {
                key: "min_area_ha".to_string(),
                reason: "must be a non-negative number".to_string(),
            });
        }
        if self.max_area_ha.value.is_nan() || self.max_area_ha.value <= self.min_area_ha.value {
            return Err(ParcelError::ConfigInvalid {
                key: "max_area_ha".to_string(),
                reason: format!(
                    "must be greater than min_area_ha ({})",
                    self.min_area_ha.value
                ),
            });
        }
        if self.max_upload_mb.value == 0 {
            return Err(ParcelError::ConfigInvalid {
                key: "max_upload_mb".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        if self.simplify_zoom_threshold.value > MAX_ZOOM {
            return Err(ParcelError::ConfigInvalid {
                key: "simplify_zoom_threshold".to_string(),
                reason: format!("must be at most {}", MAX_ZOOM),
            });
        }
        Ok(())
    }

    /// Resolve to plain settings
    pub fn settings(&self) -> ImportSettings {
        ImportSettings {
            default_conformity: self.default_conformity.value,
            min_area_ha: self.min_area_ha.value,
            max_area_ha: self.max_area_ha.value,
            max_upload_mb: self.max_upload_mb.value,
            simplify_zoom_threshold: self.simplify_zoom_threshold.value,
            parallel_parse: self.parallel_parse.value,
        }
    }

    /// Get all configuration values as a map for inspection
    pub fn to_inspection_map(&self) -> HashMap<String, (String, ConfigSource)> {
        let mut map = HashMap::new();

        map.insert(
            "default_conformity".to_string(),
            (self.default_conformity.value.to_string(), self.default_conformity.source),
        );

        map.insert(
            "min_area_ha".to_string(),
            (format!("{} ha", self.min_area_ha.value), self.min_area_ha.source),
        );

        map.insert(
            "max_area_ha".to_string(),
            (format!("{} ha", self.max_area_ha.value), self.max_area_ha.source),
        );

        map.insert(
            "max_upload_mb".to_string(),
            (format!("{} MB", self.max_upload_mb.value), self.max_upload_mb.source),
        );

        map.insert(
            "simplify_zoom_threshold".to_string(),
            (
                self.simplify_zoom_threshold.value.to_string(),
                self.simplify_zoom_threshold.source,
            ),
        );

        map.insert(
            "parallel_parse".to_string(),
            (self.parallel_parse.value.to_string(), self.parallel_parse.source),
        );

        map
    }
}

const MAX_ZOOM: u8 = 24;

/// Upload limit when nothing else is configured; also caps archive extraction
pub const DEFAULT_MAX_UPLOAD_MB: u64 = 50;

/// Configuration loaded from TOML file
#[derive(Debug, Deserialize, Serialize)]
struct FileConfig {
    default_conformity: Option<ConformityStatus>,
    min_area_ha: Option<f64>,
    max_area_ha: Option<f64>,
    max_upload_mb: Option<u64>,
    simplify_zoom_threshold: Option<u8>,
    parallel_parse: Option<bool>,
}

/// CLI configuration overrides
#[derive(Debug, Default)]
pub struct CliConfigOverrides {
    pub default_conformity: Option<ConformityStatus>,
    pub min_area_ha: Option<f64>,
    pub max_area_ha: Option<f64>,
    pub max_upload_mb: Option<u64>,
    pub simplify_zoom_threshold: Option<u8>,
    pub parallel_parse: Option<bool>,
}

fn parse_area(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok().filter(|v| v.is_finite() && *v >= 0.0)
}

/// Parse boolean from string
pub fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}
