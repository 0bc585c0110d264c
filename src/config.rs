//! Configuration for selection runs.
//!
//! Supports YAML configuration with precedence: explicit values > file > defaults.
//! Every value has a documented default, and [`AdaptiveConfig::validate`] runs on every
//! load so a bad file fails at startup instead of mid-scan.

use crate::counters::{self, HardwareEvent};
use crate::error::{Error, Result};
use crate::select::registry::StrategyId;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Rows per adaptation chunk.
pub const DEFAULT_CHUNK_ROWS: usize = 50_000;
/// Consecutive predication chunks before a forced branch probe.
pub const DEFAULT_MAX_CONSECUTIVE_PREDICATIONS: u32 = 10;
/// Rows in a branch probe burst.
pub const DEFAULT_BURST_ROWS: usize = 1_000;
/// Selectivity below which branching beats predication.
pub const DEFAULT_LOWER_CROSSOVER: f64 = 0.03;
/// Selectivity above which branching beats predication.
pub const DEFAULT_UPPER_CROSSOVER: f64 = 0.98;

/// Tuning parameters of the adaptive controller.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdaptiveConfig {
    /// Rows per chunk between adaptation decisions.
    #[serde(default = "default_chunk_rows")]
    pub chunk_rows: usize,

    /// Consecutive predication chunks that trigger a branch probe.
    #[serde(default = "default_max_consecutive_predications")]
    pub max_consecutive_predications: u32,

    /// Rows in a branch probe burst. Must not exceed `chunk_rows`.
    #[serde(default = "default_burst_rows")]
    pub burst_rows: usize,

    /// Lower selectivity crossover point.
    #[serde(default = "default_lower_crossover")]
    pub lower_crossover: f64,

    /// Upper selectivity crossover point.
    #[serde(default = "default_upper_crossover")]
    pub upper_crossover: f64,
}

fn default_chunk_rows() -> usize {
    DEFAULT_CHUNK_ROWS
}
fn default_max_consecutive_predications() -> u32 {
    DEFAULT_MAX_CONSECUTIVE_PREDICATIONS
}
fn default_burst_rows() -> usize {
    DEFAULT_BURST_ROWS
}
fn default_lower_crossover() -> f64 {
    DEFAULT_LOWER_CROSSOVER
}
fn default_upper_crossover() -> f64 {
    DEFAULT_UPPER_CROSSOVER
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        Self {
            chunk_rows: default_chunk_rows(),
            max_consecutive_predications: default_max_consecutive_predications(),
            burst_rows: default_burst_rows(),
            lower_crossover: default_lower_crossover(),
            upper_crossover: default_upper_crossover(),
        }
    }
}

impl AdaptiveConfig {
    /// Creates a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigInvalid`] naming the first offending key.
    pub fn new(
        chunk_rows: usize,
        max_consecutive_predications: u32,
        burst_rows: usize,
        lower_crossover: f64,
        upper_crossover: f64,
    ) -> Result<Self> {
        let config = Self {
            chunk_rows,
            max_consecutive_predications,
            burst_rows,
            lower_crossover,
            upper_crossover,
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks the invariants the controller relies on.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigInvalid`] naming the first offending key.
    pub fn validate(&self) -> Result<()> {
        fn invalid(key: &str, message: impl Into<String>) -> Error {
            Error::ConfigInvalid { key: key.to_string(), message: message.into() }
        }

        if self.chunk_rows == 0 {
            return Err(invalid("chunk_rows", "must be positive"));
        }
        if self.burst_rows == 0 {
            return Err(invalid("burst_rows", "must be positive"));
        }
        if self.burst_rows > self.chunk_rows {
            return Err(invalid(
                "burst_rows",
                format!("must not exceed chunk_rows ({} > {})", self.burst_rows, self.chunk_rows),
            ));
        }
        if self.max_consecutive_predications == 0 {
            return Err(invalid("max_consecutive_predications", "must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.lower_crossover) {
            return Err(invalid("lower_crossover", "must be within [0, 1]"));
        }
        if !(0.0..=1.0).contains(&self.upper_crossover) {
            return Err(invalid("upper_crossover", "must be within [0, 1]"));
        }
        if self.lower_crossover >= self.upper_crossover {
            return Err(invalid(
                "lower_crossover",
                format!(
                    "must be below upper_crossover ({} >= {})",
                    self.lower_crossover, self.upper_crossover
                ),
            ));
        }
        Ok(())
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Configuration version.
    #[serde(default = "default_version")]
    pub version: u32,

    /// Strategy display name or kebab-case identifier.
    #[serde(default = "default_strategy")]
    pub strategy: String,

    /// Hardware counter names to configure.
    #[serde(default = "default_counters")]
    pub counters: Vec<String>,

    /// Adaptive controller tuning.
    #[serde(default)]
    pub adaptive: AdaptiveConfig,
}

fn default_version() -> u32 {
    1
}
fn default_strategy() -> String {
    StrategyId::IndexesAdaptive.name().to_string()
}
fn default_counters() -> Vec<String> {
    vec![HardwareEvent::BranchMisses.name().to_string()]
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: default_version(),
            strategy: default_strategy(),
            counters: default_counters(),
            adaptive: AdaptiveConfig::default(),
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the per-user config path, `<config_dir>/adaptive-select/config.yaml`.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("adaptive-select").join("config.yaml"))
    }

    /// Loads configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or validated.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .map_err(|_| Error::ConfigNotFound(path.display().to_string()))?;

        Self::parse(&content)
    }

    /// Parses configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error with line number if parsing fails, or
    /// [`Error::ConfigInvalid`] if a value violates its constraints.
    pub fn parse(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml_ng::from_str(yaml).map_err(|e| {
            let line = e.location().map_or(0, |l| l.line());
            Error::ConfigParse { line, message: e.to_string() }
        })?;
        config.adaptive.validate()?;
        Ok(config)
    }

    /// Serializes the configuration to YAML.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigInvalid`] if serialization fails.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml_ng::to_string(self)
            .map_err(|e| Error::ConfigInvalid { key: "config".to_string(), message: e.to_string() })
    }

    /// Writes the configuration to a YAML file, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_yaml()?)?;
        Ok(())
    }

    /// Loads configuration with fallback to defaults.
    #[must_use]
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(err) => {
                log::debug!("Using default configuration: {}", err);
                Self::default()
            }
        }
    }

    /// Resolves the configured strategy.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownStrategy`] if the name is not registered.
    pub fn strategy_id(&self) -> Result<StrategyId> {
        self.strategy.parse()
    }

    /// Resolves the configured counter names.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownCounter`] for the first unrecognized name.
    pub fn counter_events(&self) -> Result<Vec<HardwareEvent>> {
        counters::parse_events(&self.counters)
    }
}
