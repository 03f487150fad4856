//! Dashboard configuration
//!
//! Configuration is read from an optional TOML file, then environment
//! overrides are applied. The process-wide instance is installed once with
//! [`init`] and is read-only afterwards.

use crate::aggregate::DEFAULT_REACTION_CEILING_S;
use crate::error::PipelineError;
use crate::jitter::{DEFAULT_JITTER_AMPLITUDE_S, MAX_JITTER_AMPLITUDE_S};
use crate::types::CategoryFilter;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Overrides the participant document directory
pub const ENV_DATA_DIR: &str = "MENTALNAV_DATA_DIR";

/// Overrides the jitter seed
pub const ENV_JITTER_SEED: &str = "MENTALNAV_JITTER_SEED";

static CONFIG: OnceLock<DashboardConfig> = OnceLock::new();

/// Dashboard configuration (loaded from mentalnav.toml)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    /// Directory holding `<participant id>.json` documents
    pub data_dir: PathBuf,
    /// Category selected when none is given
    pub category: CategoryFilter,
    /// Reaction times at or above this many seconds are left out of error bars
    pub reaction_ceiling_s: f64,
    pub jitter: JitterConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JitterConfig {
    /// Half-width of the uniform jitter window in seconds
    pub amplitude_s: f64,
    /// Fixed seed for reproducible plots; random when unset
    pub seed: Option<u64>,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            category: CategoryFilter::All,
            reaction_ceiling_s: DEFAULT_REACTION_CEILING_S,
            jitter: JitterConfig::default(),
        }
    }
}

impl Default for JitterConfig {
    fn default() -> Self {
        Self {
            amplitude_s: DEFAULT_JITTER_AMPLITUDE_S,
            seed: None,
        }
    }
}

impl DashboardConfig {
    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self, PipelineError> {
        let config: DashboardConfig =
            toml::from_str(content).map_err(|e| PipelineError::ConfigError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file (if given) and the environment
    pub fn load(path: Option<&Path>) -> Result<Self, PipelineError> {
        let mut config = match path {
            Some(path) => {
                let content = fs::read_to_string(path).map_err(|e| {
                    PipelineError::ConfigError(format!("cannot read {}: {e}", path.display()))
                })?;
                Self::from_toml(&content)?
            }
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply overrides from a key lookup (the process environment in practice)
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), PipelineError> {
        if let Some(dir) = lookup(ENV_DATA_DIR) {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(seed) = lookup(ENV_JITTER_SEED) {
            let seed = seed.trim().parse::<u64>().map_err(|e| {
                PipelineError::ConfigError(format!("{ENV_JITTER_SEED}={seed}: {e}"))
            })?;
            self.jitter.seed = Some(seed);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        let amplitude = self.jitter.amplitude_s;
        if !(0.0..=MAX_JITTER_AMPLITUDE_S).contains(&amplitude) {
            return Err(PipelineError::ConfigError(format!(
                "jitter.amplitude_s must be between 0 and {MAX_JITTER_AMPLITUDE_S}, got {amplitude}"
            )));
        }
        if !self.reaction_ceiling_s.is_finite() || self.reaction_ceiling_s <= 0.0 {
            return Err(PipelineError::ConfigError(format!(
                "reaction_ceiling_s must be positive, got {}",
                self.reaction_ceiling_s
            )));
        }
        Ok(())
    }
}

/// Install the process-wide configuration; fails if already installed
pub fn init(config: DashboardConfig) -> Result<&'static DashboardConfig, PipelineError> {
    config.validate()?;
    CONFIG
        .set(config)
        .map_err(|_| PipelineError::ConfigError("configuration already initialized".to_string()))?;
    Ok(global())
}

/// The process-wide configuration, defaulting when [`init`] was never called
pub fn global() -> &'static DashboardConfig {
    CONFIG.get_or_init(DashboardConfig::default)
}
