//! Pipeline configuration.
//!
//! Every section has defaults, so a configuration file only needs the
//! settings it changes:
//!
//! ```yaml
//! strategy: correlation_optimization
//! normalize_after_stack: true
//! ecc:
//!   motion: affine
//!   max_iterations: 200
//! ```

use std::path::{Path, PathBuf};

use common::file_format::{FileExtensionError, SerdeFormat, SerdeFormatError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::registration::{EccConfig, InvalidSetting, PointPatternConfig, Strategy};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("config '{}': {source}", path.display())]
    Format {
        path: PathBuf,
        source: FileExtensionError,
    },

    #[error("failed to parse config '{}': {source}", path.display())]
    Parse {
        path: PathBuf,
        source: SerdeFormatError,
    },

    #[error("invalid {section} configuration: {source}")]
    Invalid {
        section: &'static str,
        source: InvalidSetting,
    },

    #[error("file pattern must not be empty")]
    EmptyPattern,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Frame registration within a channel batch.
    pub strategy: Strategy,
    /// Registration of single exposures in channel composition.
    pub compose_strategy: Strategy,
    /// Rescale each stack so its maximum is 1.
    pub normalize_after_stack: bool,
    /// Wildcard selecting frames in a source directory.
    pub pattern: String,
    pub ecc: EccConfig,
    pub point_pattern: PointPatternConfig,
    /// Alignment of the channel stacks to each other.
    pub cross_channel: PointPatternConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            strategy: Strategy::PointPatternMatching,
            compose_strategy: Strategy::CorrelationOptimization,
            normalize_after_stack: false,
            pattern: "*.fits".to_string(),
            ecc: EccConfig::default(),
            point_pattern: PointPatternConfig::default(),
            cross_channel: PointPatternConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Loads a YAML or JSON file, chosen by extension, and validates it.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let format = SerdeFormat::from_path(path).map_err(|source| ConfigError::Format {
            path: path.to_path_buf(),
            source,
        })?;
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = format
            .deserialize(&text)
            .map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let section = |section: &'static str| {
            move |source: InvalidSetting| ConfigError::Invalid { section, source }
        };
        self.ecc.validate().map_err(section("ecc"))?;
        self.point_pattern
            .validate()
            .map_err(section("point_pattern"))?;
        self.cross_channel
            .validate()
            .map_err(section("cross_channel"))?;
        if self.pattern.trim().is_empty() {
            return Err(ConfigError::EmptyPattern);
        }
        Ok(())
    }
}
