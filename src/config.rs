//! Conversion configuration

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Error loading a configuration file
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    Json(#[from] serde_json::Error),
}

/// Negative form used when converting negative assertions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NegativeForm {
    /// `expect(obj).not_to`
    #[default]
    NotTo,
    /// `expect(obj).to_not`
    ToNot,
}

impl NegativeForm {
    pub fn as_str(&self) -> &'static str {
        match self {
            NegativeForm::NotTo => "not_to",
            NegativeForm::ToNot => "to_not",
        }
    }
}

/// When to colorize terminal output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorMode {
    #[default]
    Auto,
    Always,
    Never,
}

/// Conversion options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Negative form of `to` (`not_to` or `to_not`)
    pub negative_form: NegativeForm,

    /// Convert implicit-subject assertions (`obj.should`)
    pub convert_should: bool,

    /// Convert stubbing calls (`obj.stub`)
    pub convert_stub: bool,

    /// Rewrite deprecated method aliases in place (`stub!` -> `stub`)
    pub convert_deprecated_method: bool,

    /// Skip phase 1; rules use their static fallbacks only
    pub skip_dynamic_analysis: bool,

    /// Process files in parallel
    pub parallel: bool,

    /// Worker count (0 = one per CPU)
    pub jobs: usize,

    /// Colorize report output
    pub color: ColorMode,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            negative_form: NegativeForm::default(),
            convert_should: true,
            convert_stub: true,
            convert_deprecated_method: true,
            skip_dynamic_analysis: false,
            parallel: true,
            jobs: 0,
            color: ColorMode::default(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}
