use crate::error::{AnalysisError, Result};
use crate::RenderOptions;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const ENV_DATA_DIR: &str = "JIGYASA_DATA_DIR";
pub const ENV_LOG: &str = "JIGYASA_LOG";

/// Runtime settings: JSON file first, then environment overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub render: RenderOptions,
}

fn default_data_dir() -> PathBuf { PathBuf::from(".jigyasa") }
fn default_log_level() -> String { "warn".to_string() }

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            log_level: default_log_level(),
            render: RenderOptions::default(),
        }
    }
}

impl Config {
    pub fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|e| AnalysisError::Validation(format!("Invalid configuration: {}", e)))
    }

    /// Read `path` when given, fall back to defaults, then apply env overrides.
    /// An unreadable file is a `Storage` error, malformed JSON a `Validation` one.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => {
                let text = fs::read_to_string(path).map_err(|e| {
                    AnalysisError::Storage(format!(
                        "Failed to read configuration '{}': {}",
                        path.display(),
                        e
                    ))
                })?;
                Self::from_json_str(&text)?
            }
            None => Self::default(),
        };
        Ok(config.with_overrides(|key| std::env::var(key).ok()))
    }

    /// Apply overrides from a key lookup (the process environment in production).
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(dir) = lookup(ENV_DATA_DIR).filter(|v| !v.is_empty()) {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(level) = lookup(ENV_LOG).filter(|v| !v.is_empty()) {
            self.log_level = level;
        }
        self
    }
}
