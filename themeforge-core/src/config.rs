//! Build Configuration

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{BuildError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct BuildConfig {
    #[serde(default = "default_source_dir")]
    pub source_dir: PathBuf,
    #[serde(default = "default_output")]
    pub output: PathBuf,
    #[serde(default)]
    pub manifest: Option<PathBuf>,
    #[serde(default = "default_extension")]
    pub extension: String,
    #[serde(default = "default_jobs")]
    pub jobs: usize,
}

fn default_source_dir() -> PathBuf { PathBuf::from("themes") }
fn default_output() -> PathBuf { PathBuf::from("themes.bin") }
fn default_extension() -> String { "json".to_string() }
fn default_jobs() -> usize { 1 }

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            source_dir: default_source_dir(),
            output: default_output(),
            manifest: None,
            extension: default_extension(),
            jobs: default_jobs(),
        }
    }
}

impl BuildConfig {
    pub fn new(source_dir: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            source_dir: source_dir.into(),
            output: output.into(),
            ..Self::default()
        }
    }

    /// Load from a JSON file. Relative paths inside the file are resolved
    /// against the file's directory.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| BuildError::io(path, e))?;
        let mut config: BuildConfig = serde_json::from_str(&content).map_err(|e| BuildError::Config {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        if let Some(base) = path.parent() {
            config.source_dir = base.join(&config.source_dir);
            config.output = base.join(&config.output);
            config.manifest = config.manifest.map(|m| base.join(m));
        }

        config.validate().map_err(|reason| BuildError::Config {
            path: path.to_path_buf(),
            reason,
        })?;
        Ok(config)
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.extension.is_empty() || self.extension.starts_with('.') {
            return Err(format!(
                "extension must be non-empty and given without a leading dot, got '{}'",
                self.extension
            ));
        }
        if self.jobs == 0 {
            return Err("jobs must be at least 1".to_string());
        }
        if self.manifest.as_deref() == Some(self.output.as_path()) {
            return Err("manifest and output must be different files".to_string());
        }
        Ok(())
    }
}
