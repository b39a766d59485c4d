//! Config discovery and parsing.
//!
//! A config file is one `GridConfig` document, YAML (`.yml`, `.yaml`) or
//! TOML (`.toml`). Loading always validates; a document that parses but
//! breaks a field rule is rejected exactly like a syntax error.

use gridstrike_core::config::GridConfig;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum LoadConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {reason}")]
    InvalidConfig { path: PathBuf, reason: String },
}

impl LoadConfigError {
    fn invalid(path: &Path, reason: impl ToString) -> Self {
        LoadConfigError::InvalidConfig {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Yaml,
    Toml,
}

fn format_of(path: &Path) -> Option<Format> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "yml" | "yaml" => Some(Format::Yaml),
        "toml" => Some(Format::Toml),
        _ => None,
    }
}

/// Finds and parses strategy config files.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Config files directly inside `dir`, sorted by file name. Not recursive.
    pub fn list(dir: &Path) -> Result<Vec<PathBuf>, LoadConfigError> {
        let io_err = |source| LoadConfigError::Io {
            path: dir.to_path_buf(),
            source,
        };
        let mut files = Vec::new();
        for entry in std::fs::read_dir(dir).map_err(io_err)? {
            let path = entry.map_err(io_err)?.path();
            if path.is_file() && format_of(&path).is_some() {
                files.push(path);
            }
        }
        files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
        debug!(dir = %dir.display(), count = files.len(), "listed configs");
        Ok(files)
    }

    /// Parse and validate one config file.
    pub fn load(path: &Path) -> Result<GridConfig, LoadConfigError> {
        let format = format_of(path).ok_or_else(|| {
            LoadConfigError::invalid(path, "unsupported extension (expected .yml, .yaml or .toml)")
        })?;
        let text = std::fs::read_to_string(path).map_err(|source| LoadConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text, format, path)
    }

    /// Parse YAML config text. `origin` is only used in error messages.
    pub fn from_yaml_str(text: &str, origin: &Path) -> Result<GridConfig, LoadConfigError> {
        Self::parse(text, Format::Yaml, origin)
    }

    /// Parse TOML config text. `origin` is only used in error messages.
    pub fn from_toml_str(text: &str, origin: &Path) -> Result<GridConfig, LoadConfigError> {
        Self::parse(text, Format::Toml, origin)
    }

    fn parse(text: &str, format: Format, path: &Path) -> Result<GridConfig, LoadConfigError> {
        let config: GridConfig = match format {
            Format::Yaml => serde_yaml::from_str(text).map_err(|e| LoadConfigError::invalid(path, e))?,
            Format::Toml => toml::from_str(text).map_err(|e| LoadConfigError::invalid(path, e))?,
        };
        config
            .validate()
            .map_err(|e| LoadConfigError::invalid(path, e))?;
        Ok(config)
    }
}
