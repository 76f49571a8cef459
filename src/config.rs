use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::permissions::{Grant, GrantTable};
use crate::pipeline::DEFAULT_PAGE_SIZE;

pub const DEFAULT_CONFIG_FILE: &str = "backoffice-views.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("page_size must be at least 1")]
    PageSize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub page_size: usize,
    pub fetch_retries: usize,
    pub max_connections: u32,
    pub grants: Vec<Grant>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            fetch_retries: 1,
            max_connections: 5,
            grants: Vec::new(),
        }
    }
}

impl AppConfig {
    pub fn from_toml(path: &Path, text: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        if config.page_size == 0 {
            return Err(ConfigError::PageSize);
        }
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(path, &text)
    }

    pub fn discover(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => {
                let default = Path::new(DEFAULT_CONFIG_FILE);
                if default.exists() {
                    Self::load(default)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// No configured grants means full access.
    pub fn permissions(&self) -> GrantTable {
        if self.grants.is_empty() {
            GrantTable::allow_all()
        } else {
            GrantTable::new(&self.grants)
        }
    }
}
