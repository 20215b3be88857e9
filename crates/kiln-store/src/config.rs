use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::StoreResult;

/// Store configuration, loadable from a TOML file.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Root directory of the local store.
    pub path: PathBuf,
    /// Address of a sourced service to consult before local data, e.g.
    /// `"127.0.0.1:7780"`. `None` runs fully local.
    pub remote_sourced: Option<String>,
    /// Address of a compiled service for fetching built artifacts.
    pub remote_compiled: Option<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(".kiln"),
            remote_sourced: None,
            remote_compiled: None,
        }
    }
}

impl StoreConfig {
    pub fn load(path: &Path) -> StoreResult<Self> {
        let text = std::fs::read_to_string(path)?;
        let config = toml::from_str(&text).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })?;
        Ok(config)
    }
}
