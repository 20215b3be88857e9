use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Server configuration, loadable from a TOML file.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address.
    pub bind: String,
    /// Root directory of the served store.
    pub store_path: PathBuf,
    /// Base directory of raw assets; lookup paths on the wire are
    /// relative to it.
    pub import_base: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:7780".into(),
            store_path: PathBuf::from(".kiln"),
            import_base: None,
        }
    }
}

impl ServerConfig {
    pub fn load(path: &Path) -> std::io::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        toml::from_str(&text)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.bind, "127.0.0.1:7780");
        assert!(config.import_base.is_none());
    }

    #[test]
    fn load_from_toml() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("server.toml");
        std::fs::write(
            &file,
            "bind = \"0.0.0.0:9000\"\nstore_path = \"/srv/kiln\"\nimport_base = \"/srv/assets\"\n",
        )
        .unwrap();
        let config = ServerConfig::load(&file).unwrap();
        assert_eq!(config.bind, "0.0.0.0:9000");
        assert_eq!(config.store_path, PathBuf::from("/srv/kiln"));
        assert_eq!(config.import_base, Some(PathBuf::from("/srv/assets")));
    }
}
