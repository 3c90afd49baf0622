//! Configuration for studio-storage

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default storage directory
pub fn default_storage_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("studio-storage")
}

/// Configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding both store databases
    #[serde(default = "default_storage_dir")]
    pub storage_dir: PathBuf,

    /// File name of the draft store database
    #[serde(default = "default_draft_db_file")]
    pub draft_db_file: String,

    /// File name of the live store database
    #[serde(default = "default_live_db_file")]
    pub live_db_file: String,
}

fn default_draft_db_file() -> String {
    "draft.db".to_string()
}

fn default_live_db_file() -> String {
    "live.db".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage_dir: default_storage_dir(),
            draft_db_file: default_draft_db_file(),
            live_db_file: default_live_db_file(),
        }
    }
}

impl Config {
    /// Load config from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    /// Save config to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), std::io::Error> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }

    /// Get draft store database path
    pub fn draft_db_path(&self) -> PathBuf {
        self.storage_dir.join(&self.draft_db_file)
    }

    /// Get live store database path
    pub fn live_db_path(&self) -> PathBuf {
        self.storage_dir.join(&self.live_db_file)
    }

    /// Get config file path
    pub fn config_path(&self) -> PathBuf {
        self.storage_dir.join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            storage_dir: dir.path().to_path_buf(),
            ..Default::default()
        };
        config.save(config.config_path()).unwrap();

        let loaded = Config::load(config.config_path()).unwrap();
        assert_eq!(loaded.draft_db_file, "draft.db");
        assert_eq!(loaded.live_db_path(), dir.path().join("live.db"));
    }
}
