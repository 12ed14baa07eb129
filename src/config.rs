//! Configuration and data directory
//!
//! Data lives in `$TIMELY_HOME`, else `./.timely` when present, else
//! `~/.timely`. `config.toml` in that directory is optional and every field
//! has a default.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

pub const DEFAULT_BACKEND_URL: &str = "http://localhost:8000";
pub const CONFIG_FILE: &str = "config.toml";
pub const DB_FILE: &str = "timely.sqlite";

const DEFAULT_CONFIG: &str = r#"# Timely configuration

[store]
# SQLite file holding subjects and sessions (default: timely.sqlite in this directory)
# path = "/path/to/timely.sqlite"

[suggest]
# Recommendation service; TIMELY_BACKEND_URL overrides this
base_url = "http://localhost:8000"
# Give up on a suggestion request after this many seconds (default: never)
# timeout_secs = 30
"#;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub store: StoreConfig,
    pub suggest: SuggestConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SuggestConfig {
    pub base_url: String,
    pub timeout_secs: Option<u64>,
}

impl Default for SuggestConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BACKEND_URL.to_string(),
            timeout_secs: None,
        }
    }
}

impl SuggestConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

impl Config {
    /// Load `config.toml` from `data_dir` and apply environment overrides
    pub fn load(data_dir: &Path) -> Result<Self> {
        let mut config = Self::load_file(&data_dir.join(CONFIG_FILE))?;
        if let Ok(url) = std::env::var("TIMELY_BACKEND_URL") {
            if !url.trim().is_empty() {
                config.suggest.base_url = url.trim().to_string();
            }
        }
        Ok(config)
    }

    /// Parse a config file; a missing file gives the defaults
    pub fn load_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {:?}: {}", path, e)))?;
        toml::from_str(&content).map_err(|e| Error::Config(format!("invalid {:?}: {}", path, e)))
    }

    /// Database file, relative paths resolved against `data_dir`
    pub fn db_path(&self, data_dir: &Path) -> PathBuf {
        match &self.store.path {
            Some(path) if path.is_absolute() => path.clone(),
            Some(path) => data_dir.join(path),
            None => data_dir.join(DB_FILE),
        }
    }
}

/// Resolve the data directory
pub fn data_dir() -> Result<PathBuf> {
    if let Ok(home) = std::env::var("TIMELY_HOME") {
        if !home.is_empty() {
            return Ok(PathBuf::from(home));
        }
    }

    let cwd = std::env::current_dir().map_err(|e| Error::Config(e.to_string()))?;
    let project_dir = cwd.join(".timely");
    if project_dir.exists() {
        return Ok(project_dir);
    }

    let home = dirs::home_dir().ok_or_else(|| Error::Config("could not find home directory".to_string()))?;
    Ok(home.join(".timely"))
}

/// Create `data_dir` and a commented default config. Returns true if the
/// config file was written.
pub fn init_data_dir(data_dir: &Path) -> Result<bool> {
    std::fs::create_dir_all(data_dir)
        .map_err(|e| Error::Config(format!("cannot create {:?}: {}", data_dir, e)))?;

    let config_path = data_dir.join(CONFIG_FILE);
    if config_path.exists() {
        return Ok(false);
    }
    std::fs::write(&config_path, DEFAULT_CONFIG)
        .map_err(|e| Error::Config(format!("cannot write {:?}: {}", config_path, e)))?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load_file(&dir.path().join(CONFIG_FILE)).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.suggest.base_url, DEFAULT_BACKEND_URL);
        assert_eq!(config.suggest.timeout(), None);
        assert_eq!(config.db_path(dir.path()), dir.path().join(DB_FILE));
    }

    #[test]
    fn test_default_config_parses() {
        let dir = TempDir::new().unwrap();
        assert!(init_data_dir(dir.path()).unwrap());
        assert!(!init_data_dir(dir.path()).unwrap());

        let config = Config::load_file(&dir.path().join(CONFIG_FILE)).unwrap();
        assert_eq!(config.suggest.base_url, DEFAULT_BACKEND_URL);
    }

    #[test]
    fn test_partial_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "[suggest]\ntimeout_secs = 5\n\n[store]\npath = \"data/subjects.db\"\n").unwrap();

        let config = Config::load_file(&path).unwrap();
        assert_eq!(config.suggest.base_url, DEFAULT_BACKEND_URL);
        assert_eq!(config.suggest.timeout(), Some(Duration::from_secs(5)));
        assert_eq!(config.db_path(dir.path()), dir.path().join("data/subjects.db"));
    }

    #[test]
    fn test_invalid_file_is_config_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "[suggest\nbase_url = 3").unwrap();
        assert!(matches!(Config::load_file(&path), Err(Error::Config(_))));
    }
}
