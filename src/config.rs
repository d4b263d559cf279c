//! Configuration for depot paths.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (DEPOT_HOME, DEPOT_STORAGE)
//! 2. Config file (.depot/config.yaml)
//! 3. Defaults (~/.depot)
//!
//! Config file discovery:
//! - Searches current directory and parents for .depot/config.yaml
//! - Paths in config file are relative to the config file's parent directory

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    #[serde(default)]
    pub paths: PathsConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// Catalog state directory (relative to config file)
    pub home: Option<String>,
    /// Blob storage directory (relative to config file)
    pub storage: Option<String>,
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Absolute path to the depot home (database, lock file)
    pub home: PathBuf,
    /// Absolute path to blob storage
    pub storage: PathBuf,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
}

impl ResolvedConfig {
    /// Path of the catalog database file.
    pub fn db_path(&self) -> PathBuf {
        self.home.join("catalog.db")
    }
}

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(".depot").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            return None;
        }
    }
}

fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

fn resolve() -> Result<ResolvedConfig> {
    let config_file = find_config_file();
    let mut file_home: Option<PathBuf> = None;
    let mut file_storage: Option<PathBuf> = None;

    if let Some(path) = &config_file {
        let parsed = load_config_file(path)?;
        // Paths are relative to the directory holding .depot/
        let base = path
            .parent()
            .and_then(Path::parent)
            .map(Path::to_path_buf)
            .unwrap_or_default();
        file_home = parsed.paths.home.map(|p| base.join(p));
        file_storage = parsed.paths.storage.map(|p| base.join(p));
    }

    let home = match std::env::var_os("DEPOT_HOME") {
        Some(v) => PathBuf::from(v),
        None => match file_home {
            Some(p) => p,
            None => {
                let home = dirs::home_dir().context("Failed to determine home directory")?;
                home.join(".depot")
            }
        },
    };

    let storage = match std::env::var_os("DEPOT_STORAGE") {
        Some(v) => PathBuf::from(v),
        None => match file_storage {
            Some(p) => p,
            None => home.join("storage"),
        },
    };

    Ok(ResolvedConfig {
        home,
        storage,
        config_file,
    })
}

/// Get the resolved configuration, computing and caching it on first use.
pub fn config() -> Result<&'static ResolvedConfig> {
    let cached = CONFIG.get_or_init(|| resolve().map_err(|e| format!("{e:#}")));
    cached
        .as_ref()
        .map_err(|e| anyhow::anyhow!("configuration error: {e}"))
}

/// Absolute path to the depot home directory.
pub fn depot_home() -> Result<PathBuf> {
    Ok(config()?.home.clone())
}

/// Absolute path to the blob storage root.
pub fn storage_dir() -> Result<PathBuf> {
    Ok(config()?.storage.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_file_parses_paths() {
        let yaml = r#"
version: "1"
paths:
  home: state
  storage: media
"#;
        let parsed: ConfigFile = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(parsed.version, "1");
        assert_eq!(parsed.paths.home.as_deref(), Some("state"));
        assert_eq!(parsed.paths.storage.as_deref(), Some("media"));
    }

    #[test]
    fn test_config_file_paths_optional() {
        let parsed: ConfigFile = serde_yaml::from_str("version: \"1\"\n").unwrap();
        assert!(parsed.paths.home.is_none());
        assert!(parsed.paths.storage.is_none());
    }
}
