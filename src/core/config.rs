use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::error::Error as StdError;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Which storage backend the engine opens at startup. Selected here once;
/// no other code branches on the active backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageMode {
    #[default]
    Local,
    Remote,
}

impl fmt::Display for StorageMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageMode::Local => write!(f, "local"),
            StorageMode::Remote => write!(f, "remote"),
        }
    }
}

/// Engine-level configuration kept as TOML in the platform config dir.
///
/// Provider credentials do NOT live here; they are owned by the active
/// storage backend. This file only records which backend to open and how
/// to reach the remote one.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageMode,
    /// Base URL of the remote key-value database, e.g. `https://db.example.com`.
    pub remote_url: Option<String>,
    /// Service key for the remote database.
    pub remote_api_key: Option<String>,
    /// Display name of the model preselected in new chats.
    pub default_model: Option<String>,
}

/// Errors that can occur when loading or saving configuration.
#[derive(Debug)]
pub enum ConfigError {
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    Encode {
        source: toml::ser::Error,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Read { path, source } => {
                write!(f, "failed to read config at {}: {}", path.display(), source)
            }
            ConfigError::Parse { path, source } => {
                write!(
                    f,
                    "failed to parse config at {}: {}",
                    path.display(),
                    source
                )
            }
            ConfigError::Write { path, source } => {
                write!(
                    f,
                    "failed to write config at {}: {}",
                    path.display(),
                    source
                )
            }
            ConfigError::Encode { source } => write!(f, "failed to encode config: {source}"),
        }
    }
}

impl StdError for ConfigError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            ConfigError::Read { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
            ConfigError::Write { source, .. } => Some(source),
            ConfigError::Encode { source } => Some(source),
        }
    }
}

impl Config {
    pub fn load() -> Result<Config, ConfigError> {
        Self::load_from_path(&Self::config_path())
    }

    pub fn load_from_path(config_path: &Path) -> Result<Config, ConfigError> {
        if config_path.exists() {
            let contents = fs::read_to_string(config_path).map_err(|source| ConfigError::Read {
                path: config_path.to_path_buf(),
                source,
            })?;
            toml::from_str(&contents).map_err(|source| ConfigError::Parse {
                path: config_path.to_path_buf(),
                source,
            })
        } else {
            Ok(Config::default())
        }
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to_path(&Self::config_path())
    }

    pub fn save_to_path(&self, config_path: &Path) -> Result<(), ConfigError> {
        let parent = config_path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty());

        let write_err = |source| ConfigError::Write {
            path: config_path.to_path_buf(),
            source,
        };

        if let Some(dir) = parent {
            fs::create_dir_all(dir).map_err(write_err)?;
        }

        let contents = toml::to_string_pretty(self).map_err(|source| ConfigError::Encode { source })?;
        let mut temp_file = match parent {
            Some(dir) => NamedTempFile::new_in(dir),
            None => NamedTempFile::new(),
        }
        .map_err(write_err)?;

        temp_file.write_all(contents.as_bytes()).map_err(write_err)?;
        temp_file.as_file_mut().sync_all().map_err(write_err)?;
        temp_file
            .persist(config_path)
            .map_err(|err| write_err(err.error))?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        project_dirs().config_dir().join("config.toml")
    }
}

pub(crate) fn project_dirs() -> ProjectDirs {
    ProjectDirs::from("org", "permacommons", "gaod")
        .expect("failed to determine config directory")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let config = Config {
            storage: StorageMode::Remote,
            remote_url: Some("https://db.example.com".to_string()),
            remote_api_key: Some("service-key".to_string()),
            default_model: None,
        };
        config.save_to_path(&path).unwrap();

        let loaded = Config::load_from_path(&path).unwrap();
        assert_eq!(loaded.storage, StorageMode::Remote);
        assert_eq!(loaded.remote_url.as_deref(), Some("https://db.example.com"));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from_path(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.storage, StorageMode::Local);
        assert!(config.remote_url.is_none());
    }

    #[test]
    fn invalid_toml_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "storage = [broken").unwrap();
        match Config::load_from_path(&path) {
            Err(ConfigError::Parse { .. }) => {}
            other => panic!("expected parse error, got {other:?}"),
        }
    }
}
