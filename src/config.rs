//! Configuration management with layered loading
//!
//! Precedence (lowest to highest):
//! 1. Compiled defaults
//! 2. Global config: `$XDG_CONFIG_HOME/otdb/otdb.toml`
//! 3. Store config: `<store_dir>/.otdb.toml`
//! 4. Environment variables: `OTDB_*` prefix

use std::path::{Path, PathBuf};

use config::{Config, ConfigError, Environment};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::application::ApplicationError;
use crate::domain::Classification;

/// Unified configuration for otdb.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// Directory holding the tree files (default: ~/.otdb/store)
    pub store_dir: PathBuf,
    /// Name recorded as creator and in state-change audit entries
    pub user: String,
    /// Classification given to newly loaded component trees
    pub default_classification: Classification,
    /// Maximum length of a `>>` reference chain
    pub max_reference_depth: usize,
    /// Default depth for `prune` when none is given
    pub prune_level: usize,
}

impl Default for Settings {
    fn default() -> Self {
        let user = std::env::var("USER")
            .or_else(|_| std::env::var("USERNAME"))
            .unwrap_or_else(|_| "unknown".into());

        Self {
            store_dir: default_store_dir(),
            user,
            default_classification: Classification::Development,
            max_reference_depth: 8,
            prune_level: 1,
        }
    }
}

/// Raw settings for intermediate parsing (`None` = not specified, inherit).
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RawSettings {
    pub store_dir: Option<PathBuf>,
    pub user: Option<String>,
    pub default_classification: Option<Classification>,
    pub max_reference_depth: Option<usize>,
    pub prune_level: Option<usize>,
}

/// Get the default store directory (~/.otdb/store).
fn default_store_dir() -> PathBuf {
    directories::BaseDirs::new()
        .map(|dirs| dirs.home_dir().join(".otdb").join("store"))
        .unwrap_or_else(|| PathBuf::from("~/.otdb/store"))
}

/// Get the XDG config directory for otdb.
pub fn global_config_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", "otdb").map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the global config file.
pub fn global_config_path() -> Option<PathBuf> {
    global_config_dir().map(|dir| dir.join("otdb.toml"))
}

/// Get the path to the store-local config file.
pub fn store_config_path(store_dir: &Path) -> PathBuf {
    store_dir.join(".otdb.toml")
}

/// Load a TOML file into RawSettings for manual merging.
fn load_raw_settings(path: &Path) -> Result<RawSettings, ApplicationError> {
    let content = std::fs::read_to_string(path).map_err(|e| ApplicationError::Config {
        message: format!("read {}: {}", path.display(), e),
    })?;
    toml::from_str(&content).map_err(|e| ApplicationError::Config {
        message: format!("parse {}: {}", path.display(), e),
    })
}

fn config_err(e: ConfigError) -> ApplicationError {
    ApplicationError::Config {
        message: e.to_string(),
    }
}

impl Settings {
    /// Overlay wins where it specifies a value.
    fn merge_with(&self, overlay: &RawSettings) -> Self {
        Self {
            store_dir: overlay
                .store_dir
                .clone()
                .unwrap_or_else(|| self.store_dir.clone()),
            user: overlay.user.clone().unwrap_or_else(|| self.user.clone()),
            default_classification: overlay
                .default_classification
                .unwrap_or(self.default_classification),
            max_reference_depth: overlay
                .max_reference_depth
                .unwrap_or(self.max_reference_depth),
            prune_level: overlay.prune_level.unwrap_or(self.prune_level),
        }
    }

    /// Expand `~`, `$VAR` and `${VAR}` in the store path.
    fn expand_paths(&mut self) {
        let raw = self.store_dir.to_string_lossy().to_string();
        let expanded = shellexpand::full(&raw)
            .map(|s| s.into_owned())
            .unwrap_or(raw);
        self.store_dir = PathBuf::from(expanded);
    }

    /// Load settings with layered precedence.
    ///
    /// # Arguments
    /// * `store_dir` - Optional store directory override; its `.otdb.toml` is
    ///   read instead of the one in the configured store directory.
    ///
    /// # Precedence (lowest to highest)
    /// 1. Compiled defaults
    /// 2. Global config: `$XDG_CONFIG_HOME/otdb/otdb.toml`
    /// 3. Store config: `<store_dir>/.otdb.toml`
    /// 4. Environment variables: `OTDB_*` prefix
    pub fn load(store_dir: Option<&Path>) -> Result<Self, ApplicationError> {
        let mut current = Self::default();

        if let Some(global_path) = global_config_path() {
            if global_path.exists() {
                let raw = load_raw_settings(&global_path)?;
                current = current.merge_with(&raw);
            }
        }

        if let Some(dir) = store_dir {
            current.store_dir = dir.to_path_buf();
        }
        current.expand_paths();

        let local_path = store_config_path(&current.store_dir);
        if local_path.exists() {
            let raw = load_raw_settings(&local_path)?;
            current = current.merge_with(&raw);
            // an explicit directory beats whatever the store file says
            if let Some(dir) = store_dir {
                current.store_dir = dir.to_path_buf();
            }
        }

        current = Self::apply_env_overrides(current)?;
        current.expand_paths();

        Ok(current)
    }

    /// Apply OTDB_* environment variables as explicit overrides.
    fn apply_env_overrides(mut settings: Self) -> Result<Self, ApplicationError> {
        let config = Config::builder()
            .add_source(Environment::with_prefix("OTDB").separator("__"))
            .build()
            .map_err(config_err)?;

        if let Ok(val) = config.get_string("store_dir") {
            settings.store_dir = PathBuf::from(val);
        }
        if let Ok(val) = config.get_string("user") {
            settings.user = val;
        }
        if let Ok(val) = config.get_string("default_classification") {
            settings.default_classification = val.parse().map_err(|e| ApplicationError::Config {
                message: format!("OTDB_DEFAULT_CLASSIFICATION: {e}"),
            })?;
        }
        if let Ok(val) = config.get_int("max_reference_depth") {
            settings.max_reference_depth = usize::try_from(val).map_err(|_| {
                ApplicationError::Config {
                    message: format!("OTDB_MAX_REFERENCE_DEPTH: invalid value {val}"),
                }
            })?;
        }
        if let Ok(val) = config.get_int("prune_level") {
            settings.prune_level = usize::try_from(val).map_err(|_| ApplicationError::Config {
                message: format!("OTDB_PRUNE_LEVEL: invalid value {val}"),
            })?;
        }

        Ok(settings)
    }

    /// Render as TOML (for `otdb config show`).
    pub fn to_toml(&self) -> Result<String, ApplicationError> {
        toml::to_string_pretty(self).map_err(|e| ApplicationError::Config {
            message: format!("serialize settings: {e}"),
        })
    }
}
