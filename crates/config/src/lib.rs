//! Layered configuration for hashcloud.
//!
//! Values are resolved in order, later layers winning:
//!
//! 1. built-in defaults, rooted in the platform data directory
//! 2. a config file (TOML, YAML or JSON, chosen by extension); when none is
//!    given, `config.toml` in the platform config directory is used if it
//!    exists
//! 3. environment variables prefixed with `HASHCLOUD_`, nested keys
//!    separated by `__` (`HASHCLOUD_STORAGE__ROOT=/srv/blobs`)
//!
//! The result is validated before it is handed out.

pub mod error;

use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::{OptionExt, ResultExt};
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

pub const ENV_PREFIX: &str = "HASHCLOUD_";
const DEFAULT_CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    pub storage: StorageConfig,
    pub catalog: CatalogConfig,
    pub log: LogConfig,
}

/// Where blobs are kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Backend name, shown in logs.
    pub name: String,
    /// Absolute directory holding the blob tree.
    pub root: PathBuf,
}

/// Where metadata records and the principal index are kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Absolute path of the SQLite database file.
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    /// `tracing-subscriber` env-filter directive; `RUST_LOG` overrides it.
    pub filter: String,
}

impl Config {
    /// Defaults under the platform's data directory for `hashcloud`.
    pub fn defaults() -> Result<Self> {
        let dirs = project_dirs()?;
        Ok(Self::rooted_at(dirs.data_dir()))
    }

    /// Defaults with every path under `dir`.
    pub fn rooted_at(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            storage: StorageConfig {
                name: "local".to_string(),
                root: dir.join("storage"),
            },
            catalog: CatalogConfig {
                path: dir.join("catalog.sqlite"),
            },
            log: LogConfig {
                filter: "info".to_string(),
            },
        }
    }

    /// Resolve the configuration from every layer.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let figment = Figment::new().merge(Serialized::defaults(Self::defaults()?));
        let figment = match file {
            Some(path) if !path.is_file() => exn::bail!(ErrorKind::FileNotFound(path.to_path_buf())),
            Some(path) => merge_file(figment, path)?,
            None => merge_file(figment, &project_dirs()?.config_dir().join(DEFAULT_CONFIG_FILE))?,
        };
        Self::extract(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    fn extract(figment: Figment) -> Result<Self> {
        let config: Self = figment.extract().or_raise(|| ErrorKind::Invalid)?;
        config.validate()?;
        debug!(?config, "Loaded configuration");
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.storage.name.trim().is_empty() {
            exn::bail!(ErrorKind::Empty("storage.name"));
        }
        if !self.storage.root.is_absolute() {
            exn::bail!(ErrorKind::RelativePath("storage.root", self.storage.root.clone()));
        }
        if !self.catalog.path.is_absolute() {
            exn::bail!(ErrorKind::RelativePath("catalog.path", self.catalog.path.clone()));
        }
        if self.log.filter.trim().is_empty() {
            exn::bail!(ErrorKind::Empty("log.filter"));
        }
        Ok(())
    }
}

fn project_dirs() -> Result<ProjectDirs> {
    ProjectDirs::from("", "", "hashcloud").ok_or_raise(|| ErrorKind::NoHomeDirectory)
}

/// Missing files are skipped by figment's file providers.
fn merge_file(figment: Figment, path: &Path) -> Result<Figment> {
    let extension = path.extension().and_then(|ext| ext.to_str()).map(str::to_ascii_lowercase);
    Ok(match extension.as_deref() {
        Some("toml") => figment.merge(Toml::file(path)),
        Some("yaml" | "yml") => figment.merge(Yaml::file(path)),
        Some("json") => figment.merge(Json::file(path)),
        _ => exn::bail!(ErrorKind::UnsupportedFormat(path.to_path_buf())),
    })
}
