//! Application configuration management
//!
//! Settings come from three layers, later layers winning:
//! built-in defaults, a `KEY=value` env file (`.env` by default, read as
//! INI) and the process environment.

use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use directories::UserDirs;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::utils::constants::DEFAULT_MAX_CONCURRENT;
use crate::utils::file_utils::ensure_dir_exists;
use crate::utils::logging::parse_log_level;

/// Default env file looked up in the working directory
pub const ENV_FILE: &str = ".env";

/// Environment keys understood by the application
pub const ENV_KEYS: [&str; 5] = [
    "DOWNLOADS_DIR",
    "LOG_LEVEL",
    "DATABASE_PATH",
    "MAX_CONCURRENT_DOWNLOADS",
    "LOG_FILE",
];

/// Main application configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    pub downloads_dir: PathBuf,
    pub log_level: String,
    pub database_path: PathBuf,
    pub max_concurrent_downloads: usize,
    pub log_file: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            downloads_dir: default_downloads_dir(),
            log_level: "INFO".to_string(),
            database_path: PathBuf::from("./app_data/downloads.db"),
            max_concurrent_downloads: DEFAULT_MAX_CONCURRENT,
            log_file: PathBuf::from("./logs/app.log"),
        }
    }
}

fn default_downloads_dir() -> PathBuf {
    UserDirs::new()
        .and_then(|dirs| {
            dirs.download_dir()
                .map(Path::to_path_buf)
                .or_else(|| Some(dirs.home_dir().join("Downloads")))
        })
        .unwrap_or_else(|| PathBuf::from("downloads"))
        .join("YouTube")
}

/// Configuration plus the problems that were replaced by defaults
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: AppConfig,
    pub warnings: Vec<String>,
}

impl AppConfig {
    /// Load from `.env` and the process environment, then create directories
    pub fn load() -> Result<LoadedConfig> {
        let vars: HashMap<String, String> = std::env::vars().collect();
        let loaded = Self::from_sources(Some(Path::new(ENV_FILE)), &vars)?;
        loaded.config.ensure_directories()?;
        Ok(loaded)
    }

    /// Build configuration from an optional env file and a variable map
    ///
    /// A value that cannot be parsed or fails validation falls back to its
    /// default on its own; the other keys are kept and a warning is returned.
    pub fn from_sources(
        env_file: Option<&Path>,
        vars: &HashMap<String, String>,
    ) -> Result<LoadedConfig> {
        let defaults = Self::default();
        let settings = Self::settings(env_file, vars, &defaults)?;
        let mut warnings = Vec::new();

        let mut config = AppConfig {
            downloads_dir: PathBuf::from(read_or_default(
                &settings,
                "downloads_dir",
                defaults.downloads_dir.to_string_lossy().to_string(),
                &mut warnings,
            )),
            log_level: read_or_default(
                &settings,
                "log_level",
                defaults.log_level.clone(),
                &mut warnings,
            ),
            database_path: PathBuf::from(read_or_default(
                &settings,
                "database_path",
                defaults.database_path.to_string_lossy().to_string(),
                &mut warnings,
            )),
            max_concurrent_downloads: read_or_default(
                &settings,
                "max_concurrent_downloads",
                defaults.max_concurrent_downloads,
                &mut warnings,
            ),
            log_file: PathBuf::from(read_or_default(
                &settings,
                "log_file",
                defaults.log_file.to_string_lossy().to_string(),
                &mut warnings,
            )),
        };
        warnings.extend(config.reset_invalid_fields());

        tracing::debug!("Loaded configuration: {:?}", config);
        Ok(LoadedConfig { config, warnings })
    }

    /// Layer defaults, the env file and the process environment
    fn settings(
        env_file: Option<&Path>,
        vars: &HashMap<String, String>,
        defaults: &AppConfig,
    ) -> Result<Config> {
        // 环境变量名统一转为小写字段名，文件中的键同样经由 Environment 映射
        let file_values: HashMap<String, String> = match env_file {
            Some(path) => Config::builder()
                .add_source(
                    File::new(&path.to_string_lossy(), FileFormat::Ini).required(false),
                )
                .build()
                .with_context(|| format!("Failed to read env file: {:?}", path))?
                .try_deserialize()
                .with_context(|| format!("Env file {:?} must hold plain KEY=value lines", path))?,
            None => HashMap::new(),
        };

        Config::builder()
            .set_default(
                "downloads_dir",
                defaults.downloads_dir.to_string_lossy().to_string(),
            )?
            .set_default("log_level", defaults.log_level.clone())?
            .set_default(
                "database_path",
                defaults.database_path.to_string_lossy().to_string(),
            )?
            .set_default(
                "max_concurrent_downloads",
                defaults.max_concurrent_downloads as i64,
            )?
            .set_default("log_file", defaults.log_file.to_string_lossy().to_string())?
            .add_source(Environment::default().source(Some(known_keys(&file_values))))
            .add_source(Environment::default().source(Some(known_keys(vars))))
            .build()
            .with_context(|| "Failed to assemble configuration")
    }

    /// Replace out-of-range values with defaults, returning one warning each
    pub fn reset_invalid_fields(&mut self) -> Vec<String> {
        let defaults = Self::default();
        let mut warnings = Vec::new();

        if let Err(e) = check_concurrency(self.max_concurrent_downloads) {
            warnings.push(format!(
                "{}; using {}",
                e, defaults.max_concurrent_downloads
            ));
            self.max_concurrent_downloads = defaults.max_concurrent_downloads;
        }
        if let Err(e) = check_log_level(&self.log_level) {
            warnings.push(format!("{}; using {}", e, defaults.log_level));
            self.log_level = defaults.log_level;
        }
        if self.downloads_dir.as_os_str().is_empty() {
            warnings.push(format!(
                "DOWNLOADS_DIR must not be empty; using {}",
                defaults.downloads_dir.display()
            ));
            self.downloads_dir = defaults.downloads_dir;
        }

        warnings
    }

    /// Create the downloads directory and the database parent directory
    pub fn ensure_directories(&self) -> Result<()> {
        ensure_dir_exists(&self.downloads_dir)
            .with_context(|| "Failed to create downloads directory")?;

        if let Some(parent) = self.database_path.parent() {
            if !parent.as_os_str().is_empty() {
                ensure_dir_exists(parent)
                    .with_context(|| "Failed to create database directory")?;
            }
        }

        Ok(())
    }

    /// Full path for a download, or the downloads directory itself
    pub fn get_download_path(&self, filename: Option<&str>) -> PathBuf {
        match filename {
            Some(name) => self.downloads_dir.join(name),
            None => self.downloads_dir.clone(),
        }
    }

    /// Get configuration as environment variables (for debugging)
    pub fn to_env_vars(&self) -> HashMap<String, String> {
        let mut env_vars = HashMap::new();
        env_vars.insert(
            "DOWNLOADS_DIR".to_string(),
            self.downloads_dir.display().to_string(),
        );
        env_vars.insert("LOG_LEVEL".to_string(), self.log_level.clone());
        env_vars.insert(
            "DATABASE_PATH".to_string(),
            self.database_path.display().to_string(),
        );
        env_vars.insert(
            "MAX_CONCURRENT_DOWNLOADS".to_string(),
            self.max_concurrent_downloads.to_string(),
        );
        env_vars.insert("LOG_FILE".to_string(), self.log_file.display().to_string());
        env_vars
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        check_concurrency(self.max_concurrent_downloads)?;
        check_log_level(&self.log_level)?;

        if self.downloads_dir.as_os_str().is_empty() {
            anyhow::bail!("DOWNLOADS_DIR must not be empty");
        }

        Ok(())
    }
}

fn check_concurrency(value: usize) -> Result<()> {
    if value == 0 {
        anyhow::bail!("MAX_CONCURRENT_DOWNLOADS must be greater than 0");
    }
    if value > 20 {
        anyhow::bail!("MAX_CONCURRENT_DOWNLOADS should not exceed 20");
    }
    Ok(())
}

fn check_log_level(level: &str) -> Result<()> {
    if parse_log_level(level).is_none() {
        anyhow::bail!(
            "Invalid LOG_LEVEL '{}': must be one of TRACE, DEBUG, INFO, WARNING, ERROR, CRITICAL",
            level
        );
    }
    Ok(())
}

/// Only the keys the application understands, whatever their case
fn known_keys(values: &HashMap<String, String>) -> HashMap<String, String> {
    values
        .iter()
        .filter(|(key, _)| ENV_KEYS.iter().any(|known| known.eq_ignore_ascii_case(key)))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

fn read_or_default<T: DeserializeOwned + std::fmt::Display>(
    settings: &Config,
    key: &str,
    default: T,
    warnings: &mut Vec<String>,
) -> T {
    match settings.get::<T>(key) {
        Ok(value) => value,
        Err(e) => {
            warnings.push(format!(
                "Invalid {}: {}; using {}",
                key.to_uppercase(),
                e,
                default
            ));
            default
        }
    }
}
