//! YouTube Download - Core Library
//!
//! Queue-based YouTube and YouTube Music downloader driving yt-dlp, with
//! URL validation, quality presets, a concurrency-limited download manager
//! and a download history.

pub mod commands;
pub mod core;
pub mod ui;
pub mod utils;

// Re-export commonly used types
pub use core::{
    config::{AppConfig, LoadedConfig},
    downloader::{MediaBackend, YtDlpDownloader},
    history::DownloadHistory,
    manager::{DownloadEvent, DownloadManager, EventSender, ManagerOptions},
    models::{DownloadTask, DownloadType, ProgressUpdate, QualityPreset, TaskStatus},
    runtime::{spawn_download_runtime, DownloadRuntimeHandle},
};

use std::sync::Arc;
use tokio::sync::RwLock;

use crate::utils::logging::{init_tracing, LogGuard};

/// Application state shared between command handlers
#[derive(Clone)]
pub struct AppState {
    pub download_manager: DownloadManager,
    pub backend: Arc<dyn MediaBackend>,
    pub config: Arc<RwLock<AppConfig>>,
    pub download_runtime: DownloadRuntimeHandle,
}

impl AppState {
    /// Build the state around the yt-dlp engine
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(config: AppConfig, event_sender: Option<EventSender>) -> anyhow::Result<Self> {
        Self::with_backend(config, Arc::new(YtDlpDownloader::new()), event_sender)
    }

    pub fn with_backend(
        config: AppConfig,
        backend: Arc<dyn MediaBackend>,
        event_sender: Option<EventSender>,
    ) -> anyhow::Result<Self> {
        let options = ManagerOptions {
            output_dir: config.downloads_dir.clone(),
            max_concurrent: config.max_concurrent_downloads,
            event_sender,
            history: Some(DownloadHistory::new(&config.database_path)),
        };

        let download_manager = DownloadManager::new(Arc::clone(&backend), options);
        let download_runtime = spawn_download_runtime(download_manager.clone())
            .map_err(|e| anyhow::anyhow!("Failed to start download runtime: {}", e))?;

        Ok(Self {
            download_manager,
            backend,
            config: Arc::new(RwLock::new(config)),
            download_runtime,
        })
    }

    /// Load configuration, falling back to defaults when it is unusable
    ///
    /// Runs before logging is set up, so problems are handed back for the
    /// caller to report.
    pub fn load_or_initialize_config() -> LoadedConfig {
        match AppConfig::load() {
            Ok(loaded) => loaded,
            Err(err) => {
                let mut warnings = vec![format!(
                    "Failed to load configuration: {:#}. Using defaults",
                    err
                )];
                let default_cfg = AppConfig::default();
                if let Err(err) = default_cfg.ensure_directories() {
                    warnings.push(format!("Failed to create default directories: {:#}", err));
                }
                LoadedConfig {
                    config: default_cfg,
                    warnings,
                }
            }
        }
    }
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Initialize logging from the configuration
///
/// Keep the returned guard alive for as long as file logging is needed.
pub fn init(config: &AppConfig, console: bool) -> LogGuard {
    let guard = init_tracing(&config.log_level, Some(&config.log_file), console);
    tracing::info!("{} v{} initialized", NAME, VERSION);
    guard
}
