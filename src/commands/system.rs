//! System command handlers
//!
//! Tool availability checks and application information.

use serde::Serialize;
use tracing::{error, info, warn};

use crate::core::downloader::{check_ffmpeg as probe_ffmpeg, YtDlpDownloader};
use crate::utils::constants::{APP_AUTHOR, APP_NAME, APP_VERSION};

/// Application name, version and author
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AppInfo {
    pub name: &'static str,
    pub version: &'static str,
    pub author: &'static str,
}

/// Versions of the external tools, `None` when missing
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DependencyReport {
    pub yt_dlp: Option<String>,
    pub ffmpeg: Option<String>,
}

impl DependencyReport {
    /// yt-dlp is required; ffmpeg only for merging, audio extraction and thumbnails
    pub fn can_download(&self) -> bool {
        self.yt_dlp.is_some()
    }
}

pub fn get_app_info() -> AppInfo {
    AppInfo {
        name: APP_NAME,
        version: APP_VERSION,
        author: APP_AUTHOR,
    }
}

/// Check if yt-dlp is available, returning its version
pub async fn check_yt_dlp() -> Result<String, String> {
    info!("📺 Checking yt-dlp availability");

    match YtDlpDownloader::new().check_yt_dlp().await {
        Ok(version) => {
            info!("✅ yt-dlp {} is available", version);
            Ok(version)
        }
        Err(e) => {
            warn!("⚠️ yt-dlp is not available: {}", e);
            Err(e.to_string())
        }
    }
}

/// Check if FFmpeg is available, returning its version line
pub async fn check_ffmpeg() -> Result<String, String> {
    info!("🎬 Checking FFmpeg availability");

    match probe_ffmpeg().await {
        Ok(version) => {
            info!("✅ {}", version);
            Ok(version)
        }
        Err(e) => {
            warn!("⚠️ FFmpeg is not available: {}", e);
            Err(e.to_string())
        }
    }
}

pub async fn check_dependencies() -> DependencyReport {
    let (yt_dlp, ffmpeg) = tokio::join!(check_yt_dlp(), check_ffmpeg());
    let report = DependencyReport {
        yt_dlp: yt_dlp.ok(),
        ffmpeg: ffmpeg.ok(),
    };
    if !report.can_download() {
        error!("❌ yt-dlp is required for downloading");
    }
    report
}
