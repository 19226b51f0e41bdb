//! YouTube command handlers
//!
//! Metadata lookups, URL inspection and the preset catalogue.

use serde::Serialize;
use tracing::{error, info};

use crate::core::error_handling::user_friendly_message;
use crate::core::models::{MediaInfo, QualityPreset};
use crate::core::validators::{
    classify_url, extract_playlist_id, extract_video_id, validate_youtube_url, UrlKind,
};
use crate::AppState;

/// What a URL points at
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct UrlDescription {
    pub url: String,
    pub kind: UrlKind,
    pub video_id: Option<String>,
    pub playlist_id: Option<String>,
}

/// One entry of the preset catalogue
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PresetInfo {
    pub preset: QualityPreset,
    pub label: &'static str,
    pub format_selector: &'static str,
    pub audio: bool,
}

/// Get YouTube video or playlist information
pub async fn get_video_info(state: &AppState, url: String) -> Result<MediaInfo, String> {
    validate_youtube_url(&url).map_err(|e| e.message().to_string())?;
    info!("Getting video info for: {}", url);

    match state.backend.fetch_info(&url).await {
        Ok(info) => {
            info!("Retrieved info for: {}", info.display_title());
            Ok(info)
        }
        Err(e) => {
            error!("Failed to get video info: {}", e);
            Err(user_friendly_message(&e))
        }
    }
}

/// Validate and describe a URL without touching the network
pub fn describe_url(url: &str) -> Result<UrlDescription, String> {
    validate_youtube_url(url).map_err(|e| e.message().to_string())?;

    Ok(UrlDescription {
        url: url.to_string(),
        kind: classify_url(url),
        video_id: extract_video_id(url),
        playlist_id: extract_playlist_id(url),
    })
}

pub fn list_quality_presets() -> Vec<PresetInfo> {
    QualityPreset::ALL
        .iter()
        .map(|preset| PresetInfo {
            preset: *preset,
            label: preset.label(),
            format_selector: preset.format_selector(),
            audio: preset.is_audio(),
        })
        .collect()
}
