//! Core data models for the downloader application

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Task status enumeration
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TaskStatus {
    Pending,
    Downloading,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    /// Whether a worker is done with a task in this state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "Pending",
            TaskStatus::Downloading => "Downloading",
            TaskStatus::Completed => "Completed",
            TaskStatus::Failed => "Failed",
            TaskStatus::Cancelled => "Cancelled",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// What the user asked to keep from the source
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum DownloadType {
    Video,
    Audio,
}

impl fmt::Display for DownloadType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DownloadType::Video => f.write_str("video"),
            DownloadType::Audio => f.write_str("audio"),
        }
    }
}

/// Named quality presets mapped to yt-dlp format selectors
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum QualityPreset {
    Best,
    High,
    Medium,
    Low,
    AudioBest,
    AudioMp3,
}

impl QualityPreset {
    pub const ALL: [QualityPreset; 6] = [
        QualityPreset::Best,
        QualityPreset::High,
        QualityPreset::Medium,
        QualityPreset::Low,
        QualityPreset::AudioBest,
        QualityPreset::AudioMp3,
    ];

    /// User-facing label
    pub fn label(&self) -> &'static str {
        match self {
            QualityPreset::Best => "Best quality",
            QualityPreset::High => "High (1080p)",
            QualityPreset::Medium => "Medium (720p)",
            QualityPreset::Low => "Low (480p)",
            QualityPreset::AudioBest => "Best audio",
            QualityPreset::AudioMp3 => "Audio MP3",
        }
    }

    /// Format selector handed to yt-dlp via `-f`
    pub fn format_selector(&self) -> &'static str {
        match self {
            QualityPreset::Best => "best",
            QualityPreset::High => "bestvideo[height<=1080]+bestaudio/best[height<=1080]",
            QualityPreset::Medium => "bestvideo[height<=720]+bestaudio/best[height<=720]",
            QualityPreset::Low => "bestvideo[height<=480]+bestaudio/best[height<=480]",
            QualityPreset::AudioBest => "bestaudio/best",
            QualityPreset::AudioMp3 => "bestaudio[ext=m4a]",
        }
    }

    pub fn is_audio(&self) -> bool {
        matches!(self, QualityPreset::AudioBest | QualityPreset::AudioMp3)
    }

    /// Preset selected when the user switches download type
    pub fn default_for(download_type: DownloadType) -> Self {
        match download_type {
            DownloadType::Video => QualityPreset::Best,
            DownloadType::Audio => QualityPreset::AudioBest,
        }
    }

    /// Lenient lookup: unknown labels fall back to `Best`
    pub fn from_label_or_best(label: &str) -> Self {
        label.parse().unwrap_or(QualityPreset::Best)
    }
}

impl fmt::Display for QualityPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for QualityPreset {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();

        if let Some(preset) = Self::ALL
            .iter()
            .find(|preset| preset.label().to_lowercase() == wanted)
        {
            return Ok(*preset);
        }

        // short aliases for the command line
        match wanted.as_str() {
            "best" => Ok(QualityPreset::Best),
            "high" | "1080p" | "1080" => Ok(QualityPreset::High),
            "medium" | "720p" | "720" => Ok(QualityPreset::Medium),
            "low" | "480p" | "480" => Ok(QualityPreset::Low),
            "audio" | "audio-best" | "bestaudio" => Ok(QualityPreset::AudioBest),
            "mp3" | "audio-mp3" => Ok(QualityPreset::AudioMp3),
            _ => Err(AppError::Validation(format!(
                "Unknown quality preset: {}",
                s
            ))),
        }
    }
}

/// A single requested video/audio transfer tracked by the queue manager
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadTask {
    pub id: String,

    pub url: String,

    pub title: String,

    pub quality: QualityPreset,

    pub download_type: DownloadType,

    pub status: TaskStatus,

    /// Percent in 0..=100
    pub progress: f64,

    pub downloaded_bytes: u64,

    pub total_bytes: Option<u64>,

    pub speed: Option<f64>,

    pub eta: Option<u64>,

    pub error_message: Option<String>,

    pub file_path: Option<PathBuf>,

    pub created_at: chrono::DateTime<chrono::Utc>,

    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl DownloadTask {
    pub fn new(
        url: impl Into<String>,
        title: impl Into<String>,
        quality: QualityPreset,
        download_type: DownloadType,
    ) -> Self {
        let now = chrono::Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            url: url.into(),
            title: title.into(),
            quality,
            download_type,
            status: TaskStatus::Pending,
            progress: 0.0,
            downloaded_bytes: 0,
            total_bytes: None,
            speed: None,
            eta: None,
            error_message: None,
            file_path: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub(crate) fn touch(&mut self) {
        self.updated_at = chrono::Utc::now();
    }
}

/// Progress update information
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProgressUpdate {
    pub task_id: String,

    pub downloaded_bytes: u64,

    pub total_bytes: u64,

    /// Percent in 0..=100
    pub percent: f64,

    pub speed: Option<f64>,

    pub eta: Option<u64>,
}

/// Download statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DownloadStats {
    pub total_tasks: usize,

    pub pending_tasks: usize,

    pub active_downloads: usize,

    pub completed_tasks: usize,

    pub failed_tasks: usize,

    pub cancelled_tasks: usize,
}

/// Media metadata fetched without downloading
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaInfo {
    pub id: String,

    pub title: String,

    pub uploader: Option<String>,

    /// Duration in seconds
    pub duration: Option<f64>,

    pub thumbnail: Option<String>,

    pub webpage_url: Option<String>,

    /// Entries of a playlist, empty for single videos
    pub entries: Vec<PlaylistEntry>,

    pub is_playlist: bool,
}

impl MediaInfo {
    /// Title shown in the queue, playlists carry their item count
    pub fn display_title(&self) -> String {
        if self.is_playlist {
            format!("{} ({} videos)", self.title, self.entries.len())
        } else {
            self.title.clone()
        }
    }
}

/// Flat playlist entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaylistEntry {
    pub id: String,

    pub title: Option<String>,

    pub url: Option<String>,

    pub duration: Option<f64>,
}

/// Application error types
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parsing error: {0}")]
    Parse(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Download already exists: {0}")]
    Duplicate(String),

    #[error("Task not found: {0}")]
    NotFound(String),

    #[error("Download error: {0}")]
    Download(String),

    #[error("Download cancelled")]
    Cancelled,

    #[error("Unexpected error during download: {0}")]
    Unexpected(String),

    #[error("Missing dependency: {0}")]
    MissingDependency(String),

    #[error("System error: {0}")]
    System(String),
}

/// Result type alias for application operations
pub type AppResult<T> = Result<T, AppError>;
