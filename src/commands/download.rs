//! Download management commands
//!
//! Control calls go through the runtime router; read-only queries read the
//! manager directly. Errors are returned as display strings for the front end.

use tracing::{error, info, warn};

use crate::core::error_handling::user_friendly_message;
use crate::core::history::HistoryEntry;
use crate::core::models::{AppError, DownloadStats, DownloadTask, DownloadType, QualityPreset};
use crate::core::validators::validate_youtube_url;
use crate::AppState;

/// Validate, resolve a title and queue one URL
///
/// `quality` is a preset label or alias; unknown labels fall back to the
/// best preset and a missing one picks the default for `download_type`.
pub async fn enqueue_download(
    state: &AppState,
    url: String,
    download_type: DownloadType,
    quality: Option<String>,
) -> Result<DownloadTask, String> {
    let url = url.trim().to_string();
    if let Err(e) = validate_youtube_url(&url) {
        warn!("Rejected URL {:?}: {}", url, e);
        return Err(e.message().to_string());
    }

    let preset = match quality.as_deref() {
        Some(label) => QualityPreset::from_label_or_best(label),
        None => QualityPreset::default_for(download_type),
    };

    let title = match state.backend.fetch_info(&url).await {
        Ok(info) => info.display_title(),
        Err(e) => {
            warn!("Could not fetch info for {}: {}", url, e);
            "Unknown".to_string()
        }
    };

    match state
        .download_runtime
        .add(url.clone(), preset, download_type, title)
        .await
    {
        Ok(task) => {
            info!("Queued {} as {}", task.url, task.title);
            Ok(task)
        }
        Err(AppError::Duplicate(url)) => Err(format!("Already in the queue: {}", url)),
        Err(e) => {
            error!("Failed to queue {}: {}", url, e);
            Err(user_friendly_message(&e))
        }
    }
}

pub async fn cancel_download(state: &AppState, task_id: String) -> Result<(), String> {
    state
        .download_runtime
        .cancel(task_id)
        .await
        .map_err(|e| e.to_string())
}

pub async fn cancel_all_downloads(state: &AppState) -> Result<usize, String> {
    state
        .download_runtime
        .cancel_all()
        .await
        .map_err(|e| e.to_string())
}

pub async fn remove_download(state: &AppState, task_id: String) -> Result<DownloadTask, String> {
    state
        .download_runtime
        .remove(task_id)
        .await
        .map_err(|e| e.to_string())
}

pub async fn retry_failed_tasks(state: &AppState) -> Result<usize, String> {
    state
        .download_runtime
        .retry_failed()
        .await
        .map_err(|e| e.to_string())
}

pub async fn clear_finished_tasks(state: &AppState) -> Result<usize, String> {
    state
        .download_runtime
        .clear_finished()
        .await
        .map_err(|e| e.to_string())
}

pub async fn get_download_tasks(state: &AppState) -> Result<Vec<DownloadTask>, String> {
    state
        .download_runtime
        .snapshot()
        .await
        .map_err(|e| e.to_string())
}

pub fn get_active_downloads(state: &AppState) -> Vec<DownloadTask> {
    state.download_manager.get_active_downloads()
}

pub fn get_download_stats(state: &AppState) -> DownloadStats {
    state.download_manager.get_stats()
}

/// Most recent history entries, newest first
pub async fn get_download_history(
    state: &AppState,
    limit: usize,
) -> Result<Vec<HistoryEntry>, String> {
    let Some(history) = state.download_manager.history() else {
        return Ok(Vec::new());
    };
    history.recent(limit).await.map_err(|e| {
        error!("Failed to read download history: {}", e);
        e.to_string()
    })
}
