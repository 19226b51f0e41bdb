//! Download history
//!
//! Every download attempt is appended to a JSON-lines file at
//! `DATABASE_PATH`, one record per line.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::core::models::{
    AppError, AppResult, DownloadTask, DownloadType, QualityPreset, TaskStatus,
};

/// One finished download attempt
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryEntry {
    pub task_id: String,
    pub url: String,
    pub title: String,
    pub quality: QualityPreset,
    /// Format selector handed to the engine
    pub format: String,
    pub download_type: DownloadType,
    pub status: TaskStatus,
    pub error: Option<String>,
    pub file_path: Option<PathBuf>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn from_task(task: &DownloadTask, started_at: DateTime<Utc>) -> Self {
        Self {
            task_id: task.id.clone(),
            url: task.url.clone(),
            title: task.title.clone(),
            quality: task.quality,
            format: task.quality.format_selector().to_string(),
            download_type: task.download_type,
            status: task.status,
            error: task.error_message.clone(),
            file_path: task.file_path.clone(),
            started_at,
            finished_at: Utc::now(),
        }
    }
}

/// Append-only history file
#[derive(Debug)]
pub struct DownloadHistory {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl DownloadHistory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one entry
    pub async fn record(&self, entry: &HistoryEntry) -> AppResult<()> {
        let mut line = serde_json::to_string(entry)
            .map_err(|e| AppError::System(format!("Failed to serialize history entry: {}", e)))?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        debug!("Recorded history entry for {}", entry.url);
        Ok(())
    }

    /// Most recent entries, newest first
    pub async fn recent(&self, limit: usize) -> AppResult<Vec<HistoryEntry>> {
        let contents = match fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let entries = contents
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .filter_map(|(index, line)| match serde_json::from_str::<HistoryEntry>(line) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!("Skipping malformed history line {}: {}", index + 1, e);
                    None
                }
            })
            .collect::<Vec<_>>();

        Ok(entries.into_iter().rev().take(limit).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn entry(url: &str, status: TaskStatus) -> HistoryEntry {
        let mut task = DownloadTask::new(url, "Clip", QualityPreset::Medium, DownloadType::Video);
        task.status = status;
        if status == TaskStatus::Failed {
            task.error_message = Some("Download error: boom".to_string());
        }
        HistoryEntry::from_task(&task, Utc::now())
    }

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let history = DownloadHistory::new(dir.path().join("none.db"));
        assert!(history.recent(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_record_and_read_newest_first() {
        let dir = tempdir().unwrap();
        let history = DownloadHistory::new(dir.path().join("app_data").join("downloads.db"));

        history
            .record(&entry("https://youtu.be/a", TaskStatus::Completed))
            .await
            .unwrap();
        history
            .record(&entry("https://youtu.be/b", TaskStatus::Failed))
            .await
            .unwrap();
        history
            .record(&entry("https://youtu.be/c", TaskStatus::Cancelled))
            .await
            .unwrap();

        let recent = history.recent(2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].url, "https://youtu.be/c");
        assert_eq!(recent[1].url, "https://youtu.be/b");
        assert_eq!(recent[1].error.as_deref(), Some("Download error: boom"));
        assert_eq!(
            recent[1].format,
            "bestvideo[height<=720]+bestaudio/best[height<=720]"
        );
    }

    #[tokio::test]
    async fn test_malformed_lines_are_skipped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("downloads.db");
        let history = DownloadHistory::new(&path);
        history
            .record(&entry("https://youtu.be/a", TaskStatus::Completed))
            .await
            .unwrap();

        let mut contents = std::fs::read_to_string(&path).unwrap();
        contents.push_str("{not json}\n");
        std::fs::write(&path, contents).unwrap();

        let recent = history.recent(10).await.unwrap();
        assert_eq!(recent.len(), 1);
    }
}
