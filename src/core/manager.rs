//! Download Manager - queue and worker orchestration
//!
//! Owns every [`DownloadTask`], keeps a FIFO queue of pending work and runs
//! at most `max_concurrent` workers at a time. Workers report back through
//! [`DownloadEvent`]s on an unbounded channel so a front end can render
//! progress without ever blocking a download.

use chrono::Utc;
use futures::future::join_all;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::core::downloader::{
    DownloadOutcome, DownloadRequest, MediaBackend, ProgressCallback, ProgressSnapshot,
};
use crate::core::error_handling::{categorize, user_friendly_message, ErrorCategory};
use crate::core::history::{DownloadHistory, HistoryEntry};
use crate::core::models::{
    AppError, AppResult, DownloadStats, DownloadTask, DownloadType, ProgressUpdate,
    QualityPreset, TaskStatus,
};
use crate::utils::constants::DEFAULT_MAX_CONCURRENT;
use crate::utils::file_utils::{is_audio_file, is_video_file};

/// How long a cancelled worker gets to wind down before it is aborted
const CANCEL_GRACE: Duration = Duration::from_secs(10);

/// The media file among the engine outputs, skipping thumbnails and sidecars
fn primary_media_file(files: &[PathBuf]) -> Option<PathBuf> {
    files
        .iter()
        .rev()
        .find(|path| is_video_file(path) || is_audio_file(path))
        .or_else(|| files.last())
        .cloned()
}

fn added_message(task: &DownloadTask) -> String {
    format!(
        "Added download: {} ({}) [{}, {}]",
        task.title,
        task.url,
        task.download_type,
        task.quality.label()
    )
}

/// Events that can be emitted by the download manager
#[derive(Debug, Clone, serde::Serialize)]
#[serde(tag = "type", content = "payload")]
pub enum DownloadEvent {
    TaskAdded {
        task: DownloadTask,
    },
    TaskStarted {
        task_id: String,
    },
    TaskProgress {
        task_id: String,
        progress: ProgressUpdate,
    },
    StatusChanged {
        task_id: String,
        status: TaskStatus,
    },
    TaskCompleted {
        task_id: String,
        file_path: Option<String>,
    },
    TaskFailed {
        task_id: String,
        error: String,
        category: ErrorCategory,
    },
    TaskCancelled {
        task_id: String,
    },
    TaskRemoved {
        task_id: String,
    },
    StatsUpdated {
        stats: DownloadStats,
    },
}

/// Event sender type for download events
pub type EventSender = mpsc::UnboundedSender<DownloadEvent>;

/// Construction options for [`DownloadManager`]
pub struct ManagerOptions {
    pub output_dir: PathBuf,
    pub max_concurrent: usize,
    pub event_sender: Option<EventSender>,
    pub history: Option<DownloadHistory>,
}

impl ManagerOptions {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            event_sender: None,
            history: None,
        }
    }
}

struct ActiveDownload {
    cancel: CancellationToken,
    /// Taken by the first canceller that waits on the worker
    handle: Option<JoinHandle<()>>,
}

#[derive(Default)]
struct ManagerState {
    tasks: HashMap<String, DownloadTask>,
    /// Insertion order of `tasks`
    order: Vec<String>,
    queue: VecDeque<String>,
    active: HashMap<String, ActiveDownload>,
    max_concurrent: usize,
}

impl ManagerState {
    fn stats(&self) -> DownloadStats {
        let count = |status: TaskStatus| self.tasks.values().filter(|t| t.status == status).count();
        DownloadStats {
            total_tasks: self.tasks.len(),
            pending_tasks: count(TaskStatus::Pending),
            active_downloads: self.active.len(),
            completed_tasks: count(TaskStatus::Completed),
            failed_tasks: count(TaskStatus::Failed),
            cancelled_tasks: count(TaskStatus::Cancelled),
        }
    }

    fn is_idle(&self) -> bool {
        self.active.is_empty()
            && !self.queue.iter().any(|id| {
                self.tasks
                    .get(id)
                    .map_or(false, |task| task.status == TaskStatus::Pending)
            })
    }

    fn drop_task(&mut self, task_id: &str) -> Option<DownloadTask> {
        self.queue.retain(|id| id != task_id);
        self.order.retain(|id| id != task_id);
        self.tasks.remove(task_id)
    }
}

struct ManagerInner {
    backend: Arc<dyn MediaBackend>,
    output_dir: PathBuf,
    event_sender: Option<EventSender>,
    history: Option<DownloadHistory>,
    state: Mutex<ManagerState>,
    idle: Notify,
}

/// Main download manager
///
/// Cloning is cheap; every clone drives the same queue.
#[derive(Clone)]
pub struct DownloadManager {
    inner: Arc<ManagerInner>,
}

impl DownloadManager {
    pub fn new(backend: Arc<dyn MediaBackend>, options: ManagerOptions) -> Self {
        let state = ManagerState {
            max_concurrent: options.max_concurrent.max(1),
            ..ManagerState::default()
        };

        Self {
            inner: Arc::new(ManagerInner {
                backend,
                output_dir: options.output_dir,
                event_sender: options.event_sender,
                history: options.history,
                state: Mutex::new(state),
                idle: Notify::new(),
            }),
        }
    }

    pub fn backend(&self) -> Arc<dyn MediaBackend> {
        Arc::clone(&self.inner.backend)
    }

    pub fn history(&self) -> Option<&DownloadHistory> {
        self.inner.history.as_ref()
    }

    pub fn output_dir(&self) -> &PathBuf {
        &self.inner.output_dir
    }

    fn emit(&self, event: DownloadEvent) {
        if let Some(sender) = &self.inner.event_sender {
            if sender.send(event).is_err() {
                debug!("Event receiver dropped; discarding download event");
            }
        }
    }

    fn emit_stats(&self, stats: DownloadStats) {
        self.emit(DownloadEvent::StatsUpdated { stats });
    }

    /// Queue a new download
    ///
    /// URLs are unique across the manager: a URL that is already tracked is
    /// rejected with [`AppError::Duplicate`] whatever its status.
    pub fn add_download(
        &self,
        url: &str,
        quality: QualityPreset,
        download_type: DownloadType,
        title: &str,
    ) -> AppResult<DownloadTask> {
        let task = {
            let mut state = self.inner.state.lock();

            if state.tasks.values().any(|task| task.url == url) {
                warn!("Download already exists for URL: {}", url);
                return Err(AppError::Duplicate(url.to_string()));
            }

            let task = DownloadTask::new(url, title, quality, download_type);
            state.order.push(task.id.clone());
            state.queue.push_back(task.id.clone());
            state.tasks.insert(task.id.clone(), task.clone());
            task
        };

        info!("{}", added_message(&task));
        self.emit(DownloadEvent::TaskAdded { task: task.clone() });
        self.process_queue();
        Ok(task)
    }

    /// Start queued tasks while worker slots are free
    ///
    /// Must be called from within a tokio runtime.
    pub fn process_queue(&self) {
        let mut started = Vec::new();

        let stats = {
            let mut state = self.inner.state.lock();

            while state.active.len() < state.max_concurrent {
                let Some(task_id) = state.queue.pop_front() else {
                    break;
                };

                let task = match state.tasks.get_mut(&task_id) {
                    Some(task) if task.status == TaskStatus::Pending => {
                        task.status = TaskStatus::Downloading;
                        task.touch();
                        task.clone()
                    }
                    _ => continue,
                };

                let cancel = CancellationToken::new();
                let handle = tokio::spawn(self.clone().run_worker(task, cancel.clone()));
                state.active.insert(
                    task_id.clone(),
                    ActiveDownload {
                        cancel,
                        handle: Some(handle),
                    },
                );
                started.push(task_id);
            }

            if state.is_idle() {
                self.inner.idle.notify_waiters();
            }
            state.stats()
        };

        for task_id in started {
            debug!("Started worker for task {}", task_id);
            self.emit(DownloadEvent::StatusChanged {
                task_id: task_id.clone(),
                status: TaskStatus::Downloading,
            });
            self.emit(DownloadEvent::TaskStarted { task_id });
        }
        self.emit_stats(stats);
    }

    async fn run_worker(self, task: DownloadTask, cancel: CancellationToken) {
        let started_at = Utc::now();
        info!(
            url = %task.url,
            format = task.quality.format_selector(),
            started_at = %started_at,
            "Download attempt started"
        );

        let request = DownloadRequest {
            task_id: task.id.clone(),
            url: task.url.clone(),
            quality: task.quality,
            download_type: task.download_type,
            output_dir: self.inner.output_dir.clone(),
        };

        let progress_manager = self.clone();
        let progress_task_id = task.id.clone();
        let on_progress: ProgressCallback = Arc::new(move |snapshot: ProgressSnapshot| {
            progress_manager.handle_progress(&progress_task_id, &snapshot);
        });

        let result = self
            .inner
            .backend
            .download(&request, on_progress, cancel)
            .await;

        if let Some(finished) = self.finish_task(&task.id, result) {
            info!(
                url = %finished.url,
                format = finished.quality.format_selector(),
                outcome = %finished.status,
                error = finished.error_message.as_deref().unwrap_or(""),
                "Download attempt finished"
            );

            if let Some(history) = &self.inner.history {
                let entry = HistoryEntry::from_task(&finished, started_at);
                if let Err(e) = history.record(&entry).await {
                    warn!("Failed to record download history: {}", e);
                }
            }
        }

        self.inner.state.lock().active.remove(&task.id);
        self.process_queue();
    }

    fn handle_progress(&self, task_id: &str, snapshot: &ProgressSnapshot) {
        let (Some(percent), Some(total)) = (snapshot.percent(), snapshot.total()) else {
            return;
        };

        let update = {
            let mut state = self.inner.state.lock();
            let Some(task) = state.tasks.get_mut(task_id) else {
                return;
            };
            if task.status != TaskStatus::Downloading {
                return;
            }

            task.progress = percent;
            task.downloaded_bytes = snapshot.downloaded_bytes;
            task.total_bytes = Some(total);
            task.speed = snapshot.speed;
            task.eta = snapshot.eta;
            task.touch();

            ProgressUpdate {
                task_id: task_id.to_string(),
                downloaded_bytes: snapshot.downloaded_bytes,
                total_bytes: total,
                percent,
                speed: snapshot.speed,
                eta: snapshot.eta,
            }
        };

        self.emit(DownloadEvent::TaskProgress {
            task_id: task_id.to_string(),
            progress: update,
        });
    }

    /// Record a worker result
    ///
    /// A task that left `Downloading` while the worker ran (cancelled or
    /// removed) keeps its state.
    fn finish_task(
        &self,
        task_id: &str,
        result: AppResult<DownloadOutcome>,
    ) -> Option<DownloadTask> {
        let mut events = Vec::new();

        let (finished, stats) = {
            let mut state = self.inner.state.lock();
            let task = state.tasks.get_mut(task_id)?;
            if task.status != TaskStatus::Downloading {
                debug!(
                    "Worker for {} finished after task became {}; keeping state",
                    task_id, task.status
                );
                let finished = task.clone();
                return Some(finished);
            }

            task.speed = None;
            task.eta = None;
            match result {
                Ok(outcome) => {
                    task.status = TaskStatus::Completed;
                    task.progress = 100.0;
                    task.file_path = primary_media_file(&outcome.files);
                    events.push(DownloadEvent::TaskCompleted {
                        task_id: task_id.to_string(),
                        file_path: task
                            .file_path
                            .as_ref()
                            .map(|path| path.display().to_string()),
                    });
                }
                Err(AppError::Cancelled) => {
                    task.status = TaskStatus::Cancelled;
                    events.push(DownloadEvent::TaskCancelled {
                        task_id: task_id.to_string(),
                    });
                }
                Err(e) => {
                    error!("Download failed for {}: {}", task.url, e);
                    task.status = TaskStatus::Failed;
                    task.error_message = Some(e.to_string());
                    events.push(DownloadEvent::TaskFailed {
                        task_id: task_id.to_string(),
                        error: user_friendly_message(&e),
                        category: categorize(&e),
                    });
                }
            }
            task.touch();
            let finished = task.clone();

            (finished, state.stats())
        };

        self.emit(DownloadEvent::StatusChanged {
            task_id: task_id.to_string(),
            status: finished.status,
        });
        for event in events {
            self.emit(event);
        }
        self.emit_stats(stats);
        Some(finished)
    }

    /// Cancel a queued or running download
    ///
    /// Running workers are signalled and awaited. Finished tasks are left
    /// untouched.
    pub async fn cancel_download(&self, task_id: &str) -> AppResult<()> {
        let active = {
            let mut state = self.inner.state.lock();
            let task = state
                .tasks
                .get_mut(task_id)
                .ok_or_else(|| AppError::NotFound(task_id.to_string()))?;

            if task.status.is_terminal() {
                debug!("Task {} already {}; nothing to cancel", task_id, task.status);
                return Ok(());
            }

            task.status = TaskStatus::Cancelled;
            task.speed = None;
            task.eta = None;
            task.touch();
            state.queue.retain(|id| id != task_id);
            state
                .active
                .get_mut(task_id)
                .map(|active| (active.cancel.clone(), active.handle.take()))
        };

        info!("Cancelling download {}", task_id);
        self.emit(DownloadEvent::StatusChanged {
            task_id: task_id.to_string(),
            status: TaskStatus::Cancelled,
        });
        self.emit(DownloadEvent::TaskCancelled {
            task_id: task_id.to_string(),
        });

        // the slot stays taken until the worker has exited
        if let Some((cancel, handle)) = active {
            cancel.cancel();
            if let Some(mut handle) = handle {
                match tokio::time::timeout(CANCEL_GRACE, &mut handle).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) if e.is_cancelled() => {}
                    Ok(Err(e)) => warn!("Worker for {} panicked: {}", task_id, e),
                    Err(_) => {
                        warn!("Worker for {} ignored cancellation; aborting", task_id);
                        handle.abort();
                    }
                }
                self.inner.state.lock().active.remove(task_id);
            }
        }

        self.process_queue();
        Ok(())
    }

    /// Cancel every queued and running download, returning how many were hit
    pub async fn cancel_all(&self) -> AppResult<usize> {
        let ids: Vec<String> = {
            let state = self.inner.state.lock();
            state
                .order
                .iter()
                .filter(|id| {
                    state
                        .tasks
                        .get(*id)
                        .map_or(false, |task| !task.status.is_terminal())
                })
                .cloned()
                .collect()
        };

        let results = join_all(ids.iter().map(|id| self.cancel_download(id))).await;
        let cancelled = results.iter().filter(|result| result.is_ok()).count();
        info!("Cancelled {} downloads", cancelled);
        Ok(cancelled)
    }

    /// Re-queue failed and cancelled tasks
    pub fn retry_failed(&self) -> usize {
        let retried: Vec<String> = {
            let mut state = self.inner.state.lock();
            let ids: Vec<String> = state
                .order
                .iter()
                .filter(|id| {
                    state.tasks.get(*id).map_or(false, |task| {
                        matches!(task.status, TaskStatus::Failed | TaskStatus::Cancelled)
                    })
                })
                .cloned()
                .collect();

            for id in &ids {
                if let Some(task) = state.tasks.get_mut(id) {
                    task.status = TaskStatus::Pending;
                    task.progress = 0.0;
                    task.downloaded_bytes = 0;
                    task.total_bytes = None;
                    task.error_message = None;
                    task.file_path = None;
                    task.touch();
                }
                state.queue.push_back(id.clone());
            }
            ids
        };

        for task_id in &retried {
            self.emit(DownloadEvent::StatusChanged {
                task_id: task_id.clone(),
                status: TaskStatus::Pending,
            });
        }
        if !retried.is_empty() {
            info!("Retrying {} downloads", retried.len());
        }
        self.process_queue();
        retried.len()
    }

    /// Drop completed, failed and cancelled tasks
    pub fn clear_finished(&self) -> usize {
        let (removed, stats) = {
            let mut state = self.inner.state.lock();
            let finished: Vec<String> = state
                .tasks
                .values()
                .filter(|task| task.status.is_terminal())
                .map(|task| task.id.clone())
                .collect();
            for id in &finished {
                state.drop_task(id);
            }
            (finished, state.stats())
        };

        for task_id in &removed {
            self.emit(DownloadEvent::TaskRemoved {
                task_id: task_id.clone(),
            });
        }
        self.emit_stats(stats);
        removed.len()
    }

    /// Remove a task, cancelling it first when it has not finished
    pub async fn remove_task(&self, task_id: &str) -> AppResult<DownloadTask> {
        self.cancel_download(task_id).await?;

        let (task, stats) = {
            let mut state = self.inner.state.lock();
            let task = state
                .drop_task(task_id)
                .ok_or_else(|| AppError::NotFound(task_id.to_string()))?;
            (task, state.stats())
        };

        self.emit(DownloadEvent::TaskRemoved {
            task_id: task_id.to_string(),
        });
        self.emit_stats(stats);
        Ok(task)
    }

    /// Tasks currently being downloaded
    pub fn get_active_downloads(&self) -> Vec<DownloadTask> {
        let state = self.inner.state.lock();
        state
            .order
            .iter()
            .filter(|id| state.active.contains_key(*id))
            .filter_map(|id| state.tasks.get(id).cloned())
            .collect()
    }

    /// Every tracked task, oldest first
    pub fn get_all_downloads(&self) -> Vec<DownloadTask> {
        let state = self.inner.state.lock();
        state
            .order
            .iter()
            .filter_map(|id| state.tasks.get(id).cloned())
            .collect()
    }

    pub fn get_task(&self, task_id: &str) -> Option<DownloadTask> {
        self.inner.state.lock().tasks.get(task_id).cloned()
    }

    pub fn find_by_url(&self, url: &str) -> Option<DownloadTask> {
        self.inner
            .state
            .lock()
            .tasks
            .values()
            .find(|task| task.url == url)
            .cloned()
    }

    pub fn get_stats(&self) -> DownloadStats {
        self.inner.state.lock().stats()
    }

    pub fn max_concurrent(&self) -> usize {
        self.inner.state.lock().max_concurrent
    }

    /// Change the worker limit; running workers above a lowered limit finish
    pub fn set_max_concurrent(&self, max_concurrent: usize) {
        let value = max_concurrent.max(1);
        self.inner.state.lock().max_concurrent = value;
        info!("Max concurrent downloads set to {}", value);
        self.process_queue();
    }

    pub fn is_idle(&self) -> bool {
        self.inner.state.lock().is_idle()
    }

    /// Resolve once no worker runs and nothing is pending
    pub async fn wait_until_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.is_idle() {
                return;
            }
            notified.await;
        }
    }
}
