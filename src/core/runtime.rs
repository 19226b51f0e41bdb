//! Download runtime command router.
//!
//! A thin async command queue that serializes download control calls onto
//! the manager so front ends never race each other on queue state.

use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, instrument};

use crate::core::manager::DownloadManager;
use crate::core::models::{
    AppError, AppResult, DownloadStats, DownloadTask, DownloadType, QualityPreset,
};

/// Commands understood by the runtime router.
#[derive(Debug)]
pub enum RuntimeCommand {
    Add {
        url: String,
        quality: QualityPreset,
        download_type: DownloadType,
        title: String,
        respond_to: oneshot::Sender<AppResult<DownloadTask>>,
    },
    Cancel {
        task_id: String,
        respond_to: oneshot::Sender<AppResult<()>>,
    },
    CancelAll {
        respond_to: oneshot::Sender<AppResult<usize>>,
    },
    Remove {
        task_id: String,
        respond_to: oneshot::Sender<AppResult<DownloadTask>>,
    },
    RetryFailed {
        respond_to: oneshot::Sender<AppResult<usize>>,
    },
    ClearFinished {
        respond_to: oneshot::Sender<AppResult<usize>>,
    },
    SetMaxConcurrent {
        value: usize,
        respond_to: oneshot::Sender<AppResult<()>>,
    },
    Snapshot {
        respond_to: oneshot::Sender<AppResult<Vec<DownloadTask>>>,
    },
    Stats {
        respond_to: oneshot::Sender<AppResult<DownloadStats>>,
    },
}

impl RuntimeCommand {
    /// Short name for logs; the reply channel is left out
    pub fn name(&self) -> &'static str {
        match self {
            RuntimeCommand::Add { .. } => "add",
            RuntimeCommand::Cancel { .. } => "cancel",
            RuntimeCommand::CancelAll { .. } => "cancel_all",
            RuntimeCommand::Remove { .. } => "remove",
            RuntimeCommand::RetryFailed { .. } => "retry_failed",
            RuntimeCommand::ClearFinished { .. } => "clear_finished",
            RuntimeCommand::SetMaxConcurrent { .. } => "set_max_concurrent",
            RuntimeCommand::Snapshot { .. } => "snapshot",
            RuntimeCommand::Stats { .. } => "stats",
        }
    }
}

/// Handle exposed to the command layer and the rest of the backend.
#[derive(Clone)]
pub struct DownloadRuntimeHandle {
    sender: mpsc::Sender<RuntimeCommand>,
}

impl DownloadRuntimeHandle {
    pub fn new(sender: mpsc::Sender<RuntimeCommand>) -> Self {
        Self { sender }
    }

    async fn send_command<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<AppResult<T>>) -> RuntimeCommand,
    ) -> AppResult<T> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(build(tx))
            .await
            .map_err(|e| AppError::System(format!("Download runtime unavailable: {}", e)))?;
        rx.await
            .map_err(|_| AppError::System("Download runtime dropped response".into()))?
    }

    pub async fn add(
        &self,
        url: String,
        quality: QualityPreset,
        download_type: DownloadType,
        title: String,
    ) -> AppResult<DownloadTask> {
        self.send_command(|tx| RuntimeCommand::Add {
            url,
            quality,
            download_type,
            title,
            respond_to: tx,
        })
        .await
    }

    pub async fn cancel(&self, task_id: String) -> AppResult<()> {
        self.send_command(|tx| RuntimeCommand::Cancel {
            task_id,
            respond_to: tx,
        })
        .await
    }

    pub async fn cancel_all(&self) -> AppResult<usize> {
        self.send_command(|tx| RuntimeCommand::CancelAll { respond_to: tx })
            .await
    }

    pub async fn remove(&self, task_id: String) -> AppResult<DownloadTask> {
        self.send_command(|tx| RuntimeCommand::Remove {
            task_id,
            respond_to: tx,
        })
        .await
    }

    pub async fn retry_failed(&self) -> AppResult<usize> {
        self.send_command(|tx| RuntimeCommand::RetryFailed { respond_to: tx })
            .await
    }

    pub async fn clear_finished(&self) -> AppResult<usize> {
        self.send_command(|tx| RuntimeCommand::ClearFinished { respond_to: tx })
            .await
    }

    pub async fn set_max_concurrent(&self, value: usize) -> AppResult<()> {
        self.send_command(|tx| RuntimeCommand::SetMaxConcurrent {
            value,
            respond_to: tx,
        })
        .await
    }

    pub async fn snapshot(&self) -> AppResult<Vec<DownloadTask>> {
        self.send_command(|tx| RuntimeCommand::Snapshot { respond_to: tx })
            .await
    }

    pub async fn stats(&self) -> AppResult<DownloadStats> {
        self.send_command(|tx| RuntimeCommand::Stats { respond_to: tx })
            .await
    }
}

/// Spawn the router on the current runtime, or on a dedicated thread
/// when called outside of one.
pub fn spawn_download_runtime(manager: DownloadManager) -> AppResult<DownloadRuntimeHandle> {
    let (tx, rx) = mpsc::channel(256);

    let router_future = async move {
        router_loop(manager, rx).await;
    };

    match Handle::try_current() {
        Ok(handle) => {
            tracing::info!("[RUNTIME] Spawning router in existing tokio runtime");
            handle.spawn(router_future);
        }
        Err(_) => {
            tracing::warn!(
                "[RUNTIME] No tokio runtime found, creating dedicated thread with new runtime"
            );
            std::thread::Builder::new()
                .name("download-runtime".into())
                .spawn(move || {
                    match tokio::runtime::Builder::new_multi_thread()
                        .enable_all()
                        .thread_name("download-runtime-worker")
                        .build()
                    {
                        Ok(runtime) => runtime.block_on(router_future),
                        Err(e) => error!("[RUNTIME] Failed to build download runtime: {}", e),
                    }
                })
                .map_err(|e| {
                    AppError::System(format!("Failed to spawn download runtime thread: {}", e))
                })?;
        }
    }

    Ok(DownloadRuntimeHandle::new(tx))
}

async fn router_loop(manager: DownloadManager, mut rx: mpsc::Receiver<RuntimeCommand>) {
    while let Some(cmd) = rx.recv().await {
        debug!("[RUNTIME] Processing user command: {}", cmd.name());
        handle_command(&manager, cmd).await;
    }
    debug!("Download runtime channel closed, exiting router loop");
}

#[instrument(skip(manager, command), fields(command = command.name()))]
async fn handle_command(manager: &DownloadManager, command: RuntimeCommand) {
    match command {
        RuntimeCommand::Add {
            url,
            quality,
            download_type,
            title,
            respond_to,
        } => {
            let result = manager.add_download(&url, quality, download_type, &title);
            debug!("[RUNTIME_CMD] Add for {} success: {}", url, result.is_ok());
            let _ = respond_to.send(result);
        }
        RuntimeCommand::Cancel {
            task_id,
            respond_to,
        } => {
            let result = manager.cancel_download(&task_id).await;
            debug!(
                "[RUNTIME_CMD] Cancel completed for task: {}, success: {}",
                task_id,
                result.is_ok()
            );
            let _ = respond_to.send(result);
        }
        RuntimeCommand::CancelAll { respond_to } => {
            let _ = respond_to.send(manager.cancel_all().await);
        }
        RuntimeCommand::Remove {
            task_id,
            respond_to,
        } => {
            let _ = respond_to.send(manager.remove_task(&task_id).await);
        }
        RuntimeCommand::RetryFailed { respond_to } => {
            let _ = respond_to.send(Ok(manager.retry_failed()));
        }
        RuntimeCommand::ClearFinished { respond_to } => {
            let _ = respond_to.send(Ok(manager.clear_finished()));
        }
        RuntimeCommand::SetMaxConcurrent { value, respond_to } => {
            manager.set_max_concurrent(value);
            let _ = respond_to.send(Ok(()));
        }
        RuntimeCommand::Snapshot { respond_to } => {
            let _ = respond_to.send(Ok(manager.get_all_downloads()));
        }
        RuntimeCommand::Stats { respond_to } => {
            let _ = respond_to.send(Ok(manager.get_stats()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::downloader::{
        DownloadOutcome, DownloadRequest, MediaBackend, ProgressCallback,
    };
    use crate::core::manager::ManagerOptions;
    use crate::core::models::{MediaInfo, TaskStatus};
    use async_trait::async_trait;
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    /// Backend whose downloads run until cancelled
    struct HangingBackend;

    #[async_trait]
    impl MediaBackend for HangingBackend {
        async fn fetch_info(&self, url: &str) -> AppResult<MediaInfo> {
            Err(AppError::Download(url.to_string()))
        }

        async fn download(
            &self,
            _request: &DownloadRequest,
            _on_progress: ProgressCallback,
            cancel: CancellationToken,
        ) -> AppResult<DownloadOutcome> {
            cancel.cancelled().await;
            Err(AppError::Cancelled)
        }
    }

    fn runtime_handle() -> DownloadRuntimeHandle {
        let manager = DownloadManager::new(
            Arc::new(HangingBackend),
            ManagerOptions::new("/downloads"),
        );
        spawn_download_runtime(manager).unwrap()
    }

    #[tokio::test]
    async fn test_commands_round_trip_through_router() -> AppResult<()> {
        let handle = runtime_handle();

        let task = handle
            .add(
                "https://youtu.be/abc".to_string(),
                QualityPreset::Best,
                DownloadType::Video,
                "Clip".to_string(),
            )
            .await?;

        let snapshot = handle.snapshot().await?;
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].status, TaskStatus::Downloading);
        assert_eq!(handle.stats().await?.active_downloads, 1);

        handle.cancel(task.id.clone()).await?;
        let snapshot = handle.snapshot().await?;
        assert_eq!(snapshot[0].status, TaskStatus::Cancelled);

        assert_eq!(handle.retry_failed().await?, 1);
        assert_eq!(handle.cancel_all().await?, 1);
        assert_eq!(handle.clear_finished().await?, 1);
        assert!(handle.snapshot().await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_duplicate_add_is_reported() -> AppResult<()> {
        let handle = runtime_handle();
        handle.set_max_concurrent(1).await?;

        for _ in 0..2 {
            let _ = handle
                .add(
                    "https://youtu.be/dup".to_string(),
                    QualityPreset::Best,
                    DownloadType::Video,
                    "Clip".to_string(),
                )
                .await;
        }

        let result = handle
            .add(
                "https://youtu.be/dup".to_string(),
                QualityPreset::Best,
                DownloadType::Video,
                "Clip".to_string(),
            )
            .await;
        assert!(matches!(result, Err(AppError::Duplicate(_))));
        assert_eq!(handle.stats().await?.total_tasks, 1);
        handle.cancel_all().await?;
        Ok(())
    }

    #[test]
    fn test_command_name_leaves_out_reply_channel() {
        let (tx, _rx) = oneshot::channel();
        let command = RuntimeCommand::Cancel {
            task_id: "t1".to_string(),
            respond_to: tx,
        };
        assert_eq!(command.name(), "cancel");

        let (tx, _rx) = oneshot::channel();
        assert_eq!(RuntimeCommand::Stats { respond_to: tx }.name(), "stats");
    }
}
