//! 下载管理器单元测试
//!
//! 使用模拟后端测试 DownloadManager 的队列、并发限制、取消和重试

#[cfg(test)]
mod tests {
    use super::super::manager::{DownloadEvent, DownloadManager, ManagerOptions};
    use crate::core::downloader::{
        DownloadOutcome, DownloadRequest, MediaBackend, ProgressCallback, ProgressSnapshot,
    };
    use crate::core::error_handling::ErrorCategory;
    use crate::core::history::DownloadHistory;
    use crate::core::models::{
        AppError, AppResult, DownloadType, MediaInfo, QualityPreset, TaskStatus,
    };
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::{mpsc, Semaphore};
    use tokio::time::timeout;
    use tokio_util::sync::CancellationToken;

    /// 模拟 yt-dlp 的后端
    ///
    /// URL 中的关键字决定行为：`fail` 总是失败，`flaky` 第一次失败，
    /// `block` 一直等到取消后才"迟到地"成功。
    struct FakeBackend {
        gate: Option<Arc<Semaphore>>,
        running: AtomicUsize,
        peak: AtomicUsize,
        started: Mutex<Vec<String>>,
        attempts: Mutex<HashMap<String, usize>>,
    }

    impl FakeBackend {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                gate: None,
                running: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                started: Mutex::new(Vec::new()),
                attempts: Mutex::new(HashMap::new()),
            })
        }

        fn gated(gate: Arc<Semaphore>) -> Arc<Self> {
            Arc::new(Self {
                gate: Some(gate),
                running: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                started: Mutex::new(Vec::new()),
                attempts: Mutex::new(HashMap::new()),
            })
        }

        fn started(&self) -> Vec<String> {
            self.started.lock().clone()
        }

        async fn behave(
            &self,
            request: &DownloadRequest,
            on_progress: ProgressCallback,
            cancel: CancellationToken,
        ) -> AppResult<DownloadOutcome> {
            let attempt = {
                let mut attempts = self.attempts.lock();
                let count = attempts.entry(request.url.clone()).or_insert(0);
                *count += 1;
                *count
            };

            if request.url.contains("block") {
                cancel.cancelled().await;
                return Ok(DownloadOutcome::default());
            }

            if let Some(gate) = &self.gate {
                tokio::select! {
                    permit = gate.acquire() => {
                        permit.map_err(|e| AppError::System(e.to_string()))?.forget();
                    }
                    _ = cancel.cancelled() => return Err(AppError::Cancelled),
                }
            }

            if request.url.contains("fail") || (request.url.contains("flaky") && attempt == 1) {
                return Err(AppError::Download(
                    "[youtube] abc: Video unavailable".to_string(),
                ));
            }

            // 没有总大小的进度应被忽略
            on_progress(ProgressSnapshot {
                status: "downloading".to_string(),
                downloaded_bytes: 10,
                total_bytes: None,
                total_bytes_estimate: None,
                speed: None,
                eta: None,
            });
            on_progress(ProgressSnapshot {
                status: "downloading".to_string(),
                downloaded_bytes: 50,
                total_bytes: Some(100),
                total_bytes_estimate: None,
                speed: Some(25.0),
                eta: Some(2),
            });

            Ok(DownloadOutcome {
                files: vec![request.output_dir.join(format!("{}.mp4", request.task_id))],
            })
        }
    }

    #[async_trait]
    impl MediaBackend for FakeBackend {
        async fn fetch_info(&self, url: &str) -> AppResult<MediaInfo> {
            Err(AppError::Download(format!("no info for {}", url)))
        }

        async fn download(
            &self,
            request: &DownloadRequest,
            on_progress: ProgressCallback,
            cancel: CancellationToken,
        ) -> AppResult<DownloadOutcome> {
            self.started.lock().push(request.url.clone());
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);

            let result = self.behave(request, on_progress, cancel).await;

            self.running.fetch_sub(1, Ordering::SeqCst);
            result
        }
    }

    /// 创建测试用的管理器
    fn create_manager(
        backend: Arc<FakeBackend>,
        max_concurrent: usize,
    ) -> (DownloadManager, mpsc::UnboundedReceiver<DownloadEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let options = ManagerOptions {
            max_concurrent,
            event_sender: Some(tx),
            ..ManagerOptions::new(PathBuf::from("/downloads"))
        };
        (DownloadManager::new(backend, options), rx)
    }

    fn url(name: &str) -> String {
        format!("https://www.youtube.com/watch?v={}", name)
    }

    async fn wait_for_started(backend: &FakeBackend, count: usize) {
        timeout(Duration::from_secs(5), async {
            while backend.started().len() < count {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("workers did not start");
    }

    async fn settle(manager: &DownloadManager) {
        timeout(Duration::from_secs(5), manager.wait_until_idle())
            .await
            .expect("manager did not become idle");
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<DownloadEvent>) -> Vec<DownloadEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_download_completes_with_events() -> AppResult<()> {
        let backend = FakeBackend::new();
        let (manager, mut rx) = create_manager(backend, 3);

        let task = manager.add_download(
            &url("ok1"),
            QualityPreset::Best,
            DownloadType::Video,
            "Clip",
        )?;
        assert_eq!(task.status, TaskStatus::Pending);
        settle(&manager).await;

        let finished = manager.get_task(&task.id).unwrap();
        assert_eq!(finished.status, TaskStatus::Completed);
        assert_eq!(finished.progress, 100.0);
        assert_eq!(
            finished.file_path,
            Some(PathBuf::from(format!("/downloads/{}.mp4", task.id)))
        );

        let events = drain(&mut rx);
        assert!(matches!(events[0], DownloadEvent::TaskAdded { .. }));
        assert!(events.iter().any(|e| matches!(
            e,
            DownloadEvent::StatusChanged { status: TaskStatus::Downloading, .. }
        )));
        assert!(events
            .iter()
            .any(|e| matches!(e, DownloadEvent::TaskStarted { .. })));

        let progress: Vec<f64> = events
            .iter()
            .filter_map(|e| match e {
                DownloadEvent::TaskProgress { progress, .. } => Some(progress.percent),
                _ => None,
            })
            .collect();
        assert_eq!(progress, vec![50.0]);

        assert!(events
            .iter()
            .any(|e| matches!(e, DownloadEvent::TaskCompleted { file_path: Some(_), .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_duplicate_url_is_rejected() -> AppResult<()> {
        let backend = FakeBackend::new();
        let (manager, _rx) = create_manager(backend, 3);

        manager.add_download(&url("dup"), QualityPreset::Best, DownloadType::Video, "A")?;
        let second =
            manager.add_download(&url("dup"), QualityPreset::Low, DownloadType::Audio, "B");

        assert!(matches!(second, Err(AppError::Duplicate(_))));
        assert_eq!(manager.get_stats().total_tasks, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_concurrency_cap_is_respected() -> AppResult<()> {
        let gate = Arc::new(Semaphore::new(0));
        let backend = FakeBackend::gated(Arc::clone(&gate));
        let (manager, _rx) = create_manager(Arc::clone(&backend), 2);

        for i in 0..5 {
            manager.add_download(
                &url(&format!("cap{}", i)),
                QualityPreset::Best,
                DownloadType::Video,
                "Clip",
            )?;
        }

        assert_eq!(manager.get_active_downloads().len(), 2);
        let stats = manager.get_stats();
        assert_eq!(stats.active_downloads, 2);
        assert_eq!(stats.pending_tasks, 3);

        // 两个 worker 都阻塞在闸门上之后再放行
        wait_for_started(&backend, 2).await;
        gate.add_permits(5);
        settle(&manager).await;

        assert_eq!(backend.peak.load(Ordering::SeqCst), 2);
        assert_eq!(manager.get_stats().completed_tasks, 5);
        Ok(())
    }

    #[tokio::test]
    async fn test_queue_is_fifo() -> AppResult<()> {
        let backend = FakeBackend::new();
        let (manager, _rx) = create_manager(Arc::clone(&backend), 1);

        let urls: Vec<String> = ["first", "second", "third"].iter().map(|n| url(n)).collect();
        for u in &urls {
            manager.add_download(u, QualityPreset::Best, DownloadType::Video, "Clip")?;
        }
        settle(&manager).await;

        assert_eq!(backend.started(), urls);
        let listed: Vec<String> = manager
            .get_all_downloads()
            .into_iter()
            .map(|task| task.url)
            .collect();
        assert_eq!(listed, urls);
        Ok(())
    }

    #[tokio::test]
    async fn test_failure_records_message() -> AppResult<()> {
        let backend = FakeBackend::new();
        let (manager, mut rx) = create_manager(backend, 3);

        let task =
            manager.add_download(&url("fail1"), QualityPreset::Best, DownloadType::Video, "X")?;
        settle(&manager).await;

        let failed = manager.get_task(&task.id).unwrap();
        assert_eq!(failed.status, TaskStatus::Failed);
        assert!(failed
            .error_message
            .as_deref()
            .unwrap()
            .contains("Video unavailable"));

        let events = drain(&mut rx);
        assert!(events.iter().any(|e| matches!(
            e,
            DownloadEvent::TaskFailed { category: ErrorCategory::Unavailable, .. }
        )));
        Ok(())
    }

    #[tokio::test]
    async fn test_cancel_queued_task_never_starts() -> AppResult<()> {
        let gate = Arc::new(Semaphore::new(0));
        let backend = FakeBackend::gated(Arc::clone(&gate));
        let (manager, _rx) = create_manager(Arc::clone(&backend), 1);

        manager.add_download(&url("running"), QualityPreset::Best, DownloadType::Video, "A")?;
        let queued =
            manager.add_download(&url("queued"), QualityPreset::Best, DownloadType::Video, "B")?;

        manager.cancel_download(&queued.id).await?;
        assert_eq!(
            manager.get_task(&queued.id).unwrap().status,
            TaskStatus::Cancelled
        );

        gate.add_permits(2);
        settle(&manager).await;

        assert_eq!(backend.started(), vec![url("running")]);
        assert_eq!(
            manager.get_task(&queued.id).unwrap().status,
            TaskStatus::Cancelled
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_late_completion_does_not_overwrite_cancel() -> AppResult<()> {
        let backend = FakeBackend::new();
        let (manager, _rx) = create_manager(Arc::clone(&backend), 2);

        let task =
            manager.add_download(&url("block1"), QualityPreset::Best, DownloadType::Video, "A")?;
        assert_eq!(manager.get_active_downloads().len(), 1);

        manager.cancel_download(&task.id).await?;
        settle(&manager).await;

        let cancelled = manager.get_task(&task.id).unwrap();
        assert_eq!(cancelled.status, TaskStatus::Cancelled);
        assert!(manager.get_active_downloads().is_empty());

        // 已取消的任务再次取消是空操作
        manager.cancel_download(&task.id).await?;
        assert!(matches!(
            manager.cancel_download("missing").await,
            Err(AppError::NotFound(_))
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_cancel_all() -> AppResult<()> {
        let backend = FakeBackend::new();
        let (manager, _rx) = create_manager(backend, 1);

        manager.add_download(&url("block-a"), QualityPreset::Best, DownloadType::Video, "A")?;
        manager.add_download(&url("block-b"), QualityPreset::Best, DownloadType::Video, "B")?;

        let cancelled = manager.cancel_all().await?;
        settle(&manager).await;

        assert_eq!(cancelled, 2);
        assert_eq!(manager.get_stats().cancelled_tasks, 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_retry_resets_failed_tasks() -> AppResult<()> {
        let backend = FakeBackend::new();
        let (manager, _rx) = create_manager(backend, 3);

        let task =
            manager.add_download(&url("flaky1"), QualityPreset::Best, DownloadType::Video, "A")?;
        settle(&manager).await;
        assert_eq!(manager.get_task(&task.id).unwrap().status, TaskStatus::Failed);

        assert_eq!(manager.retry_failed(), 1);
        settle(&manager).await;

        let retried = manager.get_task(&task.id).unwrap();
        assert_eq!(retried.status, TaskStatus::Completed);
        assert!(retried.error_message.is_none());
        assert_eq!(manager.retry_failed(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_clear_and_remove() -> AppResult<()> {
        let gate = Arc::new(Semaphore::new(0));
        let backend = FakeBackend::gated(Arc::clone(&gate));
        let (manager, _rx) = create_manager(backend, 1);

        let done =
            manager.add_download(&url("done"), QualityPreset::Best, DownloadType::Video, "A")?;
        gate.add_permits(1);
        settle(&manager).await;

        let waiting =
            manager.add_download(&url("waiting"), QualityPreset::Best, DownloadType::Video, "B")?;
        let queued =
            manager.add_download(&url("queued"), QualityPreset::Best, DownloadType::Video, "C")?;

        let removed = manager.remove_task(&queued.id).await?;
        assert_eq!(removed.url, url("queued"));
        assert!(manager.find_by_url(&url("queued")).is_none());

        assert_eq!(manager.clear_finished(), 1);
        assert!(manager.get_task(&done.id).is_none());

        manager.remove_task(&waiting.id).await?;
        assert!(manager.get_all_downloads().is_empty());
        settle(&manager).await;
        Ok(())
    }

    #[tokio::test]
    async fn test_raising_limit_starts_queued_work() -> AppResult<()> {
        let gate = Arc::new(Semaphore::new(0));
        let backend = FakeBackend::gated(Arc::clone(&gate));
        let (manager, _rx) = create_manager(backend, 1);

        for name in ["l1", "l2", "l3"] {
            manager.add_download(&url(name), QualityPreset::Best, DownloadType::Video, "X")?;
        }
        assert_eq!(manager.get_active_downloads().len(), 1);

        manager.set_max_concurrent(3);
        assert_eq!(manager.max_concurrent(), 3);
        assert_eq!(manager.get_active_downloads().len(), 3);

        gate.add_permits(3);
        settle(&manager).await;
        Ok(())
    }

    #[tokio::test]
    async fn test_history_is_recorded() -> AppResult<()> {
        let dir = tempfile::tempdir()?;
        let backend = FakeBackend::new();
        let options = ManagerOptions {
            history: Some(DownloadHistory::new(dir.path().join("downloads.db"))),
            ..ManagerOptions::new(dir.path())
        };
        let manager = DownloadManager::new(backend, options);

        manager.add_download(&url("h1"), QualityPreset::Medium, DownloadType::Video, "A")?;
        manager.add_download(&url("fail-h2"), QualityPreset::AudioBest, DownloadType::Audio, "B")?;
        settle(&manager).await;

        let history = manager.history().unwrap().recent(10).await?;
        assert_eq!(history.len(), 2);
        let failed = history.iter().find(|e| e.url == url("fail-h2")).unwrap();
        assert_eq!(failed.status, TaskStatus::Failed);
        assert_eq!(failed.format, "bestaudio/best");
        Ok(())
    }

    #[test]
    fn test_empty_manager_is_idle() {
        let (manager, _rx) = create_manager(FakeBackend::new(), 3);
        assert!(manager.is_idle());
        tokio_test::block_on(manager.wait_until_idle());
        assert_eq!(manager.get_stats(), Default::default());
    }
}
