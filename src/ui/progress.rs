//! 下载进度条：每个任务一行，消费 DownloadEvent。

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::collections::HashMap;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::core::manager::DownloadEvent;
use crate::core::models::{ProgressUpdate, TaskStatus};
use crate::utils::format::{format_bytes, format_speed, format_time};

const TITLE_WIDTH: usize = 32;

/// Outcome of a front end session
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub completed: usize,
    pub cancelled: usize,
    /// Title and message of each failed task
    pub failed: Vec<(String, String)>,
}

impl RunSummary {
    pub fn all_completed(&self) -> bool {
        self.failed.is_empty() && self.cancelled == 0
    }
}

struct Row {
    title: String,
    bar: ProgressBar,
}

/// Progress rows for every queued task
pub struct ProgressBoard {
    multi: MultiProgress,
    style: ProgressStyle,
    rows: HashMap<String, Row>,
    summary: RunSummary,
}

fn short_title(title: &str) -> String {
    if title.chars().count() <= TITLE_WIDTH {
        return format!("{:<width$}", title, width = TITLE_WIDTH);
    }
    let cut: String = title.chars().take(TITLE_WIDTH - 1).collect();
    format!("{}…", cut)
}

fn progress_message(progress: &ProgressUpdate) -> String {
    let mut message = format!(
        "{}/{}",
        format_bytes(progress.downloaded_bytes),
        format_bytes(progress.total_bytes)
    );
    if let Some(speed) = progress.speed {
        message.push_str(&format!(" {}", format_speed(speed)));
    }
    if let Some(eta) = progress.eta {
        message.push_str(&format!(" ETA {}", format_time(eta as f64)));
    }
    message
}

impl ProgressBoard {
    /// `visible` false draws nothing, for tests and `--quiet` style runs
    pub fn new(visible: bool) -> Self {
        let target = if visible {
            ProgressDrawTarget::stderr()
        } else {
            ProgressDrawTarget::hidden()
        };
        let style = ProgressStyle::with_template("{prefix} [{bar:30}] {pos:>3}% {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ");

        Self {
            multi: MultiProgress::with_draw_target(target),
            style,
            rows: HashMap::new(),
            summary: RunSummary::default(),
        }
    }

    fn row(&self, task_id: &str) -> Option<&ProgressBar> {
        self.rows.get(task_id).map(|row| &row.bar)
    }

    /// Handle for printing lines above the bars from other tasks
    pub fn printer(&self) -> MultiProgress {
        self.multi.clone()
    }

    pub fn handle(&mut self, event: &DownloadEvent) {
        match event {
            DownloadEvent::TaskAdded { task } => {
                let bar = self.multi.add(ProgressBar::new(100));
                bar.set_style(self.style.clone());
                bar.set_prefix(short_title(&task.title));
                bar.set_message("queued");
                self.rows.insert(
                    task.id.clone(),
                    Row {
                        title: task.title.clone(),
                        bar,
                    },
                );
            }
            DownloadEvent::TaskStarted { task_id } => {
                if let Some(bar) = self.row(task_id) {
                    bar.set_message("starting");
                }
            }
            DownloadEvent::TaskProgress { task_id, progress } => {
                if let Some(bar) = self.row(task_id) {
                    bar.set_position(progress.percent.round() as u64);
                    bar.set_message(progress_message(progress));
                }
            }
            DownloadEvent::StatusChanged {
                task_id,
                status: TaskStatus::Pending,
            } => {
                // 重试：进度归零
                if let Some(bar) = self.row(task_id) {
                    bar.reset();
                    bar.set_message("queued");
                }
            }
            DownloadEvent::StatusChanged { .. } => {}
            DownloadEvent::TaskCompleted { task_id, file_path } => {
                self.summary.completed += 1;
                if let Some(bar) = self.row(task_id) {
                    bar.set_position(100);
                    bar.finish_with_message(
                        file_path
                            .as_deref()
                            .map(|path| format!("done: {}", path))
                            .unwrap_or_else(|| "done".to_string()),
                    );
                }
            }
            DownloadEvent::TaskFailed { task_id, error, .. } => {
                let title = self
                    .rows
                    .get(task_id)
                    .map(|row| row.title.clone())
                    .unwrap_or_else(|| task_id.clone());
                self.summary.failed.push((title, error.clone()));
                if let Some(bar) = self.row(task_id) {
                    bar.abandon_with_message("failed");
                }
            }
            DownloadEvent::TaskCancelled { task_id } => {
                self.summary.cancelled += 1;
                if let Some(bar) = self.row(task_id) {
                    bar.abandon_with_message("cancelled");
                }
            }
            DownloadEvent::TaskRemoved { task_id } => {
                if let Some(row) = self.rows.remove(task_id) {
                    row.bar.finish_and_clear();
                    self.multi.remove(&row.bar);
                }
            }
            DownloadEvent::StatsUpdated { .. } => {}
        }
    }

    pub fn finish(self) -> RunSummary {
        for row in self.rows.values() {
            if !row.bar.is_finished() {
                row.bar.abandon();
            }
        }
        self.summary
    }
}

/// Render events until `done` fires, then drain what is left
pub async fn render_events(
    mut rx: mpsc::UnboundedReceiver<DownloadEvent>,
    mut board: ProgressBoard,
    done: CancellationToken,
) -> RunSummary {
    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Some(event) => board.handle(&event),
                None => break,
            },
            _ = done.cancelled() => {
                while let Ok(event) = rx.try_recv() {
                    board.handle(&event);
                }
                break;
            }
        }
    }
    board.finish()
}
