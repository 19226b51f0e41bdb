//! Ctrl-C handling for a download session
//!
//! The first interrupt while work is queued or running only asks for
//! confirmation; the next one stops the session.

use tokio_util::sync::CancellationToken;

use crate::commands;
use crate::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptAction {
    /// Ask again, carrying the number of unfinished downloads
    Confirm(usize),
    CancelAll,
}

#[derive(Debug, Default)]
pub struct InterruptPolicy {
    armed: bool,
}

impl InterruptPolicy {
    /// `unfinished` counts queued and running downloads
    pub fn on_interrupt(&mut self, unfinished: usize) -> InterruptAction {
        if unfinished > 0 && !self.armed {
            self.armed = true;
            return InterruptAction::Confirm(unfinished);
        }
        // 已确认过：之后的每次 Ctrl-C 都直接取消
        self.armed = true;
        InterruptAction::CancelAll
    }
}

/// React to one Ctrl-C and return the line to show the user
///
/// Cancelling sets `shutdown` so the caller stops queueing new URLs.
pub async fn handle_interrupt(
    state: &AppState,
    policy: &mut InterruptPolicy,
    shutdown: &CancellationToken,
) -> String {
    let stats = commands::get_download_stats(state);
    let unfinished = stats.pending_tasks + stats.active_downloads;

    match policy.on_interrupt(unfinished) {
        InterruptAction::Confirm(count) => format!(
            "{} download(s) still queued or running. Press Ctrl-C again to cancel them.",
            count
        ),
        InterruptAction::CancelAll => {
            shutdown.cancel();
            match commands::cancel_all_downloads(state).await {
                Ok(count) => format!("Cancelled {} download(s)", count),
                Err(e) => format!("Failed to cancel downloads: {}", e),
            }
        }
    }
}
