//! Application constants

use std::time::Duration;

pub const APP_NAME: &str = "YouTube Download";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");
pub const APP_AUTHOR: &str = "YouTube Download Team";

pub const VIDEO_EXTENSIONS: [&str; 5] = [".mp4", ".mkv", ".webm", ".avi", ".mov"];
pub const AUDIO_EXTENSIONS: [&str; 4] = [".mp3", ".m4a", ".opus", ".wav"];

pub const DEFAULT_MAX_CONCURRENT: usize = 3;

/// Upper bound for metadata lookups and tool probes
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);
