//! Error classification for yt-dlp failures
//!
//! yt-dlp reports every problem as free-form `ERROR:` lines on stderr. This
//! module sorts those lines into categories so the front end can show a
//! message a user can act on instead of a raw extractor trace.

use serde::{Deserialize, Serialize};

use crate::core::models::AppError;

/// Error categories for failed downloads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCategory {
    /// DNS, connection resets, timeouts
    Network,
    /// Removed, private or region-blocked media
    Unavailable,
    /// Age gate, sign-in or members-only content
    Restricted,
    /// HTTP 429 and bot checks
    RateLimited,
    /// The extractor does not understand the link
    UnsupportedUrl,
    /// yt-dlp or ffmpeg missing from PATH
    MissingDependency,
    /// Disk full, permissions
    FileSystem,
    Cancelled,
    Unknown,
}

impl ErrorCategory {
    /// Message shown in the front end
    pub fn user_message(&self) -> &'static str {
        match self {
            ErrorCategory::Network => {
                "Network problem while downloading. Check your connection and try again."
            }
            ErrorCategory::Unavailable => "This video is unavailable or has been removed.",
            ErrorCategory::Restricted => {
                "This video requires sign-in or is age or membership restricted."
            }
            ErrorCategory::RateLimited => {
                "YouTube is rate limiting requests. Wait a few minutes and try again."
            }
            ErrorCategory::UnsupportedUrl => "This link is not supported.",
            ErrorCategory::MissingDependency => {
                "yt-dlp or ffmpeg is not installed or not on PATH."
            }
            ErrorCategory::FileSystem => "Could not write the file to the downloads folder.",
            ErrorCategory::Cancelled => "The download was cancelled.",
            ErrorCategory::Unknown => "The download failed for an unknown reason.",
        }
    }
}

/// Classify yt-dlp stderr output
pub fn classify_stderr(stderr: &str) -> ErrorCategory {
    let lower = stderr.to_lowercase();

    let matches_any = |needles: &[&str]| needles.iter().any(|needle| lower.contains(needle));

    if matches_any(&["http error 429", "too many requests", "confirm you're not a bot"]) {
        ErrorCategory::RateLimited
    } else if matches_any(&[
        "sign in to confirm your age",
        "age-restricted",
        "members-only",
        "join this channel",
        "login required",
        "sign in",
    ]) {
        ErrorCategory::Restricted
    } else if matches_any(&[
        "video unavailable",
        "private video",
        "has been removed",
        "not available in your country",
        "this video is not available",
        "http error 404",
    ]) {
        ErrorCategory::Unavailable
    } else if matches_any(&["unsupported url", "is not a valid url"]) {
        ErrorCategory::UnsupportedUrl
    } else if matches_any(&["ffmpeg not found", "ffprobe not found", "ffmpeg is not installed"]) {
        ErrorCategory::MissingDependency
    } else if matches_any(&[
        "no space left",
        "permission denied",
        "read-only file system",
        "unable to open for writing",
    ]) {
        ErrorCategory::FileSystem
    } else if matches_any(&[
        "timed out",
        "connection reset",
        "name or service not known",
        "temporary failure in name resolution",
        "network is unreachable",
        "unable to download webpage",
        "getaddrinfo failed",
    ]) {
        ErrorCategory::Network
    } else {
        ErrorCategory::Unknown
    }
}

/// Last `ERROR:` line of yt-dlp stderr, without the prefix
pub fn primary_error_line(stderr: &str) -> Option<String> {
    stderr
        .lines()
        .rev()
        .map(str::trim)
        .find_map(|line| line.strip_prefix("ERROR:"))
        .map(|line| line.trim().to_string())
        .filter(|line| !line.is_empty())
}

/// Category of any application error
pub fn categorize(error: &AppError) -> ErrorCategory {
    match error {
        AppError::Cancelled => ErrorCategory::Cancelled,
        AppError::MissingDependency(_) => ErrorCategory::MissingDependency,
        AppError::Io(_) => ErrorCategory::FileSystem,
        AppError::Validation(_) => ErrorCategory::UnsupportedUrl,
        AppError::Download(message) => classify_stderr(message),
        _ => ErrorCategory::Unknown,
    }
}

/// Friendly text for an error, with the engine detail when it helps
pub fn user_friendly_message(error: &AppError) -> String {
    let category = categorize(error);
    match (category, error) {
        (ErrorCategory::Unknown, AppError::Download(detail)) => {
            format!("{} ({})", category.user_message(), detail)
        }
        (ErrorCategory::Unknown, other) => other.to_string(),
        (category, _) => category.user_message().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_common_failures() {
        assert_eq!(
            classify_stderr("ERROR: [youtube] abc: Video unavailable"),
            ErrorCategory::Unavailable
        );
        assert_eq!(
            classify_stderr("ERROR: [youtube] abc: Private video. Sign in if you've been granted access"),
            ErrorCategory::Restricted
        );
        assert_eq!(
            classify_stderr("ERROR: unable to download video data: HTTP Error 429: Too Many Requests"),
            ErrorCategory::RateLimited
        );
        assert_eq!(
            classify_stderr("ERROR: Unsupported URL: https://youtube.com/foo"),
            ErrorCategory::UnsupportedUrl
        );
        assert_eq!(
            classify_stderr("ERROR: Postprocessing: ffprobe and ffmpeg not found."),
            ErrorCategory::MissingDependency
        );
        assert_eq!(
            classify_stderr("ERROR: ffmpeg not found. Please install"),
            ErrorCategory::MissingDependency
        );
        assert_eq!(
            classify_stderr("ERROR: unable to download webpage: <urlopen error timed out>"),
            ErrorCategory::Network
        );
        assert_eq!(classify_stderr("something odd"), ErrorCategory::Unknown);
    }

    #[test]
    fn test_primary_error_line() {
        let stderr = "WARNING: throttled\nERROR: first\nERROR: [youtube] x: Video unavailable\n";
        assert_eq!(
            primary_error_line(stderr),
            Some("[youtube] x: Video unavailable".to_string())
        );
        assert_eq!(primary_error_line("WARNING: only warnings"), None);
    }

    #[test]
    fn test_user_friendly_message() {
        assert_eq!(
            user_friendly_message(&AppError::Cancelled),
            "The download was cancelled."
        );
        let unknown = user_friendly_message(&AppError::Download("exit code 2".to_string()));
        assert!(unknown.contains("exit code 2"));
        assert_eq!(
            user_friendly_message(&AppError::Download(
                "[youtube] x: Video unavailable".to_string()
            )),
            ErrorCategory::Unavailable.user_message()
        );
    }
}
