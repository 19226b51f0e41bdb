//! URL validation for YouTube and YouTube Music links
//!
//! Decides whether a link is accepted at all and whether it should be
//! handled as a single item or as a playlist.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use url::Url;

const EMPTY_URL_MESSAGE: &str = "URL cannot be empty";
const INVALID_URL_MESSAGE: &str = "Not a valid YouTube or YouTube Music URL";

/// Rejected URL with the message shown to the user
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("URL cannot be empty")]
    Empty,
    #[error("Not a valid YouTube or YouTube Music URL")]
    NotYoutube,
}

impl ValidationError {
    pub fn message(&self) -> &'static str {
        match self {
            ValidationError::Empty => EMPTY_URL_MESSAGE,
            ValidationError::NotYoutube => INVALID_URL_MESSAGE,
        }
    }
}

/// Accepted URL shapes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UrlKind {
    /// `youtube.com/watch?v=...` and other youtube.com paths
    Watch,
    /// `youtu.be/<id>`
    ShortLink,
    /// Anything carrying a playlist
    Playlist,
    /// `music.youtube.com/...`
    Music,
}

fn youtube_patterns() -> &'static [Regex; 2] {
    static PATTERNS: OnceLock<[Regex; 2]> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            Regex::new(r"(?i)^(https?://)?(www\.)?(youtube\.com|youtu\.be)/.+$")
                .expect("static youtube pattern"),
            Regex::new(r"(?i)^(https?://)?(music\.youtube\.com)/.+$")
                .expect("static youtube music pattern"),
        ]
    })
}

/// Validate that `url` is a YouTube or YouTube Music link
pub fn validate_youtube_url(url: &str) -> Result<(), ValidationError> {
    if url.trim().is_empty() {
        return Err(ValidationError::Empty);
    }

    if youtube_patterns().iter().any(|pattern| pattern.is_match(url)) {
        Ok(())
    } else {
        Err(ValidationError::NotYoutube)
    }
}

/// Check if a URL points to a playlist
pub fn is_playlist_url(url: &str) -> bool {
    let lower = url.to_lowercase();
    lower.contains("list=") || lower.contains("/playlist")
}

/// Classify an already validated URL
pub fn classify_url(url: &str) -> UrlKind {
    if is_playlist_url(url) {
        return UrlKind::Playlist;
    }

    let lower = url.to_lowercase();
    if lower.contains("music.youtube.com") {
        UrlKind::Music
    } else if lower.contains("youtu.be/") {
        UrlKind::ShortLink
    } else {
        UrlKind::Watch
    }
}

fn parse_lenient(url: &str) -> Option<Url> {
    let trimmed = url.trim();
    Url::parse(trimmed)
        .or_else(|_| Url::parse(&format!("https://{}", trimmed)))
        .ok()
}

/// Extract the video id from watch, short, embed and shorts links
pub fn extract_video_id(url: &str) -> Option<String> {
    let parsed = parse_lenient(url)?;
    let host = parsed.host_str()?.to_lowercase();

    if host.ends_with("youtu.be") {
        return parsed
            .path_segments()?
            .next()
            .filter(|segment| !segment.is_empty())
            .map(str::to_string);
    }

    if let Some((_, id)) = parsed.query_pairs().find(|(key, _)| key == "v") {
        return Some(id.into_owned());
    }

    let mut segments = parsed.path_segments()?;
    match segments.next() {
        Some("embed") | Some("shorts") | Some("live") => segments
            .next()
            .filter(|segment| !segment.is_empty())
            .map(str::to_string),
        _ => None,
    }
}

/// Extract the `list=` parameter of a playlist link
pub fn extract_playlist_id(url: &str) -> Option<String> {
    let parsed = parse_lenient(url)?;
    parsed
        .query_pairs()
        .find(|(key, _)| key == "list")
        .map(|(_, id)| id.into_owned())
        .filter(|id| !id.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_urls() {
        for url in [
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
            "http://youtube.com/watch?v=dQw4w9WgXcQ",
            "youtube.com/watch?v=dQw4w9WgXcQ",
            "https://youtu.be/dQw4w9WgXcQ",
            "HTTPS://WWW.YOUTUBE.COM/playlist?list=PL123",
            "https://music.youtube.com/watch?v=abc",
        ] {
            assert_eq!(validate_youtube_url(url), Ok(()), "{url}");
        }
    }

    #[test]
    fn test_invalid_urls() {
        assert_eq!(validate_youtube_url(""), Err(ValidationError::Empty));
        assert_eq!(validate_youtube_url("   "), Err(ValidationError::Empty));
        assert_eq!(
            validate_youtube_url("https://example.com/video"),
            Err(ValidationError::NotYoutube)
        );
        assert_eq!(
            validate_youtube_url("https://youtube.com/"),
            Err(ValidationError::NotYoutube)
        );
        assert_eq!(
            ValidationError::NotYoutube.message(),
            "Not a valid YouTube or YouTube Music URL"
        );
    }

    #[test]
    fn test_playlist_detection() {
        assert!(is_playlist_url("https://www.youtube.com/playlist?list=PL123"));
        assert!(is_playlist_url(
            "https://www.youtube.com/watch?v=abc&LIST=PL123"
        ));
        assert!(!is_playlist_url("https://youtu.be/abc"));
    }

    #[test]
    fn test_classify_url() {
        assert_eq!(
            classify_url("https://www.youtube.com/watch?v=abc"),
            UrlKind::Watch
        );
        assert_eq!(classify_url("https://youtu.be/abc"), UrlKind::ShortLink);
        assert_eq!(
            classify_url("https://music.youtube.com/watch?v=abc"),
            UrlKind::Music
        );
        assert_eq!(
            classify_url("https://music.youtube.com/playlist?list=OLAK"),
            UrlKind::Playlist
        );
    }

    #[test]
    fn test_extract_ids() {
        assert_eq!(
            extract_video_id("https://www.youtube.com/watch?v=dQw4w9WgXcQ&t=10"),
            Some("dQw4w9WgXcQ".to_string())
        );
        assert_eq!(
            extract_video_id("youtu.be/dQw4w9WgXcQ?si=x"),
            Some("dQw4w9WgXcQ".to_string())
        );
        assert_eq!(
            extract_video_id("https://www.youtube.com/shorts/abc123"),
            Some("abc123".to_string())
        );
        assert_eq!(extract_video_id("https://www.youtube.com/playlist?list=PL1"), None);
        assert_eq!(
            extract_playlist_id("https://www.youtube.com/playlist?list=PLrAXtmRdnEQy6nuLMfCnAp7xfXLPd3BgB"),
            Some("PLrAXtmRdnEQy6nuLMfCnAp7xfXLPd3BgB".to_string())
        );
        assert_eq!(extract_playlist_id("https://youtu.be/abc"), None);
    }
}
