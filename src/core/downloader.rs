//! yt-dlp downloader
//!
//! Runs the yt-dlp command line tool as a child process, translating a
//! [`DownloadRequest`] into arguments and its newline progress records into
//! [`ProgressSnapshot`] callbacks. The rest of the application talks to it
//! through the [`MediaBackend`] trait.

use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::core::error_handling::primary_error_line;
use crate::core::models::{
    AppError, AppResult, DownloadType, MediaInfo, PlaylistEntry, QualityPreset,
};
use crate::core::validators::is_playlist_url;
use crate::utils::constants::DEFAULT_TIMEOUT;

const PROGRESS_MARKER: &str = "[progress]";
const FILE_MARKER: &str = "[file]";

/// Everything the engine needs to fetch one item
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub task_id: String,
    pub url: String,
    pub quality: QualityPreset,
    pub download_type: DownloadType,
    pub output_dir: PathBuf,
}

/// One progress record reported by the engine
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSnapshot {
    pub status: String,
    pub downloaded_bytes: u64,
    pub total_bytes: Option<u64>,
    pub total_bytes_estimate: Option<u64>,
    pub speed: Option<f64>,
    pub eta: Option<u64>,
}

impl ProgressSnapshot {
    /// Exact total when known, otherwise the estimate
    pub fn total(&self) -> Option<u64> {
        self.total_bytes
            .or(self.total_bytes_estimate)
            .filter(|total| *total > 0)
    }

    /// Percent complete, only defined while downloading with a known total
    pub fn percent(&self) -> Option<f64> {
        if self.status != "downloading" {
            return None;
        }
        let total = self.total()?;
        Some((self.downloaded_bytes as f64 / total as f64 * 100.0).clamp(0.0, 100.0))
    }
}

/// Files produced by a finished download
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DownloadOutcome {
    pub files: Vec<PathBuf>,
}

/// Progress callback type for downloads
pub type ProgressCallback = Arc<dyn Fn(ProgressSnapshot) + Send + Sync>;

/// Engine seam used by the download manager
#[async_trait]
pub trait MediaBackend: Send + Sync {
    /// Metadata without downloading; playlists are listed flat
    async fn fetch_info(&self, url: &str) -> AppResult<MediaInfo>;

    /// Download until finished, failed or `cancel` fires
    async fn download(
        &self,
        request: &DownloadRequest,
        on_progress: ProgressCallback,
        cancel: CancellationToken,
    ) -> AppResult<DownloadOutcome>;
}

/// Line emitted by the engine on stdout/stderr
#[derive(Debug, Clone, PartialEq)]
pub enum EngineLine {
    Progress(ProgressSnapshot),
    File(PathBuf),
    Other(String),
}

fn progress_template() -> String {
    format!(
        "download:{} %(progress.status)s %(progress.downloaded_bytes)s %(progress.total_bytes)s \
         %(progress.total_bytes_estimate)s %(progress.speed)s %(progress.eta)s",
        PROGRESS_MARKER
    )
}

/// Build the yt-dlp argument list for a request
pub fn build_download_args(request: &DownloadRequest) -> Vec<String> {
    let output_template = request.output_dir.join("%(title)s.%(ext)s");

    let mut args: Vec<String> = vec![
        "--newline".into(),
        "--no-warnings".into(),
        "--quiet".into(),
        "--progress".into(),
        "--progress-template".into(),
        progress_template(),
        "--print".into(),
        format!("after_move:{} %(filepath)s", FILE_MARKER),
        "--no-simulate".into(),
        "-f".into(),
        request.quality.format_selector().into(),
        "-o".into(),
        output_template.to_string_lossy().into_owned(),
        "--write-thumbnail".into(),
        "--embed-thumbnail".into(),
    ];

    if request.download_type == DownloadType::Audio {
        args.extend(
            [
                "--extract-audio",
                "--audio-format",
                "mp3",
                "--audio-quality",
                "192K",
                "--embed-metadata",
            ]
            .map(String::from),
        );
    }

    if is_playlist_url(&request.url) {
        args.push("--yes-playlist".into());
    } else {
        args.push("--no-playlist".into());
    }

    args.push("--".into());
    args.push(request.url.clone());
    args
}

fn parse_number(token: &str) -> Option<f64> {
    match token {
        "NA" | "None" | "" => None,
        other => other.parse::<f64>().ok().filter(|value| value.is_finite()),
    }
}

/// Parse one line of engine output
pub fn parse_engine_line(line: &str) -> EngineLine {
    let trimmed = line.trim();

    if let Some(rest) = trimmed.strip_prefix(PROGRESS_MARKER) {
        let tokens: Vec<&str> = rest.split_whitespace().collect();
        if tokens.len() >= 6 {
            return EngineLine::Progress(ProgressSnapshot {
                status: tokens[0].to_string(),
                downloaded_bytes: parse_number(tokens[1]).unwrap_or(0.0) as u64,
                total_bytes: parse_number(tokens[2]).map(|v| v as u64),
                total_bytes_estimate: parse_number(tokens[3]).map(|v| v as u64),
                speed: parse_number(tokens[4]),
                eta: parse_number(tokens[5]).map(|v| v as u64),
            });
        }
    }

    if let Some(path) = trimmed.strip_prefix(FILE_MARKER) {
        let path = path.trim();
        if !path.is_empty() {
            return EngineLine::File(PathBuf::from(path));
        }
    }

    EngineLine::Other(trimmed.to_string())
}

#[derive(Debug, Deserialize)]
struct RawInfo {
    id: Option<String>,
    title: Option<String>,
    uploader: Option<String>,
    duration: Option<f64>,
    thumbnail: Option<String>,
    webpage_url: Option<String>,
    #[serde(rename = "_type")]
    kind: Option<String>,
    entries: Option<Vec<Option<RawEntry>>>,
}

#[derive(Debug, Deserialize)]
struct RawEntry {
    id: Option<String>,
    title: Option<String>,
    url: Option<String>,
    duration: Option<f64>,
}

/// Parse `--dump-single-json` output
pub fn parse_media_info(json: &str) -> AppResult<MediaInfo> {
    let raw: RawInfo = serde_json::from_str(json)
        .map_err(|e| AppError::Parse(format!("Failed to parse yt-dlp output: {}", e)))?;

    let is_playlist = raw.kind.as_deref() == Some("playlist") || raw.entries.is_some();
    let entries = raw
        .entries
        .unwrap_or_default()
        .into_iter()
        .flatten()
        .filter_map(|entry| {
            Some(PlaylistEntry {
                id: entry.id?,
                title: entry.title,
                url: entry.url,
                duration: entry.duration,
            })
        })
        .collect();

    Ok(MediaInfo {
        id: raw
            .id
            .ok_or_else(|| AppError::Parse("Missing id in yt-dlp output".to_string()))?,
        title: raw.title.unwrap_or_else(|| "Unknown".to_string()),
        uploader: raw.uploader,
        duration: raw.duration,
        thumbnail: raw.thumbnail,
        webpage_url: raw.webpage_url,
        entries,
        is_playlist,
    })
}

fn spawn_error(program: &str, error: std::io::Error) -> AppError {
    if error.kind() == std::io::ErrorKind::NotFound {
        AppError::MissingDependency(format!("{} was not found on PATH", program))
    } else {
        AppError::Unexpected(error.to_string())
    }
}

async fn drain_stream<R>(reader: R, on_progress: ProgressCallback) -> (Vec<String>, Vec<PathBuf>)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    let mut other = Vec::new();
    let mut files = Vec::new();

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => match parse_engine_line(&line) {
                EngineLine::Progress(snapshot) => on_progress(snapshot),
                EngineLine::File(path) => files.push(path),
                EngineLine::Other(text) if !text.is_empty() => other.push(text),
                EngineLine::Other(_) => {}
            },
            Ok(None) => break,
            Err(e) => {
                warn!("Failed to read yt-dlp output: {}", e);
                break;
            }
        }
    }

    (other, files)
}

/// YouTube downloader wrapper for yt-dlp
#[derive(Debug, Clone)]
pub struct YtDlpDownloader {
    program: String,
    leading_args: Vec<String>,
}

impl Default for YtDlpDownloader {
    fn default() -> Self {
        Self::new()
    }
}

impl YtDlpDownloader {
    /// Use `yt-dlp` from PATH
    pub fn new() -> Self {
        Self::with_command("yt-dlp", Vec::new())
    }

    /// Use a custom launcher, e.g. `python3 -m yt_dlp`
    pub fn with_command(program: impl Into<String>, leading_args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            leading_args,
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.leading_args)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        detach_from_terminal(&mut command);
        command
    }

    /// Report the installed yt-dlp version
    pub async fn check_yt_dlp(&self) -> AppResult<String> {
        let mut command = self.command();
        command.arg("--version");
        probe_version(&self.program, command).await
    }

    async fn run_to_completion(&self, args: &[String]) -> AppResult<String> {
        let mut command = self.command();
        command.args(args);

        let output = tokio::time::timeout(DEFAULT_TIMEOUT, command.output())
            .await
            .map_err(|_| AppError::Download("Timed out waiting for yt-dlp".to_string()))?
            .map_err(|e| spawn_error(&self.program, e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let detail = primary_error_line(&stderr)
                .unwrap_or_else(|| format!("yt-dlp exited with {}", output.status));
            return Err(AppError::Download(detail));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Run the child in its own process group
///
/// A Ctrl-C in the terminal then only reaches the front end, and the engine
/// stops through its cancellation token.
fn detach_from_terminal(command: &mut Command) {
    #[cfg(unix)]
    command.process_group(0);
    #[cfg(not(unix))]
    let _ = command;
}

/// Report the installed ffmpeg version
pub async fn check_ffmpeg() -> AppResult<String> {
    let mut command = Command::new("ffmpeg");
    command.arg("-version").stdin(Stdio::null()).kill_on_drop(true);
    detach_from_terminal(&mut command);
    probe_version("ffmpeg", command).await
}

async fn probe_version(program: &str, mut command: Command) -> AppResult<String> {
    let output = tokio::time::timeout(DEFAULT_TIMEOUT, command.output())
        .await
        .map_err(|_| AppError::System(format!("Timed out probing {}", program)))?
        .map_err(|e| spawn_error(program, e))?;

    if !output.status.success() {
        return Err(AppError::MissingDependency(format!(
            "{} exited with {}",
            program, output.status
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()
        .unwrap_or_default()
        .trim()
        .to_string())
}

#[async_trait]
impl MediaBackend for YtDlpDownloader {
    async fn fetch_info(&self, url: &str) -> AppResult<MediaInfo> {
        debug!("Fetching video info for URL: {}", url);

        let mut args: Vec<String> = vec![
            "--dump-single-json".into(),
            "--no-warnings".into(),
            "--skip-download".into(),
        ];
        if is_playlist_url(url) {
            args.push("--flat-playlist".into());
        } else {
            args.push("--no-playlist".into());
        }
        args.push("--".into());
        args.push(url.to_string());

        let stdout = self.run_to_completion(&args).await.map_err(|e| {
            error!("Error getting video info: {}", e);
            e
        })?;
        parse_media_info(&stdout)
    }

    async fn download(
        &self,
        request: &DownloadRequest,
        on_progress: ProgressCallback,
        cancel: CancellationToken,
    ) -> AppResult<DownloadOutcome> {
        if is_playlist_url(&request.url) {
            info!("Downloading playlist: {}", request.url);
        } else {
            info!("Downloading single video: {}", request.url);
        }

        let args = build_download_args(request);
        debug!("yt-dlp arguments: {:?}", args);

        let mut child = self
            .command()
            .args(&args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| spawn_error(&self.program, e))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AppError::System("yt-dlp stdout unavailable".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| AppError::System("yt-dlp stderr unavailable".to_string()))?;

        let stdout_task = tokio::spawn(drain_stream(stdout, on_progress.clone()));
        let stderr_task = tokio::spawn(drain_stream(stderr, on_progress));

        let status = tokio::select! {
            status = child.wait() => Some(status),
            _ = cancel.cancelled() => None,
        };

        let Some(status) = status else {
            warn!("Cancelling yt-dlp for {}", request.url);
            if let Err(e) = child.kill().await {
                warn!("Failed to kill yt-dlp: {}", e);
            }
            stdout_task.abort();
            stderr_task.abort();
            return Err(AppError::Cancelled);
        };
        let status = status.map_err(|e| AppError::Unexpected(e.to_string()))?;

        let (_, files) = stdout_task.await.unwrap_or_default();
        let (stderr_lines, _) = stderr_task.await.unwrap_or_default();

        if status.success() {
            info!("Successfully downloaded: {}", request.url);
            Ok(DownloadOutcome { files })
        } else {
            let stderr_text = stderr_lines.join("\n");
            let detail = primary_error_line(&stderr_text)
                .or_else(|| stderr_lines.last().cloned())
                .unwrap_or_else(|| format!("yt-dlp exited with {}", status));
            error!("Download error: {}", detail);
            Err(AppError::Download(detail))
        }
    }
}
