//! YouTube Download command line front end.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::MultiProgress;
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use youtube_download::commands;
use youtube_download::core::models::DownloadType;
use youtube_download::ui::{handle_interrupt, render_events, InterruptPolicy, ProgressBoard};
use youtube_download::utils::file_utils::sanitize_filename;
use youtube_download::utils::format::{format_bytes, format_time};
use youtube_download::{init, AppConfig, AppState, LoadedConfig};

#[derive(Debug, Parser)]
#[command(name = "youtube-download", version)]
#[command(about = "Download videos and audio from YouTube and YouTube Music")]
struct Cli {
    /// 覆盖 LOG_LEVEL（TRACE, DEBUG, INFO, WARNING, ERROR）
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Queue one or more URLs and download them
    Download {
        #[arg(required = true)]
        urls: Vec<String>,

        /// Extract audio to mp3 instead of keeping the video
        #[arg(long, default_value_t = false)]
        audio: bool,

        /// Quality preset label or alias (best, 1080p, 720p, 480p, audio, mp3)
        #[arg(long, short)]
        quality: Option<String>,

        /// Override MAX_CONCURRENT_DOWNLOADS
        #[arg(long)]
        max_concurrent: Option<usize>,

        /// Override DOWNLOADS_DIR
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Print log lines instead of progress bars
        #[arg(long, default_value_t = false)]
        no_progress: bool,
    },
    /// Show metadata for a URL without downloading
    Info { url: String },
    /// List quality presets and their format selectors
    Presets,
    /// Show recent download attempts
    History {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Check yt-dlp and ffmpeg and print the effective configuration
    Check,
}

fn load_config(cli: &Cli) -> Result<LoadedConfig> {
    let LoadedConfig {
        mut config,
        warnings,
    } = AppState::load_or_initialize_config();
    if let Some(level) = &cli.log_level {
        config.log_level = level.clone();
    }

    if let Command::Download {
        max_concurrent,
        output_dir,
        ..
    } = &cli.command
    {
        if let Some(value) = max_concurrent {
            config.max_concurrent_downloads = *value;
        }
        if let Some(dir) = output_dir {
            config.downloads_dir = dir.clone();
        }
    }

    config.validate()?;
    config.ensure_directories()?;
    Ok(LoadedConfig { config, warnings })
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(1)
        }
    }
}

async fn run(cli: Cli) -> Result<bool> {
    let LoadedConfig { config, warnings } = load_config(&cli)?;
    let progress_bars = matches!(cli.command, Command::Download { no_progress: false, .. });
    let _log_guard = init(&config, !progress_bars);
    for warning in &warnings {
        warn!("{}", warning);
        if progress_bars {
            eprintln!("Warning: {}", warning);
        }
    }

    match cli.command {
        Command::Download { urls, audio, quality, .. } => {
            let download_type = if audio {
                DownloadType::Audio
            } else {
                DownloadType::Video
            };
            run_downloads(config, urls, download_type, quality, progress_bars).await
        }
        Command::Info { url } => show_info(config, url).await,
        Command::Presets => {
            for preset in commands::list_quality_presets() {
                println!("{:<16} {}", preset.label, preset.format_selector);
            }
            Ok(true)
        }
        Command::History { limit } => show_history(config, limit).await,
        Command::Check => run_check(config).await,
    }
}

async fn run_downloads(
    config: AppConfig,
    urls: Vec<String>,
    download_type: DownloadType,
    quality: Option<String>,
    progress_bars: bool,
) -> Result<bool> {
    if let Err(e) = commands::check_yt_dlp().await {
        bail!("yt-dlp is required but could not be run: {}", e);
    }

    info!(
        "Saving to {} with up to {} concurrent downloads",
        config.downloads_dir.display(),
        config.max_concurrent_downloads
    );

    let (tx, rx) = mpsc::unbounded_channel();
    let state = AppState::new(config, Some(tx)).context("Failed to start downloader")?;

    let board = ProgressBoard::new(progress_bars);
    let printer = board.printer();
    let done = CancellationToken::new();
    let renderer = tokio::spawn(render_events(rx, board, done.clone()));
    let shutdown = CancellationToken::new();
    let interrupt = tokio::spawn(watch_interrupts(
        state.clone(),
        printer.clone(),
        shutdown.clone(),
    ));

    let mut accepted = 0usize;
    let mut rejected = 0usize;
    let mut skipped = 0usize;
    for url in urls {
        if shutdown.is_cancelled() {
            skipped += 1;
            continue;
        }
        let queued = tokio::select! {
            result = commands::enqueue_download(&state, url.clone(), download_type, quality.clone()) => result,
            _ = shutdown.cancelled() => {
                skipped += 1;
                continue;
            }
        };
        match queued {
            Ok(_) => accepted += 1,
            Err(message) => {
                rejected += 1;
                print_line(&printer, &format!("✗ {}: {}", url, message));
            }
        }
    }
    if shutdown.is_cancelled() {
        // 元数据查询期间被打断时，任务可能刚好入队
        if let Err(e) = commands::cancel_all_downloads(&state).await {
            warn!("Failed to cancel downloads after interrupt: {}", e);
        }
    }

    state.download_manager.wait_until_idle().await;
    interrupt.abort();
    done.cancel();
    let summary = renderer.await.context("Progress renderer stopped unexpectedly")?;

    for (title, error) in &summary.failed {
        eprintln!("✗ {}: {}", title, error);
    }
    println!(
        "Downloaded {}, failed {}, cancelled {}, rejected {}, skipped {}",
        summary.completed,
        summary.failed.len(),
        summary.cancelled,
        rejected,
        skipped
    );

    Ok(rejected == 0
        && skipped == 0
        && summary.all_completed()
        && summary.completed == accepted)
}

fn print_line(printer: &MultiProgress, line: &str) {
    if printer.is_hidden() || printer.println(line).is_err() {
        eprintln!("{}", line);
    }
}

/// Keeps handling Ctrl-C for the whole session; see [`handle_interrupt`]
async fn watch_interrupts(state: AppState, printer: MultiProgress, shutdown: CancellationToken) {
    let mut policy = InterruptPolicy::default();
    loop {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            return;
        }
        let message = handle_interrupt(&state, &mut policy, &shutdown).await;
        print_line(&printer, &message);
    }
}

async fn show_info(config: AppConfig, url: String) -> Result<bool> {
    let description = match commands::describe_url(&url) {
        Ok(description) => description,
        Err(message) => {
            eprintln!("✗ {}", message);
            return Ok(false);
        }
    };

    let state = AppState::new(config.clone(), None)?;
    let info = match commands::get_video_info(&state, url).await {
        Ok(info) => info,
        Err(message) => {
            eprintln!("✗ {}", message);
            return Ok(false);
        }
    };

    println!("Title:     {}", info.display_title());
    println!("Kind:      {:?}", description.kind);
    if let Some(uploader) = &info.uploader {
        println!("Uploader:  {}", uploader);
    }
    if let Some(duration) = info.duration {
        println!("Duration:  {}", format_time(duration));
    }
    println!(
        "ID:        {}",
        description.video_id.unwrap_or_else(|| info.id.clone())
    );
    for (index, entry) in info.entries.iter().enumerate() {
        println!(
            "  {:>3}. {}",
            index + 1,
            entry.title.as_deref().unwrap_or(&entry.id)
        );
    }
    if !info.is_playlist {
        let file_name = format!("{}.%(ext)s", sanitize_filename(&info.title));
        println!(
            "Saves to:  {}",
            config.get_download_path(Some(&file_name)).display()
        );
    }
    Ok(true)
}

async fn show_history(config: AppConfig, limit: usize) -> Result<bool> {
    let state = AppState::new(config, None)?;
    let entries = commands::get_download_history(&state, limit)
        .await
        .map_err(anyhow::Error::msg)?;

    if entries.is_empty() {
        println!("No downloads recorded yet");
    }
    for entry in entries {
        let size = entry
            .file_path
            .as_ref()
            .and_then(|path| std::fs::metadata(path).ok())
            .map(|meta| format!(" ({})", format_bytes(meta.len())))
            .unwrap_or_default();
        println!(
            "{}  {:<10} {}{}  {}",
            entry.finished_at.format("%Y-%m-%d %H:%M"),
            entry.status,
            entry.title,
            size,
            entry.url
        );
        if let Some(error) = entry.error {
            println!("    {}", error);
        }
    }
    Ok(true)
}

async fn run_check(config: AppConfig) -> Result<bool> {
    let app = commands::get_app_info();
    println!("{} v{}", app.name, app.version);

    let report = commands::check_dependencies().await;
    println!(
        "yt-dlp:  {}",
        report.yt_dlp.as_deref().unwrap_or("not found")
    );
    println!(
        "ffmpeg:  {}",
        report.ffmpeg.as_deref().unwrap_or("not found")
    );

    let state = AppState::new(config, None)?;
    for (key, value) in commands::get_config_env(&state).await {
        println!("{}={}", key, value);
    }
    Ok(report.can_download())
}
