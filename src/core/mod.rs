//! Core business logic module
//!
//! Domain models, URL validation, the yt-dlp engine wrapper, the download
//! queue manager and its command router.

pub mod config;
pub mod downloader;
pub mod error_handling;
pub mod history;
pub mod manager;
pub mod models;
pub mod runtime;
pub mod validators;

#[cfg(test)]
mod manager_test;

// Re-export commonly used types
pub use config::AppConfig;
pub use manager::DownloadManager;
