//! Download service types and events.

use std::path::PathBuf;
use std::time::Duration;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::scrapers::FetchError;

/// A track as listed in a scraped tracks file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapedTrack {
    pub id_audio: String,
    pub name_audio: String,
    pub url_audio: String,
}

/// An entry of the `tracks.json` index written next to the audio files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadedTrack {
    pub name: String,
    pub src: String,
    pub volume: i64,
}

/// Events emitted during download operations.
#[derive(Debug, Clone)]
pub enum DownloadEvent {
    /// Download started for a track
    Started { id: String, name: String },
    /// Download completed successfully
    Completed { id: String, name: String, bytes: u64 },
    /// Download failed
    Failed {
        id: String,
        name: String,
        error: String,
    },
}

/// Why one track could not be downloaded.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("failed to read body: {0}")]
    Body(#[from] reqwest::Error),
    #[error("HTTP {0}")]
    Status(StatusCode),
    #[error("failed to write file: {0}")]
    Io(#[from] std::io::Error),
    #[error("track id {0:?} is not a plain numeric id")]
    InvalidId(String),
    #[error("download gate closed")]
    GateClosed,
}

/// Result of a download operation.
#[derive(Debug)]
pub struct DownloadResult {
    pub downloaded: usize,
    pub failed: usize,
    /// Successful entries, in completion order.
    pub tracks: Vec<DownloadedTrack>,
    pub index_path: PathBuf,
}

/// Configuration for the download service.
#[derive(Debug, Clone)]
pub struct DownloadConfig {
    pub output_dir: PathBuf,
    /// Prefix for each entry's `src`; the file name `<id>.mp3` is appended.
    pub web_root: String,
    pub concurrency: usize,
    pub request_timeout: Duration,
    pub user_agent: Option<String>,
}
