//! Track download service.
//!
//! Fetches the audio behind every scraped track into `<output_dir>/<id>.mp3`
//! and writes a `tracks.json` index of the successes. Failures are per
//! track; they are reported as events and never stop the batch.
//! Separated from UI concerns - emits events for progress tracking.

mod types;

use std::collections::HashSet;
use std::path::Path;

use anyhow::Context;
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::{mpsc, Semaphore, SemaphorePermit};
use tracing::{debug, info, warn};

use crate::models::MixRecord;
use crate::scrapers::HttpClient;

pub use types::{
    DownloadConfig, DownloadError, DownloadEvent, DownloadResult, DownloadedTrack, ScrapedTrack,
};

/// Name of the index written into the output directory.
pub const INDEX_FILE: &str = "tracks.json";

/// Bounds how many downloads run at once.
///
/// Created by whoever orchestrates a batch and lent to each download call.
#[derive(Debug)]
pub struct DownloadGate {
    permits: Semaphore,
}

impl DownloadGate {
    pub fn new(concurrency: usize) -> Self {
        Self {
            permits: Semaphore::new(concurrency.max(1)),
        }
    }

    /// Wait for a free slot.
    pub async fn enter(&self) -> Result<SemaphorePermit<'_>, DownloadError> {
        self.permits
            .acquire()
            .await
            .map_err(|_| DownloadError::GateClosed)
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }
}

/// Read a JSON array of `{id_audio, name_audio, url_audio}` objects.
pub fn load_tracks(path: &Path) -> anyhow::Result<Vec<ScrapedTrack>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Invalid tracks file {}", path.display()))
}

/// Unique tracks of a scraped mixes file, first occurrence of each id wins.
pub fn tracks_from_mixes(path: &Path) -> anyhow::Result<Vec<ScrapedTrack>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let mixes: Vec<MixRecord> = serde_json::from_str(&text)
        .with_context(|| format!("Invalid mixes file {}", path.display()))?;
    Ok(unique_tracks(&mixes))
}

pub fn unique_tracks(mixes: &[MixRecord]) -> Vec<ScrapedTrack> {
    let mut seen = HashSet::new();
    mixes
        .iter()
        .flat_map(|mix| mix.tracks.tracks())
        .filter(|track| seen.insert(track.id.clone()))
        .map(|track| ScrapedTrack {
            id_audio: track.id.clone(),
            name_audio: track.name.clone(),
            url_audio: track.url.clone(),
        })
        .collect()
}

/// `<id>.mp3`, for ids made only of ASCII digits.
///
/// Ids come from scraped manifests and end up in a file path.
pub fn audio_file_name(id: &str) -> Result<String, DownloadError> {
    if id.is_empty() || !id.bytes().all(|b| b.is_ascii_digit()) {
        return Err(DownloadError::InvalidId(id.to_string()));
    }
    Ok(format!("{}.mp3", id))
}

/// Service for downloading track audio.
pub struct DownloadService {
    client: HttpClient,
    config: DownloadConfig,
}

impl DownloadService {
    pub fn new(config: DownloadConfig) -> anyhow::Result<Self> {
        let client = HttpClient::new(config.request_timeout, config.user_agent.as_deref())
            .context("Failed to create HTTP client")?;
        Ok(Self { client, config })
    }

    /// Download every track, then write the index.
    pub async fn download(
        &self,
        tracks: &[ScrapedTrack],
        event_tx: mpsc::Sender<DownloadEvent>,
    ) -> anyhow::Result<DownloadResult> {
        tokio::fs::create_dir_all(&self.config.output_dir)
            .await
            .with_context(|| {
                format!("Failed to create {}", self.config.output_dir.display())
            })?;

        let gate = DownloadGate::new(self.config.concurrency);
        info!(
            "Downloading {} tracks ({} at a time)",
            tracks.len(),
            self.config.concurrency
        );

        let mut pending: FuturesUnordered<_> = tracks
            .iter()
            .map(|track| {
                let gate = &gate;
                let event_tx = event_tx.clone();
                async move {
                    let _ = event_tx
                        .send(DownloadEvent::Started {
                            id: track.id_audio.clone(),
                            name: track.name_audio.clone(),
                        })
                        .await;
                    (track, self.download_track(gate, track).await)
                }
            })
            .collect();

        let mut downloaded = Vec::new();
        let mut failed = 0;
        while let Some((track, result)) = pending.next().await {
            match result {
                Ok((entry, bytes)) => {
                    let _ = event_tx
                        .send(DownloadEvent::Completed {
                            id: track.id_audio.clone(),
                            name: track.name_audio.clone(),
                            bytes,
                        })
                        .await;
                    downloaded.push(entry);
                }
                Err(e) => {
                    warn!(
                        "Failed to download {} (ID: {}): {}",
                        track.name_audio, track.id_audio, e
                    );
                    failed += 1;
                    let _ = event_tx
                        .send(DownloadEvent::Failed {
                            id: track.id_audio.clone(),
                            name: track.name_audio.clone(),
                            error: e.to_string(),
                        })
                        .await;
                }
            }
        }

        let index_path = self.config.output_dir.join(INDEX_FILE);
        let json = serde_json::to_string(&downloaded)?;
        tokio::fs::write(&index_path, json)
            .await
            .with_context(|| format!("Failed to write {}", index_path.display()))?;

        Ok(DownloadResult {
            downloaded: downloaded.len(),
            failed,
            tracks: downloaded,
            index_path,
        })
    }

    /// Download one track while holding a slot of `gate`.
    pub async fn download_track(
        &self,
        gate: &DownloadGate,
        track: &ScrapedTrack,
    ) -> Result<(DownloadedTrack, u64), DownloadError> {
        let file_name = audio_file_name(&track.id_audio)?;
        let bytes = {
            let _permit = gate.enter().await?;
            let response = self.client.get(&track.url_audio).await?;
            if !response.is_success() {
                return Err(DownloadError::Status(response.status));
            }
            response.bytes().await?
        };

        let path = self.config.output_dir.join(&file_name);
        tokio::fs::write(&path, &bytes).await?;
        debug!("Saved {} ({} bytes)", path.display(), bytes.len());

        Ok((
            DownloadedTrack {
                name: track.name_audio.clone(),
                src: format!("{}{}", self.config.web_root, file_name),
                volume: 0,
            },
            bytes.len() as u64,
        ))
    }
}
