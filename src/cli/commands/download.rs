//! Track download command.

use std::path::Path;

use tokio::sync::mpsc;

use crate::cli::icons::{dim_arrow, error, info, success, warn};
use crate::cli::progress;
use crate::config::Settings;
use crate::services::download::{load_tracks, tracks_from_mixes};
use crate::services::{DownloadConfig, DownloadEvent, DownloadService};

/// Download every track in `tracks` into `output_dir` and write its index.
pub async fn cmd_download(
    settings: &Settings,
    tracks: &Path,
    output_dir: &Path,
    web_root: &str,
    concurrent_requests: Option<usize>,
    from_mixes: bool,
) -> anyhow::Result<()> {
    let tracks = if from_mixes {
        tracks_from_mixes(tracks)?
    } else {
        load_tracks(tracks)?
    };

    if tracks.is_empty() {
        println!("{} No tracks to download", info());
        return Ok(());
    }

    let config = DownloadConfig {
        output_dir: output_dir.to_path_buf(),
        web_root: web_root.to_string(),
        concurrency: concurrent_requests.unwrap_or(settings.download_concurrency),
        request_timeout: settings.download_timeout(),
        user_agent: settings.user_agent.clone(),
    };
    println!(
        "{} Downloading {} tracks to {} ({} at a time)",
        info(),
        tracks.len(),
        output_dir.display(),
        config.concurrency
    );

    let service = DownloadService::new(config)?;

    let bar = progress::bar(tracks.len() as u64, "Downloading");
    let handler_bar = bar.clone();
    let (event_tx, mut event_rx) = mpsc::channel::<DownloadEvent>(100);
    let event_handler = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            match event {
                DownloadEvent::Started { name, .. } => {
                    handler_bar.set_message(name);
                }
                DownloadEvent::Completed { .. } => handler_bar.inc(1),
                DownloadEvent::Failed { id, name, error: e } => {
                    handler_bar.suspend(|| {
                        eprintln!("{} Failed to download {} (ID: {}): {}", error(), name, id, e)
                    });
                    handler_bar.inc(1);
                }
            }
        }
    });

    let result = service.download(&tracks, event_tx).await;
    if let Err(e) = event_handler.await {
        tracing::warn!("Event handler task failed: {}", e);
    }
    bar.finish_and_clear();
    let result = result?;

    println!("{} Downloaded {} tracks", success(), result.downloaded);
    if result.failed > 0 {
        println!("  {} {} failed", warn(), result.failed);
    }
    println!(
        "  {} Index written to {}",
        dim_arrow(),
        result.index_path.display()
    );

    Ok(())
}
