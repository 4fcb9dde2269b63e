use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use framemark_core::ffmpeg::FfmpegDecoder;
use framemark_core::tracking::UnavailableTrackers;
use framemark_core::types::{new_identifier, VideoId};
use framemark_pipeline::{EngineConfig, LabelingService, VideoRegistry};

/// Restore the registry, extract every video given on the command line and
/// save the registry again.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "framemark_worker=debug,framemark_pipeline=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = EngineConfig::from_env().context("invalid engine configuration")?;
    tracing::info!(
        data_dir = %config.data_dir.display(),
        frame_cache_dir = %config.frame_cache_dir.display(),
        "Worker starting",
    );

    let service = LabelingService::new(
        &config,
        Arc::new(VideoRegistry::new()),
        Arc::new(FfmpegDecoder::default()),
        Arc::new(UnavailableTrackers),
    );

    let restored = service.load_videos().await?;
    tracing::info!(count = restored, "Registry restored");

    let mut pending: Vec<VideoId> = Vec::new();
    for arg in std::env::args_os().skip(1) {
        let source = PathBuf::from(arg);
        match ingest(&service, &config, &source).await {
            Ok(id) => pending.push(id),
            Err(e) => tracing::error!(path = %source.display(), error = %e, "Failed to ingest video"),
        }
    }

    tokio::select! {
        _ = wait_all(&service, &pending) => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupt received, cancelling extractions");
            for id in &pending {
                service.cancel_extraction(id).await?;
            }
            wait_all(&service, &pending).await;
        }
    }

    let saved = service.save_videos().await?;
    tracing::info!(count = saved, "Worker finished");
    Ok(())
}

/// Copy `source` into the upload area and hand it to the service, which
/// deletes the copy once extraction ends.
async fn ingest(
    service: &LabelingService,
    config: &EngineConfig,
    source: &Path,
) -> anyhow::Result<VideoId> {
    let name = source
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("{} has no usable file name", source.display()))?
        .to_string();

    let uploads = config.data_dir.join("uploads");
    tokio::fs::create_dir_all(&uploads).await?;
    let upload = uploads.join(new_identifier());
    tokio::fs::copy(source, &upload)
        .await
        .with_context(|| format!("failed to copy {}", source.display()))?;

    let (_, id) = service.upload_video(&name, upload).await?;
    Ok(id)
}

async fn wait_all(service: &LabelingService, ids: &[VideoId]) {
    for id in ids {
        match service.wait_for_extraction(id).await {
            Ok(state) => tracing::info!(video_id = %id, state = ?state, "Extraction ended"),
            Err(e) => tracing::warn!(video_id = %id, error = %e, "Video disappeared"),
        }
    }
}
