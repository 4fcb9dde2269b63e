//! Registry snapshot file (`videos.json`).
//!
//! Only completed videos are persisted. Both directions are tolerant: a
//! video whose sidecar cannot be written is left out of the save, and
//! entries that fail to parse or validate are skipped on load.

use std::sync::Arc;

use framemark_core::error::CoreError;
use framemark_core::naming::StorageLayout;
use framemark_core::snapshot::VideoSnapshot;
use framemark_core::status::ProcessState;

use crate::registry::VideoRegistry;
use crate::video::Video;

/// Write every completed video to the snapshot file. Returns the number of
/// videos written.
pub async fn save_registry(
    registry: &VideoRegistry,
    layout: &StorageLayout,
) -> Result<usize, CoreError> {
    let mut snapshots = Vec::new();
    for video in registry.list().await {
        if video.state() != ProcessState::Completed {
            tracing::warn!(
                video_id = %video.id(),
                state = ?video.state(),
                "Skipping video that is not completed",
            );
            continue;
        }
        match video.to_persistable().await {
            Ok(snapshot) => snapshots.push(snapshot),
            Err(e) => tracing::warn!(
                video_id = %video.id(),
                error = %e,
                "Failed to persist video, leaving it out of the registry",
            ),
        }
    }

    let json = serde_json::to_vec_pretty(&snapshots)
        .map_err(|e| CoreError::Internal(format!("Failed to serialize registry: {e}")))?;

    tokio::fs::create_dir_all(layout.data_dir()).await?;
    let path = layout.registry_path();
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, json).await?;
    tokio::fs::rename(&tmp, &path).await?;

    tracing::info!(count = snapshots.len(), path = %path.display(), "Saved video registry");
    Ok(snapshots.len())
}

/// Restore videos from the snapshot file into `registry`. A missing file
/// loads nothing. Returns the number of videos restored.
pub async fn load_registry(
    registry: &VideoRegistry,
    layout: &StorageLayout,
) -> Result<usize, CoreError> {
    let path = layout.registry_path();
    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "No video registry to load");
            return Ok(0);
        }
        Err(e) => return Err(e.into()),
    };

    let entries: Vec<serde_json::Value> = serde_json::from_slice(&bytes)
        .map_err(|e| CoreError::InvalidArgument(format!("Malformed video registry: {e}")))?;

    let mut loaded = 0;
    for (position, entry) in entries.into_iter().enumerate() {
        let video = match VideoSnapshot::from_value(entry) {
            Ok(snapshot) => Video::from_persistable(snapshot, layout).await,
            Err(e) => Err(e),
        };
        match video {
            Ok(video) => {
                registry.insert(Arc::new(video)).await;
                loaded += 1;
            }
            Err(e) => tracing::warn!(position, error = %e, "Skipping unreadable registry entry"),
        }
    }

    tracing::info!(count = loaded, path = %path.display(), "Loaded video registry");
    Ok(loaded)
}
