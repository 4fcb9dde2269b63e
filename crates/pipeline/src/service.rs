//! Facade over the registry, the pipelines and the frame cache.
//!
//! Transport layers call into [`LabelingService`] only; every operation
//! resolves the video by identifier first and reports `VIDEO_NOT_FOUND`
//! for unknown ids.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;

use framemark_core::decoder::VideoDecoder;
use framemark_core::error::CoreError;
use framemark_core::labels::LabelRecord;
use framemark_core::naming::{frame_path, StorageLayout};
use framemark_core::status::ProcessState;
use framemark_core::tracking::TrackerProvider;
use framemark_core::types::{BoundingBox, FrameIndex, VideoId};

use crate::config::EngineConfig;
use crate::extraction::spawn_extraction;
use crate::frame_cache::FrameCache;
use crate::persistence;
use crate::registry::VideoRegistry;
use crate::tracking::{start_session, TrackingSession};
use crate::video::{Video, VideoInfo};

/// A frame handed out for display: a single-use cache token plus the
/// labels currently attached to the frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameView {
    pub token: String,
    pub frame_index: FrameIndex,
    pub labels: Vec<LabelRecord>,
}

pub struct LabelingService {
    layout: StorageLayout,
    registry: Arc<VideoRegistry>,
    frame_cache: FrameCache,
    decoder: Arc<dyn VideoDecoder>,
    trackers: Arc<dyn TrackerProvider>,
}

impl LabelingService {
    pub fn new(
        config: &EngineConfig,
        registry: Arc<VideoRegistry>,
        decoder: Arc<dyn VideoDecoder>,
        trackers: Arc<dyn TrackerProvider>,
    ) -> Self {
        Self {
            layout: config.layout(),
            registry,
            frame_cache: FrameCache::new(&config.frame_cache_dir, config.frame_cache_ttl),
            decoder,
            trackers,
        }
    }

    pub fn registry(&self) -> &Arc<VideoRegistry> {
        &self.registry
    }

    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    async fn video(&self, id: &str) -> Result<Arc<Video>, CoreError> {
        self.registry
            .get(id)
            .await
            .ok_or_else(|| CoreError::VideoNotFound(id.to_string()))
    }

    // ---- lifecycle ----

    /// Register a new video and start extracting `upload_path` in the
    /// background. The upload file is deleted once extraction ends.
    pub async fn upload_video(
        &self,
        name: &str,
        upload_path: PathBuf,
    ) -> Result<(String, VideoId), CoreError> {
        let video = Arc::new(Video::new(name, &self.layout));
        let id = video.id().to_string();
        self.registry.insert(Arc::clone(&video)).await;
        spawn_extraction(video, Arc::clone(&self.decoder), upload_path)?;

        tracing::info!(video_id = %id, name, "Video uploaded");
        Ok((name.to_string(), id))
    }

    pub async fn video_info(&self, id: &str) -> Result<VideoInfo, CoreError> {
        Ok(self.video(id).await?.info().await)
    }

    pub async fn list_videos(&self) -> Vec<(VideoId, VideoInfo)> {
        let mut out = Vec::new();
        for video in self.registry.list().await {
            out.push((video.id().to_string(), video.info().await));
        }
        out
    }

    /// Request cancellation. Returns `false` when extraction already ended.
    pub async fn cancel_extraction(&self, id: &str) -> Result<bool, CoreError> {
        let cancelled = self.video(id).await?.cancel_extraction();
        if cancelled {
            tracing::info!(video_id = %id, "Frame extraction cancellation requested");
        }
        Ok(cancelled)
    }

    pub async fn cancel_tracking(&self, id: &str) -> Result<bool, CoreError> {
        let cancelled = self.video(id).await?.cancel_tracking();
        if cancelled {
            tracing::info!(video_id = %id, "Tracking cancellation requested");
        }
        Ok(cancelled)
    }

    pub async fn wait_for_extraction(&self, id: &str) -> Result<ProcessState, CoreError> {
        Ok(self.video(id).await?.wait_for_extraction().await)
    }

    // ---- frames and labels ----

    /// Stage a frame image in the cache and return its token with the
    /// frame's labels.
    pub async fn read_frame(&self, id: &str, frame_index: FrameIndex) -> Result<FrameView, CoreError> {
        let video = self.video(id).await?;
        let labels = video.frame_labels(frame_index).await?;
        let token = self
            .frame_cache
            .stage(&frame_path(video.dir(), frame_index))
            .await?;
        Ok(FrameView {
            token,
            frame_index,
            labels,
        })
    }

    /// Redeem a frame token for the staged image path.
    pub async fn take_frame(&self, token: &str) -> Result<PathBuf, CoreError> {
        self.frame_cache.take(token).await
    }

    pub async fn label_frame(
        &self,
        id: &str,
        frame_index: FrameIndex,
        label: &str,
        absolute: BoundingBox,
    ) -> Result<String, CoreError> {
        self.video(id).await?.label_frame(frame_index, label, absolute).await
    }

    pub async fn unlabel_frame(&self, id: &str, label_id: &str) -> Result<(), CoreError> {
        self.video(id).await?.unlabel_frame(label_id).await
    }

    pub async fn exclude_frame(&self, id: &str, frame_index: FrameIndex) -> Result<(), CoreError> {
        self.video(id).await?.exclude_frame(frame_index).await
    }

    // ---- tracking ----

    pub async fn start_tracking(
        &self,
        id: &str,
        start: FrameIndex,
        algorithm: &str,
    ) -> Result<TrackingSession, CoreError> {
        let video = self.video(id).await?;
        start_session(video, start, algorithm, Arc::clone(&self.trackers)).await
    }

    // ---- persistence ----

    pub async fn save_videos(&self) -> Result<usize, CoreError> {
        persistence::save_registry(&self.registry, &self.layout).await
    }

    pub async fn load_videos(&self) -> Result<usize, CoreError> {
        persistence::load_registry(&self.registry, &self.layout).await
    }
}
