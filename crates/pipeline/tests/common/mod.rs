//! Shared fakes and fixtures for the pipeline integration tests.
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use image::{Rgb, RgbImage};

use framemark_core::decoder::{DecodeError, DecodedVideo, VideoDecoder};
use framemark_core::status::ProcessState;
use framemark_core::tracking::{Tracker, TrackerError, TrackerProvider, TrackingAlgorithm};
use framemark_core::types::{new_identifier, BoundingBox, Resolution, VideoId};
use framemark_pipeline::{EngineConfig, LabelingService, Video, VideoRegistry};

// ---------------------------------------------------------------------------
// Decoder
// ---------------------------------------------------------------------------

/// Decoder producing solid-colour frames without touching the file content.
#[derive(Clone)]
pub struct SyntheticDecoder {
    /// Frame count reported by `frame_count`.
    pub declared: u32,
    /// Frames actually produced before end of stream.
    pub available: u32,
    pub resolution: Resolution,
    /// Return a decode error instead of this 1-based frame.
    pub fail_at: Option<u32>,
    /// Block forever instead of producing this 1-based frame.
    pub stall_at: Option<u32>,
    /// Block forever inside `open`, keeping the video in `PREPARING`.
    pub stall_open: bool,
    /// Request cancellation of this video when the stream resolution is
    /// read, which happens after the last frame was written.
    pub cancel_on_resolution: Option<Arc<Video>>,
    /// Whether that cancellation request was accepted.
    pub cancel_accepted: Arc<AtomicBool>,
    /// Set once any opened stream was closed.
    pub closed: Arc<AtomicBool>,
}

impl SyntheticDecoder {
    pub fn new(frames: u32) -> Self {
        Self {
            declared: frames,
            available: frames,
            resolution: Resolution::new(32, 24),
            fail_at: None,
            stall_at: None,
            stall_open: false,
            cancel_on_resolution: None,
            cancel_accepted: Arc::new(AtomicBool::new(false)),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn was_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VideoDecoder for SyntheticDecoder {
    async fn open(&self, path: &Path) -> Result<Box<dyn DecodedVideo>, DecodeError> {
        if !path.exists() {
            return Err(DecodeError::VideoNotFound(path.display().to_string()));
        }
        if self.stall_open {
            std::future::pending::<()>().await;
        }
        Ok(Box::new(SyntheticStream {
            config: self.clone(),
            next: 1,
        }))
    }
}

struct SyntheticStream {
    config: SyntheticDecoder,
    next: u32,
}

#[async_trait]
impl DecodedVideo for SyntheticStream {
    fn frame_count(&self) -> u32 {
        self.config.declared
    }

    fn resolution(&self) -> Resolution {
        if let Some(video) = &self.config.cancel_on_resolution {
            let accepted = video.cancel_extraction();
            self.config.cancel_accepted.store(accepted, Ordering::SeqCst);
        }
        self.config.resolution
    }

    async fn read_next(&mut self) -> Result<Option<RgbImage>, DecodeError> {
        let index = self.next;
        if self.config.stall_at == Some(index) {
            std::future::pending::<()>().await;
        }
        if self.config.fail_at == Some(index) {
            return Err(DecodeError::ParseError(format!("corrupt frame {index}")));
        }
        if index > self.config.available {
            return Ok(None);
        }
        self.next += 1;
        let shade = (index % 256) as u8;
        let Resolution { width, height } = self.config.resolution;
        Ok(Some(RgbImage::from_pixel(width, height, Rgb([shade, shade, shade]))))
    }

    async fn close(&mut self) {
        self.config.closed.store(true, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// Trackers
// ---------------------------------------------------------------------------

/// Trackers that move their box one pixel right per update.
#[derive(Clone, Default)]
pub struct ShiftTrackers {
    /// Report a lost target on this update (1 = first frame after start),
    /// shared across every tracker built by this provider.
    pub lose_at_update: Option<u32>,
    pub fail_init: bool,
    pub updates: Arc<AtomicU32>,
}

impl ShiftTrackers {
    pub fn losing_at(update: u32) -> Self {
        Self {
            lose_at_update: Some(update),
            ..Self::default()
        }
    }
}

impl TrackerProvider for ShiftTrackers {
    fn init(
        &self,
        _algorithm: TrackingAlgorithm,
        _frame: &RgbImage,
        initial: BoundingBox,
    ) -> Result<Box<dyn Tracker>, TrackerError> {
        if self.fail_init {
            return Err(TrackerError::InitFailed("synthetic init failure".into()));
        }
        Ok(Box::new(ShiftTracker {
            current: initial,
            steps: 0,
            lose_at_update: self.lose_at_update,
            updates: Arc::clone(&self.updates),
        }))
    }
}

struct ShiftTracker {
    current: BoundingBox,
    steps: u32,
    lose_at_update: Option<u32>,
    updates: Arc<AtomicU32>,
}

impl Tracker for ShiftTracker {
    fn update(&mut self, _frame: &RgbImage) -> Option<BoundingBox> {
        self.steps += 1;
        self.updates.fetch_add(1, Ordering::SeqCst);
        if self.lose_at_update == Some(self.steps) {
            return None;
        }
        self.current = BoundingBox::new(
            self.current.left + 1.0,
            self.current.top,
            self.current.right + 1.0,
            self.current.bottom,
        );
        Some(self.current)
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub fn test_config(root: &Path) -> EngineConfig {
    EngineConfig {
        data_dir: root.join("data"),
        frame_cache_dir: root.join("cache"),
        frame_cache_ttl: Duration::from_secs(60),
    }
}

pub fn build_service(
    root: &Path,
    decoder: SyntheticDecoder,
    trackers: ShiftTrackers,
) -> LabelingService {
    LabelingService::new(
        &test_config(root),
        Arc::new(VideoRegistry::new()),
        Arc::new(decoder),
        Arc::new(trackers),
    )
}

/// Create a throwaway upload file and return its path.
pub fn write_upload(root: &Path) -> PathBuf {
    let path = root.join(format!("upload-{}.bin", new_identifier()));
    std::fs::write(&path, b"synthetic video").unwrap();
    path
}

/// Upload a video and wait for extraction to complete.
pub async fn completed_video(service: &LabelingService, root: &Path) -> VideoId {
    let (_, id) = service
        .upload_video("clip.mp4", write_upload(root))
        .await
        .unwrap();
    let state = service.wait_for_extraction(&id).await.unwrap();
    assert_eq!(state, ProcessState::Completed);
    id
}

pub fn bbox() -> BoundingBox {
    BoundingBox::new(4.0, 4.0, 12.0, 12.0)
}
