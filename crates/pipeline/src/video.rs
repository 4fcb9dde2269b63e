//! The video entity: process state machine, frame bookkeeping and labels.
//!
//! All mutable state sits behind one [`RwLock`] per video, so label edits
//! and label appends from a tracking session are serialized. Task handles
//! (extraction, tracking) are kept in small synchronous slots so that the
//! RAII guard of a finishing task can release them from `Drop`.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tokio::sync::{watch, RwLock};
use tokio_util::sync::CancellationToken;

use framemark_core::error::CoreError;
use framemark_core::labels::{LabelRecord, LabelStore};
use framemark_core::naming::{labels_path, StorageLayout};
use framemark_core::snapshot::VideoSnapshot;
use framemark_core::status::{validate_transition, ProcessState};
use framemark_core::types::{new_identifier, BoundingBox, FrameIndex, Resolution, VideoId};

/// State-dependent summary of a video.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "video_type")]
pub enum VideoInfo {
    /// Extraction has not completed (including cancelled videos).
    #[serde(rename = "processing")]
    Extraction {
        name: String,
        state: ProcessState,
        total_frame_count: u32,
        extracted_frame_count: u32,
    },
    #[serde(rename = "processed")]
    Ready {
        name: String,
        resolution: Resolution,
        total_frame_count: u32,
        labeled_frame_count: usize,
        excluded_frame_count: usize,
    },
}

#[derive(Debug)]
pub(crate) struct VideoInner {
    pub(crate) state: ProcessState,
    pub(crate) resolution: Option<Resolution>,
    pub(crate) total_frame_count: u32,
    pub(crate) extracted_frame_count: u32,
    pub(crate) excluded_frames: BTreeSet<FrameIndex>,
    pub(crate) labels: LabelStore,
}

pub struct Video {
    id: VideoId,
    name: String,
    dir: PathBuf,
    pub(crate) inner: RwLock<VideoInner>,
    state_tx: watch::Sender<ProcessState>,
    extraction: Mutex<Option<CancellationToken>>,
    tracking: Mutex<Option<CancellationToken>>,
}

impl Video {
    /// A freshly uploaded video in `PREPARING`.
    pub fn new(name: impl Into<String>, layout: &StorageLayout) -> Self {
        let id = new_identifier();
        let dir = layout.video_dir(&id);
        Self::build(id, name.into(), dir, VideoInner {
            state: ProcessState::Preparing,
            resolution: None,
            total_frame_count: 0,
            extracted_frame_count: 0,
            excluded_frames: BTreeSet::new(),
            labels: LabelStore::new(),
        })
    }

    /// Rebuild a completed video from its snapshot, reloading the label
    /// sidecar. A missing sidecar yields an empty label store.
    pub async fn from_persistable(
        snapshot: VideoSnapshot,
        layout: &StorageLayout,
    ) -> Result<Self, CoreError> {
        snapshot.validate()?;
        let dir = layout.video_dir(&snapshot.identifier);

        let labels = match tokio::fs::read(labels_path(&dir)).await {
            Ok(bytes) => LabelStore::from_csv(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => LabelStore::new(),
            Err(e) => return Err(e.into()),
        };

        let inner = VideoInner {
            state: ProcessState::Completed,
            resolution: Some(snapshot.resolution()),
            total_frame_count: snapshot.total_frame_count,
            extracted_frame_count: snapshot.total_frame_count,
            excluded_frames: snapshot.excluded_set(),
            labels,
        };
        Ok(Self::build(snapshot.identifier, snapshot.name, dir, inner))
    }

    fn build(id: VideoId, name: String, dir: PathBuf, inner: VideoInner) -> Self {
        let (state_tx, _) = watch::channel(inner.state);
        Self {
            id,
            name,
            dir,
            inner: RwLock::new(inner),
            state_tx,
            extraction: Mutex::new(None),
            tracking: Mutex::new(None),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Directory holding this video's frames and label sidecar.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn state(&self) -> ProcessState {
        *self.state_tx.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ProcessState> {
        self.state_tx.subscribe()
    }

    /// Resolve once extraction reaches `COMPLETED` or `CANCELLED`.
    pub async fn wait_for_extraction(&self) -> ProcessState {
        let mut rx = self.subscribe_state();
        let state = match rx.wait_for(|s| s.is_terminal()).await {
            Ok(state) => *state,
            Err(_) => self.state(),
        };
        state
    }

    pub async fn info(&self) -> VideoInfo {
        let inner = self.inner.read().await;
        match (inner.state, inner.resolution) {
            (ProcessState::Completed, Some(resolution)) => VideoInfo::Ready {
                name: self.name.clone(),
                resolution,
                total_frame_count: inner.total_frame_count,
                labeled_frame_count: inner.labels.labeled_frame_count(),
                excluded_frame_count: inner.excluded_frames.len(),
            },
            (state, _) => VideoInfo::Extraction {
                name: self.name.clone(),
                state,
                total_frame_count: inner.total_frame_count,
                extracted_frame_count: inner.extracted_frame_count,
            },
        }
    }

    // ---- labeling ----

    pub async fn label_frame(
        &self,
        frame_index: FrameIndex,
        label: &str,
        absolute: BoundingBox,
    ) -> Result<String, CoreError> {
        let mut inner = self.inner.write().await;
        let resolution = self.require_frame(&inner, frame_index)?;
        if !absolute.is_well_formed() {
            return Err(CoreError::InvalidArgument(format!(
                "Malformed bounding box {absolute:?}"
            )));
        }
        let record = LabelRecord::new(frame_index, label, absolute, resolution);
        let label_id = inner.labels.add(record);
        tracing::debug!(video_id = %self.id, frame_index, label_id = %label_id, "Frame labeled");
        Ok(label_id)
    }

    /// Remove a label. Unknown identifiers are ignored.
    pub async fn unlabel_frame(&self, label_id: &str) -> Result<(), CoreError> {
        let mut inner = self.inner.write().await;
        self.require_completed(&inner)?;
        if inner.labels.remove(label_id) {
            tracing::debug!(video_id = %self.id, label_id, "Label removed");
        }
        Ok(())
    }

    pub async fn exclude_frame(&self, frame_index: FrameIndex) -> Result<(), CoreError> {
        let mut inner = self.inner.write().await;
        self.require_frame(&inner, frame_index)?;
        inner.excluded_frames.insert(frame_index);
        Ok(())
    }

    pub async fn frame_labels(&self, frame_index: FrameIndex) -> Result<Vec<LabelRecord>, CoreError> {
        let inner = self.inner.read().await;
        self.require_frame(&inner, frame_index)?;
        Ok(inner.labels.for_frame(frame_index).cloned().collect())
    }

    pub async fn excluded_frames(&self) -> Vec<FrameIndex> {
        self.inner.read().await.excluded_frames.iter().copied().collect()
    }

    pub(crate) async fn append_labels(&self, records: Vec<LabelRecord>) {
        let mut inner = self.inner.write().await;
        for record in records {
            inner.labels.add(record);
        }
    }

    fn require_completed(&self, inner: &VideoInner) -> Result<Resolution, CoreError> {
        match (inner.state, inner.resolution) {
            (ProcessState::Completed, Some(resolution)) => Ok(resolution),
            _ => Err(CoreError::VideoProcessing(self.id.clone())),
        }
    }

    /// `COMPLETED` and `1 <= frame_index <= total_frame_count`.
    pub(crate) fn require_frame(
        &self,
        inner: &VideoInner,
        frame_index: FrameIndex,
    ) -> Result<Resolution, CoreError> {
        let resolution = self.require_completed(inner)?;
        if frame_index == 0 || frame_index > inner.total_frame_count {
            return Err(CoreError::FrameNotFound(format!(
                "frame {frame_index} of video {} ({} frames)",
                self.id, inner.total_frame_count
            )));
        }
        Ok(resolution)
    }

    // ---- persistence ----

    /// Snapshot a completed video and write its label sidecar.
    pub async fn to_persistable(&self) -> Result<VideoSnapshot, CoreError> {
        let inner = self.inner.read().await;
        let resolution = self.require_completed(&inner)?;

        tokio::fs::create_dir_all(&self.dir).await?;
        tokio::fs::write(labels_path(&self.dir), inner.labels.to_csv()?).await?;

        Ok(VideoSnapshot {
            name: self.name.clone(),
            identifier: self.id.clone(),
            resolution: resolution.into(),
            total_frame_count: inner.total_frame_count,
            excluded_frames: inner.excluded_frames.iter().copied().collect(),
        })
    }

    // ---- extraction bookkeeping ----

    fn transition(&self, inner: &mut VideoInner, next: ProcessState) -> Result<(), CoreError> {
        validate_transition(inner.state, next)?;
        inner.state = next;
        self.state_tx.send_replace(next);
        tracing::debug!(video_id = %self.id, state = ?next, "Video state changed");
        Ok(())
    }

    pub(crate) async fn begin_processing(&self, total_frame_count: u32) -> Result<(), CoreError> {
        let mut inner = self.inner.write().await;
        self.transition(&mut inner, ProcessState::Processing)?;
        inner.total_frame_count = total_frame_count;
        inner.extracted_frame_count = 0;
        Ok(())
    }

    pub(crate) async fn record_extracted_frame(&self) -> u32 {
        let mut inner = self.inner.write().await;
        inner.extracted_frame_count += 1;
        inner.extracted_frame_count
    }

    /// Transition to `COMPLETED`, unless a cancel was accepted first.
    pub(crate) async fn complete(&self, resolution: Resolution) -> Result<(), CoreError> {
        let mut inner = self.inner.write().await;
        // Held until the state changes so `cancel_extraction` sees either a
        // cancellable video or a completed one.
        let slot = lock(&self.extraction);
        if slot.as_ref().is_some_and(CancellationToken::is_cancelled) {
            return Err(CoreError::TaskWasCancelled);
        }
        inner.resolution = Some(resolution);
        inner.labels = LabelStore::new();
        inner.excluded_frames.clear();
        self.transition(&mut inner, ProcessState::Completed)
    }

    pub(crate) async fn mark_cancelled(&self) -> Result<(), CoreError> {
        let mut inner = self.inner.write().await;
        self.transition(&mut inner, ProcessState::Cancelled)
    }

    // ---- task slots ----

    /// Claim the extraction slot. Extraction runs at most once per video.
    pub(crate) fn claim_extraction(&self) -> Result<CancellationToken, CoreError> {
        let mut slot = lock(&self.extraction);
        if slot.is_some() || self.state() != ProcessState::Preparing {
            return Err(CoreError::InvalidArgument(format!(
                "Frame extraction was already started for video {}",
                self.id
            )));
        }
        let token = CancellationToken::new();
        *slot = Some(token.clone());
        Ok(token)
    }

    /// Request cancellation of a running extraction. Returns `false` when
    /// there is nothing left to cancel.
    pub fn cancel_extraction(&self) -> bool {
        let slot = lock(&self.extraction);
        if self.state().is_terminal() {
            return false;
        }
        match slot.as_ref() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Claim the tracking slot; the returned guard frees it on drop.
    pub(crate) fn claim_tracking(self: &Arc<Self>) -> Result<TrackingSlot, CoreError> {
        let mut slot = lock(&self.tracking);
        if slot.is_some() {
            return Err(CoreError::TrackingInProgress(self.id.clone()));
        }
        let token = CancellationToken::new();
        *slot = Some(token.clone());
        Ok(TrackingSlot {
            video: Arc::clone(self),
            token,
        })
    }

    pub fn is_tracking(&self) -> bool {
        lock(&self.tracking).is_some()
    }

    pub fn cancel_tracking(&self) -> bool {
        match lock(&self.tracking).as_ref() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Ownership of a video's single tracking slot.
pub(crate) struct TrackingSlot {
    video: Arc<Video>,
    token: CancellationToken,
}

impl TrackingSlot {
    pub(crate) fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}

impl Drop for TrackingSlot {
    fn drop(&mut self) {
        *lock(&self.video.tracking) = None;
    }
}
