//! Flow-controlled tracking sessions.
//!
//! A session propagates the labels of a start frame forward, one frame at a
//! time. After each frame it hands a [`TrackedFrame`] to the consumer over a
//! single-slot channel and then suspends until the consumer acknowledges
//! it, so the producer is never more than one frame ahead.

use std::path::Path;
use std::sync::Arc;

use image::{ImageFormat, RgbImage};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use framemark_core::error::CoreError;
use framemark_core::labels::LabelRecord;
use framemark_core::naming::frame_path;
use framemark_core::status::ProcessState;
use framemark_core::tracking::{Tracker, TrackerProvider, TrackingAlgorithm};
use framemark_core::types::{FrameIndex, VideoId};

use crate::video::{TrackingSlot, Video};

/// Labels produced for one frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackedFrame {
    pub frame_index: FrameIndex,
    pub labels: Vec<LabelRecord>,
}

/// Result of a session that ran to the last frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackingSummary {
    pub start_frame: FrameIndex,
    pub last_frame: FrameIndex,
    pub frames_processed: u32,
    pub labels_created: usize,
}

/// Consumer side of a running session.
///
/// Call [`next_frame`](Self::next_frame) to receive a frame and
/// [`acknowledge`](Self::acknowledge) once it has been handled. Dropping the
/// handle cancels the session.
pub struct TrackingSession {
    video_id: VideoId,
    algorithm: TrackingAlgorithm,
    start_frame: FrameIndex,
    frames: mpsc::Receiver<TrackedFrame>,
    acks: mpsc::Sender<()>,
    awaiting_ack: bool,
    cancel: CancellationToken,
    task: JoinHandle<Result<TrackingSummary, CoreError>>,
}

impl TrackingSession {
    pub fn video_id(&self) -> &str {
        &self.video_id
    }

    pub fn algorithm(&self) -> TrackingAlgorithm {
        self.algorithm
    }

    pub fn start_frame(&self) -> FrameIndex {
        self.start_frame
    }

    /// Wait for the next tracked frame. `Ok(None)` means the session ended;
    /// call [`finish`](Self::finish) for its outcome.
    pub async fn next_frame(&mut self) -> Result<Option<TrackedFrame>, CoreError> {
        if self.awaiting_ack {
            return Err(CoreError::InvalidArgument(
                "previous tracked frame has not been acknowledged".into(),
            ));
        }
        let frame = self.frames.recv().await;
        self.awaiting_ack = frame.is_some();
        Ok(frame)
    }

    /// Signal that the last received frame was handled and the session may
    /// advance.
    pub async fn acknowledge(&mut self) -> Result<(), CoreError> {
        if !self.awaiting_ack {
            return Err(CoreError::InvalidArgument(
                "no tracked frame is awaiting acknowledgement".into(),
            ));
        }
        self.awaiting_ack = false;
        // A closed channel only means the producer already stopped.
        let _ = self.acks.send(()).await;
        Ok(())
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Close the consumer side and wait for the session outcome.
    ///
    /// Finishing before the last frame was delivered cancels the session.
    /// The last frame itself needs no acknowledgement.
    pub async fn finish(self) -> Result<TrackingSummary, CoreError> {
        let Self {
            frames, acks, task, ..
        } = self;
        drop(frames);
        drop(acks);
        task.await
            .map_err(|e| CoreError::Internal(format!("Tracking task failed: {e}")))?
    }
}

/// Validate the start request in the documented order.
async fn validate_start(
    video: &Video,
    start: FrameIndex,
    algorithm: &str,
) -> Result<TrackingAlgorithm, CoreError> {
    let inner = video.inner.read().await;
    // The frame count is not known before extraction begins.
    if inner.state == ProcessState::Preparing {
        return Err(CoreError::VideoProcessing(video.id().to_string()));
    }
    if start == 0 || start > inner.total_frame_count {
        return Err(CoreError::FrameNotFound(format!(
            "frame {start} of video {} ({} frames)",
            video.id(),
            inner.total_frame_count
        )));
    }
    if start == inner.total_frame_count {
        return Err(CoreError::NoMoreFrames(start));
    }
    if inner.state != ProcessState::Completed {
        return Err(CoreError::VideoProcessing(video.id().to_string()));
    }
    let algorithm: TrackingAlgorithm = algorithm.parse()?;
    if !inner.labels.has_frame(start) {
        return Err(CoreError::FrameNotLabeled(start));
    }
    Ok(algorithm)
}

/// Check preconditions, claim the video's tracking slot and spawn the
/// session task.
pub async fn start_session(
    video: Arc<Video>,
    start: FrameIndex,
    algorithm: &str,
    provider: Arc<dyn TrackerProvider>,
) -> Result<TrackingSession, CoreError> {
    let algorithm = validate_start(&video, start, algorithm).await?;
    let slot = video.claim_tracking()?;
    let cancel = slot.token();

    let (frames_tx, frames_rx) = mpsc::channel(1);
    let (acks_tx, acks_rx) = mpsc::channel(1);

    tracing::info!(
        video_id = %video.id(),
        start_frame = start,
        algorithm = %algorithm,
        "Object tracking started",
    );

    let producer = Producer {
        video: Arc::clone(&video),
        provider,
        algorithm,
        start,
        frames: frames_tx,
        acks: acks_rx,
        cancel: cancel.clone(),
    };
    let task = tokio::spawn(producer.run(slot));

    Ok(TrackingSession {
        video_id: video.id().to_string(),
        algorithm,
        start_frame: start,
        frames: frames_rx,
        acks: acks_tx,
        awaiting_ack: false,
        cancel,
        task,
    })
}

struct Producer {
    video: Arc<Video>,
    provider: Arc<dyn TrackerProvider>,
    algorithm: TrackingAlgorithm,
    start: FrameIndex,
    frames: mpsc::Sender<TrackedFrame>,
    acks: mpsc::Receiver<()>,
    cancel: CancellationToken,
}

impl Producer {
    async fn run(mut self, slot: TrackingSlot) -> Result<TrackingSummary, CoreError> {
        let result = self.track().await;
        drop(slot);

        let video_id = self.video.id();
        match &result {
            Ok(summary) => tracing::info!(
                video_id,
                frames_processed = summary.frames_processed,
                labels_created = summary.labels_created,
                "Object tracking finished",
            ),
            Err(CoreError::TaskWasCancelled) => {
                tracing::info!(video_id, "Object tracking cancelled")
            }
            Err(e) => tracing::warn!(video_id, error = %e, "Object tracking failed"),
        }
        result
    }

    async fn track(&mut self) -> Result<TrackingSummary, CoreError> {
        let (resolution, total, seeds) = {
            let inner = self.video.inner.read().await;
            let resolution = self.video.require_frame(&inner, self.start)?;
            let seeds: Vec<LabelRecord> = inner.labels.for_frame(self.start).cloned().collect();
            (resolution, inner.total_frame_count, seeds)
        };
        if seeds.is_empty() {
            return Err(CoreError::FrameNotLabeled(self.start));
        }

        let first = load_frame(&frame_path(self.video.dir(), self.start)).await?;
        let mut trackers: Vec<(String, Box<dyn Tracker>)> = Vec::with_capacity(seeds.len());
        for seed in seeds {
            let tracker = self
                .provider
                .init(self.algorithm, &first, seed.absolute_box())
                .map_err(|e| CoreError::TrackingFailed(e.to_string()))?;
            trackers.push((seed.label, tracker));
        }

        let mut summary = TrackingSummary {
            start_frame: self.start,
            last_frame: self.start,
            frames_processed: 0,
            labels_created: 0,
        };

        for index in (self.start + 1)..=total {
            if self.cancel.is_cancelled() {
                return Err(CoreError::TaskWasCancelled);
            }

            let frame = load_frame(&frame_path(self.video.dir(), index)).await?;
            let mut labels = Vec::with_capacity(trackers.len());
            for (text, tracker) in trackers.iter_mut() {
                let bbox = tracker.update(&frame).ok_or_else(|| {
                    CoreError::TrackingFailed(format!("lost '{text}' at frame {index}"))
                })?;
                labels.push(LabelRecord::new(index, text.clone(), bbox, resolution));
            }

            self.video.append_labels(labels.clone()).await;
            summary.frames_processed += 1;
            summary.labels_created += labels.len();
            summary.last_frame = index;

            self.handshake(
                TrackedFrame {
                    frame_index: index,
                    labels,
                },
                index == total,
            )
            .await?;
        }

        Ok(summary)
    }

    /// Deliver one frame, then wait for the consumer to ask for the next.
    /// A consumer that goes away after the last frame ends the session
    /// normally.
    async fn handshake(&mut self, frame: TrackedFrame, last: bool) -> Result<(), CoreError> {
        tokio::select! {
            _ = self.cancel.cancelled() => return Err(CoreError::TaskWasCancelled),
            sent = self.frames.send(frame) => {
                if sent.is_err() {
                    return Err(CoreError::TaskWasCancelled);
                }
            }
        }
        tokio::select! {
            _ = self.cancel.cancelled() => Err(CoreError::TaskWasCancelled),
            ack = self.acks.recv() => match ack {
                Some(()) => Ok(()),
                None if last => Ok(()),
                None => Err(CoreError::TaskWasCancelled),
            },
        }
    }
}

async fn load_frame(path: &Path) -> Result<RgbImage, CoreError> {
    let bytes = tokio::fs::read(path).await.map_err(|e| {
        CoreError::TrackingFailed(format!("cannot read {}: {e}", path.display()))
    })?;
    image::load_from_memory_with_format(&bytes, ImageFormat::Png)
        .map(|img| img.to_rgb8())
        .map_err(|e| CoreError::TrackingFailed(format!("cannot decode {}: {e}", path.display())))
}
