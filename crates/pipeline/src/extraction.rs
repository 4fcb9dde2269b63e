//! Frame extraction: decode an uploaded file into numbered PNG frames.
//!
//! One background task per video. Cancellation is observed while waiting
//! on the decoder and between frames, never in the middle of a frame
//! write. Whatever the outcome, the decoder handle is closed and the
//! uploaded temporary file removed exactly once.

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::{ImageFormat, RgbImage};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use framemark_core::decoder::{DecodeError, DecodedVideo, VideoDecoder};
use framemark_core::error::CoreError;
use framemark_core::naming::frame_path;
use framemark_core::status::ProcessState;

use crate::video::Video;

/// Claim the video's extraction slot and spawn the extraction task.
///
/// The task resolves to the terminal state the video ended in.
pub fn spawn_extraction(
    video: Arc<Video>,
    decoder: Arc<dyn VideoDecoder>,
    upload_path: PathBuf,
) -> Result<JoinHandle<ProcessState>, CoreError> {
    let cancel = video.claim_extraction()?;
    Ok(tokio::spawn(run_extraction(video, decoder, upload_path, cancel)))
}

async fn run_extraction(
    video: Arc<Video>,
    decoder: Arc<dyn VideoDecoder>,
    upload_path: PathBuf,
    cancel: CancellationToken,
) -> ProcessState {
    let mut handle: Option<Box<dyn DecodedVideo>> = None;
    let result = extract_frames(&video, decoder.as_ref(), &upload_path, &cancel, &mut handle).await;

    if let Some(mut stream) = handle.take() {
        stream.close().await;
    }

    match result {
        Ok(extracted) => {
            tracing::info!(video_id = %video.id(), extracted, "Video frame extraction finished");
        }
        Err(e) => {
            if matches!(e, CoreError::TaskWasCancelled) {
                tracing::info!(video_id = %video.id(), "Video frame extraction cancelled");
            } else {
                tracing::error!(video_id = %video.id(), error = %e, "Video frame extraction failed");
            }
            if let Err(e) = video.mark_cancelled().await {
                tracing::warn!(video_id = %video.id(), error = %e, "Could not mark video cancelled");
            }
            remove_output_dir(video.dir()).await;
        }
    }

    if let Err(e) = tokio::fs::remove_file(&upload_path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(
                path = %upload_path.display(),
                error = %e,
                "Failed to remove uploaded file",
            );
        }
    }

    video.state()
}

/// Decode and write frames. Returns the number of frames written.
async fn extract_frames(
    video: &Video,
    decoder: &dyn VideoDecoder,
    upload_path: &Path,
    cancel: &CancellationToken,
    handle: &mut Option<Box<dyn DecodedVideo>>,
) -> Result<u32, CoreError> {
    let opened = tokio::select! {
        _ = cancel.cancelled() => return Err(CoreError::TaskWasCancelled),
        opened = decoder.open(upload_path) => opened.map_err(decode_error)?,
    };
    let stream = handle.insert(opened);

    let total = stream.frame_count();
    video.begin_processing(total).await?;
    tokio::fs::create_dir_all(video.dir()).await?;
    tracing::info!(video_id = %video.id(), total, "Video frame extraction started");

    let mut extracted = 0;
    for index in 1..=total {
        if cancel.is_cancelled() {
            return Err(CoreError::TaskWasCancelled);
        }

        let next = tokio::select! {
            _ = cancel.cancelled() => return Err(CoreError::TaskWasCancelled),
            next = stream.read_next() => next.map_err(decode_error)?,
        };
        let Some(frame) = next else {
            tracing::debug!(
                video_id = %video.id(),
                declared = total,
                extracted,
                "Decoder reached end of stream early",
            );
            break;
        };

        tokio::fs::write(frame_path(video.dir(), index), encode_png(&frame)?).await?;
        extracted = video.record_extracted_frame().await;
    }

    video.complete(stream.resolution()).await?;
    Ok(extracted)
}

fn encode_png(frame: &RgbImage) -> Result<Vec<u8>, CoreError> {
    let mut buf = Vec::new();
    frame
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .map_err(|e| CoreError::Internal(format!("Failed to encode frame: {e}")))?;
    Ok(buf)
}

fn decode_error(e: DecodeError) -> CoreError {
    CoreError::Internal(format!("Video decoding failed: {e}"))
}

/// Best-effort removal of partial output; the directory may not exist yet.
async fn remove_output_dir(dir: &Path) {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => tracing::debug!(dir = %dir.display(), "Removed partial frame output"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(dir = %dir.display(), error = %e, "Failed to remove partial frame output"),
    }
}
