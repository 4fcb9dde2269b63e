//! Video decoder seam consumed by frame extraction.

use std::path::Path;

use async_trait::async_trait;
use image::RgbImage;

use crate::types::Resolution;

/// Error type for decoder operations.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("video file not found: {0}")]
    VideoNotFound(String),

    #[error("decoder binary not found: {0}")]
    BinaryNotFound(std::io::Error),

    #[error("decoder execution failed (exit code {exit_code:?}): {stderr}")]
    ExecutionFailed {
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("failed to parse decoder output: {0}")]
    ParseError(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Opens video files for sequential decoding.
#[async_trait]
pub trait VideoDecoder: Send + Sync {
    async fn open(&self, path: &Path) -> Result<Box<dyn DecodedVideo>, DecodeError>;
}

/// An open decoder handle positioned before the first frame.
#[async_trait]
pub trait DecodedVideo: Send {
    /// Frame count declared by the container. The stream may end earlier.
    fn frame_count(&self) -> u32;

    fn resolution(&self) -> Resolution;

    /// Decode the next frame, or `None` at end of stream.
    async fn read_next(&mut self) -> Result<Option<RgbImage>, DecodeError>;

    /// Release the handle. Called exactly once by the owner.
    async fn close(&mut self);
}
