use serde::Serialize;

/// Error kinds surfaced to the transport layer.
///
/// Each kind carries a stable numeric code and a canonical message; the
/// transport maps them onto its own status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    VideoNotFound,
    VideoProcessing,
    FrameNotFound,
    NoMoreFrames,
    UnacceptableAlgorithm,
    TrackingFailed,
    FrameNotLabeled,
    TaskWasCancelled,
    InvalidArgument,
    TrackingInProgress,
    Internal,
}

impl ErrorKind {
    /// Numeric wire code. `0` is reserved for success.
    pub fn code(self) -> u16 {
        match self {
            Self::VideoNotFound => 1,
            Self::VideoProcessing => 2,
            Self::FrameNotFound => 3,
            Self::NoMoreFrames => 4,
            Self::UnacceptableAlgorithm => 5,
            Self::TrackingFailed => 9,
            Self::FrameNotLabeled => 10,
            Self::TaskWasCancelled => 11,
            Self::InvalidArgument => 12,
            Self::TrackingInProgress => 13,
            Self::Internal => 500,
        }
    }

    /// Canonical human-readable message for this kind.
    pub fn message(self) -> &'static str {
        match self {
            Self::VideoNotFound => "Video not found",
            Self::VideoProcessing => "Frame extracting for this video is still ongoing",
            Self::FrameNotFound => "Frame not found",
            Self::NoMoreFrames => "No more frames for object tracking",
            Self::UnacceptableAlgorithm => "Unacceptable algorithm for object tracking",
            Self::TrackingFailed => "Object tracking failed",
            Self::FrameNotLabeled => "Frame hasn't labeled, can't start object tracking",
            Self::TaskWasCancelled => "Task was cancelled",
            Self::InvalidArgument => "Invalid argument",
            Self::TrackingInProgress => "Object tracking is already running for this video",
            Self::Internal => "An internal error occurred",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Video not found: {0}")]
    VideoNotFound(String),

    #[error("Video {0} has not finished frame extraction")]
    VideoProcessing(String),

    #[error("Frame not found: {0}")]
    FrameNotFound(String),

    #[error("No more frames after frame {0}")]
    NoMoreFrames(u32),

    #[error("Unacceptable tracking algorithm '{0}'")]
    UnacceptableAlgorithm(String),

    #[error("Object tracking failed: {0}")]
    TrackingFailed(String),

    #[error("Frame {0} has no labels to track")]
    FrameNotLabeled(u32),

    #[error("Task was cancelled")]
    TaskWasCancelled,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Object tracking is already running for video {0}")]
    TrackingInProgress(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::VideoNotFound(_) => ErrorKind::VideoNotFound,
            Self::VideoProcessing(_) => ErrorKind::VideoProcessing,
            Self::FrameNotFound(_) => ErrorKind::FrameNotFound,
            Self::NoMoreFrames(_) => ErrorKind::NoMoreFrames,
            Self::UnacceptableAlgorithm(_) => ErrorKind::UnacceptableAlgorithm,
            Self::TrackingFailed(_) => ErrorKind::TrackingFailed,
            Self::FrameNotLabeled(_) => ErrorKind::FrameNotLabeled,
            Self::TaskWasCancelled => ErrorKind::TaskWasCancelled,
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::TrackingInProgress(_) => ErrorKind::TrackingInProgress,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }
}

impl From<std::io::Error> for CoreError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(format!("I/O error: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_unique() {
        let kinds = [
            ErrorKind::VideoNotFound,
            ErrorKind::VideoProcessing,
            ErrorKind::FrameNotFound,
            ErrorKind::NoMoreFrames,
            ErrorKind::UnacceptableAlgorithm,
            ErrorKind::TrackingFailed,
            ErrorKind::FrameNotLabeled,
            ErrorKind::TaskWasCancelled,
            ErrorKind::InvalidArgument,
            ErrorKind::TrackingInProgress,
            ErrorKind::Internal,
        ];
        let mut codes: Vec<u16> = kinds.iter().map(|k| k.code()).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), kinds.len());
        assert!(!codes.contains(&0));
    }

    #[test]
    fn error_maps_to_kind() {
        assert_eq!(
            CoreError::NoMoreFrames(10).kind(),
            ErrorKind::NoMoreFrames
        );
        assert_eq!(CoreError::TaskWasCancelled.kind().code(), 11);
    }

    #[test]
    fn tracking_errors_carry_canonical_messages() {
        assert_eq!(
            CoreError::FrameNotLabeled(3).kind().message(),
            "Frame hasn't labeled, can't start object tracking"
        );
        assert_eq!(
            CoreError::NoMoreFrames(10).kind().message(),
            "No more frames for object tracking"
        );
        assert_eq!(CoreError::TaskWasCancelled.kind().message(), "Task was cancelled");
    }

    #[test]
    fn io_error_is_internal() {
        let err: CoreError = std::io::Error::other("disk full").into();
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert!(err.to_string().contains("disk full"));
    }

    #[test]
    fn kind_serializes_screaming_snake() {
        let json = serde_json::to_string(&ErrorKind::FrameNotLabeled).unwrap();
        assert_eq!(json, "\"FRAME_NOT_LABELED\"");
    }
}
