//! Persisted form of a completed video in the registry snapshot file.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{FrameIndex, Resolution, VideoId};

/// One entry of `videos.json`. Labels are stored separately in the video's
/// CSV sidecar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoSnapshot {
    pub name: String,
    pub identifier: VideoId,
    /// `[width, height]`
    pub resolution: (u32, u32),
    pub total_frame_count: u32,
    pub excluded_frames: Vec<FrameIndex>,
}

impl VideoSnapshot {
    /// Parse and validate one snapshot entry.
    pub fn from_value(value: serde_json::Value) -> Result<Self, CoreError> {
        let snapshot: Self = serde_json::from_value(value)
            .map_err(|e| CoreError::InvalidArgument(format!("Malformed video snapshot: {e}")))?;
        snapshot.validate()?;
        Ok(snapshot)
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.identifier.trim().is_empty() {
            return Err(CoreError::InvalidArgument(
                "Video snapshot has an empty identifier".into(),
            ));
        }
        // The identifier names the video's directory under the data root.
        if self.identifier.contains(['/', '\\'])
            || self.identifier.contains("..")
            || self.identifier == "."
        {
            return Err(CoreError::InvalidArgument(format!(
                "Video identifier '{}' is not a plain directory name",
                self.identifier
            )));
        }
        if let Some(bad) = self
            .excluded_frames
            .iter()
            .find(|&&f| f == 0 || f > self.total_frame_count)
        {
            return Err(CoreError::InvalidArgument(format!(
                "Excluded frame {bad} is outside 1..={} for video {}",
                self.total_frame_count, self.identifier
            )));
        }
        Ok(())
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution.into()
    }

    pub fn excluded_set(&self) -> BTreeSet<FrameIndex> {
        self.excluded_frames.iter().copied().collect()
    }
}
