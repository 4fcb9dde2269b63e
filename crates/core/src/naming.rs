//! On-disk layout of videos, frames and label sidecars.
//!
//! ```text
//! {data_dir}/videos.json
//! {data_dir}/videos/{video_id}/frame_{n}.png
//! {data_dir}/videos/{video_id}/labels.csv
//! ```

use std::path::{Path, PathBuf};

use crate::types::FrameIndex;

pub const REGISTRY_FILE: &str = "videos.json";
pub const VIDEOS_DIR: &str = "videos";
pub const LABELS_FILE: &str = "labels.csv";

/// File name of the 1-based frame `index`.
pub fn frame_file_name(index: FrameIndex) -> String {
    format!("frame_{index}.png")
}

#[derive(Debug, Clone)]
pub struct StorageLayout {
    data_dir: PathBuf,
}

impl StorageLayout {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn registry_path(&self) -> PathBuf {
        self.data_dir.join(REGISTRY_FILE)
    }

    pub fn video_dir(&self, video_id: &str) -> PathBuf {
        self.data_dir.join(VIDEOS_DIR).join(video_id)
    }
}

/// Path of frame `index` inside a video directory.
pub fn frame_path(video_dir: &Path, index: FrameIndex) -> PathBuf {
    video_dir.join(frame_file_name(index))
}

/// Path of the label sidecar inside a video directory.
pub fn labels_path(video_dir: &Path) -> PathBuf {
    video_dir.join(LABELS_FILE)
}
