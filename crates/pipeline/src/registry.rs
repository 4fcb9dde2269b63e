use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use framemark_core::types::VideoId;

use crate::video::Video;

/// Concurrent map of all known videos.
///
/// Every operation takes the lock once, so callers never observe a
/// half-inserted video. Designed to be wrapped in `Arc` and injected.
pub struct VideoRegistry {
    videos: RwLock<HashMap<VideoId, Arc<Video>>>,
}

impl VideoRegistry {
    pub fn new() -> Self {
        Self {
            videos: RwLock::new(HashMap::new()),
        }
    }

    /// Insert a fully constructed video, replacing any entry with the same id.
    pub async fn insert(&self, video: Arc<Video>) {
        self.videos
            .write()
            .await
            .insert(video.id().to_string(), video);
    }

    pub async fn get(&self, id: &str) -> Option<Arc<Video>> {
        self.videos.read().await.get(id).cloned()
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.videos.read().await.contains_key(id)
    }

    /// Point-in-time copy of every registered video.
    pub async fn list(&self) -> Vec<Arc<Video>> {
        self.videos.read().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.videos.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.videos.read().await.is_empty()
    }
}

impl Default for VideoRegistry {
    fn default() -> Self {
        Self::new()
    }
}
