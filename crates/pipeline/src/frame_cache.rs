//! Short-lived, single-use frame access tokens.
//!
//! A token maps to a frame image file until it is taken once or until the
//! TTL elapses. Expiry removes the entry and deletes the backing file, so
//! abandoned consumers do not leak cache files.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use framemark_core::error::CoreError;
use framemark_core::types::new_identifier;

/// Default lifetime of a frame token.
pub const DEFAULT_FRAME_TTL: Duration = Duration::from_secs(10);

pub struct FrameCache {
    dir: PathBuf,
    ttl: Duration,
    entries: Arc<Mutex<HashMap<String, PathBuf>>>,
}

impl FrameCache {
    pub fn new(dir: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self {
            dir: dir.into(),
            ttl,
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Register `path` under a fresh token and schedule its eviction.
    pub async fn put(&self, path: PathBuf) -> String {
        let token = new_identifier();
        self.register(token.clone(), path).await;
        token
    }

    /// Copy `source` into the cache directory as `{token}.png` and register it.
    pub async fn stage(&self, source: &Path) -> Result<String, CoreError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let token = new_identifier();
        let dest = self.dir.join(format!("{token}.png"));
        tokio::fs::copy(source, &dest).await.map_err(|e| {
            CoreError::FrameNotFound(format!("cannot stage {}: {e}", source.display()))
        })?;
        self.register(token.clone(), dest).await;
        Ok(token)
    }

    /// Consume a token. Each token can be taken once.
    pub async fn take(&self, token: &str) -> Result<PathBuf, CoreError> {
        self.entries
            .lock()
            .await
            .remove(token)
            .ok_or_else(|| CoreError::FrameNotFound(format!("frame token {token}")))
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    async fn register(&self, token: String, path: PathBuf) {
        self.entries
            .lock()
            .await
            .insert(token.clone(), path.clone());

        let entries = Arc::clone(&self.entries);
        let ttl = self.ttl;
        tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            entries.lock().await.remove(&token);
            match tokio::fs::remove_file(&path).await {
                Ok(()) => tracing::debug!(token = %token, "Evicted cached frame"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => tracing::warn!(
                    token = %token,
                    path = %path.display(),
                    error = %e,
                    "Failed to delete cached frame",
                ),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[tokio::test]
    async fn take_is_single_use() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FrameCache::new(dir.path(), Duration::from_secs(60));
        let token = cache.put(dir.path().join("a.png")).await;

        assert_eq!(cache.take(&token).await.unwrap(), dir.path().join("a.png"));
        assert_matches!(cache.take(&token).await, Err(CoreError::FrameNotFound(_)));
    }

    #[tokio::test]
    async fn unknown_token_is_frame_not_found() {
        let cache = FrameCache::new("/tmp", DEFAULT_FRAME_TTL);
        assert_matches!(cache.take("nope").await, Err(CoreError::FrameNotFound(_)));
    }

    #[tokio::test]
    async fn expiry_removes_entry_and_file() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("frame_1.png");
        tokio::fs::write(&source, b"png").await.unwrap();

        let cache = FrameCache::new(dir.path().join("cache"), Duration::from_millis(50));
        let token = cache.stage(&source).await.unwrap();
        let staged = dir.path().join("cache").join(format!("{token}.png"));
        assert!(staged.exists());
        assert_eq!(cache.len().await, 1);

        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(cache.is_empty().await);
        assert!(!staged.exists());
        assert!(source.exists());
        assert_matches!(cache.take(&token).await, Err(CoreError::FrameNotFound(_)));
    }

    #[tokio::test]
    async fn stage_missing_source_fails() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FrameCache::new(dir.path(), DEFAULT_FRAME_TTL);
        let result = cache.stage(&dir.path().join("missing.png")).await;
        assert_matches!(result, Err(CoreError::FrameNotFound(_)));
        assert!(cache.is_empty().await);
    }
}
