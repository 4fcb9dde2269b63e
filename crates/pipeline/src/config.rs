use std::path::PathBuf;
use std::time::Duration;

use framemark_core::error::CoreError;
use framemark_core::naming::StorageLayout;

use crate::frame_cache::DEFAULT_FRAME_TTL;

/// Engine configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Root of the persisted data (default: `data`).
    pub data_dir: PathBuf,
    /// Directory for staged frame images handed out by token
    /// (default: `static/img/tmp`).
    pub frame_cache_dir: PathBuf,
    /// Lifetime of a frame token (default: 10 seconds).
    pub frame_cache_ttl: Duration,
}

impl EngineConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default          |
    /// |------------------------|------------------|
    /// | `DATA_DIR`             | `data`           |
    /// | `FRAME_CACHE_DIR`      | `static/img/tmp` |
    /// | `FRAME_CACHE_TTL_SECS` | `10`             |
    pub fn from_env() -> Result<Self, CoreError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, CoreError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let data_dir = lookup("DATA_DIR").unwrap_or_else(|| "data".into());
        let frame_cache_dir =
            lookup("FRAME_CACHE_DIR").unwrap_or_else(|| "static/img/tmp".into());

        let frame_cache_ttl = match lookup("FRAME_CACHE_TTL_SECS") {
            Some(raw) => {
                let secs: u64 = raw.trim().parse().map_err(|_| {
                    CoreError::InvalidArgument(format!(
                        "FRAME_CACHE_TTL_SECS must be a valid u64, got '{raw}'"
                    ))
                })?;
                Duration::from_secs(secs)
            }
            None => DEFAULT_FRAME_TTL,
        };

        Ok(Self {
            data_dir: data_dir.into(),
            frame_cache_dir: frame_cache_dir.into(),
            frame_cache_ttl,
        })
    }

    pub fn layout(&self) -> StorageLayout {
        StorageLayout::new(&self.data_dir)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            frame_cache_dir: PathBuf::from("static/img/tmp"),
            frame_cache_ttl: DEFAULT_FRAME_TTL,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use assert_matches::assert_matches;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let config = EngineConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.frame_cache_ttl, Duration::from_secs(10));
    }

    #[test]
    fn overrides_are_applied() {
        let config = EngineConfig::from_lookup(lookup(&[
            ("DATA_DIR", "/srv/frames"),
            ("FRAME_CACHE_DIR", "/tmp/cache"),
            ("FRAME_CACHE_TTL_SECS", "30"),
        ]))
        .unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/srv/frames"));
        assert_eq!(config.frame_cache_dir, PathBuf::from("/tmp/cache"));
        assert_eq!(config.frame_cache_ttl, Duration::from_secs(30));
        assert_eq!(
            config.layout().registry_path(),
            PathBuf::from("/srv/frames/videos.json")
        );
    }

    #[test]
    fn bad_ttl_is_rejected() {
        let result = EngineConfig::from_lookup(lookup(&[("FRAME_CACHE_TTL_SECS", "soon")]));
        assert_matches!(result, Err(CoreError::InvalidArgument(_)));
    }
}
