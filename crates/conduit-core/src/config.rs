//! Config - JSON ファイル + 環境変数による設定
//!
//! 優先順位: 既定値 < JSON ファイル < 環境変数
//!
//! ```json
//! { "cache": { "sliding_ttl_secs": 600, "sweep_interval_secs": 30 },
//!   "identifier": { "prefix": "c" } }
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::domain::ids::DEFAULT_PREFIX;

pub const ENV_CACHE_TTL_SECS: &str = "CONDUIT_CACHE_TTL_SECS";
pub const ENV_SWEEP_INTERVAL_SECS: &str = "CONDUIT_SWEEP_INTERVAL_SECS";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ConduitConfig {
    pub cache: CacheConfig,
    pub identifier: IdentifierConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub sliding_ttl_secs: u64,
    pub sweep_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            sliding_ttl_secs: 3600,
            sweep_interval_secs: 60,
        }
    }
}

impl CacheConfig {
    pub fn sliding_ttl(&self) -> Duration {
        Duration::from_secs(self.sliding_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        // 0 だと tokio::time::interval が panic する
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }

    pub fn with_env_overrides(mut self) -> Self {
        apply_cache_overrides(&mut self, |key| std::env::var(key).ok());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct IdentifierConfig {
    pub prefix: char,
}

impl Default for IdentifierConfig {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_PREFIX,
        }
    }
}

impl ConduitConfig {
    /// ファイルがあれば読み、環境変数で上書きする
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        apply_env_overrides(&mut config);
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_slice(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

pub fn apply_env_overrides(config: &mut ConduitConfig) {
    apply_cache_overrides(&mut config.cache, |key| std::env::var(key).ok());
}

fn apply_cache_overrides<F>(cache: &mut CacheConfig, mut lookup: F)
where
    F: FnMut(&str) -> Option<String>,
{
    if let Some(secs) = parse_secs(&mut lookup, ENV_CACHE_TTL_SECS) {
        cache.sliding_ttl_secs = secs;
    }
    if let Some(secs) = parse_secs(&mut lookup, ENV_SWEEP_INTERVAL_SECS) {
        cache.sweep_interval_secs = secs;
    }
}

fn parse_secs<F>(lookup: &mut F, key: &str) -> Option<u64>
where
    F: FnMut(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    match trimmed.parse::<u64>() {
        Ok(value) => Some(value),
        Err(err) => {
            tracing::warn!("invalid {key}, ignoring: {err}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::collections::HashMap;

    fn overrides(pairs: &[(&str, &str)]) -> CacheConfig {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let mut cache = CacheConfig::default();
        apply_cache_overrides(&mut cache, |key| env.get(key).cloned());
        cache
    }

    #[test]
    fn defaults() {
        let config = ConduitConfig::default();
        assert_eq!(config.cache.sliding_ttl(), Duration::from_secs(3600));
        assert_eq!(config.cache.sweep_interval(), Duration::from_secs(60));
        assert_eq!(config.identifier.prefix, 'c');
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: ConduitConfig =
            serde_json::from_str(r#"{"cache": {"sliding_ttl_secs": 5}}"#).unwrap();
        assert_eq!(config.cache.sliding_ttl_secs, 5);
        assert_eq!(config.cache.sweep_interval_secs, 60);
        assert_eq!(config.identifier.prefix, 'c');
    }

    #[rstest]
    #[case::ttl(&[(ENV_CACHE_TTL_SECS, " 120 ")], 120, 60)]
    #[case::interval(&[(ENV_SWEEP_INTERVAL_SECS, "5")], 3600, 5)]
    #[case::garbage_is_ignored(&[(ENV_CACHE_TTL_SECS, "soon")], 3600, 60)]
    #[case::blank_is_ignored(&[(ENV_CACHE_TTL_SECS, "  ")], 3600, 60)]
    fn env_overrides(#[case] env: &[(&str, &str)], #[case] ttl: u64, #[case] interval: u64) {
        let cache = overrides(env);
        assert_eq!(cache.sliding_ttl_secs, ttl);
        assert_eq!(cache.sweep_interval_secs, interval);
    }

    #[test]
    fn zero_interval_is_clamped() {
        let cache = CacheConfig {
            sliding_ttl_secs: 1,
            sweep_interval_secs: 0,
        };
        assert_eq!(cache.sweep_interval(), Duration::from_secs(1));
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = ConduitConfig::from_file(Path::new("/nonexistent/conduit.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
