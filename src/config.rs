//! Engine configuration.
//!
//! Loaded from `<config dir>/sorng-transfer/config.json`. A missing file means
//! defaults; every field has its own default so partial files work. The
//! concurrency bound can be overridden with `SORNG_TRANSFER_MAX_CONCURRENT`.

use serde::{Deserialize, Serialize};
use sorng_transfer::throttle::DEFAULT_CHUNK_SIZE;
use sorng_transfer::{QueueConfig, TransferError, TransferResult};
use std::path::{Path, PathBuf};

pub const MAX_CONCURRENT_ENV: &str = "SORNG_TRANSFER_MAX_CONCURRENT";

fn default_max_concurrent() -> usize {
    3
}
fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}
fn default_log_filter() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    /// Chunk size for uncapped transfers, bytes.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Global caps applied at startup, bytes/sec.
    #[serde(default)]
    pub global_upload_limit: Option<u64>,
    #[serde(default)]
    pub global_download_limit: Option<u64>,
    /// Used when `RUST_LOG` is not set.
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            chunk_size: default_chunk_size(),
            global_upload_limit: None,
            global_download_limit: None,
            log_filter: default_log_filter(),
        }
    }
}

impl EngineConfig {
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("sorng-transfer").join("config.json"))
    }

    /// Read `path`; a file that does not exist yields the defaults.
    pub fn load(path: &Path) -> TransferResult<Self> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(TransferError::local_io(&path.display().to_string(), e)),
        };
        let config: Self = serde_json::from_str(&raw).map_err(|e| {
            TransferError::invalid(format!("Invalid config {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Default location plus environment overrides.
    pub fn load_default() -> TransferResult<Self> {
        let mut config = match Self::default_path() {
            Some(path) => Self::load(&path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply overrides from an environment-like lookup.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> TransferResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(MAX_CONCURRENT_ENV) {
            self.max_concurrent = raw.trim().parse().map_err(|_| {
                TransferError::invalid(format!("{} must be a positive integer, got '{}'", MAX_CONCURRENT_ENV, raw))
            })?;
        }
        self.validate()
    }

    pub fn validate(&self) -> TransferResult<()> {
        if self.max_concurrent == 0 {
            return Err(TransferError::invalid("maxConcurrent must be at least 1"));
        }
        if self.global_upload_limit == Some(0) || self.global_download_limit == Some(0) {
            return Err(TransferError::invalid("Global limits must be greater than zero"));
        }
        Ok(())
    }

    pub fn queue_config(&self) -> QueueConfig {
        QueueConfig {
            max_concurrent: self.max_concurrent,
            chunk_size: self.chunk_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sorng_transfer::TransferErrorKind;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = EngineConfig::load(&dir.path().join("absent.json")).unwrap();
        assert_eq!(cfg, EngineConfig::default());
        assert_eq!(cfg.max_concurrent, 3);
        assert_eq!(cfg.chunk_size, 65_536);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"maxConcurrent": 5, "globalDownloadLimit": 1048576}"#).unwrap();
        let cfg = EngineConfig::load(&path).unwrap();
        assert_eq!(cfg.max_concurrent, 5);
        assert_eq!(cfg.global_download_limit, Some(1_048_576));
        assert_eq!(cfg.log_filter, "info");
    }

    #[test]
    fn malformed_or_zero_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{not json").unwrap();
        assert_eq!(
            EngineConfig::load(&path).unwrap_err().kind,
            TransferErrorKind::InvalidArgument
        );
        std::fs::write(&path, r#"{"maxConcurrent": 0}"#).unwrap();
        assert!(EngineConfig::load(&path).is_err());
    }

    #[test]
    fn env_override() {
        let mut cfg = EngineConfig::default();
        cfg.apply_overrides(|k| (k == MAX_CONCURRENT_ENV).then(|| " 8 ".to_string()))
            .unwrap();
        assert_eq!(cfg.max_concurrent, 8);
        assert_eq!(cfg.queue_config().max_concurrent, 8);

        let err = cfg
            .apply_overrides(|_| Some("many".to_string()))
            .unwrap_err();
        assert_eq!(err.kind, TransferErrorKind::InvalidArgument);
    }
}
