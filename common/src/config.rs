//! Configuration for the columnar broadcast path.
//!
//! Values arrive as string key/value pairs from the host session, or as a
//! JSON document in tests and tools. Keys live under the `nativesql.` prefix.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::compression::{CompressionAlgorithm, CompressionConfig};
use crate::error::{CommonError, Result};

pub const BROADCAST_COMPRESS: &str = "nativesql.broadcast.compress";
pub const COMPRESSION_CODEC: &str = "nativesql.io.compression.codec";
pub const ZSTD_LEVEL: &str = "nativesql.io.compression.zstd.level";
pub const BROADCAST_CACHE_CAPACITY: &str = "nativesql.broadcast.cache.capacity";
pub const BROADCAST_CACHE_IDLE_TIMEOUT_SECS: &str = "nativesql.broadcast.cache.idleTimeoutSecs";

const KEY_PREFIX: &str = "nativesql.";

/// Settings shared by the coordinator that builds broadcast buffers and the
/// workers that read them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NativeSqlConfig {
    /// Whether broadcast blocks are compressed.
    pub broadcast_compress: bool,
    /// Codec used for broadcast blocks when compression is enabled.
    pub compression_codec: CompressionAlgorithm,
    /// Zstd level, ignored by the other codecs.
    pub zstd_level: i32,
    /// Maximum number of broadcast buffers kept by a worker-side cache.
    pub broadcast_cache_capacity: u64,
    /// Seconds an unused broadcast buffer stays in a worker-side cache.
    pub broadcast_cache_idle_secs: u64,
}

impl Default for NativeSqlConfig {
    fn default() -> Self {
        Self {
            broadcast_compress: true,
            compression_codec: CompressionAlgorithm::Lz4,
            zstd_level: 1,
            broadcast_cache_capacity: 64,
            broadcast_cache_idle_secs: 1800,
        }
    }
}

impl NativeSqlConfig {
    /// Build a configuration from string key/value pairs.
    ///
    /// Keys outside the `nativesql.` prefix are ignored silently; unknown
    /// keys inside it are ignored with a warning.
    pub fn from_map(settings: &HashMap<String, String>) -> Result<Self> {
        let mut config = Self::default();

        for (key, value) in settings {
            match key.as_str() {
                BROADCAST_COMPRESS => config.broadcast_compress = parse_value(key, value)?,
                COMPRESSION_CODEC => config.compression_codec = value.parse()?,
                ZSTD_LEVEL => config.zstd_level = parse_value(key, value)?,
                BROADCAST_CACHE_CAPACITY => {
                    config.broadcast_cache_capacity = parse_value(key, value)?
                }
                BROADCAST_CACHE_IDLE_TIMEOUT_SECS => {
                    config.broadcast_cache_idle_secs = parse_value(key, value)?
                }
                other if other.starts_with(KEY_PREFIX) => {
                    warn!("Ignoring unknown configuration key: {}", other);
                }
                _ => {}
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Build a configuration from a JSON document. Missing fields keep their
    /// defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).map_err(|e| {
            CommonError::configuration_error_with_source("Malformed configuration document", e)
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges that the individual parsers cannot see.
    pub fn validate(&self) -> Result<()> {
        if !(1..=22).contains(&self.zstd_level) {
            return Err(CommonError::configuration_error(format!(
                "{} must be between 1 and 22, got {}",
                ZSTD_LEVEL, self.zstd_level
            )));
        }
        if self.broadcast_cache_capacity == 0 {
            return Err(CommonError::configuration_error(format!(
                "{} must be positive",
                BROADCAST_CACHE_CAPACITY
            )));
        }
        Ok(())
    }

    /// Compression settings for broadcast blocks, `None` when disabled.
    pub fn block_compression(&self) -> Option<CompressionConfig> {
        if !self.broadcast_compress {
            return None;
        }
        let config = CompressionConfig::new(self.compression_codec);
        Some(if self.compression_codec.supports_levels() {
            config.with_level(self.zstd_level)
        } else {
            config
        })
    }

    pub fn broadcast_cache_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.broadcast_cache_idle_secs)
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value.trim().parse::<T>().map_err(|e| {
        CommonError::configuration_error(format!("Invalid value '{}' for {}: {}", value, key, e))
    })
}
