//! Block compression for serialized broadcast batches.
//!
//! Each broadcast block is compressed as a whole before it is shipped, the
//! same way a cluster runtime compresses broadcast pieces. The codec name
//! travels in configuration, so both sides must agree on it.

use std::fmt::{self, Debug, Display};
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::error::{CommonError, Result};

/// Compression algorithm types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionAlgorithm {
    /// LZ4 block format with the uncompressed size prepended.
    Lz4,
    /// Zstd frame.
    Zstd,
    /// Snappy framed stream.
    Snappy,
}

impl CompressionAlgorithm {
    /// Get the default compression level for this algorithm.
    pub fn default_level(&self) -> i32 {
        match self {
            CompressionAlgorithm::Zstd => 1,
            CompressionAlgorithm::Lz4 | CompressionAlgorithm::Snappy => 0,
        }
    }

    /// Check if this algorithm supports compression levels.
    pub fn supports_levels(&self) -> bool {
        matches!(self, CompressionAlgorithm::Zstd)
    }

    /// Short name used in configuration values.
    pub fn name(&self) -> &'static str {
        match self {
            CompressionAlgorithm::Lz4 => "lz4",
            CompressionAlgorithm::Zstd => "zstd",
            CompressionAlgorithm::Snappy => "snappy",
        }
    }
}

impl Display for CompressionAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CompressionAlgorithm {
    type Err = CommonError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lz4" => Ok(CompressionAlgorithm::Lz4),
            "zstd" => Ok(CompressionAlgorithm::Zstd),
            "snappy" => Ok(CompressionAlgorithm::Snappy),
            other => Err(CommonError::configuration_error(format!(
                "Unknown compression codec '{}', expected one of lz4, zstd, snappy",
                other
            ))),
        }
    }
}

/// Generic compressor interface.
pub trait Compressor: Debug + Send + Sync {
    /// Compress the input data and return compressed bytes.
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>>;

    /// Decompress the input data and return original bytes.
    fn decompress(&self, compressed_data: &[u8]) -> Result<Vec<u8>>;

    /// Uncompressed size recorded in the frame header, when the format
    /// records one.
    fn decompressed_size(&self, compressed_data: &[u8]) -> Option<usize>;

    /// Get the compression algorithm used by this compressor.
    fn algorithm(&self) -> CompressionAlgorithm;

    /// Get compression statistics.
    fn stats(&self) -> CompressionStats;
}

/// Compression statistics information.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompressionStats {
    pub total_compressions: u64,
    pub total_decompressions: u64,
    pub total_input_bytes: u64,
    pub total_compressed_bytes: u64,
    pub total_decompressed_bytes: u64,
}

impl CompressionStats {
    /// Compressed size divided by input size, 0.0 when nothing was compressed.
    pub fn compression_ratio(&self) -> f64 {
        if self.total_input_bytes == 0 {
            0.0
        } else {
            self.total_compressed_bytes as f64 / self.total_input_bytes as f64
        }
    }
}

/// Configuration for compressor creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressionConfig {
    /// The compression algorithm to use.
    pub algorithm: CompressionAlgorithm,
    /// Compression level (only used for algorithms that support it).
    pub level: Option<i32>,
    /// Whether to track compression statistics.
    pub track_stats: bool,
}

impl CompressionConfig {
    /// Create a new configuration with the specified algorithm.
    pub fn new(algorithm: CompressionAlgorithm) -> Self {
        Self {
            algorithm,
            level: Some(algorithm.default_level()),
            track_stats: true,
        }
    }

    /// Set the compression level.
    pub fn with_level(mut self, level: i32) -> Self {
        self.level = Some(level);
        self
    }
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self::new(CompressionAlgorithm::Lz4)
    }
}

/// Builder for creating compressor instances.
pub struct CompressionBuilder {
    config: CompressionConfig,
}

impl CompressionBuilder {
    /// Create a new compression builder with the default configuration (LZ4).
    pub fn new() -> Self {
        Self {
            config: CompressionConfig::default(),
        }
    }

    /// Create a new compression builder with the specified algorithm.
    pub fn with_algorithm(algorithm: CompressionAlgorithm) -> Self {
        Self {
            config: CompressionConfig::new(algorithm),
        }
    }

    /// Create a builder from an existing configuration.
    pub fn from_config(config: CompressionConfig) -> Self {
        Self { config }
    }

    /// Set the compression level.
    pub fn level(mut self, level: i32) -> Self {
        self.config.level = Some(level);
        self
    }

    /// Enable or disable statistics tracking.
    pub fn track_stats(mut self, track: bool) -> Self {
        self.config.track_stats = track;
        self
    }

    /// Build a compressor instance.
    pub fn build(self) -> Result<Arc<dyn Compressor>> {
        let algorithm = self.config.algorithm;
        let level = self.config.level.unwrap_or(algorithm.default_level());

        if algorithm == CompressionAlgorithm::Zstd && !(1..=22).contains(&level) {
            return Err(CommonError::configuration_error(format!(
                "Invalid zstd compression level: {}. Must be between 1 and 22",
                level
            )));
        }

        let stats = self
            .config
            .track_stats
            .then(|| Arc::new(InternalCompressionStats::default()));

        Ok(Arc::new(BlockCompressor {
            algorithm,
            level,
            stats,
        }))
    }
}

impl Default for CompressionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Default)]
struct InternalCompressionStats {
    compressions: AtomicU64,
    decompressions: AtomicU64,
    input_bytes: AtomicU64,
    compressed_bytes: AtomicU64,
    decompressed_bytes: AtomicU64,
}

impl InternalCompressionStats {
    fn record_compression(&self, input_size: usize, compressed_size: usize) {
        self.compressions.fetch_add(1, Ordering::AcqRel);
        self.input_bytes
            .fetch_add(input_size as u64, Ordering::AcqRel);
        self.compressed_bytes
            .fetch_add(compressed_size as u64, Ordering::AcqRel);
    }

    fn record_decompression(&self, decompressed_size: usize) {
        self.decompressions.fetch_add(1, Ordering::AcqRel);
        self.decompressed_bytes
            .fetch_add(decompressed_size as u64, Ordering::AcqRel);
    }

    fn snapshot(&self) -> CompressionStats {
        CompressionStats {
            total_compressions: self.compressions.load(Ordering::Acquire),
            total_decompressions: self.decompressions.load(Ordering::Acquire),
            total_input_bytes: self.input_bytes.load(Ordering::Acquire),
            total_compressed_bytes: self.compressed_bytes.load(Ordering::Acquire),
            total_decompressed_bytes: self.decompressed_bytes.load(Ordering::Acquire),
        }
    }
}

/// Upper bound on the LZ4 block expansion ratio.
const LZ4_MAX_EXPANSION: usize = 255;

#[derive(Debug)]
struct BlockCompressor {
    algorithm: CompressionAlgorithm,
    level: i32,
    stats: Option<Arc<InternalCompressionStats>>,
}

impl Compressor for BlockCompressor {
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let compressed = match self.algorithm {
            CompressionAlgorithm::Lz4 => lz4_flex::compress_prepend_size(data),
            CompressionAlgorithm::Zstd => zstd::encode_all(data, self.level).map_err(|e| {
                CommonError::compression_error_with_source("Zstd compression failed", e)
            })?,
            CompressionAlgorithm::Snappy => {
                let mut encoder = snap::write::FrameEncoder::new(Vec::new());
                std::io::copy(&mut std::io::Cursor::new(data), &mut encoder).map_err(|e| {
                    CommonError::compression_error_with_source("Snappy compression failed", e)
                })?;
                encoder.into_inner().map_err(|e| {
                    CommonError::compression_error(format!(
                        "Snappy compression finalization failed: {}",
                        e
                    ))
                })?
            }
        };

        if let Some(ref stats) = self.stats {
            stats.record_compression(data.len(), compressed.len());
        }

        Ok(compressed)
    }

    fn decompress(&self, compressed_data: &[u8]) -> Result<Vec<u8>> {
        let decompressed = match self.algorithm {
            CompressionAlgorithm::Lz4 => {
                let declared = self.decompressed_size(compressed_data).unwrap_or_default();
                if declared > compressed_data.len().saturating_mul(LZ4_MAX_EXPANSION) {
                    return Err(CommonError::decompression_error(format!(
                        "LZ4 frame of {} bytes declares {} uncompressed bytes",
                        compressed_data.len(),
                        declared
                    )));
                }
                lz4_flex::decompress_size_prepended(compressed_data).map_err(|e| {
                    CommonError::decompression_error_with_source("LZ4 decompression failed", e)
                })?
            }
            CompressionAlgorithm::Zstd => zstd::decode_all(compressed_data).map_err(|e| {
                CommonError::decompression_error_with_source("Zstd decompression failed", e)
            })?,
            CompressionAlgorithm::Snappy => {
                let mut decompressed = Vec::new();
                let mut decoder = snap::read::FrameDecoder::new(compressed_data);
                std::io::copy(&mut decoder, &mut decompressed).map_err(|e| {
                    CommonError::decompression_error_with_source("Snappy decompression failed", e)
                })?;
                decompressed
            }
        };

        if let Some(ref stats) = self.stats {
            stats.record_decompression(decompressed.len());
        }

        Ok(decompressed)
    }

    fn decompressed_size(&self, compressed_data: &[u8]) -> Option<usize> {
        match self.algorithm {
            CompressionAlgorithm::Lz4 => {
                let prefix = compressed_data.first_chunk::<4>()?;
                Some(u32::from_le_bytes(*prefix) as usize)
            }
            CompressionAlgorithm::Zstd | CompressionAlgorithm::Snappy => None,
        }
    }

    fn algorithm(&self) -> CompressionAlgorithm {
        self.algorithm
    }

    fn stats(&self) -> CompressionStats {
        self.stats
            .as_ref()
            .map(|stats| stats.snapshot())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_DATA: &[u8] = b"ARROW1 schema message followed by record batch bodies; \
        repeated column values compress well: aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";

    #[test]
    fn test_each_algorithm_restores_input() {
        for algorithm in [
            CompressionAlgorithm::Lz4,
            CompressionAlgorithm::Zstd,
            CompressionAlgorithm::Snappy,
        ] {
            let compressor = CompressionBuilder::with_algorithm(algorithm)
                .build()
                .unwrap();
            let compressed = compressor.compress(TEST_DATA).unwrap();
            assert_eq!(compressor.decompress(&compressed).unwrap(), TEST_DATA);
            assert_eq!(compressor.algorithm(), algorithm);
        }
    }

    #[test]
    fn test_parse_codec_names() {
        assert_eq!(
            "LZ4".parse::<CompressionAlgorithm>().unwrap(),
            CompressionAlgorithm::Lz4
        );
        assert_eq!(
            " zstd ".parse::<CompressionAlgorithm>().unwrap(),
            CompressionAlgorithm::Zstd
        );
        assert!(matches!(
            "gzip".parse::<CompressionAlgorithm>(),
            Err(CommonError::ConfigurationError { .. })
        ));
        assert_eq!(CompressionAlgorithm::Snappy.to_string(), "snappy");
    }

    #[test]
    fn test_invalid_zstd_level() {
        let result = CompressionBuilder::with_algorithm(CompressionAlgorithm::Zstd)
            .level(40)
            .build();
        assert!(matches!(result, Err(CommonError::ConfigurationError { .. })));
    }

    #[test]
    fn test_garbage_input_fails_decompression() {
        let compressor = CompressionBuilder::with_algorithm(CompressionAlgorithm::Zstd)
            .build()
            .unwrap();
        let result = compressor.decompress(b"definitely not a zstd frame");
        assert!(matches!(
            result,
            Err(CommonError::DecompressionError { .. })
        ));
    }

    #[test]
    fn test_lz4_declared_size() {
        let compressor = CompressionBuilder::with_algorithm(CompressionAlgorithm::Lz4)
            .build()
            .unwrap();
        let mut compressed = compressor.compress(TEST_DATA).unwrap();
        assert_eq!(compressor.decompressed_size(&compressed), Some(TEST_DATA.len()));
        assert_eq!(compressor.decompressed_size(&[1, 2]), None);

        compressed[..4].copy_from_slice(&u32::MAX.to_le_bytes());
        assert!(matches!(
            compressor.decompress(&compressed),
            Err(CommonError::DecompressionError { .. })
        ));
        assert_eq!(compressor.stats().total_decompressions, 0);

        let zstd = CompressionBuilder::with_algorithm(CompressionAlgorithm::Zstd)
            .build()
            .unwrap();
        assert_eq!(zstd.decompressed_size(&zstd.compress(TEST_DATA).unwrap()), None);
    }

    #[test]
    fn test_compression_statistics() {
        let compressor = CompressionBuilder::with_algorithm(CompressionAlgorithm::Lz4)
            .track_stats(true)
            .build()
            .unwrap();
        assert_eq!(compressor.stats(), CompressionStats::default());

        let compressed = compressor.compress(TEST_DATA).unwrap();
        compressor.decompress(&compressed).unwrap();

        let stats = compressor.stats();
        assert_eq!(stats.total_compressions, 1);
        assert_eq!(stats.total_decompressions, 1);
        assert_eq!(stats.total_input_bytes, TEST_DATA.len() as u64);
        assert_eq!(stats.total_decompressed_bytes, TEST_DATA.len() as u64);
        assert!(stats.compression_ratio() > 0.0);
    }

    #[test]
    fn test_statistics_disabled() {
        let compressor = CompressionBuilder::new().track_stats(false).build().unwrap();
        compressor.compress(TEST_DATA).unwrap();
        assert_eq!(compressor.stats().total_compressions, 0);
    }
}
