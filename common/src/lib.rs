//! Common utilities shared by the nativesql crates.
//!
//! This crate provides the error taxonomy, block compression and configuration.

pub mod compression;
pub mod config;
pub mod error;

pub use compression::{
    CompressionAlgorithm, CompressionBuilder, CompressionConfig, CompressionStats, Compressor,
};
pub use config::NativeSqlConfig;
pub use error::{CommonError, Diagnose, ErrorContext, Result};
