//! RDD implementations
//!
//! Partitioned columnar operators of the nativesql core.

pub mod broadcast_columnar_rdd;

pub use broadcast_columnar_rdd::*;
