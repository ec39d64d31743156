//! Error handling for the nativesql-common crate.

use thiserror::Error;

/// Error type shared by the expression compiler and the broadcast batch path.
///
/// Every variant carries a human-readable message and an optional source so
/// errors raised by Arrow, DataFusion or the compression libraries are kept in
/// the chain instead of being flattened into a string.
#[derive(Error, Debug)]
pub enum CommonError {
    #[error("Unsupported operator: {message}")]
    UnsupportedOperatorError {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    #[error("Unresolved reference: {message}")]
    UnresolvedReferenceError {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    #[error("Unsupported data type: {message}")]
    UnsupportedTypeError {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    #[error("Native library error: {message}")]
    NativeError {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    #[error("Corrupt broadcast data: {message}")]
    CorruptBroadcastDataError {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    #[error("Invalid partition: {message}")]
    InvalidPartitionError {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    #[error("Serialization failed: {message}")]
    SerializationError {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    #[error("Deserialization failed: {message}")]
    DeserializationError {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    #[error("Compression failed: {message}")]
    CompressionError {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    #[error("Decompression failed: {message}")]
    DecompressionError {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    #[error("Invalid configuration: {message}")]
    ConfigurationError {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    #[error("Resource exhausted: {message}")]
    ResourceExhaustedError {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },
}

/// Result type alias for common operations.
pub type Result<T> = std::result::Result<T, CommonError>;

/// Error severity levels for categorizing errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Operation can continue with degraded functionality
    Low,
    /// Operation should be retried or an alternative path used
    Medium,
    /// The current task must be aborted
    High,
}

/// Error category for grouping related error types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Expression compilation and planning errors
    Planning,
    /// Data encoding and decoding errors
    DataProcessing,
    /// Configuration and setup errors
    Configuration,
    /// Memory and other resource management errors
    Resource,
    /// Internal logic errors
    Internal,
}

/// Trait for error diagnostics used when reporting task failures.
pub trait Diagnose {
    /// Get the error severity level.
    fn severity(&self) -> ErrorSeverity;

    /// Get the error category.
    fn category(&self) -> ErrorCategory;

    /// Get suggestions for resolving the error.
    fn suggestions(&self) -> Vec<String>;

    /// Check if the error is retryable.
    ///
    /// Nothing in this workspace retries on its own; the answer is for the
    /// enclosing scheduler deciding whether to re-run a task.
    fn is_retryable(&self) -> bool;

    /// Get the recommended retry delay in milliseconds.
    fn retry_delay_ms(&self) -> Option<u64>;
}

macro_rules! error_constructors {
    ($($variant:ident => $plain:ident, $with_source:ident;)*) => {
        impl CommonError {
            $(
                #[doc = concat!("Create a `", stringify!($variant), "` with a custom message.")]
                pub fn $plain<S: Into<String>>(message: S) -> Self {
                    Self::$variant {
                        message: message.into(),
                        source: None,
                    }
                }

                #[doc = concat!("Create a `", stringify!($variant), "` with a custom message and source error.")]
                pub fn $with_source<S: Into<String>, E: Into<anyhow::Error>>(
                    message: S,
                    source: E,
                ) -> Self {
                    Self::$variant {
                        message: message.into(),
                        source: Some(source.into()),
                    }
                }
            )*
        }
    };
}

error_constructors! {
    UnsupportedOperatorError => unsupported_operator_error, unsupported_operator_error_with_source;
    UnresolvedReferenceError => unresolved_reference_error, unresolved_reference_error_with_source;
    UnsupportedTypeError => unsupported_type_error, unsupported_type_error_with_source;
    NativeError => native_error, native_error_with_source;
    CorruptBroadcastDataError => corrupt_broadcast_data_error, corrupt_broadcast_data_error_with_source;
    InvalidPartitionError => invalid_partition_error, invalid_partition_error_with_source;
    SerializationError => serialization_error, serialization_error_with_source;
    DeserializationError => deserialization_error, deserialization_error_with_source;
    CompressionError => compression_error, compression_error_with_source;
    DecompressionError => decompression_error, decompression_error_with_source;
    ConfigurationError => configuration_error, configuration_error_with_source;
    ResourceExhaustedError => resource_exhausted_error, resource_exhausted_error_with_source;
}

impl CommonError {
    /// The message carried by this error, without the variant prefix.
    pub fn message(&self) -> &str {
        match self {
            CommonError::UnsupportedOperatorError { message, .. }
            | CommonError::UnresolvedReferenceError { message, .. }
            | CommonError::UnsupportedTypeError { message, .. }
            | CommonError::NativeError { message, .. }
            | CommonError::CorruptBroadcastDataError { message, .. }
            | CommonError::InvalidPartitionError { message, .. }
            | CommonError::SerializationError { message, .. }
            | CommonError::DeserializationError { message, .. }
            | CommonError::CompressionError { message, .. }
            | CommonError::DecompressionError { message, .. }
            | CommonError::ConfigurationError { message, .. }
            | CommonError::ResourceExhaustedError { message, .. } => message,
        }
    }

    fn message_mut(&mut self) -> &mut String {
        match self {
            CommonError::UnsupportedOperatorError { message, .. }
            | CommonError::UnresolvedReferenceError { message, .. }
            | CommonError::UnsupportedTypeError { message, .. }
            | CommonError::NativeError { message, .. }
            | CommonError::CorruptBroadcastDataError { message, .. }
            | CommonError::InvalidPartitionError { message, .. }
            | CommonError::SerializationError { message, .. }
            | CommonError::DeserializationError { message, .. }
            | CommonError::CompressionError { message, .. }
            | CommonError::DecompressionError { message, .. }
            | CommonError::ConfigurationError { message, .. }
            | CommonError::ResourceExhaustedError { message, .. } => message,
        }
    }

    /// Prepend diagnostic context (an expression node, a partition) to the
    /// message while keeping the variant and the source chain intact.
    pub fn with_context_prefix<S: AsRef<str>>(mut self, prefix: S) -> Self {
        let message = self.message_mut();
        *message = format!("{}: {}", prefix.as_ref(), message);
        self
    }
}

impl Diagnose for CommonError {
    fn severity(&self) -> ErrorSeverity {
        match self {
            CommonError::UnsupportedOperatorError { .. } => ErrorSeverity::High,
            CommonError::UnresolvedReferenceError { .. } => ErrorSeverity::High,
            CommonError::UnsupportedTypeError { .. } => ErrorSeverity::High,
            CommonError::NativeError { .. } => ErrorSeverity::High,
            CommonError::CorruptBroadcastDataError { .. } => ErrorSeverity::High,
            CommonError::InvalidPartitionError { .. } => ErrorSeverity::High,
            CommonError::SerializationError { .. } => ErrorSeverity::Medium,
            CommonError::DeserializationError { .. } => ErrorSeverity::Medium,
            CommonError::CompressionError { .. } => ErrorSeverity::Low,
            CommonError::DecompressionError { .. } => ErrorSeverity::Medium,
            CommonError::ConfigurationError { .. } => ErrorSeverity::High,
            CommonError::ResourceExhaustedError { .. } => ErrorSeverity::Medium,
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            CommonError::UnsupportedOperatorError { .. }
            | CommonError::UnresolvedReferenceError { .. }
            | CommonError::UnsupportedTypeError { .. }
            | CommonError::NativeError { .. } => ErrorCategory::Planning,
            CommonError::CorruptBroadcastDataError { .. }
            | CommonError::SerializationError { .. }
            | CommonError::DeserializationError { .. }
            | CommonError::CompressionError { .. }
            | CommonError::DecompressionError { .. } => ErrorCategory::DataProcessing,
            CommonError::ConfigurationError { .. } => ErrorCategory::Configuration,
            CommonError::ResourceExhaustedError { .. } => ErrorCategory::Resource,
            CommonError::InvalidPartitionError { .. } => ErrorCategory::Internal,
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            CommonError::UnsupportedOperatorError { .. } => vec![
                "Fall back to the row-based execution path for this expression".to_string(),
                "Add a lowering row for the operator to the native dispatch table".to_string(),
            ],
            CommonError::UnresolvedReferenceError { .. } => vec![
                "Check that the input field list matches the child operator's output".to_string(),
            ],
            CommonError::UnsupportedTypeError { .. } => {
                vec!["Cast the column to a supported type before native execution".to_string()]
            }
            CommonError::NativeError { .. } => vec![
                "Verify the native backend recognises the emitted function names".to_string(),
                "Check function arity and result types against the registry".to_string(),
            ],
            CommonError::CorruptBroadcastDataError { .. } => vec![
                "Verify both sides use the same block compression codec".to_string(),
                "Re-run the stage so the broadcast is rebuilt".to_string(),
            ],
            CommonError::InvalidPartitionError { .. } => {
                vec!["Partition indices must be below the configured partition count".to_string()]
            }
            CommonError::SerializationError { .. } | CommonError::DeserializationError { .. } => {
                vec!["Check serialization format versions on both sides".to_string()]
            }
            CommonError::CompressionError { .. } | CommonError::DecompressionError { .. } => {
                vec!["Verify compression algorithm parameters".to_string()]
            }
            CommonError::ConfigurationError { .. } => {
                vec!["Review the nativesql.* configuration keys and values".to_string()]
            }
            CommonError::ResourceExhaustedError { .. } => vec![
                "Increase the memory pool limit".to_string(),
                "Reduce the size of the broadcast side".to_string(),
            ],
        }
    }

    fn is_retryable(&self) -> bool {
        matches!(self, CommonError::ResourceExhaustedError { .. })
    }

    fn retry_delay_ms(&self) -> Option<u64> {
        match self {
            CommonError::ResourceExhaustedError { .. } => Some(5000),
            _ => None,
        }
    }
}

/// Context helpers for mapping foreign errors into the taxonomy.
pub mod context {
    use super::*;

    /// Extension trait for adding context to Results from Arrow, DataFusion
    /// and the compression libraries.
    pub trait ErrorContext<T> {
        /// Wrap the error as a `NativeError`.
        fn with_native_context<F>(self, f: F) -> Result<T>
        where
            F: FnOnce() -> String;

        /// Wrap the error as a `CorruptBroadcastDataError`.
        fn with_corruption_context<F>(self, f: F) -> Result<T>
        where
            F: FnOnce() -> String;

        /// Wrap the error as a `SerializationError`.
        fn with_serialization_context<F>(self, f: F) -> Result<T>
        where
            F: FnOnce() -> String;
    }

    impl<T, E> ErrorContext<T> for std::result::Result<T, E>
    where
        E: Into<anyhow::Error>,
    {
        fn with_native_context<F>(self, f: F) -> Result<T>
        where
            F: FnOnce() -> String,
        {
            self.map_err(|e| CommonError::native_error_with_source(f(), e.into()))
        }

        fn with_corruption_context<F>(self, f: F) -> Result<T>
        where
            F: FnOnce() -> String,
        {
            self.map_err(|e| CommonError::corrupt_broadcast_data_error_with_source(f(), e.into()))
        }

        fn with_serialization_context<F>(self, f: F) -> Result<T>
        where
            F: FnOnce() -> String,
        {
            self.map_err(|e| CommonError::serialization_error_with_source(f(), e.into()))
        }
    }
}

pub use context::ErrorContext;
