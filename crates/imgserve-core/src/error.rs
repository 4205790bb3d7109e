//! Error types for the imgserve derivative pipeline.
//!
//! Errors are organized by stage so that callers can tell a fatal failure
//! (the original could not be acquired) from one that only affects a single
//! requested output.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for imgserve operations.
#[derive(Error, Debug)]
pub enum ImgserveError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Pipeline processing errors
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// General I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Metric registration or encoding errors
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read the config file from disk
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse TOML configuration
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Configuration values are invalid
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Storage port errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// No blob stored at the key
    #[error("Not found: {0}")]
    NotFound(String),

    /// Backend read/write failure
    #[error("Storage IO error for {key}: {message}")]
    Io { key: String, message: String },
}

/// A single failed output within a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemFailure {
    /// Canonical output-spec token
    pub output: String,
    /// Human-readable failure reason
    pub reason: String,
}

/// Pipeline processing errors, organized by stage.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Malformed namespace, hash or output spec; nothing was attempted
    #[error("Validation error: {0}")]
    Validation(String),

    /// The original could not be fetched from its source
    #[error("Fetch failed for {locator}: {message}")]
    Fetch {
        locator: String,
        message: String,
        status_code: Option<u16>,
    },

    /// Byte stream is not a recognized raster container
    #[error("Unsupported format: {format}")]
    UnsupportedFormat { format: String },

    /// Image header or pixel data could not be decoded
    #[error("Decode error: {message}")]
    Decode { message: String },

    /// Derivative generation failed
    #[error("Transform failed for {spec}: {message}")]
    Transform { spec: String, message: String },

    /// Storage port failure
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Operation timed out
    #[error("Timeout in {stage} stage after {timeout_ms}ms")]
    Timeout { stage: String, timeout_ms: u64 },

    /// Input exceeds size limit
    #[error("File too large: {size_mb}MB > {max_mb}MB")]
    FileTooLarge { size_mb: u64, max_mb: u64 },

    /// Requested or source dimensions exceed limit
    #[error("Image too large: {width}x{height} > {max_dim}")]
    ImageTooLarge {
        width: u32,
        height: u32,
        max_dim: u32,
    },

    /// File not found
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// Local I/O failure
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Some requested outputs failed; the rest were stored
    #[error(
        "{} of {} outputs failed: {}",
        .failures.len(),
        .failures.len() + .succeeded.len(),
        describe_failures(.failures)
    )]
    PartialFailure {
        failures: Vec<ItemFailure>,
        succeeded: Vec<String>,
    },
}

fn describe_failures(failures: &[ItemFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{} ({})", f.output, f.reason))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Convenience type alias for imgserve results.
pub type Result<T> = std::result::Result<T, ImgserveError>;

/// Convenience type alias for pipeline-specific results.
pub type StageResult<T> = std::result::Result<T, PipelineError>;
