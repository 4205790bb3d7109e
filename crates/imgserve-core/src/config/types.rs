//! Sub-configuration structs with their defaults.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address to listen on
    pub listen: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:7000".to_string(),
        }
    }
}

/// Storage backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Backend: "local" or "memory"
    pub backend: String,

    /// Root directory for the local backend
    pub root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: "local".to_string(),
            root: PathBuf::from("~/.imgserve/store"),
        }
    }
}

/// Where originals come from when they are not in storage yet.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SourceConfig {
    /// Base URL that mirrors the storage layout; empty disables it
    pub base_url: String,
}

impl SourceConfig {
    /// The configured base URL, if any.
    pub fn base_url(&self) -> Option<&str> {
        let trimmed = self.base_url.trim_end_matches('/');
        (!trimmed.is_empty()).then_some(trimmed)
    }
}

/// Derivative pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Max derivatives generated concurrently per request
    pub parallel_workers: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            parallel_workers: 4,
        }
    }
}

/// Source fetch settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Per-attempt timeout in milliseconds
    pub timeout_ms: u64,

    /// Max retry attempts for transient failures
    pub retry_attempts: u32,

    /// Base delay between retries in milliseconds
    pub retry_delay_ms: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            retry_attempts: 2,
            retry_delay_ms: 500,
        }
    }
}

/// Resource limits to protect against problematic inputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum original size in megabytes
    pub max_file_size_mb: u64,

    /// Maximum image dimension (width or height), source or derivative
    pub max_image_dimension: u32,

    /// Transform timeout in milliseconds
    pub transform_timeout_ms: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_file_size_mb: 100,
            max_image_dimension: 10000,
            transform_timeout_ms: 30000,
        }
    }
}

/// Which event sinks are registered at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    /// Log every pipeline event through `tracing`
    pub tracing: bool,

    /// Record Prometheus counters and latency histograms
    pub metrics: bool,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            tracing: true,
            metrics: true,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: error, warn, info, debug, trace
    pub level: String,

    /// Log format: "pretty" or "json"
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}
