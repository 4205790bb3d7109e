//! Configuration validation with range checks.

use crate::error::ConfigError;

use super::Config;

impl Config {
    /// Validate configuration values are within acceptable ranges.
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.pipeline.parallel_workers == 0 {
            return Err(ConfigError::ValidationError(
                "pipeline.parallel_workers must be > 0".into(),
            ));
        }
        if !matches!(self.storage.backend.as_str(), "local" | "memory") {
            return Err(ConfigError::ValidationError(format!(
                "storage.backend must be \"local\" or \"memory\", got {:?}",
                self.storage.backend
            )));
        }
        if self.storage.backend == "local" && self.storage.root.as_os_str().is_empty() {
            return Err(ConfigError::ValidationError(
                "storage.root must be set for the local backend".into(),
            ));
        }
        if self.fetch.timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "fetch.timeout_ms must be > 0".into(),
            ));
        }
        if self.limits.max_file_size_mb == 0 {
            return Err(ConfigError::ValidationError(
                "limits.max_file_size_mb must be > 0".into(),
            ));
        }
        if self.limits.max_image_dimension == 0 {
            return Err(ConfigError::ValidationError(
                "limits.max_image_dimension must be > 0".into(),
            ));
        }
        if self.limits.transform_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "limits.transform_timeout_ms must be > 0".into(),
            ));
        }
        if !matches!(self.logging.format.as_str(), "pretty" | "json") {
            return Err(ConfigError::ValidationError(format!(
                "logging.format must be \"pretty\" or \"json\", got {:?}",
                self.logging.format
            )));
        }
        Ok(())
    }
}
