//! imgserve core - content-addressed image derivative pipeline.
//!
//! Given a namespace, the content hash of an original and a list of requested
//! output specs, imgserve stores the original once and generates only the
//! derivatives that are missing.
//!
//! # Architecture
//!
//! ```text
//! request → original (fetch once) → derivatives (skip existing) → report
//! ```
//!
//! Storage, transforms and source fetching sit behind traits so backends can
//! be chosen at configuration time.
//!
//! # Usage
//!
//! ```rust,ignore
//! use imgserve_core::{Config, Imgserve, OutputSpec, PipelineRequest};
//!
//! #[tokio::main]
//! async fn main() -> imgserve_core::Result<()> {
//!     let imgserve = Imgserve::new(Config::load()?)?;
//!     let props = imgserve.identify_file("./cat.jpg".as_ref(), None).await?;
//!     println!("{}x{} {}", props.width, props.height, props.content_type);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod fetch;
pub mod identity;
pub mod paths;
pub mod pipeline;
pub mod storage;
pub mod transform;
pub mod types;

#[cfg(test)]
mod test_support;

pub use config::Config;
pub use error::{ConfigError, ImgserveError, PipelineError, Result, StageResult, StorageError};
pub use events::{Event, EventBus, EventSink, MetricsSink};
pub use fetch::{DefaultFetcher, SourceFetcher, SourceLocator};
pub use identity::{identify, Hasher, Identifier};
pub use paths::{PathResolver, StorageKey};
pub use pipeline::{Orchestrator, OrchestratorOptions, PipelineReport, PipelineRequest};
pub use storage::{Storage, StorageFactory};
pub use transform::{ImageTransformer, Transformer};
pub use types::{ContentHash, ImageProperties, Namespace, OutputSpec};

use std::path::Path;
use std::sync::Arc;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Fully wired pipeline: configured storage, transformer, fetcher and events.
pub struct Imgserve {
    config: Config,
    orchestrator: Arc<Orchestrator>,
    fetcher: Arc<DefaultFetcher>,
    metrics: Option<Arc<MetricsSink>>,
}

impl Imgserve {
    /// Wire everything described by `config`.
    pub fn new(config: Config) -> Result<Self> {
        tracing::debug!("Initializing imgserve v{}", VERSION);
        let storage = StorageFactory::create(&config)?;
        let (events, metrics) = EventBus::from_config(&config.events)?;
        Ok(Self::with_storage(config, storage, events, metrics))
    }

    /// Wire the pipeline around an already-built storage backend and bus.
    pub fn with_storage(
        config: Config,
        storage: Arc<dyn Storage>,
        events: EventBus,
        metrics: Option<Arc<MetricsSink>>,
    ) -> Self {
        tracing::debug!(
            "Storage backend: {}, {} event sink(s)",
            storage.name(),
            events.len()
        );
        let transformer = Arc::new(ImageTransformer::new(config.limits.clone()));
        let orchestrator = Arc::new(Orchestrator::new(
            storage,
            transformer,
            events,
            OrchestratorOptions::from_config(&config),
        ));
        let fetcher = Arc::new(DefaultFetcher::new(config.fetch.clone(), &config.limits));
        Self {
            config,
            orchestrator,
            fetcher,
            metrics,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    pub fn fetcher(&self) -> &Arc<DefaultFetcher> {
        &self.fetcher
    }

    pub fn events(&self) -> &EventBus {
        self.orchestrator.events()
    }

    /// Prometheus metrics, if `[events] metrics` is enabled.
    pub fn metrics(&self) -> Option<&Arc<MetricsSink>> {
        self.metrics.as_ref()
    }

    /// Run one batch with the configured fetcher.
    pub async fn process(&self, request: &PipelineRequest) -> StageResult<PipelineReport> {
        self.orchestrator.run(request, self.fetcher.as_ref()).await
    }

    /// Identify an image file with the configured size limits.
    pub async fn identify_file(
        &self,
        path: &Path,
        content_type_override: Option<&str>,
    ) -> StageResult<ImageProperties> {
        Identifier::new(self.config.limits.clone())
            .identify_file(path, content_type_override)
            .await
    }
}
