//! HTTP request layer over the derivative pipeline.

mod error;
mod handler;
mod router;

pub use error::ApiError;
pub use router::build_router;

use imgserve_core::{
    ContentHash, Event, Imgserve, MetricsSink, Namespace, Orchestrator, PathResolver,
    PipelineError, SourceFetcher, SourceLocator,
};
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;

/// Shared state handed to every handler.
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub fetcher: Arc<dyn SourceFetcher>,
    /// Origin prefix for originals requested without an explicit source
    pub base_url: Option<String>,
    /// Maximum request body in bytes
    pub body_limit: usize,
    /// Served at `/metrics` when present
    pub metrics: Option<Arc<MetricsSink>>,
}

impl AppState {
    pub fn from_imgserve(imgserve: &Imgserve) -> Self {
        let config = imgserve.config();
        Self {
            orchestrator: imgserve.orchestrator().clone(),
            fetcher: imgserve.fetcher().clone(),
            base_url: config.source.base_url().map(str::to_string),
            body_limit: (config.limits.max_file_size_mb * 1024 * 1024) as usize,
            metrics: imgserve.metrics().cloned(),
        }
    }

    /// `{base_url}/{original key}`, when a base URL is configured.
    fn default_source(
        &self,
        namespace: &Namespace,
        hash: &ContentHash,
    ) -> Result<Option<SourceLocator>, PipelineError> {
        let Some(base) = &self.base_url else {
            return Ok(None);
        };
        let key = PathResolver::original(namespace.as_str(), hash.as_str())?;
        Ok(Some(SourceLocator::Url(format!("{base}/{key}"))))
    }

    fn latency(&self, handler: &str, start: Instant) {
        self.orchestrator.events().notify(Event::RequestLatency {
            handler: handler.to_string(),
            elapsed: start.elapsed(),
        });
    }
}

/// imgserve HTTP server.
pub struct Server {
    state: Arc<AppState>,
    listen: String,
}

impl Server {
    pub fn new(state: AppState, listen: impl Into<String>) -> Self {
        Self {
            state: Arc::new(state),
            listen: listen.into(),
        }
    }

    /// Build the router (useful for testing).
    pub fn router(&self) -> axum::Router {
        build_router(self.state.clone())
    }

    /// Serve requests until Ctrl-C.
    pub async fn serve(self) -> anyhow::Result<()> {
        let app = self.router();
        let listener = TcpListener::bind(&self.listen).await?;
        tracing::info!("imgserve listening on {}", listener.local_addr()?);
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::warn!("Cannot listen for shutdown signal: {e}");
                    std::future::pending::<()>().await;
                }
                tracing::info!("Shutting down");
            })
            .await?;
        Ok(())
    }
}
