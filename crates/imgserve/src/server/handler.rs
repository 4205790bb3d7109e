//! Request handlers.

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use imgserve_core::{
    identify, ContentHash, Event, ImageProperties, Namespace, OutputSpec, PipelineError,
    PipelineRequest, SourceLocator,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;

use super::error::ApiError;
use super::AppState;

/// Query parameters shared by the processing endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct ProcessParams {
    /// Comma-separated output specs, e.g. `x110.jpg,w400.webp`
    pub outputs: Option<String>,
    /// URL of the original
    pub source: Option<String>,
    /// Content type to record when the original is not a raster format
    pub content_type: Option<String>,
}

impl ProcessParams {
    fn outputs(&self) -> Result<Vec<OutputSpec>, PipelineError> {
        OutputSpec::parse_list(self.outputs.as_deref().unwrap_or(""))
    }
}

/// Liveness check.
pub async fn status(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let start = Instant::now();
    let body = Json(json!({
        "status": "ok",
        "version": imgserve_core::VERSION,
    }));
    state.latency("status", start);
    body
}

/// Prometheus text exposition.
pub async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    let Some(metrics) = &state.metrics else {
        return StatusCode::NOT_FOUND.into_response();
    };
    match metrics.render() {
        Ok(text) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        Err(e) => {
            tracing::warn!("Cannot render metrics: {e}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Generate the missing derivatives of a known original.
pub async fn resize_many(
    State(state): State<Arc<AppState>>,
    Path((namespace, hash)): Path<(String, String)>,
    Query(params): Query<ProcessParams>,
) -> Response {
    let start = Instant::now();
    let result = run_resize_many(&state, &namespace, &hash, params).await;
    state.latency("resize_many", start);

    match result {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => e.into_response(),
    }
}

async fn run_resize_many(
    state: &AppState,
    namespace: &str,
    hash: &str,
    params: ProcessParams,
) -> Result<(), ApiError> {
    let namespace = Namespace::parse(namespace)?;
    let hash = ContentHash::parse(hash)?;
    let outputs = params.outputs()?;
    let source = match params.source {
        Some(url) => Some(SourceLocator::Url(url)),
        None => state.default_source(&namespace, &hash)?,
    };

    let request = PipelineRequest {
        namespace,
        hash,
        source,
        outputs,
        content_type: params.content_type,
    };
    state
        .orchestrator
        .run(&request, state.fetcher.as_ref())
        .await?
        .into_result()?;
    Ok(())
}

/// Store a new original, generate its derivatives and return its properties.
///
/// The original is read from `source` if given, otherwise from the body.
pub async fn new_image(
    State(state): State<Arc<AppState>>,
    Path(namespace): Path<String>,
    Query(params): Query<ProcessParams>,
    body: Bytes,
) -> Response {
    let start = Instant::now();
    let result = run_new_image(&state, &namespace, params, body).await;
    let events = state.orchestrator.events();
    events.notify(match &result {
        Ok(_) => Event::ImagePosted,
        Err(_) => Event::ImagePostingFailed,
    });
    state.latency("new_image", start);

    match result {
        Ok(props) => Json(props).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn run_new_image(
    state: &AppState,
    namespace: &str,
    params: ProcessParams,
    body: Bytes,
) -> Result<ImageProperties, ApiError> {
    let namespace = Namespace::parse(namespace)?;
    let outputs = params.outputs()?;
    if outputs.is_empty() {
        return Err(PipelineError::Validation("no outputs requested".into()).into());
    }

    let bytes = match &params.source {
        Some(url) => {
            state
                .fetcher
                .fetch(&SourceLocator::Url(url.clone()))
                .await?
        }
        None => body.to_vec(),
    };
    if bytes.is_empty() {
        return Err(PipelineError::Validation("no image in request body or source".into()).into());
    }

    let props = identify(&bytes, params.content_type.as_deref())?;
    let request = PipelineRequest {
        namespace,
        hash: ContentHash::of_bytes(&bytes),
        source: Some(SourceLocator::Bytes(bytes)),
        outputs,
        content_type: params.content_type,
    };
    state
        .orchestrator
        .run(&request, state.fetcher.as_ref())
        .await?
        .into_result()?;
    Ok(props)
}
