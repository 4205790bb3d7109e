//! Fetch-once, generate-missing, report-per-item orchestration.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;

use crate::config::Config;
use crate::error::PipelineError;
use crate::events::{Event, EventBus};
use crate::fetch::{SourceFetcher, SourceLocator};
use crate::identity::identify;
use crate::paths::{PathResolver, StorageKey};
use crate::storage::Storage;
use crate::transform::Transformer;
use crate::types::{ContentHash, Namespace, OutputSpec};

use super::report::{ItemReport, OriginalStatus, Outcome, PipelineReport};

/// Tuning for one orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    /// Maximum derivatives generated concurrently within one run
    pub parallel: usize,
    /// Per-derivative transform timeout in milliseconds
    pub transform_timeout_ms: u64,
}

impl OrchestratorOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            parallel: config.pipeline.parallel_workers,
            transform_timeout_ms: config.limits.transform_timeout_ms,
        }
    }
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Everything the request layer knows about one batch.
#[derive(Debug, Clone)]
pub struct PipelineRequest {
    pub namespace: Namespace,
    pub hash: ContentHash,
    /// Where to fetch the original if it is not stored; `None` when the
    /// caller expects it to be cached already
    pub source: Option<SourceLocator>,
    pub outputs: Vec<OutputSpec>,
    /// Content type for the sidecar when the original is not a raster format
    pub content_type: Option<String>,
}

/// Drives one batch of derivative requests against the storage and
/// transform ports.
///
/// Holds no per-request state, so a single instance can serve many
/// concurrent runs for different (namespace, hash) pairs.
pub struct Orchestrator {
    storage: Arc<dyn Storage>,
    transformer: Arc<dyn Transformer>,
    events: EventBus,
    options: OrchestratorOptions,
}

impl Orchestrator {
    pub fn new(
        storage: Arc<dyn Storage>,
        transformer: Arc<dyn Transformer>,
        events: EventBus,
        options: OrchestratorOptions,
    ) -> Self {
        Self {
            storage,
            transformer,
            events,
            options,
        }
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Run the pipeline for one batch.
    ///
    /// Returns `Err` only when the request is malformed or the original cannot
    /// be acquired; per-output failures are recorded in the report.
    pub async fn run(
        &self,
        request: &PipelineRequest,
        fetcher: &dyn SourceFetcher,
    ) -> Result<PipelineReport, PipelineError> {
        let start = Instant::now();
        let outputs = dedupe(&request.outputs);
        if outputs.is_empty() {
            return Err(PipelineError::Validation("no outputs requested".into()));
        }

        let ns = request.namespace.as_str();
        let hash = request.hash.as_str();
        let original_key = PathResolver::original(ns, hash)?;
        let keys = outputs
            .iter()
            .map(|spec| PathResolver::derivative(ns, hash, spec))
            .collect::<Result<Vec<_>, _>>()?;

        tracing::debug!(
            namespace = ns,
            hash,
            outputs = outputs.len(),
            "Processing batch"
        );

        // Phase 1
        let (original, original_status) =
            self.acquire_original(request, &original_key, fetcher).await?;
        let original = Arc::new(original);
        let phase1_time = start.elapsed();
        tracing::trace!("  Original: {:?}", phase1_time);

        // Phase 2
        let items = self.resolve_outputs(original, outputs, keys).await;

        // Phase 3
        let report = PipelineReport {
            original: original_status,
            items,
        };
        if report.all_already_present() {
            self.events.notify(Event::AllImagesAlreadyProcessed {
                namespace: ns.to_string(),
                hash: hash.to_string(),
                source: describe_source(request.source.as_ref()),
            });
        }

        tracing::debug!(
            namespace = ns,
            hash,
            generated = report.generated().count(),
            failed = report.failures().len(),
            "Processed batch in {:?}",
            start.elapsed()
        );
        Ok(report)
    }

    async fn acquire_original(
        &self,
        request: &PipelineRequest,
        key: &StorageKey,
        fetcher: &dyn SourceFetcher,
    ) -> Result<(Vec<u8>, OriginalStatus), PipelineError> {
        let source = describe_source(request.source.as_ref());
        let failed = |e: PipelineError| {
            self.events.notify(Event::OriginalDownloadFailed {
                source: source.clone(),
            });
            e
        };

        if self.storage.exists(key).await.map_err(|e| failed(e.into()))? {
            let bytes = self.storage.read(key).await.map_err(|e| failed(e.into()))?;
            self.events.notify(Event::OriginalDownloadSkipped {
                source: source.clone(),
            });
            return Ok((bytes, OriginalStatus::Skipped));
        }

        let locator = request.source.as_ref().ok_or_else(|| {
            failed(PipelineError::Fetch {
                locator: key.to_string(),
                message: "original is not stored and no source was given".to_string(),
                status_code: None,
            })
        })?;
        let bytes = fetcher.fetch(locator).await.map_err(|e| {
            tracing::warn!(%source, "Original fetch failed: {e}");
            failed(e)
        })?;

        let actual = ContentHash::of_bytes(&bytes);
        if actual != request.hash {
            tracing::warn!(%source, expected = %request.hash, %actual, "Original hash mismatch");
            return Err(failed(PipelineError::Fetch {
                locator: source.clone(),
                message: format!(
                    "content hash mismatch: expected {}, got {actual}",
                    request.hash
                ),
                status_code: None,
            }));
        }

        self.storage
            .write(key, &bytes)
            .await
            .map_err(|e| failed(e.into()))?;
        self.events.notify(Event::OriginalDownloaded {
            source,
            destination: key.to_string(),
        });

        self.write_sidecar(request, &bytes).await;
        Ok((bytes, OriginalStatus::Downloaded))
    }

    /// Store the original's properties next to it. Failures are only logged.
    async fn write_sidecar(&self, request: &PipelineRequest, bytes: &[u8]) {
        let props = match identify(bytes, request.content_type.as_deref()) {
            Ok(props) => props,
            Err(e) => {
                tracing::warn!(hash = %request.hash, "Cannot identify original: {e}");
                return;
            }
        };
        let written = async {
            let key = PathResolver::sidecar(request.namespace.as_str(), request.hash.as_str())?;
            let json = props
                .to_json()
                .map_err(|e| PipelineError::Validation(e.to_string()))?;
            self.storage.write(&key, json.as_bytes()).await?;
            Ok::<_, PipelineError>(())
        }
        .await;
        if let Err(e) = written {
            tracing::warn!(hash = %request.hash, "Cannot store sidecar: {e}");
        }
    }

    async fn resolve_outputs(
        &self,
        original: Arc<Vec<u8>>,
        outputs: Vec<OutputSpec>,
        keys: Vec<StorageKey>,
    ) -> Vec<ItemReport> {
        let semaphore = Arc::new(Semaphore::new(self.options.parallel.max(1)));
        let timeout = Duration::from_millis(self.options.transform_timeout_ms);
        let mut handles = Vec::with_capacity(outputs.len());

        for (spec, key) in outputs.into_iter().zip(keys) {
            let semaphore = semaphore.clone();
            let storage = self.storage.clone();
            let transformer = self.transformer.clone();
            let events = self.events.clone();
            let original = original.clone();
            let task_spec = spec.clone();
            let task_key = key.clone();

            let handle = tokio::spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return Outcome::Failed("worker pool closed".to_string()),
                };
                resolve_single(
                    storage.as_ref(),
                    transformer.as_ref(),
                    &events,
                    &original,
                    &task_spec,
                    &task_key,
                    timeout,
                )
                .await
            });
            handles.push((spec, key, handle));
        }

        let mut items = Vec::with_capacity(handles.len());
        for (spec, key, handle) in handles {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!(output = %spec, "Derivative task panicked: {e}");
                    self.events.notify(Event::ImageProcessedWithErrors {
                        format: spec.format_name().to_string(),
                    });
                    Outcome::Failed(format!("task failed: {e}"))
                }
            };
            items.push(ItemReport::new(&spec, key, outcome));
        }
        items
    }
}

/// Resolve one output: skip if stored, otherwise transform and upload.
async fn resolve_single(
    storage: &dyn Storage,
    transformer: &dyn Transformer,
    events: &EventBus,
    original: &[u8],
    spec: &OutputSpec,
    key: &StorageKey,
    timeout: Duration,
) -> Outcome {
    let format = spec.format_name().to_string();

    let result = async {
        if storage.exists(key).await? {
            return Ok(Outcome::AlreadyPresent);
        }
        let bytes = match tokio::time::timeout(timeout, transformer.transform(original, spec)).await
        {
            Ok(result) => result?,
            Err(_) => {
                return Err(PipelineError::Timeout {
                    stage: "transform".to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
        };
        storage.write(key, &bytes).await?;
        Ok::<_, PipelineError>(Outcome::Generated)
    }
    .await;

    match result {
        Ok(Outcome::AlreadyPresent) => {
            events.notify(Event::ImageAlreadyProcessed { format });
            Outcome::AlreadyPresent
        }
        Ok(outcome) => {
            events.notify(Event::ImageProcessed { format });
            outcome
        }
        Err(e) => {
            tracing::warn!(output = %spec, key = %key, "Derivative failed: {e}");
            events.notify(Event::ImageProcessedWithErrors { format });
            Outcome::Failed(e.to_string())
        }
    }
}

/// Drop repeated specs, keeping the first occurrence.
fn dedupe(outputs: &[OutputSpec]) -> Vec<OutputSpec> {
    let mut seen = HashSet::new();
    outputs
        .iter()
        .filter(|spec| seen.insert(spec.to_string()))
        .cloned()
        .collect()
}

fn describe_source(source: Option<&SourceLocator>) -> String {
    source
        .map(ToString::to_string)
        .unwrap_or_else(|| "<storage>".to_string())
}
