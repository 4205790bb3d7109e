//! Pipeline event notifications.
//!
//! The set of sinks is fixed when the [`EventBus`] is built at startup and is
//! handed to the orchestrator explicitly. A sink that panics is logged and
//! skipped; it never fails the request that emitted the event.

use prometheus::{
    register_counter_vec_with_registry, register_histogram_vec_with_registry, CounterVec, Encoder,
    HistogramVec, Registry, TextEncoder,
};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use crate::config::EventsConfig;

/// Something observable happened in the pipeline or the request layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Original fetched from its source and stored
    OriginalDownloaded { source: String, destination: String },
    /// Original could not be fetched or stored
    OriginalDownloadFailed { source: String },
    /// Original was already in storage
    OriginalDownloadSkipped { source: String },
    /// Derivative generated and stored
    ImageProcessed { format: String },
    /// Derivative already in storage
    ImageAlreadyProcessed { format: String },
    /// Derivative generation or upload failed
    ImageProcessedWithErrors { format: String },
    /// Every requested derivative was already in storage
    AllImagesAlreadyProcessed {
        namespace: String,
        hash: String,
        source: String,
    },
    /// A new original was posted
    ImagePosted,
    /// Posting a new original failed
    ImagePostingFailed,
    /// A request handler finished
    RequestLatency { handler: String, elapsed: Duration },
}

impl Event {
    /// Stable event name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::OriginalDownloaded { .. } => "OriginalDownloaded",
            Self::OriginalDownloadFailed { .. } => "OriginalDownloadFailed",
            Self::OriginalDownloadSkipped { .. } => "OriginalDownloadSkipped",
            Self::ImageProcessed { .. } => "ImageProcessed",
            Self::ImageAlreadyProcessed { .. } => "ImageAlreadyProcessed",
            Self::ImageProcessedWithErrors { .. } => "ImageProcessedWithErrors",
            Self::AllImagesAlreadyProcessed { .. } => "AllImagesAlreadyProcessed",
            Self::ImagePosted => "ImagePosted",
            Self::ImagePostingFailed => "ImagePostingFailed",
            Self::RequestLatency { .. } => "RequestLatency",
        }
    }
}

/// Receives pipeline events.
///
/// Called inline from the pipeline, so implementations should not block.
pub trait EventSink: Send + Sync {
    fn notify(&self, event: &Event);
}

/// Fan-out over the sinks registered at startup.
#[derive(Clone, Default)]
pub struct EventBus {
    sinks: Arc<Vec<Arc<dyn EventSink>>>,
}

impl EventBus {
    pub fn builder() -> EventBusBuilder {
        EventBusBuilder::default()
    }

    /// A bus with no sinks.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build the bus described by `[events]`, returning the metrics sink if enabled.
    pub fn from_config(
        config: &EventsConfig,
    ) -> Result<(Self, Option<Arc<MetricsSink>>), prometheus::Error> {
        let mut builder = Self::builder();
        if config.tracing {
            builder = builder.with(Arc::new(TracingSink));
        }
        let metrics = if config.metrics {
            Some(Arc::new(MetricsSink::new()?))
        } else {
            None
        };
        if let Some(metrics) = &metrics {
            builder = builder.with(metrics.clone());
        }
        Ok((builder.build(), metrics))
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    /// Deliver `event` to every sink.
    pub fn notify(&self, event: Event) {
        for sink in self.sinks.iter() {
            if catch_unwind(AssertUnwindSafe(|| sink.notify(&event))).is_err() {
                tracing::warn!(event = event.name(), "Event sink panicked; event dropped");
            }
        }
    }
}

/// Collects sinks before the bus is frozen.
#[derive(Default)]
pub struct EventBusBuilder {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl EventBusBuilder {
    pub fn with(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn build(self) -> EventBus {
        EventBus {
            sinks: Arc::new(self.sinks),
        }
    }
}

/// Logs every event as a structured `tracing` record.
pub struct TracingSink;

impl EventSink for TracingSink {
    fn notify(&self, event: &Event) {
        let name = event.name();
        match event {
            Event::OriginalDownloaded {
                source,
                destination,
            } => tracing::info!(event = name, %source, %destination, "Original downloaded"),
            Event::OriginalDownloadFailed { source } => {
                tracing::warn!(event = name, %source, "Original unavailable")
            }
            Event::OriginalDownloadSkipped { source } => {
                tracing::debug!(event = name, %source, "Original already stored")
            }
            Event::ImageProcessed { format } => {
                tracing::info!(event = name, %format, "Derivative generated")
            }
            Event::ImageAlreadyProcessed { format } => {
                tracing::debug!(event = name, %format, "Derivative already stored")
            }
            Event::ImageProcessedWithErrors { format } => {
                tracing::warn!(event = name, %format, "Derivative failed")
            }
            Event::AllImagesAlreadyProcessed {
                namespace,
                hash,
                source,
            } => tracing::debug!(event = name, %namespace, %hash, %source, "Nothing to generate"),
            Event::ImagePosted => tracing::debug!(event = name, "Image posted"),
            Event::ImagePostingFailed => tracing::warn!(event = name, "Image posting failed"),
            Event::RequestLatency { handler, elapsed } => tracing::debug!(
                event = name,
                %handler,
                elapsed_ms = elapsed.as_millis() as u64,
                "Request finished"
            ),
        }
    }
}

/// Prometheus metrics fed from pipeline events.
///
/// Every event increments `imgserve_events_total` with a `metric` label
/// holding the statsd-style name, e.g. `processing.version.ok_count`.
/// Per-format events also count a `.{format}`-suffixed name such as
/// `processing.version.ok.jpg_count`. Request latency is observed into the
/// fixed-bucket `imgserve_request_latency_seconds` histogram under
/// `{handler}.request_latency`.
#[derive(Clone)]
pub struct MetricsSink {
    registry: Registry,
    events: CounterVec,
    latency: HistogramVec,
}

impl MetricsSink {
    /// Create the metric families in a fresh registry.
    pub fn new() -> Result<Self, prometheus::Error> {
        Self::with_registry(Registry::new())
    }

    /// Register the metric families with an existing registry.
    pub fn with_registry(registry: Registry) -> Result<Self, prometheus::Error> {
        let events = register_counter_vec_with_registry!(
            "imgserve_events_total",
            "Pipeline and request events by statsd metric name",
            &["metric"],
            registry
        )?;
        let latency = register_histogram_vec_with_registry!(
            "imgserve_request_latency_seconds",
            "Request handler latency in seconds",
            &["metric"],
            registry
        )?;
        Ok(Self {
            registry,
            events,
            latency,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Current value of a counter (0 if never incremented).
    pub fn count(&self, metric: &str) -> u64 {
        self.events.with_label_values(&[metric]).get() as u64
    }

    /// Number of latency observations recorded under `metric`.
    pub fn latency_samples(&self, metric: &str) -> u64 {
        self.latency.with_label_values(&[metric]).get_sample_count()
    }

    /// Prometheus text exposition of every registered family.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buf)?;
        String::from_utf8(buf).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }

    fn track(&self, name: &str) {
        self.events
            .with_label_values(&[format!("{name}_count").as_str()])
            .inc();
    }

    fn track_format(&self, name: &str, format: &str) {
        self.track(name);
        self.track(&format!("{name}.{format}"));
    }
}

impl EventSink for MetricsSink {
    fn notify(&self, event: &Event) {
        match event {
            Event::ImagePosted => self.track("new_image.request"),
            Event::ImagePostingFailed => self.track("new_image.request_failed"),
            Event::ImageProcessed { format } => self.track_format("processing.version.ok", format),
            Event::ImageAlreadyProcessed { format } => {
                self.track_format("processing.version.noop", format)
            }
            Event::ImageProcessedWithErrors { format } => {
                self.track_format("processing.version.failed", format)
            }
            Event::AllImagesAlreadyProcessed { .. } => self.track("processing.versions.noop"),
            Event::OriginalDownloaded { .. } => self.track("fetch.original_downloaded"),
            Event::OriginalDownloadFailed { .. } => self.track("fetch.original_unavailable"),
            Event::OriginalDownloadSkipped { .. } => {
                self.track("fetch.original_download_skipped")
            }
            Event::RequestLatency { handler, elapsed } => self
                .latency
                .with_label_values(&[format!("{handler}.request_latency").as_str()])
                .observe(elapsed.as_secs_f64()),
        }
    }
}
