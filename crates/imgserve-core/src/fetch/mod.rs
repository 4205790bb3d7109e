//! Source fetching for originals that are not in storage yet.
//!
//! The fetcher owns its retry policy; the orchestrator calls it once.

pub mod retry;

use async_trait::async_trait;
use futures_util::StreamExt;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::{FetchConfig, LimitsConfig};
use crate::error::PipelineError;
use retry::{FailedAttempt, FailureKind, RetryPolicy};

/// Where to get an original's bytes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceLocator {
    /// Remote HTTP(S) URL
    Url(String),
    /// Local file
    Path(PathBuf),
    /// Bytes already received by the request layer
    Bytes(Vec<u8>),
}

impl fmt::Display for SourceLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Url(url) => f.write_str(url),
            Self::Path(path) => write!(f, "file://{}", path.display()),
            Self::Bytes(bytes) => write!(f, "<{} uploaded bytes>", bytes.len()),
        }
    }
}

/// Fetches original bytes from a [`SourceLocator`].
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    async fn fetch(&self, locator: &SourceLocator) -> Result<Vec<u8>, PipelineError>;
}

/// HTTP, file and in-memory fetching with timeouts, size limits and retries.
pub struct DefaultFetcher {
    client: reqwest::Client,
    options: FetchConfig,
    max_bytes: u64,
}

impl DefaultFetcher {
    pub fn new(options: FetchConfig, limits: &LimitsConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            options,
            max_bytes: limits.max_file_size_mb * 1024 * 1024,
        }
    }

    fn too_large(&self, size: u64) -> PipelineError {
        PipelineError::FileTooLarge {
            size_mb: size / (1024 * 1024),
            max_mb: self.max_bytes / (1024 * 1024),
        }
    }

    async fn fetch_url(&self, url: &str) -> Result<Vec<u8>, PipelineError> {
        let policy = RetryPolicy::from_config(&self.options);
        let timeout = Duration::from_millis(self.options.timeout_ms);
        let mut retries = 0;
        loop {
            let failure = match tokio::time::timeout(timeout, self.fetch_url_once(url)).await {
                Ok(Ok(bytes)) => return Ok(bytes),
                Ok(Err(failure)) => failure,
                Err(_) => FailedAttempt::new(
                    FailureKind::Timeout,
                    PipelineError::Timeout {
                        stage: "fetch".to_string(),
                        timeout_ms: self.options.timeout_ms,
                    },
                ),
            };

            let Some(delay) = policy.next_delay(retries, &failure) else {
                return Err(failure.error);
            };
            retries += 1;
            tracing::debug!(
                kind = ?failure.kind,
                "Retry {retries}/{} for {url} after {delay:?}: {}",
                policy.retries,
                failure.error
            );
            tokio::time::sleep(delay).await;
        }
    }

    async fn fetch_url_once(&self, url: &str) -> Result<Vec<u8>, FailedAttempt> {
        let transport = |e: reqwest::Error| {
            FailedAttempt::new(
                FailureKind::of_transport(&e),
                PipelineError::Fetch {
                    locator: url.to_string(),
                    message: e.to_string(),
                    status_code: e.status().map(|s| s.as_u16()),
                },
            )
        };

        let response = self.client.get(url).send().await.map_err(transport)?;
        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(FailedAttempt {
                kind: FailureKind::Status(status.as_u16()),
                error: PipelineError::Fetch {
                    locator: url.to_string(),
                    message: format!("HTTP {status}"),
                    status_code: Some(status.as_u16()),
                },
                retry_after,
            });
        }

        let too_large = |size: u64| FailedAttempt::new(FailureKind::TooLarge, self.too_large(size));
        if let Some(size) = response.content_length() {
            if size > self.max_bytes {
                return Err(too_large(size));
            }
        }

        let mut stream = response.bytes_stream();
        let mut body = Vec::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(transport)?;
            body.extend_from_slice(&chunk);
            if body.len() as u64 > self.max_bytes {
                return Err(too_large(body.len() as u64));
            }
        }
        Ok(body)
    }
}

#[async_trait]
impl SourceFetcher for DefaultFetcher {
    async fn fetch(&self, locator: &SourceLocator) -> Result<Vec<u8>, PipelineError> {
        match locator {
            SourceLocator::Url(url) => self.fetch_url(url).await,
            SourceLocator::Path(path) => {
                let metadata = tokio::fs::metadata(path).await.map_err(|e| {
                    if e.kind() == std::io::ErrorKind::NotFound {
                        PipelineError::FileNotFound(path.clone())
                    } else {
                        PipelineError::Io(e)
                    }
                })?;
                if metadata.len() > self.max_bytes {
                    return Err(self.too_large(metadata.len()));
                }
                Ok(tokio::fs::read(path).await?)
            }
            SourceLocator::Bytes(bytes) => {
                if bytes.len() as u64 > self.max_bytes {
                    return Err(self.too_large(bytes.len() as u64));
                }
                Ok(bytes.clone())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    const UNAVAILABLE: &str =
        "HTTP/1.1 503 Service Unavailable\r\nContent-Length: 0\r\nConnection: close\r\n\r\n";
    const NOT_FOUND: &str =
        "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n";
    const OK_ABC: &str = "HTTP/1.1 200 OK\r\nContent-Length: 3\r\nConnection: close\r\n\r\nabc";

    /// Answer one connection per canned response, in order.
    async fn origin(responses: Vec<&'static str>) -> (String, Arc<AtomicU32>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicU32::new(0));
        let counter = hits.clone();
        tokio::spawn(async move {
            for response in responses {
                let (mut socket, _) = listener.accept().await.unwrap();
                counter.fetch_add(1, Ordering::SeqCst);
                let mut buf = [0u8; 2048];
                let _ = socket.read(&mut buf).await;
                socket.write_all(response.as_bytes()).await.unwrap();
                let _ = socket.shutdown().await;
            }
        });
        (format!("http://{addr}/a.jpg"), hits)
    }

    fn quick_retries(retry_attempts: u32) -> DefaultFetcher {
        let options = FetchConfig {
            timeout_ms: 2000,
            retry_attempts,
            retry_delay_ms: 1,
        };
        DefaultFetcher::new(options, &LimitsConfig::default())
    }

    #[tokio::test]
    async fn test_server_error_is_retried_until_success() {
        let (url, hits) = origin(vec![UNAVAILABLE, OK_ABC]).await;
        let bytes = quick_retries(2).fetch(&SourceLocator::Url(url)).await.unwrap();
        assert_eq!(bytes, b"abc");
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_not_found_is_not_retried() {
        let (url, hits) = origin(vec![NOT_FOUND, OK_ABC]).await;
        let err = quick_retries(2)
            .fetch(&SourceLocator::Url(url))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Fetch {
                status_code: Some(404),
                ..
            }
        ));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_last_status_reported_when_retries_run_out() {
        let (url, hits) = origin(vec![UNAVAILABLE, UNAVAILABLE]).await;
        let err = quick_retries(1)
            .fetch(&SourceLocator::Url(url))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Fetch {
                status_code: Some(503),
                ..
            }
        ));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_oversized_body_is_not_retried() {
        let (url, hits) = origin(vec![OK_ABC, OK_ABC]).await;
        let limits = LimitsConfig {
            max_file_size_mb: 0,
            ..LimitsConfig::default()
        };
        let options = FetchConfig {
            timeout_ms: 2000,
            retry_attempts: 2,
            retry_delay_ms: 1,
        };
        let err = DefaultFetcher::new(options, &limits)
            .fetch(&SourceLocator::Url(url))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::FileTooLarge { .. }));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    fn fetcher() -> DefaultFetcher {
        DefaultFetcher::new(FetchConfig::default(), &LimitsConfig::default())
    }

    #[tokio::test]
    async fn test_fetch_bytes() {
        let bytes = fetcher()
            .fetch(&SourceLocator::Bytes(b"abc".to_vec()))
            .await
            .unwrap();
        assert_eq!(bytes, b"abc");
    }

    #[tokio::test]
    async fn test_fetch_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.jpg");
        std::fs::write(&path, b"jpeg-ish").unwrap();
        let bytes = fetcher().fetch(&SourceLocator::Path(path)).await.unwrap();
        assert_eq!(bytes, b"jpeg-ish");
    }

    #[tokio::test]
    async fn test_fetch_missing_path() {
        let dir = tempfile::tempdir().unwrap();
        let err = fetcher()
            .fetch(&SourceLocator::Path(dir.path().join("missing")))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::FileNotFound(_)));
    }

    #[tokio::test]
    async fn test_size_limit_applies_to_uploaded_bytes() {
        let limits = LimitsConfig {
            max_file_size_mb: 1,
            ..LimitsConfig::default()
        };
        let fetcher = DefaultFetcher::new(FetchConfig::default(), &limits);
        let err = fetcher
            .fetch(&SourceLocator::Bytes(vec![0u8; 1024 * 1024 + 1]))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::FileTooLarge { .. }));
    }

    #[tokio::test]
    async fn test_unreachable_url_fails_after_retries() {
        let options = FetchConfig {
            timeout_ms: 2000,
            retry_attempts: 1,
            retry_delay_ms: 1,
        };
        let fetcher = DefaultFetcher::new(options, &LimitsConfig::default());
        // Port 9 (discard) on localhost is almost never listening
        let err = fetcher
            .fetch(&SourceLocator::Url("http://127.0.0.1:9/a.jpg".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Fetch { .. } | PipelineError::Timeout { .. }
        ));
    }

    #[test]
    fn test_locator_display() {
        assert_eq!(
            SourceLocator::Url("https://x/y.png".into()).to_string(),
            "https://x/y.png"
        );
        assert_eq!(
            SourceLocator::Bytes(vec![1, 2, 3]).to_string(),
            "<3 uploaded bytes>"
        );
    }
}
