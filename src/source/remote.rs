use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use ahash::AHashMap;
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};

/// Read-only access to remote dataset files by URL.
///
/// Implementations return [`Error::Aborted`] once `cancel` fires and
/// [`Error::BundleFetch`] for any other failure.
#[async_trait]
pub trait RemoteSource: Debug + Send + Sync {
    async fn get(&self, url: &str, cancel: &CancellationToken) -> Result<Bytes>;
}

/// Remote files over HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: reqwest::Client,
}

impl HttpSource {
    pub fn new() -> Result<Self> {
        Self::with_timeout(Duration::from_secs(30))
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("tilesketch/", env!("CARGO_PKG_VERSION")))
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { client })
    }

    async fn send(&self, url: &str) -> Result<Bytes> {
        let response = self.client.get(url).send().await.map_err(|e| {
            warn!(url, error = %e, is_timeout = e.is_timeout(), "HTTP request failed");
            Error::BundleFetch(format!("Request to {url} failed: {e}"))
        })?;

        let status = response.status();
        debug!(url, status = status.as_u16(), "HTTP response received");
        let response = response.error_for_status()
            .map_err(|_| Error::BundleFetch(format!("HTTP {status} from {url}")))?;

        response.bytes().await
            .map_err(|e| Error::BundleFetch(format!("Failed to read response from {url}: {e}")))
    }
}

#[async_trait]
impl RemoteSource for HttpSource {
    async fn get(&self, url: &str, cancel: &CancellationToken) -> Result<Bytes> {
        trace!(url, "HTTP GET");
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Aborted),
            result = self.send(url) => result,
        }
    }
}

/// In-memory remote files keyed by URL, for offline use and tests.
///
/// Counts requests per URL and can simulate network latency.
#[derive(Debug, Default)]
pub struct MemSource {
    files: Mutex<AHashMap<String, Bytes>>,
    requests: Mutex<AHashMap<String, usize>>,
    latency: Option<Duration>,
}

impl MemSource {
    pub fn new() -> Self { Self::default() }

    /// Every `get` sleeps for `latency` before answering.
    pub fn with_latency(latency: Duration) -> Self {
        Self { latency: Some(latency), ..Self::default() }
    }

    pub fn insert(&self, url: impl Into<String>, bytes: impl Into<Bytes>) {
        self.files.lock().insert(url.into(), bytes.into());
    }

    pub fn remove(&self, url: &str) -> Option<Bytes> {
        self.files.lock().remove(url)
    }

    /// Number of `get` calls made for `url`, answered or not.
    pub fn requests(&self, url: &str) -> usize {
        self.requests.lock().get(url).copied().unwrap_or(0)
    }

    pub fn total_requests(&self) -> usize {
        self.requests.lock().values().sum()
    }

    pub fn into_shared(self) -> Arc<Self> { Arc::new(self) }
}

#[async_trait]
impl RemoteSource for MemSource {
    async fn get(&self, url: &str, cancel: &CancellationToken) -> Result<Bytes> {
        *self.requests.lock().entry(url.to_string()).or_default() += 1;

        if let Some(latency) = self.latency {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Aborted),
                _ = tokio::time::sleep(latency) => {}
            }
        }
        if cancel.is_cancelled() {
            return Err(Error::Aborted);
        }

        self.files.lock().get(url).cloned()
            .ok_or_else(|| Error::BundleFetch(format!("HTTP 404 Not Found from {url}")))
    }
}
