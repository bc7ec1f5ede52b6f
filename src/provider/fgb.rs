use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::geom::BBox;
use crate::io::read_from_fgb_bytes;
use crate::source::RemoteSource;
use crate::types::Feature;

/// Attempts and linear backoff for whole-file loads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Wait after failed attempt `n` is `backoff * n`.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3, backoff: Duration::from_millis(250) }
    }
}

impl RetryPolicy {
    #[inline]
    pub fn delay(&self, attempt: u32) -> Duration { self.backoff * attempt }
}

async fn load_once(source: &dyn RemoteSource, url: &str, bbox: &BBox) -> Result<Vec<Feature>> {
    let bytes = source.get(url, &CancellationToken::new()).await?;
    read_from_fgb_bytes(&bytes, Some(bbox)).map_err(Error::decode)
}

/// Features of the FlatGeobuf at `url` intersecting `bbox` (the whole world
/// when `None`), retried with the default [`RetryPolicy`].
pub async fn load_fgb(source: &dyn RemoteSource, url: &str, bbox: Option<&BBox>) -> Result<Vec<Feature>> {
    load_fgb_with_retry(source, url, bbox, &RetryPolicy::default()).await
}

/// [`load_fgb`] with an explicit retry policy. Fails with
/// [`Error::BundleFetch`] once every attempt has failed.
pub async fn load_fgb_with_retry(
    source: &dyn RemoteSource,
    url: &str,
    bbox: Option<&BBox>,
    policy: &RetryPolicy,
) -> Result<Vec<Feature>> {
    let bbox = bbox.copied().unwrap_or(BBox::WORLD);
    let max_attempts = policy.max_attempts.max(1);
    debug!(url, ?bbox, "loading FlatGeobuf");

    let mut attempt = 0;
    loop {
        attempt += 1;
        match load_once(source, url, &bbox).await {
            Ok(features) => return Ok(features),
            Err(e) if e.is_aborted() => return Err(e),
            Err(e) if attempt >= max_attempts => {
                return Err(Error::BundleFetch(format!("Failed to load FGB after {max_attempts} attempts: {e}")));
            }
            Err(e) => {
                let wait = policy.delay(attempt);
                warn!(url, attempt, wait_ms = wait.as_millis() as u64, error = %e, "FlatGeobuf load failed, retrying");
                tokio::time::sleep(wait).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::fgb::tests::write_fgb;
    use crate::source::MemSource;
    use async_trait::async_trait;
    use bytes::Bytes;
    use geo::{polygon, MultiPolygon};
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn squares() -> Vec<u8> {
        let square = |x: f64| MultiPolygon(vec![polygon![
            (x: x, y: 0.0), (x: x + 1.0, y: 0.0), (x: x + 1.0, y: 1.0), (x: x, y: 1.0)
        ]]);
        write_fgb(&[square(0.0), square(10.0)])
    }

    /// Fails the first `failures` requests, then serves `inner`.
    #[derive(Debug)]
    struct Flaky {
        inner: MemSource,
        failures: Mutex<u32>,
    }

    #[async_trait]
    impl RemoteSource for Flaky {
        async fn get(&self, url: &str, cancel: &CancellationToken) -> Result<Bytes> {
            {
                let mut failures = self.failures.lock();
                if *failures > 0 {
                    *failures -= 1;
                    return Err(Error::BundleFetch("connection reset".into()));
                }
            }
            self.inner.get(url, cancel).await
        }
    }

    #[tokio::test]
    async fn loads_all_or_bbox_filtered_features() {
        let source = MemSource::new();
        source.insert("mem://reefs.fgb", squares());

        assert_eq!(load_fgb(&source, "mem://reefs.fgb", None).await.unwrap().len(), 2);
        let near = load_fgb(&source, "mem://reefs.fgb", Some(&BBox::new(9.5, 0.0, 12.0, 1.0))).await.unwrap();
        assert_eq!(near.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_with_linear_backoff() {
        let flaky = Arc::new(Flaky { inner: MemSource::new(), failures: Mutex::new(2) });
        flaky.inner.insert("mem://reefs.fgb", squares());

        let started = tokio::time::Instant::now();
        let features = load_fgb(flaky.as_ref(), "mem://reefs.fgb", None).await.unwrap();
        assert_eq!(features.len(), 2);
        // 250 ms after the first failure, 500 ms after the second
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(750) && elapsed < Duration::from_secs(1), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts() {
        let source = MemSource::new();
        let err = load_fgb(&source, "mem://missing.fgb", None).await.unwrap_err();

        assert!(matches!(&err, Error::BundleFetch(msg) if msg.starts_with("Failed to load FGB after 3 attempts")));
        assert_eq!(source.requests("mem://missing.fgb"), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn undecodable_files_are_retried_too() {
        let source = MemSource::new();
        source.insert("mem://bad.fgb", Bytes::from_static(b"garbage"));
        let policy = RetryPolicy { max_attempts: 2, ..Default::default() };

        assert!(load_fgb_with_retry(&source, "mem://bad.fgb", None, &policy).await.is_err());
        assert_eq!(source.requests("mem://bad.fgb"), 2);
    }
}
