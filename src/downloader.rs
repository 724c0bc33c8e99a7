//! Index blob download
//!
//! Learns the blob size from a HEAD request, then streams the body into
//! memory, reporting progress after every chunk read. Size is mandatory:
//! a source that cannot state its length fails instead of reporting
//! indeterminate progress.

use crate::config::ClientConfig;
use crate::error::ClientError;
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::future::Future;
use tokio::sync::watch;
use tracing::{debug, info};

pub type ByteStream = BoxStream<'static, Result<Bytes, ClientError>>;

/// Where the index blob comes from
#[async_trait]
pub trait IndexSource: Send + Sync {
    /// Declared size of the blob, `None` when the source does not say
    async fn content_length(&self) -> Result<Option<u64>, ClientError>;

    /// Stream the blob body
    async fn open(&self) -> Result<ByteStream, ClientError>;
}

/// `HEAD`/`GET` against a fixed URL
pub struct HttpIndexSource {
    client: reqwest::Client,
    url: String,
}

impl HttpIndexSource {
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .timeout(config.download_timeout())
            .build()?;
        Ok(Self::with_client(client, &config.index_url))
    }

    pub fn with_client(client: reqwest::Client, url: &str) -> Self {
        Self {
            client,
            url: url.to_string(),
        }
    }
}

#[async_trait]
impl IndexSource for HttpIndexSource {
    async fn content_length(&self) -> Result<Option<u64>, ClientError> {
        let response = self.client.head(&self.url).send().await?;
        if !response.status().is_success() {
            return Err(ClientError::Download(format!(
                "HEAD {} failed: HTTP {}",
                self.url,
                response.status()
            )));
        }
        // reqwest's content_length() reports the body size of a HEAD response, which is zero
        let length = response
            .headers()
            .get(reqwest::header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        Ok(length)
    }

    async fn open(&self) -> Result<ByteStream, ClientError> {
        let response = self.client.get(&self.url).send().await?;
        if !response.status().is_success() {
            return Err(ClientError::Download(format!(
                "GET {} failed: HTTP {}",
                self.url,
                response.status()
            )));
        }
        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map_err(ClientError::from))
            .boxed())
    }
}

/// Progress sent to observers of an index download
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadProgress {
    pub bytes_downloaded: u64,
    pub total_bytes: u64,
    pub state: DownloadState,
}

impl DownloadProgress {
    pub fn new(state: DownloadState, bytes_downloaded: u64, total_bytes: u64) -> Self {
        Self {
            bytes_downloaded,
            total_bytes,
            state,
        }
    }

    /// Fraction in `[0, 1]`
    pub fn fraction(&self) -> f64 {
        if self.total_bytes == 0 {
            return 0.0;
        }
        (self.bytes_downloaded as f64 / self.total_bytes as f64).min(1.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DownloadState {
    Starting,
    Downloading,
    Persisting,
    Initializing,
    Completed,
    Failed,
    Cancelled,
}

/// Check `bytes` against a hex SHA-256, accepting an optional `sha256:` prefix
pub fn verify_sha256(bytes: &[u8], expected_hash: &str) -> bool {
    let expected = expected_hash.strip_prefix("sha256:").unwrap_or(expected_hash);
    let actual = hex::encode(Sha256::digest(bytes));
    actual.eq_ignore_ascii_case(expected.trim())
}

/// Marker error for an abandoned download
#[derive(Debug)]
pub struct DownloadCancelled;

impl std::fmt::Display for DownloadCancelled {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Download cancelled")
    }
}

impl std::error::Error for DownloadCancelled {}

/// Download the whole blob into memory.
///
/// `on_progress` runs after every chunk with the running byte count.
/// Fails when the length is unknown, zero or too large to buffer, when the
/// stream delivers a different number of bytes than declared, when the hash
/// does not match, or as soon as `cancel` flips to true, even while a read
/// is stalled (with a [`DownloadCancelled`] root cause).
pub async fn download_index(
    source: &dyn IndexSource,
    expected_sha256: Option<&str>,
    cancel: &watch::Receiver<bool>,
    mut on_progress: impl FnMut(DownloadProgress),
) -> Result<Vec<u8>> {
    let mut cancel = cancel.clone();

    let total = or_cancel(&mut cancel, source.content_length())
        .await?
        .context("Failed to read index size")?
        .filter(|len| *len > 0)
        .ok_or_else(|| anyhow!("Index source did not declare a content length"))?;
    let capacity = usize::try_from(total).context("Index does not fit in memory")?;

    let mut buffer: Vec<u8> = Vec::new();
    buffer
        .try_reserve_exact(capacity)
        .with_context(|| format!("Index of {} bytes does not fit in memory", total))?;

    info!(total, "Downloading index");
    on_progress(DownloadProgress::new(DownloadState::Starting, 0, total));

    let mut stream = or_cancel(&mut cancel, source.open())
        .await?
        .context("Failed to start index download")?;

    while let Some(chunk) = or_cancel(&mut cancel, stream.next()).await? {
        let chunk = chunk.context("Error reading index chunk")?;
        if buffer.len() as u64 + chunk.len() as u64 > total {
            bail!("Index stream exceeded declared length of {} bytes", total);
        }
        buffer.extend_from_slice(&chunk);

        on_progress(DownloadProgress::new(
            DownloadState::Downloading,
            buffer.len() as u64,
            total,
        ));
    }

    if buffer.len() as u64 != total {
        bail!(
            "Downloaded index size mismatch: expected {}, got {}",
            total,
            buffer.len()
        );
    }

    if let Some(expected) = expected_sha256 {
        if !verify_sha256(&buffer, expected) {
            bail!("Hash verification failed for index");
        }
        debug!("Index hash verified");
    }

    Ok(buffer)
}

/// Run `fut` unless `cancel` is or becomes true first
async fn or_cancel<T>(cancel: &mut watch::Receiver<bool>, fut: impl Future<Output = T>) -> Result<T> {
    tokio::select! {
        biased;
        _ = cancelled(cancel) => Err(DownloadCancelled.into()),
        out = fut => Ok(out),
    }
}

async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    // A dropped sender can never cancel
    let closed = cancel.wait_for(|c| *c).await.is_err();
    if closed {
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use futures_util::stream;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// In-memory source serving `reads` chunks of `chunk` bytes, optionally
    /// failing after `fail_after` reads
    pub(crate) struct ChunkedSource {
        pub reads: usize,
        pub chunk: usize,
        pub declared: Option<u64>,
        pub fail_after: Option<usize>,
        pub opens: AtomicUsize,
    }

    impl ChunkedSource {
        pub(crate) fn new(reads: usize, chunk: usize) -> Self {
            Self {
                reads,
                chunk,
                declared: Some((reads * chunk) as u64),
                fail_after: None,
                opens: AtomicUsize::new(0),
            }
        }

        pub(crate) fn bytes(&self) -> Vec<u8> {
            (0..self.reads * self.chunk).map(|i| (i % 7) as u8).collect()
        }
    }

    #[async_trait]
    impl IndexSource for ChunkedSource {
        async fn content_length(&self) -> Result<Option<u64>, ClientError> {
            Ok(self.declared)
        }

        async fn open(&self) -> Result<ByteStream, ClientError> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            let bytes = self.bytes();
            let chunk = self.chunk;
            let fail_after = self.fail_after;
            let items: Vec<Result<Bytes, ClientError>> = (0..self.reads)
                .map(|i| {
                    if fail_after == Some(i) {
                        Err(ClientError::Network("connection reset".to_string()))
                    } else {
                        Ok(Bytes::copy_from_slice(&bytes[i * chunk..(i + 1) * chunk]))
                    }
                })
                .collect();
            Ok(stream::iter(items).boxed())
        }
    }

    pub(crate) fn no_cancel() -> watch::Receiver<bool> {
        watch::channel(false).1
    }

    #[tokio::test]
    async fn test_progress_is_monotonic_tenths() {
        let source = ChunkedSource::new(10, 100);
        let mut seen = Vec::new();
        let bytes = download_index(&source, None, &no_cancel(), |p| {
            if p.state == DownloadState::Downloading {
                seen.push(p.fraction());
            }
        })
        .await
        .unwrap();

        assert_eq!(bytes, source.bytes());
        let expected: Vec<f64> = (1..=10).map(|i| i as f64 / 10.0).collect();
        assert_eq!(seen.len(), 10);
        for (got, want) in seen.iter().zip(&expected) {
            assert!((got - want).abs() < 1e-9, "{} != {}", got, want);
        }
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
    }

    #[tokio::test]
    async fn test_unknown_length_fails_before_streaming() {
        let mut source = ChunkedSource::new(2, 10);
        source.declared = None;
        assert!(download_index(&source, None, &no_cancel(), |_| {}).await.is_err());
        assert_eq!(source.opens.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_length_mismatch_fails() {
        let mut source = ChunkedSource::new(2, 10);
        source.declared = Some(25);
        assert!(download_index(&source, None, &no_cancel(), |_| {}).await.is_err());

        source.declared = Some(15);
        assert!(download_index(&source, None, &no_cancel(), |_| {}).await.is_err());
    }

    #[tokio::test]
    async fn test_stream_error_propagates() {
        let mut source = ChunkedSource::new(10, 100);
        source.fail_after = Some(3);
        let mut reads = 0;
        let result = download_index(&source, None, &no_cancel(), |p| {
            if p.state == DownloadState::Downloading {
                reads += 1;
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(reads, 3);
    }

    #[tokio::test]
    async fn test_cancel_is_reported_as_cancelled() {
        let source = ChunkedSource::new(3, 10);
        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();
        let err = download_index(&source, None, &rx, |_| {}).await.unwrap_err();
        assert!(err.downcast_ref::<DownloadCancelled>().is_some());
    }

    /// Serves one chunk of a larger declared blob, then never sends again
    struct StalledSource;

    #[async_trait]
    impl IndexSource for StalledSource {
        async fn content_length(&self) -> Result<Option<u64>, ClientError> {
            Ok(Some(100))
        }

        async fn open(&self) -> Result<ByteStream, ClientError> {
            let first: Result<Bytes, ClientError> = Ok(Bytes::from_static(&[0; 10]));
            Ok(stream::iter(vec![first]).chain(stream::pending()).boxed())
        }
    }

    #[tokio::test]
    async fn test_cancel_interrupts_stalled_read() {
        let (tx, rx) = watch::channel(false);
        let mut received = 0;
        let download = download_index(&StalledSource, None, &rx, |p| received = p.bytes_downloaded);
        let cancel = async {
            tokio::task::yield_now().await;
            tx.send(true).unwrap();
        };

        let (result, ()) = tokio::time::timeout(Duration::from_secs(2), async { tokio::join!(download, cancel) })
            .await
            .expect("cancel did not interrupt the stalled read");
        assert!(result.unwrap_err().downcast_ref::<DownloadCancelled>().is_some());
        assert_eq!(received, 10);
    }

    #[tokio::test]
    async fn test_absurd_length_fails_without_reading() {
        let mut source = ChunkedSource::new(1, 10);
        source.declared = Some(u64::MAX / 2 + 10);
        let err = download_index(&source, None, &no_cancel(), |_| {}).await.unwrap_err();
        assert!(format!("{:#}", err).contains("does not fit in memory"));
        assert_eq!(source.opens.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_hash_check() {
        let source = ChunkedSource::new(1, 4);
        let good = hex::encode(Sha256::digest(source.bytes()));
        assert!(download_index(&source, Some(&format!("sha256:{}", good)), &no_cancel(), |_| {})
            .await
            .is_ok());
        assert!(download_index(&source, Some("00"), &no_cancel(), |_| {}).await.is_err());
    }

    #[test]
    fn test_fraction_caps_and_handles_zero() {
        assert_eq!(DownloadProgress::new(DownloadState::Downloading, 5, 0).fraction(), 0.0);
        assert_eq!(DownloadProgress::new(DownloadState::Downloading, 50, 100).fraction(), 0.5);
    }
}
