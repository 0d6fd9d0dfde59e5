use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("fetch failed: {0}")]
    Failed(String),
}

/// Abstraction over the registry download step.
/// Implementations take a validated receipt URL and return the raw response
/// bytes; charset handling happens downstream in the decoder.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

// ── Mock fetcher (always available, used for tests) ──────────────────────────

enum MockResponse {
    Bytes(Vec<u8>),
    Fail(String),
    /// Never resolves; models an in-flight download.
    Pending,
}

/// Returns preset bytes and counts invocations, useful for exercising the
/// lifecycle state machine without a registry.
pub struct MockFetcher {
    response: MockResponse,
    calls: AtomicU32,
}

impl MockFetcher {
    pub fn returning(bytes: impl Into<Vec<u8>>) -> Self {
        Self { response: MockResponse::Bytes(bytes.into()), calls: AtomicU32::new(0) }
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self { response: MockResponse::Fail(message.into()), calls: AtomicU32::new(0) }
    }

    pub fn pending() -> Self {
        Self { response: MockResponse::Pending, calls: AtomicU32::new(0) }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, _url: &str) -> Result<Vec<u8>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.response {
            MockResponse::Bytes(b) => Ok(b.clone()),
            MockResponse::Fail(m) => Err(FetchError::Failed(m.clone())),
            MockResponse::Pending => std::future::pending().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_returns_preset_bytes_and_counts() {
        let f = MockFetcher::returning(b"<RQ/>".to_vec());
        assert_eq!(f.fetch("https://anything").await.unwrap(), b"<RQ/>");
        assert_eq!(f.fetch("https://anything").await.unwrap(), b"<RQ/>");
        assert_eq!(f.calls(), 2);
    }

    #[tokio::test]
    async fn mock_failure_carries_message() {
        let f = MockFetcher::failing("timeout");
        let err = f.fetch("https://x").await.unwrap_err();
        assert_eq!(err.to_string(), "fetch failed: timeout");
    }
}
