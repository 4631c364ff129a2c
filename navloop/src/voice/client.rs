//! Cache-first speech client.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;

use super::interceptor::OfflineCacheInterceptor;
use super::request::SpeechRequest;
use super::store::{ResponseStore, StoredResponse};
use super::BoxFuture;

/// Default request timeout for the HTTP transport.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default freshness lifetime of a stored response.
pub const DEFAULT_FRESH_FOR: Duration = Duration::from_secs(24 * 60 * 60);

/// Errors from speech requests.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SpeechError {
    /// The endpoint URL is malformed.
    #[error("Invalid speech URL: {0}")]
    InvalidUrl(String),

    /// The HTTP request failed before a response arrived.
    #[error("HTTP error: {0}")]
    Http(String),

    /// The endpoint answered with a non-success status.
    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    /// The response store failed.
    #[error("Response store error: {0}")]
    Store(String),
}

/// Performs the network leg of a speech request.
pub trait SpeechTransport: Send + Sync {
    /// GET `url` and return the response body.
    fn get(&self, url: &str) -> BoxFuture<'_, Result<Vec<u8>, SpeechError>>;
}

/// HTTP transport using an async reqwest client.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Create a transport with the default 30 second timeout.
    pub fn new() -> Result<Self, SpeechError> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    /// Create a transport with a custom timeout.
    pub fn with_timeout(timeout: Duration) -> Result<Self, SpeechError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SpeechError::Http(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client })
    }
}

impl SpeechTransport for ReqwestTransport {
    fn get(&self, url: &str) -> BoxFuture<'_, Result<Vec<u8>, SpeechError>> {
        let url = url.to_string();
        Box::pin(async move {
            let response = self
                .client
                .get(&url)
                .send()
                .await
                .map_err(|e| SpeechError::Http(format!("Request failed: {}", e)))?;

            if !response.status().is_success() {
                return Err(SpeechError::Status {
                    status: response.status().as_u16(),
                    url,
                });
            }

            response
                .bytes()
                .await
                .map(|b| b.to_vec())
                .map_err(|e| SpeechError::Http(format!("Failed to read response: {}", e)))
        })
    }
}

/// Where a response was served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    /// Fetched over the network and stored.
    Network,
    /// Fresh stored response.
    Cache,
    /// Stale stored response accepted by the request's max-stale.
    StaleCache,
}

/// A served speech response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeechResponse {
    /// Canonical request URL.
    pub url: String,
    /// Audio bytes.
    pub body: Vec<u8>,
    /// Where the body came from.
    pub source: ResponseSource,
}

/// Cache-first speech client over a response store.
///
/// ```text
/// stored && age <= fresh_for                 ──► Cache
/// stored && age <= fresh_for + max_stale     ──► StaleCache
/// otherwise                                  ──► transport, then store
/// ```
pub struct SpeechClient {
    transport: Arc<dyn SpeechTransport>,
    store: Arc<dyn ResponseStore>,
    interceptor: Option<OfflineCacheInterceptor>,
    fresh_for: Duration,
}

impl std::fmt::Debug for SpeechClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpeechClient")
            .field("interceptor", &self.interceptor)
            .field("fresh_for", &self.fresh_for)
            .field("stored", &self.store.urls().len())
            .finish()
    }
}

impl SpeechClient {
    /// Create a client without an offline interceptor.
    pub fn new(transport: Arc<dyn SpeechTransport>, store: Arc<dyn ResponseStore>) -> Self {
        Self {
            transport,
            store,
            interceptor: None,
            fresh_for: DEFAULT_FRESH_FOR,
        }
    }

    /// Rewrite requests through `interceptor` before serving them.
    pub fn with_interceptor(mut self, interceptor: OfflineCacheInterceptor) -> Self {
        self.interceptor = Some(interceptor);
        self
    }

    /// Override the freshness lifetime of stored responses.
    pub fn with_fresh_for(mut self, fresh_for: Duration) -> Self {
        self.fresh_for = fresh_for;
        self
    }

    /// The backing response store.
    pub fn store(&self) -> &Arc<dyn ResponseStore> {
        &self.store
    }

    /// Serve `request` from the store when allowed, else from the network.
    pub async fn fetch(&self, request: SpeechRequest) -> Result<SpeechResponse, SpeechError> {
        let request = match &self.interceptor {
            Some(interceptor) => interceptor.intercept(request),
            None => request,
        };

        let cached = match self.store.get(&request.url).await {
            Ok(cached) => cached,
            Err(e) => {
                tracing::warn!(url = %request.url, error = %e, "Response store read failed");
                None
            }
        };

        if let Some(cached) = cached {
            let age = cached.age(Utc::now());
            if age <= self.fresh_for {
                return Ok(SpeechResponse {
                    url: request.url,
                    body: cached.body,
                    source: ResponseSource::Cache,
                });
            }
            if let Some(max_stale) = request.cache_control.max_stale {
                if age <= self.fresh_for + max_stale {
                    tracing::debug!(url = %request.url, age_s = age.as_secs(), "Serving stale response");
                    return Ok(SpeechResponse {
                        url: request.url,
                        body: cached.body,
                        source: ResponseSource::StaleCache,
                    });
                }
            }
        }

        let body = self.transport.get(&request.url).await?;
        if let Err(e) = self
            .store
            .put(StoredResponse::new(request.url.clone(), body.clone()))
            .await
        {
            tracing::warn!(url = %request.url, error = %e, "Failed to store response");
        }

        Ok(SpeechResponse {
            url: request.url,
            body,
            source: ResponseSource::Network,
        })
    }

    /// Remove one stored response.
    pub async fn remove(&self, url: &str) -> Result<bool, SpeechError> {
        self.store
            .remove(url)
            .await
            .map_err(|e| SpeechError::Store(e.to_string()))
    }

    /// Delete every stored response.
    pub async fn flush(&self) -> Result<usize, SpeechError> {
        self.store
            .clear()
            .await
            .map_err(|e| SpeechError::Store(e.to_string()))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::voice::{MemoryResponseStore, SharedConnectivity, SpeechRequestBuilder};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Transport with a scripted answer that counts calls.
    pub(crate) struct MockTransport {
        pub response: Result<Vec<u8>, SpeechError>,
        pub calls: AtomicUsize,
    }

    impl MockTransport {
        pub(crate) fn ok(body: &[u8]) -> Self {
            Self {
                response: Ok(body.to_vec()),
                calls: AtomicUsize::new(0),
            }
        }

        pub(crate) fn failing() -> Self {
            Self {
                response: Err(SpeechError::Http("connection refused".to_string())),
                calls: AtomicUsize::new(0),
            }
        }

        pub(crate) fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl SpeechTransport for MockTransport {
        fn get(&self, _url: &str) -> BoxFuture<'_, Result<Vec<u8>, SpeechError>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let response = self.response.clone();
            Box::pin(async move { response })
        }
    }

    fn request() -> SpeechRequest {
        SpeechRequestBuilder::new("https://api.example.com", "en", "tok")
            .unwrap()
            .build("<speak>Keep left</speak>")
            .unwrap()
    }

    #[tokio::test]
    async fn test_network_then_cache() {
        let transport = Arc::new(MockTransport::ok(b"mp3"));
        let store = Arc::new(MemoryResponseStore::new(1024));
        let client = SpeechClient::new(transport.clone(), store.clone());

        let first = client.fetch(request()).await.unwrap();
        let second = client.fetch(request()).await.unwrap();

        assert_eq!(first.source, ResponseSource::Network);
        assert_eq!(second.source, ResponseSource::Cache);
        assert_eq!(second.body, b"mp3".to_vec());
        assert_eq!(transport.calls(), 1);
        assert!(store.contains(&request().url));
    }

    #[tokio::test]
    async fn test_failure_is_not_stored() {
        let store = Arc::new(MemoryResponseStore::new(1024));
        let client = SpeechClient::new(Arc::new(MockTransport::failing()), store.clone());

        assert!(matches!(
            client.fetch(request()).await,
            Err(SpeechError::Http(_))
        ));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_offline_serves_stale_within_three_days() {
        let store = Arc::new(MemoryResponseStore::new(1024));
        let two_days_old = Utc::now() - chrono::Duration::days(2);
        store
            .put(StoredResponse::stored_at(request().url, b"old".to_vec(), two_days_old))
            .await
            .unwrap();

        let connectivity = SharedConnectivity::new(false);
        let transport = Arc::new(MockTransport::failing());
        let client = SpeechClient::new(transport.clone(), store)
            .with_interceptor(OfflineCacheInterceptor::new(Arc::new(connectivity.clone())));

        let response = client.fetch(request()).await.unwrap();
        assert_eq!(response.source, ResponseSource::StaleCache);
        assert_eq!(response.body, b"old".to_vec());
        assert_eq!(transport.calls(), 0);

        // Back online the stale entry is no longer acceptable
        connectivity.set_connected(true);
        assert!(client.fetch(request()).await.is_err());
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_offline_rejects_entries_beyond_max_stale() {
        let store = Arc::new(MemoryResponseStore::new(1024));
        let five_days_old = Utc::now() - chrono::Duration::days(5);
        store
            .put(StoredResponse::stored_at(request().url, b"old".to_vec(), five_days_old))
            .await
            .unwrap();

        let client = SpeechClient::new(Arc::new(MockTransport::failing()), store).with_interceptor(
            OfflineCacheInterceptor::new(Arc::new(SharedConnectivity::new(false))),
        );

        assert!(client.fetch(request()).await.is_err());
    }

    #[tokio::test]
    async fn test_flush_and_remove() {
        let store = Arc::new(MemoryResponseStore::new(1024));
        let client = SpeechClient::new(Arc::new(MockTransport::ok(b"x")), store.clone());
        client.fetch(request()).await.unwrap();

        assert!(client.remove(&request().url).await.unwrap());
        client.fetch(request()).await.unwrap();
        assert_eq!(client.flush().await.unwrap(), 1);
        assert!(store.is_empty());
    }
}
