//! Voice response caching through the public API.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tempfile::TempDir;

use navloop::voice::{
    BoxFuture, ConnectivityMonitor, DiskResponseStore, MemoryResponseStore, OfflineCacheInterceptor, ResponseSource,
    ResponseStore, SharedConnectivity, SpeechClient, SpeechError, SpeechRequestBuilder,
    SpeechTransport, StoredResponse,
};

/// Transport that counts requests and fails while disconnected.
struct CountingTransport {
    calls: AtomicUsize,
    connectivity: SharedConnectivity,
}

impl SpeechTransport for CountingTransport {
    fn get(&self, url: &str) -> BoxFuture<'_, Result<Vec<u8>, SpeechError>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let result = if self.connectivity.is_connected() {
            Ok(format!("audio for {}", url).into_bytes())
        } else {
            Err(SpeechError::Http("network unreachable".to_string()))
        };
        Box::pin(async move { result })
    }
}

fn requests() -> SpeechRequestBuilder {
    SpeechRequestBuilder::new("https://api.example.com", "en-US", "tok").unwrap()
}

#[tokio::test]
async fn offline_serves_responses_within_max_stale() {
    let connectivity = SharedConnectivity::new(true);
    let transport = Arc::new(CountingTransport {
        calls: AtomicUsize::new(0),
        connectivity: connectivity.clone(),
    });
    let store = Arc::new(MemoryResponseStore::new(1024 * 1024));
    let client = SpeechClient::new(transport.clone(), store.clone())
        .with_fresh_for(Duration::from_secs(60))
        .with_interceptor(
            OfflineCacheInterceptor::new(Arc::new(connectivity.clone()))
                .with_max_stale(Duration::from_secs(3 * 24 * 3600)),
        );

    let request = requests().build("<speak>Turn left</speak>").unwrap();

    // Two days old: stale, but within the offline allowance
    let aged = Utc::now() - chrono::Duration::days(2);
    store
        .put(StoredResponse::stored_at(request.url.clone(), b"old".to_vec(), aged))
        .await
        .unwrap();

    connectivity.set_connected(false);
    let response = client.fetch(request.clone()).await.unwrap();
    assert_eq!(response.source, ResponseSource::StaleCache);
    assert_eq!(response.body, b"old");
    assert_eq!(transport.calls.load(Ordering::SeqCst), 0);

    // Online, a stale entry is refetched
    connectivity.set_connected(true);
    let response = client.fetch(request).await.unwrap();
    assert_eq!(response.source, ResponseSource::Network);
    assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn offline_past_max_stale_goes_to_network() {
    let connectivity = SharedConnectivity::new(false);
    let transport = Arc::new(CountingTransport {
        calls: AtomicUsize::new(0),
        connectivity: connectivity.clone(),
    });
    let store = Arc::new(MemoryResponseStore::new(1024 * 1024));
    let client = SpeechClient::new(transport.clone(), store.clone())
        .with_fresh_for(Duration::from_secs(60))
        .with_interceptor(OfflineCacheInterceptor::new(Arc::new(connectivity)));

    let request = requests().build("<speak>Keep right</speak>").unwrap();
    let aged = Utc::now() - chrono::Duration::days(4);
    store
        .put(StoredResponse::stored_at(request.url.clone(), b"old".to_vec(), aged))
        .await
        .unwrap();

    let result = client.fetch(request).await;
    assert!(matches!(result, Err(SpeechError::Http(_))));
    assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn disk_store_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let connectivity = SharedConnectivity::default();
    let transport = Arc::new(CountingTransport {
        calls: AtomicUsize::new(0),
        connectivity,
    });
    let request = requests().build("<speak>Arrive</speak>").unwrap();

    {
        let store = Arc::new(DiskResponseStore::open(dir.path(), 1024 * 1024).await.unwrap());
        let client = SpeechClient::new(transport.clone(), store);
        let first = client.fetch(request.clone()).await.unwrap();
        assert_eq!(first.source, ResponseSource::Network);
    }

    let store = Arc::new(DiskResponseStore::open(dir.path(), 1024 * 1024).await.unwrap());
    assert_eq!(store.urls(), vec![request.url.clone()]);

    let client = SpeechClient::new(transport.clone(), store);
    let second = client.fetch(request).await.unwrap();
    assert_eq!(second.source, ResponseSource::Cache);
    assert_eq!(transport.calls.load(Ordering::SeqCst), 1);

    assert_eq!(client.flush().await.unwrap(), 1);
    assert!(client.store().urls().is_empty());
}
