//! Bounded storage for synthesized instruction audio.
//!
//! # File Layout
//!
//! The disk store keeps two files per response in a flat directory:
//!
//! ```text
//! {cache_dir}/{sha256(url)}.body   raw audio bytes
//! {cache_dir}/{sha256(url)}.meta   JSON: url, stored_at, size
//! ```
//!
//! A moka index weighted by body size enforces the byte budget, evicting the
//! least recently used responses first. When moka evicts for size, its
//! listener deletes the evicted files.

use std::collections::VecDeque;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use moka::future::Cache as MokaCache;
use moka::notification::RemovalCause;
use moka::policy::EvictionPolicy;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use super::BoxFuture;

const BODY_EXTENSION: &str = "body";
const META_EXTENSION: &str = "meta";

/// Errors from a response store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// I/O error reading or writing stored files.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Stored metadata could not be encoded or decoded.
    #[error("Invalid metadata: {0}")]
    Metadata(#[from] serde_json::Error),

    /// A single response exceeds the whole store budget.
    #[error("Response too large: {size} bytes (max: {max})")]
    TooLarge { size: u64, max: u64 },
}

/// A stored response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredResponse {
    /// Canonical request URL.
    pub url: String,
    /// Response body.
    pub body: Vec<u8>,
    /// When the response was stored.
    pub stored_at: DateTime<Utc>,
}

impl StoredResponse {
    /// Create a response stored now.
    pub fn new(url: impl Into<String>, body: Vec<u8>) -> Self {
        Self::stored_at(url, body, Utc::now())
    }

    /// Create a response with an explicit storage time.
    pub fn stored_at(url: impl Into<String>, body: Vec<u8>, stored_at: DateTime<Utc>) -> Self {
        Self {
            url: url.into(),
            body,
            stored_at,
        }
    }

    /// Age of the response at `now`, zero if stored in the future.
    pub fn age(&self, now: DateTime<Utc>) -> std::time::Duration {
        (now - self.stored_at).to_std().unwrap_or_default()
    }

    /// Body size in bytes.
    pub fn size(&self) -> u64 {
        self.body.len() as u64
    }
}

/// Storage of response bodies keyed by canonical URL.
///
/// Implementations must be `Send + Sync`; prefetch tasks and eviction tasks
/// use the store concurrently.
pub trait ResponseStore: Send + Sync {
    /// Store a response, replacing any previous entry for the URL.
    fn put(&self, response: StoredResponse) -> BoxFuture<'_, Result<(), StoreError>>;

    /// Look up a response by URL.
    fn get(&self, url: &str) -> BoxFuture<'_, Result<Option<StoredResponse>, StoreError>>;

    /// Remove a response. Returns whether it was present.
    fn remove(&self, url: &str) -> BoxFuture<'_, Result<bool, StoreError>>;

    /// Delete every stored response. Returns how many were removed.
    fn clear(&self) -> BoxFuture<'_, Result<usize, StoreError>>;

    /// URLs currently stored.
    fn urls(&self) -> Vec<String>;

    /// Total size of stored bodies in bytes.
    fn size_bytes(&self) -> u64;

    /// Byte budget of the store.
    fn max_size_bytes(&self) -> u64;
}

#[derive(Debug, Clone)]
struct IndexEntry {
    hash: String,
    size: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct ResponseMeta {
    url: String,
    stored_at: DateTime<Utc>,
    size: u64,
}

/// Hex SHA-256 of a URL, used as the file stem.
fn url_hash(url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn entry_path(dir: &Path, hash: &str, extension: &str) -> PathBuf {
    dir.join(format!("{}.{}", hash, extension))
}

fn remove_entry_files_sync(dir: &Path, hash: &str) {
    for extension in [BODY_EXTENSION, META_EXTENSION] {
        let path = entry_path(dir, hash, extension);
        if let Err(e) = std::fs::remove_file(&path) {
            if e.kind() != io::ErrorKind::NotFound {
                tracing::warn!(path = %path.display(), error = %e, "Failed to delete evicted response");
            }
        }
    }
}

async fn remove_entry_files(dir: &Path, hash: &str) -> Result<(), StoreError> {
    for extension in [BODY_EXTENSION, META_EXTENSION] {
        match tokio::fs::remove_file(entry_path(dir, hash, extension)).await {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

/// Disk-backed response store bounded by a byte budget.
pub struct DiskResponseStore {
    directory: PathBuf,
    index: MokaCache<String, IndexEntry>,
    max_size_bytes: u64,
}

impl std::fmt::Debug for DiskResponseStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiskResponseStore")
            .field("directory", &self.directory)
            .field("entries", &self.index.entry_count())
            .field("max_size_bytes", &self.max_size_bytes)
            .finish()
    }
}

impl DiskResponseStore {
    /// Open (or create) a store in `directory`.
    ///
    /// Existing entries are re-indexed oldest first; orphaned or unreadable
    /// files are deleted.
    pub async fn open(
        directory: impl Into<PathBuf>,
        max_size_bytes: u64,
    ) -> Result<Self, StoreError> {
        let directory = directory.into();
        tokio::fs::create_dir_all(&directory).await?;

        let listener_dir = directory.clone();
        let index = MokaCache::builder()
            .weigher(|_url: &String, entry: &IndexEntry| -> u32 {
                entry.size.min(u32::MAX as u64) as u32
            })
            .max_capacity(max_size_bytes)
            .eviction_policy(EvictionPolicy::lru())
            .eviction_listener(move |url: Arc<String>, entry: IndexEntry, cause| {
                if cause == RemovalCause::Size {
                    tracing::debug!(url = %url, size = entry.size, "Evicting response over budget");
                    remove_entry_files_sync(&listener_dir, &entry.hash);
                }
            })
            .build();

        let store = Self {
            directory,
            index,
            max_size_bytes,
        };
        let restored = store.reindex().await?;
        if restored > 0 {
            tracing::info!(
                directory = %store.directory.display(),
                entries = restored,
                size_bytes = store.size_bytes(),
                "Restored voice response store"
            );
        }
        Ok(store)
    }

    /// Directory holding the stored files.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    async fn reindex(&self) -> Result<usize, StoreError> {
        let mut metas = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.directory).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(META_EXTENSION) {
                continue;
            }
            let Some(hash) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string) else {
                continue;
            };

            let meta = tokio::fs::read(&path)
                .await
                .ok()
                .and_then(|bytes| serde_json::from_slice::<ResponseMeta>(&bytes).ok());
            let body_exists = tokio::fs::try_exists(entry_path(&self.directory, &hash, BODY_EXTENSION))
                .await
                .unwrap_or(false);

            match meta {
                Some(meta) if body_exists && url_hash(&meta.url) == hash => metas.push((hash, meta)),
                _ => {
                    tracing::debug!(path = %path.display(), "Dropping unreadable stored response");
                    remove_entry_files(&self.directory, &hash).await?;
                }
            }
        }

        metas.sort_by_key(|(_, meta)| meta.stored_at);
        let restored = metas.len();
        for (hash, meta) in metas {
            self.index
                .insert(meta.url, IndexEntry { hash, size: meta.size })
                .await;
        }
        self.index.run_pending_tasks().await;
        Ok(restored)
    }
}

impl ResponseStore for DiskResponseStore {
    fn put(&self, response: StoredResponse) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(async move {
            let size = response.size();
            if size > self.max_size_bytes {
                return Err(StoreError::TooLarge {
                    size,
                    max: self.max_size_bytes,
                });
            }

            let hash = url_hash(&response.url);
            let meta = ResponseMeta {
                url: response.url.clone(),
                stored_at: response.stored_at,
                size,
            };
            tokio::fs::write(entry_path(&self.directory, &hash, BODY_EXTENSION), &response.body)
                .await?;
            tokio::fs::write(
                entry_path(&self.directory, &hash, META_EXTENSION),
                serde_json::to_vec(&meta)?,
            )
            .await?;

            self.index.insert(response.url, IndexEntry { hash, size }).await;
            self.index.run_pending_tasks().await;
            Ok(())
        })
    }

    fn get(&self, url: &str) -> BoxFuture<'_, Result<Option<StoredResponse>, StoreError>> {
        let url = url.to_string();
        Box::pin(async move {
            let Some(entry) = self.index.get(&url).await else {
                return Ok(None);
            };

            let meta = match tokio::fs::read(entry_path(&self.directory, &entry.hash, META_EXTENSION)).await {
                Ok(bytes) => serde_json::from_slice::<ResponseMeta>(&bytes)?,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    self.index.invalidate(&url).await;
                    return Ok(None);
                }
                Err(e) => return Err(e.into()),
            };
            let body = match tokio::fs::read(entry_path(&self.directory, &entry.hash, BODY_EXTENSION)).await {
                Ok(body) => body,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    self.index.invalidate(&url).await;
                    return Ok(None);
                }
                Err(e) => return Err(e.into()),
            };

            Ok(Some(StoredResponse::stored_at(meta.url, body, meta.stored_at)))
        })
    }

    fn remove(&self, url: &str) -> BoxFuture<'_, Result<bool, StoreError>> {
        let url = url.to_string();
        Box::pin(async move {
            let Some(entry) = self.index.remove(&url).await else {
                return Ok(false);
            };
            remove_entry_files(&self.directory, &entry.hash).await?;
            Ok(true)
        })
    }

    fn clear(&self) -> BoxFuture<'_, Result<usize, StoreError>> {
        Box::pin(async move {
            let removed = self.index.entry_count() as usize;
            self.index.invalidate_all();
            self.index.run_pending_tasks().await;

            let mut entries = tokio::fs::read_dir(&self.directory).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                let ours = matches!(
                    path.extension().and_then(|e| e.to_str()),
                    Some(BODY_EXTENSION) | Some(META_EXTENSION)
                );
                if ours {
                    tokio::fs::remove_file(&path).await?;
                }
            }

            tracing::info!(directory = %self.directory.display(), removed, "Flushed voice response store");
            Ok(removed)
        })
    }

    fn urls(&self) -> Vec<String> {
        self.index.iter().map(|(url, _)| url.as_ref().clone()).collect()
    }

    fn size_bytes(&self) -> u64 {
        self.index.weighted_size()
    }

    fn max_size_bytes(&self) -> u64 {
        self.max_size_bytes
    }
}

/// In-memory response store, oldest entries dropped first when over budget.
#[derive(Debug)]
pub struct MemoryResponseStore {
    entries: Mutex<VecDeque<StoredResponse>>,
    max_size_bytes: u64,
}

impl MemoryResponseStore {
    /// Create an empty store with the given budget.
    pub fn new(max_size_bytes: u64) -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            max_size_bytes,
        }
    }

    /// Number of stored responses.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Whether a response for `url` is stored.
    pub fn contains(&self, url: &str) -> bool {
        self.entries.lock().iter().any(|r| r.url == url)
    }
}

impl ResponseStore for MemoryResponseStore {
    fn put(&self, response: StoredResponse) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(async move {
            let size = response.size();
            if size > self.max_size_bytes {
                return Err(StoreError::TooLarge {
                    size,
                    max: self.max_size_bytes,
                });
            }

            let mut entries = self.entries.lock();
            entries.retain(|r| r.url != response.url);
            entries.push_back(response);
            while entries.iter().map(StoredResponse::size).sum::<u64>() > self.max_size_bytes {
                entries.pop_front();
            }
            Ok(())
        })
    }

    fn get(&self, url: &str) -> BoxFuture<'_, Result<Option<StoredResponse>, StoreError>> {
        let found = self.entries.lock().iter().find(|r| r.url == url).cloned();
        Box::pin(async move { Ok(found) })
    }

    fn remove(&self, url: &str) -> BoxFuture<'_, Result<bool, StoreError>> {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|r| r.url != url);
        let removed = entries.len() != before;
        Box::pin(async move { Ok(removed) })
    }

    fn clear(&self) -> BoxFuture<'_, Result<usize, StoreError>> {
        let removed = {
            let mut entries = self.entries.lock();
            let count = entries.len();
            entries.clear();
            count
        };
        Box::pin(async move { Ok(removed) })
    }

    fn urls(&self) -> Vec<String> {
        self.entries.lock().iter().map(|r| r.url.clone()).collect()
    }

    fn size_bytes(&self) -> u64 {
        self.entries.lock().iter().map(StoredResponse::size).sum()
    }

    fn max_size_bytes(&self) -> u64 {
        self.max_size_bytes
    }
}
