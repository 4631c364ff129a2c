//! Voice instruction prefetch cache.
//!
//! Keeps a small look-ahead window of synthesized voice instructions in a
//! bounded response store so announcements play without waiting on the
//! network.
//!
//! # Components
//!
//! - [`SpeechRequestBuilder`]: canonical request URLs for instruction text
//! - [`OfflineCacheInterceptor`]: accepts stale responses while offline
//! - [`ResponseStore`]: bounded storage of response bodies keyed by URL
//! - [`SpeechClient`]: cache-first fetch over a [`SpeechTransport`]
//! - [`VoiceInstructionCacheManager`]: priming and eviction per route session
//!
//! # Session Lifecycle
//!
//! ```text
//!          route change                 all fetches settled
//!  Idle ─────────────────► Priming ─────────────────────────► Steady
//!                            ▲                                  │
//!                            └──────── eviction due ────────────┘
//! ```

mod cache_manager;
pub(crate) mod client;
mod interceptor;
mod request;
mod store;

pub use cache_manager::{
    CachePhase, FetchOutcome, VoiceInstructionCacheManager, DEFAULT_BATCH_SIZE, DEFAULT_EVICT_COUNT,
};
pub use client::{
    ReqwestTransport, ResponseSource, SpeechClient, SpeechError, SpeechResponse, SpeechTransport,
    DEFAULT_FRESH_FOR, DEFAULT_TIMEOUT,
};
pub use interceptor::{
    ConnectivityMonitor, OfflineCacheInterceptor, SharedConnectivity, DEFAULT_MAX_STALE,
};
pub use request::{CacheControl, SpeechRequest, SpeechRequestBuilder, SSML_TEXT_TYPE};
pub use store::{DiskResponseStore, MemoryResponseStore, ResponseStore, StoreError, StoredResponse};

use std::future::Future;
use std::pin::Pin;

/// Boxed future type for dyn-compatible async methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
