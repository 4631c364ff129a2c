//! Connectivity-aware request rewriting.
//!
//! # Thread Safety
//!
//! `SharedConnectivity` is a cloneable atomic flag: the application flips it
//! from its network callbacks while prefetch tasks read it concurrently.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::request::{CacheControl, SpeechRequest};

/// How stale a stored response may be when no network is available.
pub const DEFAULT_MAX_STALE: Duration = Duration::from_secs(3 * 24 * 60 * 60);

/// Reports whether the network is currently reachable.
pub trait ConnectivityMonitor: Send + Sync {
    /// Whether a network connection is available.
    fn is_connected(&self) -> bool;
}

/// Connectivity flag shared between the application and the speech client.
///
/// # Example
///
/// ```
/// use navloop::voice::{ConnectivityMonitor, SharedConnectivity};
///
/// let connectivity = SharedConnectivity::new(true);
/// let client_view = connectivity.clone();
///
/// connectivity.set_connected(false);
/// assert!(!client_view.is_connected());
/// ```
#[derive(Debug, Clone)]
pub struct SharedConnectivity {
    connected: Arc<AtomicBool>,
}

impl SharedConnectivity {
    /// Create a flag with the given initial state.
    pub fn new(connected: bool) -> Self {
        Self {
            connected: Arc::new(AtomicBool::new(connected)),
        }
    }

    /// Update the connectivity state.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Relaxed);
    }
}

impl Default for SharedConnectivity {
    fn default() -> Self {
        Self::new(true)
    }
}

impl ConnectivityMonitor for SharedConnectivity {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }
}

/// Rewrites requests to accept stale stored responses while offline.
#[derive(Clone)]
pub struct OfflineCacheInterceptor {
    monitor: Arc<dyn ConnectivityMonitor>,
    max_stale: Duration,
}

impl std::fmt::Debug for OfflineCacheInterceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OfflineCacheInterceptor")
            .field("connected", &self.monitor.is_connected())
            .field("max_stale", &self.max_stale)
            .finish()
    }
}

impl OfflineCacheInterceptor {
    /// Create an interceptor with the default 3-day staleness allowance.
    pub fn new(monitor: Arc<dyn ConnectivityMonitor>) -> Self {
        Self {
            monitor,
            max_stale: DEFAULT_MAX_STALE,
        }
    }

    /// Override the staleness allowance.
    pub fn with_max_stale(mut self, max_stale: Duration) -> Self {
        self.max_stale = max_stale;
        self
    }

    /// Whether the monitor currently reports connectivity.
    pub fn is_connected(&self) -> bool {
        self.monitor.is_connected()
    }

    /// Apply the offline rewrite to `request`.
    ///
    /// Online requests pass through untouched.
    pub fn intercept(&self, mut request: SpeechRequest) -> SpeechRequest {
        if !self.monitor.is_connected() {
            tracing::trace!(url = %request.url, "Offline, accepting stale response");
            request.cache_control = CacheControl::max_stale(self.max_stale);
        }
        request
    }
}
