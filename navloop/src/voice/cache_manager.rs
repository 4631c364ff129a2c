//! Voice instruction cache manager.
//!
//! Owns the per-route prefetch session: which instructions have been
//! requested, which are resident in the response store, and which failed and
//! need another attempt. All methods run on the tick worker; network fetches
//! and store deletions run as spawned tasks and report back through the
//! completion channel.
//!
//! # Priming Pass
//!
//! ```text
//! budget = batch_size
//! 1. retry failed indices of earlier passes   (oldest first, within budget)
//! 2. issue cursor, cursor+1, ...               (within budget, never past total)
//! ```
//!
//! # Eviction
//!
//! When the announcement counter makes an eviction due, the `evict_count`
//! oldest resident URLs are deleted from the store and a new priming pass
//! starts from the cursor.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::client::{SpeechClient, SpeechError};
use super::request::SpeechRequestBuilder;
use crate::processor::SessionCounters;
use crate::route::{Route, VoiceInstruction};

/// Default number of requests issued per priming pass.
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// Default number of resident instructions removed per eviction.
pub const DEFAULT_EVICT_COUNT: usize = 4;

/// Prefetch session phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CachePhase {
    /// No route loaded, or the session was cancelled.
    #[default]
    Idle,
    /// Requests of the current pass are in flight.
    Priming,
    /// Every request of the current pass has settled.
    Steady,
}

/// Completion of one prefetch request, posted back to the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOutcome {
    /// Session generation the request belongs to.
    pub generation: u64,
    /// Flat voice-instruction index within the route.
    pub index: usize,
    /// Canonical request URL.
    pub url: String,
    /// Whether the response is now stored.
    pub result: Result<(), SpeechError>,
}

/// Prefetches upcoming voice instructions into the response store.
pub struct VoiceInstructionCacheManager {
    client: Arc<SpeechClient>,
    requests: SpeechRequestBuilder,
    batch_size: usize,
    evict_count: usize,
    completions: mpsc::UnboundedSender<FetchOutcome>,
    shutdown: CancellationToken,
    session: CancellationToken,
    generation: u64,
    phase: CachePhase,
    route: Option<Arc<Route>>,
    /// Resident URLs in fetch completion order.
    resident: VecDeque<String>,
    /// Failed indices awaiting the next pass.
    retry: VecDeque<usize>,
    in_flight: usize,
}

impl std::fmt::Debug for VoiceInstructionCacheManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoiceInstructionCacheManager")
            .field("generation", &self.generation)
            .field("phase", &self.phase)
            .field("resident", &self.resident.len())
            .field("retry", &self.retry.len())
            .field("in_flight", &self.in_flight)
            .finish()
    }
}

fn instruction_text(instruction: &VoiceInstruction) -> &str {
    if instruction.ssml_announcement.is_empty() {
        &instruction.announcement
    } else {
        &instruction.ssml_announcement
    }
}

impl VoiceInstructionCacheManager {
    /// Create an idle manager.
    ///
    /// # Arguments
    ///
    /// * `client` - Cache-first speech client shared with fetch tasks
    /// * `requests` - Builds canonical request URLs
    /// * `completions` - Channel drained by the tick worker
    /// * `shutdown` - Cancelling it aborts every in-flight fetch
    pub fn new(
        client: Arc<SpeechClient>,
        requests: SpeechRequestBuilder,
        completions: mpsc::UnboundedSender<FetchOutcome>,
        shutdown: CancellationToken,
    ) -> Self {
        let session = shutdown.child_token();
        Self {
            client,
            requests,
            batch_size: DEFAULT_BATCH_SIZE,
            evict_count: DEFAULT_EVICT_COUNT,
            completions,
            shutdown,
            session,
            generation: 0,
            phase: CachePhase::Idle,
            route: None,
            resident: VecDeque::new(),
            retry: VecDeque::new(),
            in_flight: 0,
        }
    }

    /// Set the number of requests per priming pass.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Set the number of resident instructions removed per eviction.
    pub fn with_evict_count(mut self, evict_count: usize) -> Self {
        self.evict_count = evict_count;
        self
    }

    /// Current session phase.
    pub fn phase(&self) -> CachePhase {
        self.phase
    }

    /// Current session generation, bumped on every route change.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Resident URLs, oldest first.
    pub fn resident_urls(&self) -> impl Iterator<Item = &str> {
        self.resident.iter().map(String::as_str)
    }

    /// Number of resident instructions.
    pub fn resident_count(&self) -> usize {
        self.resident.len()
    }

    /// Requests of the current pass still in flight.
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// Failed indices waiting for the next pass.
    pub fn pending_retries(&self) -> usize {
        self.retry.len()
    }

    /// Start a new session for `route`.
    ///
    /// Cancels the previous session's fetches, drops its resident entries
    /// that the new route does not share, resets `counters` and primes.
    pub fn start_session(&mut self, route: Arc<Route>, counters: &mut SessionCounters) {
        self.session.cancel();
        self.session = self.shutdown.child_token();
        self.generation += 1;

        let keep: HashSet<String> = route
            .voice_instructions()
            .filter_map(|instruction| self.requests.url_for(instruction_text(instruction)).ok())
            .collect();
        let stale: Vec<String> = self
            .resident
            .drain(..)
            .filter(|url| !keep.contains(url))
            .collect();
        self.remove_from_store(stale);

        self.retry.clear();
        self.in_flight = 0;
        counters.reset(route.voice_instruction_count());
        self.route = Some(route);

        tracing::debug!(
            generation = self.generation,
            total = counters.total(),
            "Voice cache session started"
        );
        self.prime(counters);
    }

    /// Per-tick maintenance: evict and re-prime when an eviction is due.
    pub fn maintain(&mut self, counters: &mut SessionCounters) {
        if self.route.is_none() || !counters.eviction_due() {
            return;
        }

        let evicted = self.evict();
        counters.clear_eviction_due();
        tracing::debug!(
            evicted = evicted.len(),
            resident = self.resident.len(),
            cursor = counters.cursor(),
            "Voice cache eviction"
        );
        self.prime(counters);
    }

    /// Record the completion of a prefetch request.
    ///
    /// Completions from an earlier session are ignored.
    pub fn on_fetch_complete(&mut self, outcome: FetchOutcome) {
        if outcome.generation != self.generation {
            tracing::trace!(
                generation = outcome.generation,
                current = self.generation,
                "Ignoring completion from previous session"
            );
            return;
        }

        self.in_flight = self.in_flight.saturating_sub(1);
        match outcome.result {
            Ok(()) => {
                if !self.resident.contains(&outcome.url) {
                    self.resident.push_back(outcome.url);
                }
            }
            Err(e) => {
                tracing::warn!(
                    index = outcome.index,
                    url = %outcome.url,
                    error = %e,
                    "Voice instruction prefetch failed"
                );
                self.retry.push_back(outcome.index);
            }
        }

        if self.in_flight == 0 && self.phase == CachePhase::Priming {
            self.phase = CachePhase::Steady;
            tracing::debug!(
                resident = self.resident.len(),
                retry = self.retry.len(),
                "Voice cache pass settled"
            );
        }
    }

    /// Cancel in-flight fetches of the current session.
    pub fn cancel(&mut self) {
        self.session.cancel();
        self.in_flight = 0;
        self.phase = CachePhase::Idle;
    }

    /// Cancel the session and delete every stored response.
    pub async fn flush_cache(&mut self) -> Result<usize, SpeechError> {
        self.cancel();
        self.resident.clear();
        self.retry.clear();
        self.route = None;
        self.client.flush().await
    }

    fn prime(&mut self, counters: &mut SessionCounters) {
        let Some(route) = self.route.clone() else {
            return;
        };

        let mut budget = self.batch_size;
        while budget > 0 {
            let Some(index) = self.retry.pop_front() else {
                break;
            };
            self.issue(&route, index);
            budget -= 1;
        }
        while budget > 0 {
            let Some(index) = counters.advance_cursor() else {
                break;
            };
            self.issue(&route, index);
            budget -= 1;
        }

        self.phase = if self.in_flight > 0 {
            CachePhase::Priming
        } else {
            CachePhase::Steady
        };
    }

    fn issue(&mut self, route: &Route, index: usize) {
        let Some(instruction) = route.voice_instruction(index) else {
            return;
        };
        let request = match self.requests.build(instruction_text(instruction)) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(index, error = %e, "Cannot build voice instruction request");
                return;
            }
        };

        let url = request.url.clone();
        let client = Arc::clone(&self.client);
        let completions = self.completions.clone();
        let token = self.session.clone();
        let generation = self.generation;
        self.in_flight += 1;

        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    tracing::trace!(index, "Voice instruction prefetch cancelled");
                }
                result = client.fetch(request) => {
                    let outcome = FetchOutcome {
                        generation,
                        index,
                        url,
                        result: result.map(|_| ()),
                    };
                    // Worker gone means the session is shutting down
                    let _ = completions.send(outcome);
                }
            }
        });
    }

    /// Drop the oldest resident URLs. Returns the evicted URLs.
    fn evict(&mut self) -> Vec<String> {
        let count = self.evict_count.min(self.resident.len());
        let evicted: Vec<String> = self.resident.drain(..count).collect();
        self.remove_from_store(evicted.clone());
        evicted
    }

    fn remove_from_store(&self, urls: Vec<String>) {
        if urls.is_empty() {
            return;
        }
        let client = Arc::clone(&self.client);
        tokio::spawn(async move {
            for url in urls {
                if let Err(e) = client.remove(&url).await {
                    tracing::warn!(url = %url, error = %e, "Failed to evict voice instruction");
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::route::tests::equator_route;
    use crate::voice::client::tests::MockTransport;
    use crate::voice::{MemoryResponseStore, ResponseStore};
    use std::time::Duration;

    struct Harness {
        manager: VoiceInstructionCacheManager,
        completions: mpsc::UnboundedReceiver<FetchOutcome>,
        store: Arc<MemoryResponseStore>,
        transport: Arc<MockTransport>,
        counters: SessionCounters,
    }

    fn harness(transport: MockTransport) -> Harness {
        let transport = Arc::new(transport);
        let store = Arc::new(MemoryResponseStore::new(10 * 1024 * 1024));
        let client = Arc::new(SpeechClient::new(transport.clone(), store.clone()));
        let requests = SpeechRequestBuilder::new("https://api.example.com", "en", "tok").unwrap();
        let (tx, rx) = mpsc::unbounded_channel();
        Harness {
            manager: VoiceInstructionCacheManager::new(client, requests, tx, CancellationToken::new()),
            completions: rx,
            store,
            transport,
            counters: SessionCounters::default(),
        }
    }

    impl Harness {
        /// Feed `n` completions back into the manager.
        async fn settle(&mut self, n: usize) {
            for _ in 0..n {
                let outcome = tokio::time::timeout(Duration::from_secs(5), self.completions.recv())
                    .await
                    .expect("completion timed out")
                    .expect("channel closed");
                self.manager.on_fetch_complete(outcome);
            }
        }

        fn announce(&mut self, n: usize) {
            for _ in 0..n {
                self.counters.record_announcement(5);
            }
        }
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        for _ in 0..500 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn test_twelve_instructions_prime_evict_reprime() {
        let mut h = harness(MockTransport::ok(b"mp3"));
        let route = Arc::new(equator_route(&[4, 4, 4]));

        h.manager.start_session(route, &mut h.counters);
        assert_eq!(h.counters.total(), 12);
        assert_eq!(h.counters.cursor(), 10);
        assert_eq!(h.manager.in_flight(), 10);
        assert_eq!(h.manager.phase(), CachePhase::Priming);

        h.settle(10).await;
        assert_eq!(h.manager.resident_count(), 10);
        assert_eq!(h.manager.phase(), CachePhase::Steady);

        // No eviction before the fifth announcement
        h.announce(4);
        h.manager.maintain(&mut h.counters);
        assert_eq!(h.manager.resident_count(), 10);

        h.announce(1);
        let oldest: Vec<String> = h.manager.resident_urls().take(4).map(str::to_string).collect();
        h.manager.maintain(&mut h.counters);

        assert!(!h.counters.eviction_due());
        assert_eq!(h.manager.resident_count(), 6);
        assert_eq!(h.counters.cursor(), 12);
        assert_eq!(h.manager.in_flight(), 2);

        h.settle(2).await;
        assert_eq!(h.manager.resident_count(), 8);
        assert_eq!(h.transport.calls(), 12);

        let store = h.store.clone();
        wait_until(|| oldest.iter().all(|url| !store.contains(url))).await;
        assert_eq!(h.store.urls().len(), 8);
    }

    #[tokio::test]
    async fn test_short_route_never_passes_total() {
        let mut h = harness(MockTransport::ok(b"mp3"));
        h.manager
            .start_session(Arc::new(equator_route(&[3])), &mut h.counters);

        assert_eq!(h.counters.cursor(), 3);
        assert_eq!(h.manager.in_flight(), 3);
        h.settle(3).await;

        h.announce(5);
        h.manager.maintain(&mut h.counters);
        assert_eq!(h.counters.cursor(), 3);
        assert_eq!(h.manager.in_flight(), 0);
        assert_eq!(h.manager.phase(), CachePhase::Steady);
    }

    #[tokio::test]
    async fn test_route_without_instructions_is_steady() {
        let mut h = harness(MockTransport::ok(b"mp3"));
        h.manager
            .start_session(Arc::new(equator_route(&[0, 0])), &mut h.counters);

        assert_eq!(h.counters.total(), 0);
        assert_eq!(h.manager.in_flight(), 0);
        assert_eq!(h.manager.phase(), CachePhase::Steady);
    }

    #[tokio::test]
    async fn test_failed_fetches_retried_first() {
        let mut h = harness(MockTransport::failing());
        h.manager
            .start_session(Arc::new(equator_route(&[12])), &mut h.counters);
        h.settle(10).await;

        assert_eq!(h.manager.resident_count(), 0);
        assert_eq!(h.manager.pending_retries(), 10);

        h.announce(5);
        h.manager.maintain(&mut h.counters);

        // The whole batch went to retries; the cursor did not move
        assert_eq!(h.counters.cursor(), 10);
        assert_eq!(h.manager.pending_retries(), 0);
        assert_eq!(h.manager.in_flight(), 10);
    }

    #[tokio::test]
    async fn test_stale_generation_completion_ignored() {
        let mut h = harness(MockTransport::ok(b"mp3"));
        h.manager
            .start_session(Arc::new(equator_route(&[2])), &mut h.counters);
        let old_generation = h.manager.generation();

        h.manager
            .start_session(Arc::new(equator_route(&[1, 1])), &mut h.counters);
        assert_eq!(h.manager.generation(), old_generation + 1);

        h.manager.on_fetch_complete(FetchOutcome {
            generation: old_generation,
            index: 0,
            url: "https://api.example.com/old".to_string(),
            result: Ok(()),
        });

        assert_eq!(h.manager.resident_count(), 0);
        assert_eq!(h.manager.in_flight(), 2);
    }

    #[tokio::test]
    async fn test_route_change_resets_counters_and_drops_old_entries() {
        let mut h = harness(MockTransport::ok(b"mp3"));
        h.manager
            .start_session(Arc::new(equator_route(&[3])), &mut h.counters);
        h.settle(3).await;
        h.announce(2);
        assert_eq!(h.store.urls().len(), 3);

        // Instructions of the new route have different text
        let mut next = equator_route(&[2]);
        for (i, instruction) in next.legs[0].steps[0].voice_instructions.iter_mut().enumerate() {
            instruction.ssml_announcement = format!("<speak>Rerouted {}</speak>", i);
        }
        h.manager.start_session(Arc::new(next), &mut h.counters);

        assert_eq!(h.counters.announced(), 0);
        assert_eq!(h.counters.total(), 2);
        assert_eq!(h.counters.cursor(), 2);
        assert_eq!(h.manager.resident_count(), 0);

        h.settle(2).await;
        let store = h.store.clone();
        wait_until(|| store.urls().len() == 2).await;
        assert!(store.urls().iter().all(|url| url.contains("Rerouted")));
    }

    #[tokio::test]
    async fn test_cancel_stops_reporting() {
        let mut h = harness(MockTransport::ok(b"mp3"));
        h.manager
            .start_session(Arc::new(equator_route(&[5])), &mut h.counters);
        h.manager.cancel();

        assert_eq!(h.manager.phase(), CachePhase::Idle);
        assert_eq!(h.manager.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_flush_cache_empties_store() {
        let mut h = harness(MockTransport::ok(b"mp3"));
        h.manager
            .start_session(Arc::new(equator_route(&[3])), &mut h.counters);
        h.settle(3).await;

        assert_eq!(h.manager.flush_cache().await.unwrap(), 3);
        assert!(h.store.is_empty());
        assert_eq!(h.manager.resident_count(), 0);
    }
}
