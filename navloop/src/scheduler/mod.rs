//! Navigation session lifecycle.
//!
//! [`Navigation`] collects the configuration, the route engine and the
//! milestones, then [`Navigation::start`] spawns two tasks:
//!
//! - the tick worker ([`TickWorker`]), which owns all mutable tick state
//! - the dispatcher ([`Dispatcher`]), which delivers results to the
//!   [`NavigationListener`] in FIFO order
//!
//! The returned [`NavigationSession`] is the application's handle: it feeds
//! locations, replaces the route and stops the session.
//!
//! # Example
//!
//! ```ignore
//! use navloop::{Navigation, NavigationConfig};
//! use navloop::milestone::{StepMilestone, VoiceInstructionMilestone};
//!
//! let session = Navigation::new(NavigationConfig::default(), engine)
//!     .with_milestone(StepMilestone::new(1))
//!     .with_milestone(VoiceInstructionMilestone::new(2))
//!     .start(Some(route), listener)
//!     .await?;
//!
//! session.update_location(location);
//! session.stop().await?;
//! ```

mod dispatcher;
mod worker;

pub use crate::processor::TickResult;
pub use dispatcher::{Dispatcher, NavigationListener};
pub use worker::TickWorker;

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::{NavigationConfig, VoiceCacheConfig, MIN_TICK_INTERVAL};
use crate::engine::RouteEngine;
use crate::error::NavigationError;
use crate::location::{Location, LocationSlot};
use crate::milestone::Milestone;
use crate::processor::RouteProcessor;
use crate::route::Route;
use crate::voice::{
    ConnectivityMonitor, DiskResponseStore, OfflineCacheInterceptor, ReqwestTransport,
    SharedConnectivity, SpeechClient, SpeechRequestBuilder, VoiceInstructionCacheManager,
};

/// Open the disk-backed speech client described by `voice`.
pub async fn open_speech_client(
    voice: &VoiceCacheConfig,
    connectivity: Arc<dyn ConnectivityMonitor>,
) -> Result<SpeechClient, NavigationError> {
    let store = DiskResponseStore::open(&voice.cache_dir, voice.max_size_bytes).await?;
    let transport = ReqwestTransport::new()?;
    let interceptor = OfflineCacheInterceptor::new(connectivity).with_max_stale(voice.max_stale);

    Ok(SpeechClient::new(Arc::new(transport), Arc::new(store))
        .with_interceptor(interceptor)
        .with_fresh_for(voice.fresh_for))
}

/// Builder for a navigation session.
pub struct Navigation {
    config: NavigationConfig,
    engine: Arc<dyn RouteEngine>,
    milestones: Vec<Box<dyn Milestone>>,
    speech: Option<Arc<SpeechClient>>,
    connectivity: Option<Arc<dyn ConnectivityMonitor>>,
}

impl Navigation {
    /// Start building a session over `engine`.
    pub fn new(config: NavigationConfig, engine: Arc<dyn RouteEngine>) -> Self {
        Self {
            config,
            engine,
            milestones: Vec::new(),
            speech: None,
            connectivity: None,
        }
    }

    /// Register a milestone. Milestones are evaluated in registration order.
    pub fn with_milestone(mut self, milestone: impl Milestone + 'static) -> Self {
        self.milestones.push(Box::new(milestone));
        self
    }

    /// Register a boxed milestone.
    pub fn with_boxed_milestone(mut self, milestone: Box<dyn Milestone>) -> Self {
        self.milestones.push(milestone);
        self
    }

    /// Use `client` for voice prefetch instead of opening one from config.
    pub fn with_speech_client(mut self, client: Arc<SpeechClient>) -> Self {
        self.speech = Some(client);
        self
    }

    /// Connectivity source for the offline cache rewrite.
    pub fn with_connectivity(mut self, connectivity: Arc<dyn ConnectivityMonitor>) -> Self {
        self.connectivity = Some(connectivity);
        self
    }

    /// The session configuration.
    pub fn config(&self) -> &NavigationConfig {
        &self.config
    }

    async fn voice_client(&mut self) -> Result<Option<(Arc<SpeechClient>, String)>, NavigationError> {
        let voice = &self.config.voice;
        if !voice.enabled {
            return Ok(None);
        }

        match (self.speech.take(), voice.access_token.clone()) {
            (Some(client), token) => Ok(Some((client, token.unwrap_or_default()))),
            (None, Some(token)) => {
                let connectivity = self
                    .connectivity
                    .clone()
                    .unwrap_or_else(|| Arc::new(SharedConnectivity::default()));
                let client = open_speech_client(voice, connectivity).await?;
                Ok(Some((Arc::new(client), token)))
            }
            (None, None) => {
                tracing::warn!("Voice cache enabled without an access token, prefetch disabled");
                Ok(None)
            }
        }
    }

    /// Spawn the tick worker and dispatcher.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the voice response store or HTTP client cannot be
    /// created, or the speech endpoint URL is invalid.
    pub async fn start(
        mut self,
        route: Option<Route>,
        listener: Arc<dyn NavigationListener>,
    ) -> Result<NavigationSession, NavigationError> {
        let shutdown = CancellationToken::new();
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();

        let voice = self.voice_client().await?;
        let mut processor = RouteProcessor::new(
            &self.config,
            Arc::clone(&self.engine),
            std::mem::take(&mut self.milestones),
        );

        let speech = match voice {
            Some((client, token)) => {
                let requests = SpeechRequestBuilder::new(
                    &self.config.voice.base_url,
                    self.config.voice.language.clone(),
                    token,
                )?;
                let manager = VoiceInstructionCacheManager::new(
                    Arc::clone(&client),
                    requests,
                    completions_tx,
                    shutdown.clone(),
                )
                .with_batch_size(self.config.voice.batch_size)
                .with_evict_count(self.config.voice.evict_count);
                processor = processor.with_voice_cache(manager);
                Some(client)
            }
            None => None,
        };

        let slot = Arc::new(LocationSlot::new());
        let (route_tx, route_rx) = watch::channel(route.map(Arc::new));
        let (results_tx, results_rx) = mpsc::unbounded_channel();

        // The field is public, so a zero cadence can bypass the builder
        let tick_interval = self.config.tick_interval.max(MIN_TICK_INTERVAL);
        if tick_interval != self.config.tick_interval {
            tracing::warn!(
                tick_interval_ms = tick_interval.as_millis() as u64,
                "Zero tick interval clamped"
            );
        }

        let worker = TickWorker::new(
            processor,
            tick_interval,
            Arc::clone(&slot),
            route_rx,
            results_tx,
            completions_rx,
        );
        let worker = tokio::spawn(worker.run(shutdown.clone()));
        let dispatcher = tokio::spawn(Dispatcher::new(listener).run(results_rx, shutdown.clone()));

        tracing::info!(
            engine = self.engine.name(),
            voice_cache = speech.is_some(),
            "Navigation started"
        );

        Ok(NavigationSession {
            slot,
            engine: self.engine,
            route: route_tx,
            speech,
            shutdown,
            worker,
            dispatcher,
        })
    }
}

/// Handle to a running navigation session.
pub struct NavigationSession {
    slot: Arc<LocationSlot>,
    engine: Arc<dyn RouteEngine>,
    route: watch::Sender<Option<Arc<Route>>>,
    speech: Option<Arc<SpeechClient>>,
    shutdown: CancellationToken,
    worker: JoinHandle<()>,
    dispatcher: JoinHandle<()>,
}

impl NavigationSession {
    /// Publish a new raw location. The latest write wins.
    pub fn update_location(&self, location: Location) {
        self.engine.update_location(&location);
        self.slot.update(location);
    }

    /// Replace the route. The next tick starts a new route session if the
    /// route differs by value.
    pub fn update_route(&self, route: Route) {
        self.route.send_replace(Some(Arc::new(route)));
    }

    /// The currently published route.
    pub fn route(&self) -> Option<Arc<Route>> {
        self.route.borrow().clone()
    }

    /// Whether the tick worker is still running.
    pub fn is_running(&self) -> bool {
        !self.worker.is_finished()
    }

    /// Delete every stored voice response. Returns how many were removed.
    pub async fn flush_voice_cache(&self) -> Result<usize, NavigationError> {
        match &self.speech {
            Some(client) => Ok(client.flush().await?),
            None => Ok(0),
        }
    }

    /// Stop the session and wait for both tasks to finish.
    ///
    /// In-flight prefetches are cancelled; results not yet delivered are
    /// dropped.
    pub async fn stop(self) -> Result<(), NavigationError> {
        self.shutdown.cancel();

        let worker = self.worker.await;
        let dispatcher = self.dispatcher.await;
        worker.map_err(|e| NavigationError::Task(format!("tick worker: {}", e)))?;
        dispatcher.map_err(|e| NavigationError::Task(format!("dispatcher: {}", e)))?;

        tracing::info!("Navigation stopped");
        Ok(())
    }
}
