//! navloop - route progress tick loop with voice-instruction prefetch
//!
//! This library evaluates a vehicle's position against an active route once
//! per tick, derives progress, runs the off-route, snap and faster-route
//! decision engines, fires milestones and keeps a small look-ahead cache of
//! spoken instructions warm.
//!
//! # Architecture
//!
//! ```text
//! location ──► LocationSlot ─┐
//!                            ▼
//!   ┌────────────── worker task (one tick at a time) ──────────────┐
//!   │ RouteEngine ─► progress ─► decision engines ─► voice cache   │
//!   │                                 └─► milestone evaluator      │
//!   └──────────────────────────────┬───────────────────────────────┘
//!                                  │ TickResult (FIFO)
//!                                  ▼
//!                     Dispatcher ─► NavigationListener
//! ```

pub mod config;
pub mod decision;
pub mod engine;
pub mod error;
pub mod geo;
pub mod location;
pub mod logging;
pub mod milestone;
pub mod processor;
pub mod progress;
pub mod route;
pub mod scheduler;
pub mod voice;

pub use config::NavigationConfig;
pub use error::NavigationError;
pub use location::{Location, LocationSlot};
pub use progress::RouteProgress;
pub use route::Route;
pub use scheduler::{Navigation, NavigationListener, NavigationSession, TickResult};

/// Library version, taken from the crate manifest.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
