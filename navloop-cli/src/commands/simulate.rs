//! Simulate command - replay a recorded trace through the tick loop.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use navloop::engine::{ReplayFrame, ReplayRouteEngine};
use navloop::milestone::{StepMilestone, TriggeredMilestone, VoiceInstructionMilestone};
use navloop::{Location, Navigation, NavigationListener, Route, RouteProgress};

use super::{init_cli_logging, load_config, runtime};
use crate::error::CliError;

const STEP_MILESTONE: u32 = 1;
const VOICE_MILESTONE: u32 = 2;

/// Arguments for the simulate command.
pub struct SimulateArgs {
    pub route: PathBuf,
    pub trace: PathBuf,
    pub config: Option<PathBuf>,
    pub tick_ms: Option<u64>,
}

/// Prints every delivered tick.
#[derive(Default)]
struct PrintingListener {
    ticks: AtomicUsize,
    milestones: AtomicUsize,
    off_route_ticks: AtomicUsize,
}

impl NavigationListener for PrintingListener {
    fn on_progress(&self, location: Option<&Location>, progress: &RouteProgress) {
        let tick = self.ticks.fetch_add(1, Ordering::SeqCst) + 1;
        let position = location
            .map(|l| format!("{:.5},{:.5}", l.latitude, l.longitude))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "[tick {:>4}] {:<10} leg {} step {} | {:>8.0} m left | {:>5.1}% | at {}",
            tick,
            progress.route_state().as_str(),
            progress.leg_index(),
            progress.step_index(),
            progress.distance_remaining(),
            progress.fraction_traveled() * 100.0,
            position
        );
    }

    fn on_milestones(&self, milestones: &[TriggeredMilestone], _progress: &RouteProgress) {
        for milestone in milestones {
            self.milestones.fetch_add(1, Ordering::SeqCst);
            match &milestone.instruction {
                Some(text) => println!("             milestone {}: {}", milestone.identifier, text),
                None => println!("             milestone {}", milestone.identifier),
            }
        }
    }

    fn on_off_route(&self, _location: Option<&Location>, off_route: bool) {
        if off_route {
            self.off_route_ticks.fetch_add(1, Ordering::SeqCst);
            println!("             off route");
        }
    }

    fn on_check_faster_route(
        &self,
        _location: Option<&Location>,
        _progress: &RouteProgress,
        check: bool,
    ) {
        if check {
            println!("             faster-route check due");
        }
    }
}

/// Read and decode a JSON file.
fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, CliError> {
    let text = fs::read_to_string(path).map_err(|error| CliError::FileRead {
        path: path.to_path_buf(),
        error,
    })?;
    serde_json::from_str(&text).map_err(|error| CliError::InvalidInput {
        path: path.to_path_buf(),
        error,
    })
}

/// Load a route file.
pub fn load_route(path: &Path) -> Result<Route, CliError> {
    read_json(path)
}

/// Load a replay trace file.
pub fn load_trace(path: &Path) -> Result<Vec<ReplayFrame>, CliError> {
    read_json(path)
}

/// Run the simulate command.
pub fn run(args: SimulateArgs) -> Result<(), CliError> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(ms) = args.tick_ms {
        config = config.with_tick_interval(Duration::from_millis(ms));
    }
    let _logging = init_cli_logging()?;

    let route = load_route(&args.route)?;
    let frames = load_trace(&args.trace)?;

    tracing::info!("navloop v{}", navloop::VERSION);
    println!("navloop simulator v{}", navloop::VERSION);
    println!("==========================");
    println!();
    println!("Route:  {} ({} legs, {:.0} m)", args.route.display(), route.legs.len(), route.distance);
    println!("Trace:  {} ({} frames)", args.trace.display(), frames.len());
    println!("Tick:   {} ms", config.tick_interval.as_millis());
    println!(
        "Voice:  {}",
        if config.voice.enabled && config.voice.access_token.is_some() {
            "prefetch enabled"
        } else {
            "prefetch disabled"
        }
    );
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    ctrlc::set_handler(move || {
        println!();
        println!("Received shutdown signal, stopping...");
        signal.cancel();
    })
    .map_err(|e| CliError::Signal(e.to_string()))?;

    let listener = Arc::new(PrintingListener::default());
    let tick_interval = config.tick_interval;
    let engine = Arc::new(ReplayRouteEngine::from_frames(&frames));

    runtime()?.block_on(async {
        let session = Navigation::new(config, engine)
            .with_milestone(StepMilestone::new(STEP_MILESTONE))
            .with_milestone(VoiceInstructionMilestone::new(VOICE_MILESTONE))
            .start(Some(route), listener.clone())
            .await?;

        for frame in frames {
            if let Some(location) = frame.location {
                session.update_location(location);
            }
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(tick_interval) => {}
            }
        }

        // Let the last frame's tick be delivered
        if !shutdown.is_cancelled() {
            tokio::time::sleep(tick_interval).await;
        }
        session.stop().await
    })?;

    println!();
    println!("Simulation Summary");
    println!("──────────────────");
    println!("  Ticks delivered:    {}", listener.ticks.load(Ordering::SeqCst));
    println!("  Milestones fired:   {}", listener.milestones.load(Ordering::SeqCst));
    println!("  Off-route ticks:    {}", listener.off_route_ticks.load(Ordering::SeqCst));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use navloop::engine::NavigationStatus;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_temp(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_route() {
        let file = write_temp(
            r#"{"distance": 1000.0, "duration": 60.0, "legs": [
                {"distance": 1000.0, "duration": 60.0, "steps": [
                    {"distance": 1000.0, "duration": 60.0}
                ]}
            ]}"#,
        );
        let route = load_route(file.path()).unwrap();
        assert_eq!(route.legs.len(), 1);
        assert_eq!(route.legs[0].steps.len(), 1);
    }

    #[test]
    fn test_load_trace_round_trips_frames() {
        let frames = vec![
            ReplayFrame {
                location: Some(Location::new(0.0, 0.001)),
                status: NavigationStatus::tracking(Utc::now(), 0, 0, 900.0, 900.0),
            },
            ReplayFrame {
                location: None,
                status: NavigationStatus::tracking(Utc::now(), 0, 0, 800.0, 800.0),
            },
        ];
        let file = write_temp(&serde_json::to_string(&frames).unwrap());

        let loaded = load_trace(file.path()).unwrap();
        assert_eq!(loaded.len(), 2);
        assert!(loaded[0].location.is_some());
        assert!(loaded[1].location.is_none());
    }

    #[test]
    fn test_invalid_trace_reports_path() {
        let file = write_temp("[{");
        let err = load_trace(file.path()).unwrap_err();
        assert!(matches!(err, CliError::InvalidInput { .. }));
        assert!(err.to_string().contains(&file.path().display().to_string()));
    }

    #[test]
    fn test_missing_route_file() {
        let err = load_route(Path::new("/nonexistent/route.json")).unwrap_err();
        assert!(matches!(err, CliError::FileRead { .. }));
    }
}
