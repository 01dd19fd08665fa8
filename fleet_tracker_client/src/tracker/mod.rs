mod filter;
mod state;

pub use filter::{FixFilter, MIN_MOVE_DISTANCE_METERS, MIN_SEND_INTERVAL};
pub use state::{
    AccuracyMode, TrackerPhase, TrackerStatus, WATCH_TIMEOUT_MESSAGE, WatchErrorOutcome,
    watch_error_outcome,
};

use std::sync::Arc;

use tokio::{sync::Mutex, task::JoinHandle, time::Instant};
use tracing::{debug, info, warn};

use fleet_tracker_lib::{location_update::LocationUpdate, position_fix::PositionFix, role::Role};

use crate::{
    auth::CredentialStore,
    geolocation::{GeolocationError, PositionSource, PositionWatch, WatchId},
    sink::{LocationSink, SinkError},
};

/// Errors surfaced by `LocationTracker::start`. The same failure is also
/// retained in the status snapshot as a user-facing message.
#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    #[error(transparent)]
    Geolocation(#[from] GeolocationError),
}

struct TrackerState {
    phase: TrackerPhase,
    watch_id: Option<WatchId>,
    filter: FixFilter,
    last_error: Option<String>,
    pump: Option<JoinHandle<()>>,
}

impl TrackerState {
    fn new() -> Self {
        Self {
            phase: TrackerPhase::Idle,
            watch_id: None,
            filter: FixFilter::new(),
            last_error: None,
            pump: None,
        }
    }

    fn fail(&mut self, message: &str) {
        self.phase = TrackerPhase::Stopped;
        self.watch_id = None;
        self.last_error = Some(message.to_string());
    }
}

/// Turns the device position stream into throttled, distance-filtered
/// location reports and relays each accepted fix to the sink, trading
/// accuracy for availability when the device keeps timing out.
///
/// One fix stream exists per session: the continuous watch is registered
/// after the initial acquisition succeeds and is re-registered at most
/// once, for the accuracy downgrade.
#[derive(Clone)]
pub struct LocationTracker {
    source: Arc<dyn PositionSource>,
    sink: Arc<dyn LocationSink>,
    credentials: Arc<dyn CredentialStore>,
    role: Role,
    state: Arc<Mutex<TrackerState>>,
}

impl LocationTracker {
    pub fn new(
        source: Arc<dyn PositionSource>,
        sink: Arc<dyn LocationSink>,
        credentials: Arc<dyn CredentialStore>,
        role: Role,
    ) -> Self {
        Self {
            source,
            sink,
            credentials,
            role,
            state: Arc::new(Mutex::new(TrackerState::new())),
        }
    }

    /// Begin a tracking session; a no-op while one is underway. The
    /// initial high-accuracy acquisition is awaited here and its failure
    /// ends the session without retry.
    pub async fn start(&self) -> Result<(), TrackerError> {
        {
            let mut state = self.state.lock().await;
            if state.phase.is_tracking() {
                debug!("Tracking already active, ignoring start");
                return Ok(());
            }
            state.phase = TrackerPhase::Acquiring;
            state.filter = FixFilter::new();
            state.last_error = None;
        }

        let first_fix = match self
            .source
            .current_position(AccuracyMode::High.watch_options())
            .await
        {
            Ok(fix) => fix,
            Err(err) => {
                warn!("Initial position acquisition failed: {err}");
                let mut state = self.state.lock().await;
                if state.phase == TrackerPhase::Acquiring {
                    state.fail(err.user_message());
                }
                return Err(err.into());
            }
        };

        // stop() may have run while the one-shot was in flight.
        if self.state.lock().await.phase != TrackerPhase::Acquiring {
            debug!("Tracking stopped during acquisition, discarding first fix");
            return Ok(());
        }

        self.handle_fix(first_fix).await;

        let watch = match self
            .source
            .watch_position(AccuracyMode::High.watch_options())
            .await
        {
            Ok(watch) => watch,
            Err(err) => {
                warn!("Watch registration failed: {err}");
                let mut state = self.state.lock().await;
                if state.phase == TrackerPhase::Acquiring {
                    state.fail(err.user_message());
                }
                return Err(err.into());
            }
        };

        let mut state = self.state.lock().await;
        if state.phase != TrackerPhase::Acquiring {
            self.source.clear_watch(watch.id);
            return Ok(());
        }
        state.phase = TrackerPhase::Watching(AccuracyMode::High);
        state.watch_id = Some(watch.id);
        info!("Tracking started, watch {:?} in high-accuracy mode", watch.id);

        let tracker = self.clone();
        state.pump = Some(tokio::spawn(async move { tracker.pump(watch).await }));

        Ok(())
    }

    /// End the session. Clears the platform watch before returning; safe
    /// to call in any phase, including mid-acquisition.
    pub async fn stop(&self) {
        let (watch_id, pump) = {
            let mut state = self.state.lock().await;
            match state.phase {
                TrackerPhase::Idle | TrackerPhase::Stopped => return,
                TrackerPhase::Acquiring | TrackerPhase::Watching(_) => {}
            }
            state.phase = TrackerPhase::Idle;
            (state.watch_id.take(), state.pump.take())
        };

        if let Some(id) = watch_id {
            self.source.clear_watch(id);
        }
        if let Some(pump) = pump {
            pump.abort();
        }

        info!("Tracking stopped");
    }

    pub async fn status(&self) -> TrackerStatus {
        let state = self.state.lock().await;
        TrackerStatus {
            phase: state.phase,
            last_sent: state.filter.last_sent().cloned(),
            last_error: state.last_error.clone(),
        }
    }

    pub async fn is_tracking(&self) -> bool {
        self.state.lock().await.phase.is_tracking()
    }

    async fn pump(self, mut watch: PositionWatch) {
        loop {
            let Some(update) = watch.updates.recv().await else {
                debug!("Watch {:?} stream closed", watch.id);
                return;
            };

            match update {
                Ok(fix) => self.handle_fix(fix).await,
                Err(err) => match self.handle_watch_error(err).await {
                    Some(next_watch) => watch = next_watch,
                    None => return,
                },
            }
        }
    }

    /// Run one fix through the throttle and distance gate; dispatch the
    /// accepted ones to the sink without awaiting the result.
    async fn handle_fix(&self, fix: PositionFix) {
        let accepted = {
            let mut state = self.state.lock().await;
            if !state.phase.is_tracking() {
                return;
            }
            if state.filter.accept(&fix, Instant::now()) {
                state.last_error = None;
                true
            } else {
                false
            }
        };

        if !accepted {
            debug!("Fix rejected by throttle/distance filter");
            return;
        }

        let Some(credential) = self.credentials.credential(self.role) else {
            warn!(
                "No {} credential stored, dropping location update",
                self.role.as_str()
            );
            return;
        };

        let update = LocationUpdate::from(&fix);
        let sink = self.sink.clone();
        // Fire and forget: a failed send is logged and lost, tracking
        // carries on.
        tokio::spawn(async move {
            match sink.send(&update, &credential.access_token).await {
                Ok(()) => {}
                Err(SinkError::Unauthorized) => {
                    warn!("Location sink rejected the session credential")
                }
                Err(err) => warn!("Failed to deliver location update: {err}"),
            }
        });
    }

    /// Apply the degrade-or-stop policy for an error from the active
    /// watch. Returns the replacement watch when the session downgraded.
    async fn handle_watch_error(&self, error: GeolocationError) -> Option<PositionWatch> {
        let mode = match self.state.lock().await.phase {
            TrackerPhase::Watching(mode) => mode,
            _ => return None,
        };
        let permission = self.source.permission().await;

        match watch_error_outcome(mode, permission, &error) {
            WatchErrorOutcome::Downgrade => {
                // Holding the state lock keeps the downgrade atomic for
                // stop() and status() callers.
                let mut state = self.state.lock().await;
                if state.phase != TrackerPhase::Watching(AccuracyMode::High) {
                    return None;
                }
                // Never leave two concurrent watches registered.
                if let Some(id) = state.watch_id.take() {
                    self.source.clear_watch(id);
                }
                match self
                    .source
                    .watch_position(AccuracyMode::Low.watch_options())
                    .await
                {
                    Ok(watch) => {
                        state.phase = TrackerPhase::Watching(AccuracyMode::Low);
                        state.watch_id = Some(watch.id);
                        info!("Position watch timed out, downgraded to low-accuracy mode");
                        Some(watch)
                    }
                    Err(err) => {
                        warn!("Low-accuracy watch registration failed: {err}");
                        state.fail(err.user_message());
                        None
                    }
                }
            }
            WatchErrorOutcome::Fatal(message) => {
                let mut state = self.state.lock().await;
                if let Some(id) = state.watch_id.take() {
                    self.source.clear_watch(id);
                }
                if state.phase.is_tracking() {
                    state.fail(message);
                }
                warn!("Tracking stopped: {error}");
                None
            }
        }
    }
}
