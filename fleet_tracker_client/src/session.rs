use tracing::debug;

use crate::tracker::LocationTracker;

/// View-facing tracking state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStatus {
    pub is_tracking: bool,
    pub error: Option<String>,
}

/// Bridges view intent to the location tracker: start or stop a shift
/// and expose `{is_tracking, error}` for rendering.
pub struct TrackingSession {
    tracker: LocationTracker,
}

impl TrackingSession {
    pub fn new(tracker: LocationTracker) -> Self {
        Self { tracker }
    }

    /// Start a shift; a no-op while one is underway. A failed start is
    /// not an error here: the message lands in `status()`.
    pub async fn start_tracking(&self) {
        if self.tracker.is_tracking().await {
            debug!("Shift already running, ignoring start");
            return;
        }
        if let Err(err) = self.tracker.start().await {
            debug!("Shift start failed: {err}");
        }
    }

    /// End the shift. Safe in any state, including mid-acquisition.
    pub async fn stop_tracking(&self) {
        self.tracker.stop().await;
    }

    pub async fn status(&self) -> SessionStatus {
        let status = self.tracker.status().await;
        SessionStatus {
            is_tracking: status.is_tracking(),
            error: status.last_error,
        }
    }
}
