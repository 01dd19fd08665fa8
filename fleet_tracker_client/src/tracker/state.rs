use fleet_tracker_lib::position_fix::PositionFix;

use crate::geolocation::{GeolocationError, PermissionState, WatchOptions};

/// Accuracy profile of the active watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccuracyMode {
    High,
    Low,
}

impl AccuracyMode {
    pub fn watch_options(&self) -> WatchOptions {
        match self {
            AccuracyMode::High => WatchOptions::high_accuracy(),
            AccuracyMode::Low => WatchOptions::low_accuracy(),
        }
    }
}

/// Lifecycle of one tracking session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerPhase {
    /// No session; never started or cleanly stopped.
    Idle,
    /// One-shot high-accuracy request in flight before continuous
    /// watching.
    Acquiring,
    /// Continuous watch registered.
    Watching(AccuracyMode),
    /// Ended by an unrecoverable error; `start()` is required to resume.
    Stopped,
}

impl TrackerPhase {
    /// A session is underway. Acquisition counts, so a repeated `start()`
    /// is a no-op during it.
    pub fn is_tracking(&self) -> bool {
        matches!(self, TrackerPhase::Acquiring | TrackerPhase::Watching(_))
    }

    /// A continuous watch registration exists.
    pub fn is_watching(&self) -> bool {
        matches!(self, TrackerPhase::Watching(_))
    }
}

/// Snapshot of tracker state for the view layer.
#[derive(Debug, Clone)]
pub struct TrackerStatus {
    pub phase: TrackerPhase,
    pub last_sent: Option<PositionFix>,
    pub last_error: Option<String>,
}

impl TrackerStatus {
    pub fn is_tracking(&self) -> bool {
        self.phase.is_tracking()
    }
}

/// What to do about an error delivered through an active watch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchErrorOutcome {
    /// Re-register the watch with relaxed accuracy; nothing surfaces to
    /// the user.
    Downgrade,
    /// End the session and surface the message.
    Fatal(&'static str),
}

pub const WATCH_TIMEOUT_MESSAGE: &str = "GPS Timed out. Please click Start again.";

/// Decide how a watch error is handled. A timeout downgrades while the
/// watch is high-accuracy and permission is still granted; every other
/// error, and any further timeout, ends the session.
pub fn watch_error_outcome(
    mode: AccuracyMode,
    permission: PermissionState,
    error: &GeolocationError,
) -> WatchErrorOutcome {
    match error {
        GeolocationError::Timeout
            if mode == AccuracyMode::High && permission == PermissionState::Granted =>
        {
            WatchErrorOutcome::Downgrade
        }
        GeolocationError::Timeout => WatchErrorOutcome::Fatal(WATCH_TIMEOUT_MESSAGE),
        other => WatchErrorOutcome::Fatal(other.user_message()),
    }
}
