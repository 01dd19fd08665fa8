use std::time::Duration;

use tokio::time::Instant;

use fleet_tracker_lib::position_fix::PositionFix;

/// Minimum elapsed time between transmitted fixes.
pub const MIN_SEND_INTERVAL: Duration = Duration::from_millis(5000);
/// Minimum movement between transmitted fixes; suppresses stationary
/// jitter.
pub const MIN_MOVE_DISTANCE_METERS: f64 = 20.0;

/// Throttle-then-distance gate in front of the location sink. Only an
/// accepted fix updates the last-sent state; a rejected fix leaves it
/// untouched, so the next candidate is measured against the last fix
/// that actually went out.
#[derive(Debug, Default)]
pub struct FixFilter {
    last_sent: Option<PositionFix>,
    last_sent_at: Option<Instant>,
}

impl FixFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `fix` should be transmitted at time `now`.
    pub fn accept(&mut self, fix: &PositionFix, now: Instant) -> bool {
        if let Some(sent_at) = self.last_sent_at {
            if now.duration_since(sent_at) < MIN_SEND_INTERVAL {
                return false;
            }
        }

        if let Some(previous) = &self.last_sent {
            if previous.distance_meters(fix) < MIN_MOVE_DISTANCE_METERS {
                return false;
            }
        }

        self.last_sent = Some(fix.clone());
        self.last_sent_at = Some(now);
        true
    }

    pub fn last_sent(&self) -> Option<&PositionFix> {
        self.last_sent.as_ref()
    }
}
