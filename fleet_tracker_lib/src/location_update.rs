use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::position_fix::PositionFix;

/// Body of a location report to the fleet backend. The timestamp is
/// serialized as an ISO-8601 string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationUpdate {
    pub latitude: f64,
    pub longitude: f64,
    pub timestamp: DateTime<Utc>,
}

impl From<&PositionFix> for LocationUpdate {
    fn from(fix: &PositionFix) -> Self {
        Self {
            latitude: fix.latitude,
            longitude: fix.longitude,
            timestamp: fix.captured_at,
        }
    }
}
