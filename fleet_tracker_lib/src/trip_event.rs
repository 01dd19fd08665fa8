use serde::{Deserialize, Serialize};

/// Payload of a `trip-created` broadcast. Fields default so a partial
/// payload still routes instead of being dropped at deserialization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TripCreatedEvent {
    pub trip_id: Option<String>,
    pub registration_number: String,
}

/// Payload of a `trip-status-updated` broadcast.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TripStatusUpdatedEvent {
    pub trip_id: Option<String>,
    pub status: String,
}
