use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Fired on transport establishment, initially and after every reconnect.
pub const EVENT_CONNECT: &str = "connect";
/// Fired on transport loss.
pub const EVENT_DISCONNECT: &str = "disconnect";
pub const EVENT_TRIP_CREATED: &str = "trip-created";
pub const EVENT_TRIP_STATUS_UPDATED: &str = "trip-status-updated";
/// Outbound room subscription request.
pub const EVENT_JOIN_ROOM: &str = "join-room";

/// Wire frame of the event bus: a named event plus an opaque payload the
/// channel routes without interpreting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventFrame {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

impl EventFrame {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }

    pub fn join_room(room_id: &str) -> Self {
        Self::new(EVENT_JOIN_ROOM, Value::String(room_id.to_owned()))
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap()
    }

    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}
