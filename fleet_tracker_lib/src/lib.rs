pub mod location_update;
pub mod position_fix;
pub mod role;
pub mod trip_event;
