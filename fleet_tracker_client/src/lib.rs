pub mod auth;
pub mod channel;
pub mod config;
pub mod geolocation;
pub mod notifications;
pub mod session;
pub mod sink;
pub mod tracker;

pub use channel::EventChannel;
pub use notifications::{ChannelSession, NotificationFeed};
pub use session::TrackingSession;
pub use tracker::LocationTracker;
