use std::sync::{Arc, Mutex};

use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fleet_tracker_client::{
    ChannelSession, EventChannel, LocationTracker, NotificationFeed, TrackingSession,
    auth::{CredentialStore, FileCredentialStore},
    config::ClientConfig,
    geolocation::SimulatedRoute,
    sink::HttpLocationSink,
};
use fleet_tracker_lib::role::Role;

/// Drives a simulated driver shift against the configured backend: a
/// scripted route feeds the real tracker and sink pipeline, and the
/// event channel is attached when a driver credential is stored.
#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("{}=trace,fleet_tracker_client=trace", env!("CARGO_CRATE_NAME")).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ClientConfig::from_env();
    info!("Simulating a shift against {}", config.api_base_url);

    let credentials: Arc<dyn CredentialStore> = Arc::new(FileCredentialStore::default_location());
    if credentials.credential(Role::Driver).is_none() {
        warn!("No driver credential stored, location updates will be dropped");
    }

    let source = Arc::new(SimulatedRoute::new(56.1752, 10.1961));
    let sink = Arc::new(HttpLocationSink::new(&config));
    let tracker = LocationTracker::new(source, sink, credentials.clone(), Role::Driver);
    let session = TrackingSession::new(tracker);

    let feed = Arc::new(Mutex::new(NotificationFeed::new(Role::Driver)));
    let channel = EventChannel::shared().clone();
    let channel_session =
        match ChannelSession::open(channel, Role::Driver, credentials.as_ref(), feed.clone()) {
            Ok(open) => Some(open),
            Err(err) => {
                warn!("Event channel not attached: {err}");
                None
            }
        };

    session.start_tracking().await;
    let status = session.status().await;
    if let Some(error) = &status.error {
        warn!("Shift did not start: {error}");
    }

    info!("Shift running, press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;

    session.stop_tracking().await;
    if let Some(open) = channel_session {
        open.close();
    }

    let feed = feed.lock().unwrap();
    info!(
        "Shift ended with {} notifications ({} unread)",
        feed.len(),
        feed.unread()
    );

    Ok(())
}
