use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use tokio::sync::mpsc;

use fleet_tracker_lib::position_fix::PositionFix;

/// Settings for a one-shot or continuous position request, mirroring the
/// platform geolocation options.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WatchOptions {
    pub enable_high_accuracy: bool,
    pub timeout: Duration,
    /// Oldest cached fix the platform may hand back instead of taking a
    /// fresh reading.
    pub maximum_age: Duration,
}

impl WatchOptions {
    /// Tight timeout, no cached fixes.
    pub fn high_accuracy() -> Self {
        Self {
            enable_high_accuracy: true,
            timeout: Duration::from_secs(30),
            maximum_age: Duration::ZERO,
        }
    }

    /// Relaxed timeout, cached fixes up to a minute old are acceptable.
    pub fn low_accuracy() -> Self {
        Self {
            enable_high_accuracy: false,
            timeout: Duration::from_secs(40),
            maximum_age: Duration::from_secs(60),
        }
    }
}

/// Platform permission state for the geolocation capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionState {
    Granted,
    Denied,
    Prompt,
}

/// Errors reported by the platform position source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum GeolocationError {
    #[error("location permission denied")]
    PermissionDenied,
    #[error("position unavailable")]
    PositionUnavailable,
    #[error("position request timed out")]
    Timeout,
}

impl GeolocationError {
    /// Plain-language message for the view layer. Raw platform error codes
    /// are never shown to the user.
    pub fn user_message(&self) -> &'static str {
        match self {
            GeolocationError::PermissionDenied => {
                "Permission denied. Please allow location access and start again."
            }
            GeolocationError::PositionUnavailable => {
                "Location unavailable. Please move outdoors and try again."
            }
            GeolocationError::Timeout => "Location request timed out.",
        }
    }
}

/// Identifier of a continuous watch registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchId(pub u64);

/// A live continuous watch: the registration id plus the stream of fixes
/// and errors the platform delivers, in callback order.
pub struct PositionWatch {
    pub id: WatchId,
    pub updates: mpsc::UnboundedReceiver<Result<PositionFix, GeolocationError>>,
}

/// Boundary to the platform's position-reporting capability.
///
/// Implementations honor `WatchOptions::timeout` by delivering
/// `GeolocationError::Timeout` through the one-shot result or the watch
/// stream.
#[async_trait]
pub trait PositionSource: Send + Sync {
    /// One-shot position request.
    async fn current_position(
        &self,
        options: WatchOptions,
    ) -> Result<PositionFix, GeolocationError>;

    /// Register a continuous watch.
    async fn watch_position(
        &self,
        options: WatchOptions,
    ) -> Result<PositionWatch, GeolocationError>;

    /// Drop a watch registration. The platform delivers no further
    /// callbacks for `id` after this returns.
    fn clear_watch(&self, id: WatchId);

    /// Current permission state, consulted on the timeout-recovery path.
    async fn permission(&self) -> PermissionState;
}

/// Development position source walking north-east at a steady pace from a
/// starting coordinate, with a little jitter on every reading. Real
/// deployments plug in a platform-backed `PositionSource` instead.
pub struct SimulatedRoute {
    start: (f64, f64),
    speed_mps: f64,
    tick: Duration,
    next_watch_id: AtomicU64,
    stops: Mutex<HashMap<u64, Arc<AtomicBool>>>,
}

impl SimulatedRoute {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            start: (latitude, longitude),
            speed_mps: 13.9, // ~50 km/h
            tick: Duration::from_secs(2),
            next_watch_id: AtomicU64::new(1),
            stops: Mutex::new(HashMap::new()),
        }
    }

    fn jittered(coordinate: f64) -> f64 {
        coordinate + rand::rng().random_range(-0.000005..0.000005)
    }
}

#[async_trait]
impl PositionSource for SimulatedRoute {
    async fn current_position(
        &self,
        _options: WatchOptions,
    ) -> Result<PositionFix, GeolocationError> {
        Ok(PositionFix::new(
            Self::jittered(self.start.0),
            Self::jittered(self.start.1),
            Utc::now(),
        ))
    }

    async fn watch_position(
        &self,
        _options: WatchOptions,
    ) -> Result<PositionWatch, GeolocationError> {
        let id = self.next_watch_id.fetch_add(1, Ordering::Relaxed);
        let stop = Arc::new(AtomicBool::new(false));
        self.stops.lock().unwrap().insert(id, stop.clone());

        let (tx, rx) = mpsc::unbounded_channel();
        let (mut latitude, mut longitude) = self.start;
        let tick = self.tick;
        // Degrees advanced per tick; one degree of latitude is ~111.2 km.
        let step = self.speed_mps * tick.as_secs_f64() / 111_195.0;

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick);
            interval.tick().await;
            loop {
                interval.tick().await;
                if stop.load(Ordering::Relaxed) {
                    break;
                }
                latitude += step;
                longitude += step;
                let fix = PositionFix::new(
                    Self::jittered(latitude),
                    Self::jittered(longitude),
                    Utc::now(),
                );
                if tx.send(Ok(fix)).is_err() {
                    break;
                }
            }
        });

        Ok(PositionWatch {
            id: WatchId(id),
            updates: rx,
        })
    }

    fn clear_watch(&self, id: WatchId) {
        if let Some(stop) = self.stops.lock().unwrap().remove(&id.0) {
            stop.store(true, Ordering::Relaxed);
        }
    }

    async fn permission(&self) -> PermissionState {
        PermissionState::Granted
    }
}
