#![allow(dead_code)]

use std::{
    collections::{HashMap, VecDeque},
    net::SocketAddr,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use axum::{
    Router,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
    routing::get,
};
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::{Notify, mpsc};

use fleet_tracker_client::{
    geolocation::{
        GeolocationError, PermissionState, PositionSource, PositionWatch, WatchId, WatchOptions,
    },
    sink::{LocationSink, SinkError},
};
use fleet_tracker_lib::{location_update::LocationUpdate, position_fix::PositionFix};

pub fn fix(latitude: f64, longitude: f64) -> PositionFix {
    PositionFix::new(latitude, longitude, Utc::now())
}

/// Poll `check` until it holds or the deadline passes.
pub async fn wait_until(deadline: Duration, mut check: impl FnMut() -> bool) {
    let start = tokio::time::Instant::now();
    while !check() {
        if start.elapsed() > deadline {
            panic!("condition not reached within {deadline:?}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

// ---------------------------------------------------------------------
// Scripted position source
// ---------------------------------------------------------------------

struct WatchRecord {
    id: u64,
    options: WatchOptions,
    cleared: u32,
    sender: Option<mpsc::UnboundedSender<Result<PositionFix, GeolocationError>>>,
}

struct SourceInner {
    one_shots: VecDeque<Result<PositionFix, GeolocationError>>,
    one_shot_requests: usize,
    permission: PermissionState,
    next_id: u64,
    watches: Vec<WatchRecord>,
    ops: Vec<String>,
}

/// Position source driven entirely by the test: one-shot answers are
/// queued up front, watch fixes and errors are pushed on demand, and
/// every registration and clear is recorded in order.
pub struct ScriptedSource {
    inner: Mutex<SourceInner>,
}

impl ScriptedSource {
    pub fn new(permission: PermissionState) -> Self {
        Self {
            inner: Mutex::new(SourceInner {
                one_shots: VecDeque::new(),
                one_shot_requests: 0,
                permission,
                next_id: 1,
                watches: Vec::new(),
                ops: Vec::new(),
            }),
        }
    }

    pub fn queue_one_shot(&self, result: Result<PositionFix, GeolocationError>) {
        self.inner.lock().unwrap().one_shots.push_back(result);
    }

    /// Deliver through the newest live watch.
    pub fn push(&self, result: Result<PositionFix, GeolocationError>) {
        let inner = self.inner.lock().unwrap();
        let live = inner
            .watches
            .iter()
            .rev()
            .find_map(|watch| watch.sender.as_ref())
            .expect("no live watch to push into");
        live.send(result).expect("watch receiver dropped");
    }

    pub fn set_permission(&self, permission: PermissionState) {
        self.inner.lock().unwrap().permission = permission;
    }

    pub fn one_shot_requests(&self) -> usize {
        self.inner.lock().unwrap().one_shot_requests
    }

    pub fn watch_count(&self) -> usize {
        self.inner.lock().unwrap().watches.len()
    }

    pub fn watch_options(&self, index: usize) -> WatchOptions {
        self.inner.lock().unwrap().watches[index].options
    }

    pub fn cleared_count(&self, index: usize) -> u32 {
        self.inner.lock().unwrap().watches[index].cleared
    }

    /// Chronological record of source calls, e.g. `["one-shot",
    /// "watch-1", "clear-1", "watch-2"]`.
    pub fn ops(&self) -> Vec<String> {
        self.inner.lock().unwrap().ops.clone()
    }
}

#[async_trait]
impl PositionSource for ScriptedSource {
    async fn current_position(
        &self,
        _options: WatchOptions,
    ) -> Result<PositionFix, GeolocationError> {
        let mut inner = self.inner.lock().unwrap();
        inner.one_shot_requests += 1;
        inner.ops.push("one-shot".to_string());
        inner
            .one_shots
            .pop_front()
            .unwrap_or(Err(GeolocationError::PositionUnavailable))
    }

    async fn watch_position(
        &self,
        options: WatchOptions,
    ) -> Result<PositionWatch, GeolocationError> {
        let mut inner = self.inner.lock().unwrap();
        let id = inner.next_id;
        inner.next_id += 1;
        let (tx, rx) = mpsc::unbounded_channel();
        inner.watches.push(WatchRecord {
            id,
            options,
            cleared: 0,
            sender: Some(tx),
        });
        inner.ops.push(format!("watch-{id}"));
        Ok(PositionWatch {
            id: WatchId(id),
            updates: rx,
        })
    }

    fn clear_watch(&self, id: WatchId) {
        let mut inner = self.inner.lock().unwrap();
        inner.ops.push(format!("clear-{}", id.0));
        if let Some(watch) = inner.watches.iter_mut().find(|watch| watch.id == id.0) {
            watch.cleared += 1;
            watch.sender = None;
        }
    }

    async fn permission(&self) -> PermissionState {
        self.inner.lock().unwrap().permission
    }
}

// ---------------------------------------------------------------------
// Recording sink
// ---------------------------------------------------------------------

/// Sink that records every delivery and wakes waiting tests.
#[derive(Default)]
pub struct RecordingSink {
    sends: Mutex<Vec<(LocationUpdate, String)>>,
    notify: Notify,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.sends.lock().unwrap().len()
    }

    pub fn sends(&self) -> Vec<(LocationUpdate, String)> {
        self.sends.lock().unwrap().clone()
    }

    pub async fn wait_for(&self, count: usize) {
        loop {
            let notified = self.notify.notified();
            if self.count() >= count {
                return;
            }
            notified.await;
        }
    }
}

#[async_trait]
impl LocationSink for RecordingSink {
    async fn send(&self, update: &LocationUpdate, bearer_token: &str) -> Result<(), SinkError> {
        self.sends
            .lock()
            .unwrap()
            .push((update.clone(), bearer_token.to_string()));
        self.notify.notify_waiters();
        Ok(())
    }
}

// ---------------------------------------------------------------------
// In-process event bus
// ---------------------------------------------------------------------

#[derive(Clone)]
struct BusState {
    rooms: Arc<Mutex<HashMap<String, Vec<mpsc::UnboundedSender<Message>>>>>,
    joins: Arc<Mutex<Vec<String>>>,
    join_notify: Arc<Notify>,
    sever_notify: Arc<Notify>,
}

/// Room-aware broadcast server the channel under test dials into.
pub struct EventBus {
    state: BusState,
    pub addr: SocketAddr,
}

pub async fn start_bus() -> EventBus {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let state = BusState {
        rooms: Arc::new(Mutex::new(HashMap::new())),
        joins: Arc::new(Mutex::new(Vec::new())),
        join_notify: Arc::new(Notify::new()),
        sever_notify: Arc::new(Notify::new()),
    };

    let app = Router::new()
        .route("/ws", get(ws_handler))
        .with_state(state.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    EventBus { state, addr }
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<BusState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: BusState) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

    let writer = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if sink.send(message).await.is_err() {
                break;
            }
        }
    });

    loop {
        tokio::select! {
            // Severed: bail out without a close handshake so the client
            // sees a transport error, not a clean close.
            _ = state.sever_notify.notified() => break,
            inbound = stream.next() => {
                let Some(Ok(message)) = inbound else {
                    break;
                };
                let Message::Text(text) = message else {
                    continue;
                };
                let Ok(frame) = serde_json::from_str::<Value>(text.as_str()) else {
                    continue;
                };
                if frame["event"] == "join-room" {
                    if let Some(room) = frame["data"].as_str() {
                        state
                            .rooms
                            .lock()
                            .unwrap()
                            .entry(room.to_string())
                            .or_default()
                            .push(tx.clone());
                        state.joins.lock().unwrap().push(room.to_string());
                        state.join_notify.notify_waiters();
                    }
                }
            }
        }
    }

    writer.abort();
}

impl EventBus {
    pub fn socket_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn broadcast(&self, room: &str, event: &str, data: Value) {
        let frame = serde_json::json!({"event": event, "data": data}).to_string();
        let rooms = self.state.rooms.lock().unwrap();
        if let Some(members) = rooms.get(room) {
            for member in members {
                let _ = member.send(Message::Text(frame.clone().into()));
            }
        }
    }

    /// Every join-room request received, in arrival order.
    pub fn joins(&self) -> Vec<String> {
        self.state.joins.lock().unwrap().clone()
    }

    pub async fn wait_for_joins(&self, count: usize) {
        loop {
            let notified = self.state.join_notify.notified();
            if self.joins().len() >= count {
                return;
            }
            notified.await;
        }
    }

    /// Server-side close of every member connection in `room`.
    pub fn drop_room(&self, room: &str) {
        if let Some(members) = self.state.rooms.lock().unwrap().remove(room) {
            for member in members {
                let _ = member.send(Message::Close(None));
            }
        }
    }

    /// Tear down every live connection with no close handshake.
    pub fn sever_connections(&self) {
        self.state.rooms.lock().unwrap().clear();
        self.state.sever_notify.notify_waiters();
    }
}
