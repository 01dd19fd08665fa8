mod actor;
pub mod protocol;

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex, OnceLock,
        atomic::{AtomicU64, Ordering},
    },
};

use serde_json::Value;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, info};

use crate::config::ClientConfig;
use protocol::EventFrame;

/// Errors surfaced by the event channel.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// A room join was issued with no live transport. Join from a
    /// `connect` handler instead.
    #[error("event channel is not connected")]
    NotConnected,
    /// No stored credential for the requested role.
    #[error("no stored credential for this role")]
    Unauthenticated,
}

/// Token for removing one registered handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

type Handler = Arc<dyn Fn(Value) + Send + Sync>;

struct Listener {
    id: HandlerId,
    handler: Handler,
}

#[derive(Default)]
struct Registry {
    listeners: HashMap<String, Vec<Listener>>,
}

pub(crate) struct ChannelInner {
    pub(crate) dial_url: String,
    registry: Mutex<Registry>,
    next_handler_id: AtomicU64,
    /// Sender into the live connection's outbound queue; `None` while
    /// disconnected.
    pub(crate) outbound: Mutex<Option<mpsc::UnboundedSender<EventFrame>>>,
    actor: Mutex<Option<JoinHandle<()>>>,
}

impl ChannelInner {
    /// Invoke every handler registered for `event`. Handlers are cloned
    /// out of the registry first, so one of them may re-enter the channel
    /// without deadlocking.
    pub(crate) fn dispatch(&self, event: &str, data: Value) {
        let handlers: Vec<Handler> = {
            let registry = self.registry.lock().unwrap();
            match registry.listeners.get(event) {
                Some(listeners) => listeners.iter().map(|l| l.handler.clone()).collect(),
                None => {
                    debug!("No handlers for bus event {event}");
                    return;
                }
            }
        };
        for handler in handlers {
            handler(data.clone());
        }
    }
}

/// One reconnectable duplex connection to the server-side broadcast bus.
///
/// Frames are routed to registered handlers by event name; payloads pass
/// through uninterpreted. Transport loss is absorbed by the connection
/// actor's reconnect loop, with the synthetic `connect` and `disconnect`
/// events marking every transition. The channel never replays a room
/// join itself: consumers re-issue theirs from a `connect` handler.
#[derive(Clone)]
pub struct EventChannel {
    inner: Arc<ChannelInner>,
}

impl EventChannel {
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            inner: Arc::new(ChannelInner {
                dial_url: config.websocket_url(),
                registry: Mutex::new(Registry::default()),
                next_handler_id: AtomicU64::new(1),
                outbound: Mutex::new(None),
                actor: Mutex::new(None),
            }),
        }
    }

    /// Process-wide channel, shared so independent consumers reuse one
    /// connection instead of duplicating handshakes.
    pub fn shared() -> &'static EventChannel {
        static SHARED: OnceLock<EventChannel> = OnceLock::new();
        SHARED.get_or_init(|| EventChannel::new(&ClientConfig::from_env()))
    }

    /// Establish the transport. Idempotent: connecting a connected or
    /// connecting channel is a no-op. Does not join any room.
    pub fn connect(&self) {
        let mut actor_slot = self.inner.actor.lock().unwrap();
        if let Some(handle) = actor_slot.as_ref() {
            if !handle.is_finished() {
                debug!("Event channel already connecting, ignoring connect");
                return;
            }
        }
        info!("Event channel connecting to {}", self.inner.dial_url);
        *actor_slot = Some(tokio::spawn(actor::run(self.inner.clone())));
    }

    /// Ask the bus to subscribe this connection to `room_id`. Fails when
    /// the transport is not established; the `connect` acknowledgment is
    /// the signal that it is.
    pub fn join_room(&self, room_id: &str) -> Result<(), ChannelError> {
        let outbound = self.inner.outbound.lock().unwrap();
        let Some(sender) = outbound.as_ref() else {
            return Err(ChannelError::NotConnected);
        };
        sender
            .send(EventFrame::join_room(room_id))
            .map_err(|_| ChannelError::NotConnected)?;
        info!("Joining room {room_id}");
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.inner.outbound.lock().unwrap().is_some()
    }

    /// Register `handler` for `event`. The returned id removes exactly
    /// this registration.
    pub fn on(&self, event: &str, handler: impl Fn(Value) + Send + Sync + 'static) -> HandlerId {
        let id = HandlerId(self.inner.next_handler_id.fetch_add(1, Ordering::Relaxed));
        let mut registry = self.inner.registry.lock().unwrap();
        registry
            .listeners
            .entry(event.to_owned())
            .or_default()
            .push(Listener {
                id,
                handler: Arc::new(handler),
            });
        id
    }

    /// Remove one registration. Other handlers for the same event are
    /// untouched.
    pub fn off(&self, event: &str, id: HandlerId) {
        let mut registry = self.inner.registry.lock().unwrap();
        if let Some(listeners) = registry.listeners.get_mut(event) {
            listeners.retain(|listener| listener.id != id);
            if listeners.is_empty() {
                registry.listeners.remove(event);
            }
        }
    }

    /// Tear down the transport and drop every registered handler, so a
    /// later session cannot receive deliveries meant for an earlier one.
    pub fn disconnect(&self) {
        if let Some(handle) = self.inner.actor.lock().unwrap().take() {
            handle.abort();
        }
        self.inner.outbound.lock().unwrap().take();
        self.inner.registry.lock().unwrap().listeners.clear();
        info!("Event channel disconnected");
    }
}
