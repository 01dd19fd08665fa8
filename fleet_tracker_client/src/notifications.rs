use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use chrono::{DateTime, Utc};
use tracing::warn;

use fleet_tracker_lib::{
    role::Role,
    trip_event::{TripCreatedEvent, TripStatusUpdatedEvent},
};

use crate::{
    auth::CredentialStore,
    channel::{
        ChannelError, EventChannel, HandlerId,
        protocol::{EVENT_CONNECT, EVENT_TRIP_CREATED, EVENT_TRIP_STATUS_UPDATED},
    },
};

/// Entries retained in the feed; the oldest beyond this are evicted.
pub const MAX_RETAINED_EVENTS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    TripCreated,
    TripStatusUpdated,
}

/// One received broadcast, rendered for the feed.
#[derive(Debug, Clone)]
pub struct NotificationEvent {
    pub id: String,
    pub kind: NotificationKind,
    pub message: String,
    pub trip_id: Option<String>,
    pub received_at: DateTime<Utc>,
}

/// Ordered, capped in-memory feed of received events with unread-count
/// tracking. Newest entries first. Duplicate ids are kept as-is; the
/// feed does not de-duplicate.
#[derive(Debug)]
pub struct NotificationFeed {
    role: Role,
    entries: VecDeque<NotificationEvent>,
    unread: usize,
    open: bool,
}

impl NotificationFeed {
    pub fn new(role: Role) -> Self {
        Self {
            role,
            entries: VecDeque::new(),
            unread: 0,
            open: false,
        }
    }

    pub fn on_trip_created(&mut self, payload: TripCreatedEvent) {
        let id = match &payload.trip_id {
            Some(trip_id) => format!("trip-created-{trip_id}"),
            // Without a trip id the entry still renders; the receipt time
            // keeps the id unique enough.
            None => format!("trip-created-{}", Utc::now().timestamp_millis()),
        };
        let message = if payload.registration_number.is_empty() {
            "New trip created".to_string()
        } else {
            format!("New trip created for {}", payload.registration_number)
        };
        self.push(NotificationEvent {
            id,
            kind: NotificationKind::TripCreated,
            message,
            trip_id: payload.trip_id,
            received_at: Utc::now(),
        });
    }

    pub fn on_trip_status_updated(&mut self, payload: TripStatusUpdatedEvent) {
        let id = format!(
            "trip-status-{}-{}",
            payload.trip_id.as_deref().unwrap_or_default(),
            payload.status
        );
        let message = format!("Trip status updated to {}", payload.status);
        self.push(NotificationEvent {
            id,
            kind: NotificationKind::TripStatusUpdated,
            message,
            trip_id: payload.trip_id,
            received_at: Utc::now(),
        });
    }

    fn push(&mut self, event: NotificationEvent) {
        self.entries.push_front(event);
        self.unread += 1;
        while self.entries.len() > MAX_RETAINED_EVENTS {
            self.entries.pop_back();
        }
    }

    /// Open or close the feed panel. Opening marks everything read;
    /// closing keeps the entries.
    pub fn toggle_open(&mut self) {
        self.open = !self.open;
        if self.open {
            self.unread = 0;
        }
    }

    /// Resolve a selection to the role's trip detail route, closing the
    /// feed on navigation. An entry with no trip id does nothing.
    pub fn select(&mut self, entry_id: &str) -> Option<String> {
        let role = self.role;
        let route = self
            .entries
            .iter()
            .find(|entry| entry.id == entry_id)
            .and_then(|entry| entry.trip_id.as_deref())
            .map(|trip_id| role.trip_route(trip_id));
        if route.is_some() {
            self.open = false;
        }
        route
    }

    pub fn entries(&self) -> impl Iterator<Item = &NotificationEvent> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn unread(&self) -> usize {
        self.unread
    }

    pub fn is_open(&self) -> bool {
        self.open
    }
}

/// Lifecycle of one authenticated attachment to the event channel: joins
/// the identity's room on every connect acknowledgment and routes trip
/// broadcasts into the feed. `close()` removes exactly this session's
/// handlers before dropping the transport.
pub struct ChannelSession {
    channel: EventChannel,
    room_id: String,
    handlers: Vec<(&'static str, HandlerId)>,
}

impl ChannelSession {
    /// Attach to the bus for the stored identity of `role`. Handlers are
    /// registered before the transport comes up, so the very first
    /// `connect` acknowledgment already triggers the room join.
    pub fn open(
        channel: EventChannel,
        role: Role,
        credentials: &dyn CredentialStore,
        feed: Arc<Mutex<NotificationFeed>>,
    ) -> Result<Self, ChannelError> {
        let Some(credential) = credentials.credential(role) else {
            return Err(ChannelError::Unauthenticated);
        };
        let room_id = role.room_id(&credential.identity_id);

        let mut handlers = Vec::new();

        let join_channel = channel.clone();
        let join_room = room_id.clone();
        handlers.push((
            EVENT_CONNECT,
            channel.on(EVENT_CONNECT, move |_| {
                if let Err(err) = join_channel.join_room(&join_room) {
                    warn!("Room join failed right after connect: {err}");
                }
            }),
        ));

        let created_feed = feed.clone();
        handlers.push((
            EVENT_TRIP_CREATED,
            channel.on(EVENT_TRIP_CREATED, move |data| {
                match serde_json::from_value::<TripCreatedEvent>(data) {
                    Ok(payload) => created_feed.lock().unwrap().on_trip_created(payload),
                    Err(err) => warn!("Malformed trip-created payload: {err}"),
                }
            }),
        ));

        let status_feed = feed;
        handlers.push((
            EVENT_TRIP_STATUS_UPDATED,
            channel.on(EVENT_TRIP_STATUS_UPDATED, move |data| {
                match serde_json::from_value::<TripStatusUpdatedEvent>(data) {
                    Ok(payload) => status_feed.lock().unwrap().on_trip_status_updated(payload),
                    Err(err) => warn!("Malformed trip-status-updated payload: {err}"),
                }
            }),
        ));

        channel.connect();

        // The channel may already have been live before this attachment;
        // no connect event will re-fire for it, so join immediately.
        if channel.is_connected() {
            if let Err(err) = channel.join_room(&room_id) {
                warn!("Room join on live channel failed: {err}");
            }
        }

        Ok(Self {
            channel,
            room_id,
            handlers,
        })
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    pub fn connected(&self) -> bool {
        self.channel.is_connected()
    }

    /// Detach: remove this session's handlers, then drop the transport.
    pub fn close(self) {
        for (event, id) in &self.handlers {
            self.channel.off(event, *id);
        }
        self.channel.disconnect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn created(trip_id: Option<&str>, registration: &str) -> TripCreatedEvent {
        TripCreatedEvent {
            trip_id: trip_id.map(str::to_owned),
            registration_number: registration.to_owned(),
        }
    }

    fn status(trip_id: Option<&str>, status: &str) -> TripStatusUpdatedEvent {
        TripStatusUpdatedEvent {
            trip_id: trip_id.map(str::to_owned),
            status: status.to_owned(),
        }
    }

    #[test]
    fn newest_entry_is_first() {
        let mut feed = NotificationFeed::new(Role::Owner);
        feed.on_trip_created(created(Some("T1"), "AB 12 345"));
        feed.on_trip_status_updated(status(Some("T1"), "Started"));

        let ids: Vec<_> = feed.entries().map(|e| e.id.clone()).collect();
        assert_eq!(ids, vec!["trip-status-T1-Started", "trip-created-T1"]);
    }

    #[test]
    fn unread_counts_until_opened() {
        let mut feed = NotificationFeed::new(Role::Owner);
        feed.on_trip_created(created(Some("T1"), "AB 12 345"));
        feed.on_trip_created(created(Some("T2"), "CD 67 890"));
        assert_eq!(feed.unread(), 2);

        feed.toggle_open();
        assert!(feed.is_open());
        assert_eq!(feed.unread(), 0);
        assert_eq!(feed.len(), 2);

        feed.toggle_open();
        assert!(!feed.is_open());

        feed.on_trip_created(created(Some("T3"), "EF 11 213"));
        assert_eq!(feed.unread(), 1);
    }

    #[test]
    fn identical_status_updates_are_both_kept() {
        let mut feed = NotificationFeed::new(Role::Owner);
        feed.on_trip_status_updated(status(Some("T1"), "Delivered"));
        feed.on_trip_status_updated(status(Some("T1"), "Delivered"));

        assert_eq!(feed.len(), 2);
        assert_eq!(feed.unread(), 2);
        let ids: Vec<_> = feed.entries().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["trip-status-T1-Delivered", "trip-status-T1-Delivered"]);
    }

    #[test]
    fn created_without_trip_id_gets_timestamp_id() {
        let mut feed = NotificationFeed::new(Role::Owner);
        feed.on_trip_created(created(None, "AB 12 345"));

        let entry = feed.entries().next().unwrap();
        assert!(entry.id.starts_with("trip-created-"));
        assert!(entry.trip_id.is_none());
    }

    #[test]
    fn select_routes_by_role_and_closes() {
        let mut owner_feed = NotificationFeed::new(Role::Owner);
        owner_feed.on_trip_created(created(Some("T1"), "AB 12 345"));
        owner_feed.toggle_open();

        let route = owner_feed.select("trip-created-T1");
        assert_eq!(route.as_deref(), Some("/owner-home/trips/T1"));
        assert!(!owner_feed.is_open());

        let mut driver_feed = NotificationFeed::new(Role::Driver);
        driver_feed.on_trip_status_updated(status(Some("T2"), "Started"));
        let route = driver_feed.select("trip-status-T2-Started");
        assert_eq!(route.as_deref(), Some("/driver-home/trips/T2"));
    }

    #[test]
    fn select_without_trip_id_is_inert() {
        let mut feed = NotificationFeed::new(Role::Owner);
        feed.on_trip_created(created(None, "AB 12 345"));
        feed.toggle_open();

        let id = feed.entries().next().unwrap().id.clone();
        assert_eq!(feed.select(&id), None);
        assert!(feed.is_open());
    }

    #[test]
    fn feed_is_capped() {
        let mut feed = NotificationFeed::new(Role::Owner);
        for i in 0..MAX_RETAINED_EVENTS + 5 {
            feed.on_trip_created(created(Some(&format!("T{i}")), "AB 12 345"));
        }

        assert_eq!(feed.len(), MAX_RETAINED_EVENTS);
        // Newest first; the oldest five were evicted.
        assert_eq!(feed.entries().next().unwrap().id, "trip-created-T104");
        assert!(feed.entries().all(|e| e.id != "trip-created-T4"));
        assert!(feed.entries().any(|e| e.id == "trip-created-T5"));
    }
}
