//! Event bus with callback listeners
//!
//! Components register a callback for an event type and get back a
//! [`ListenerHandle`]. Removing the handle unsubscribes the callback, so a
//! config entry can push the handle onto its unload callbacks and have the
//! subscription disappear together with the entry.

use dashmap::DashMap;
use ha_core::{Event, EventType};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, trace};

/// Listener callback; runs synchronously inside [`EventBus::fire`]
pub type EventCallback = Arc<dyn Fn(&Event) + Send + Sync>;

/// A unique identifier for an event listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct Listener {
    id: ListenerId,
    callback: EventCallback,
}

type ListenerMap = DashMap<EventType, Vec<Listener>>;

/// The event bus for publishing and subscribing to events
pub struct EventBus {
    /// Listeners by event type, in registration order
    listeners: Arc<ListenerMap>,
    next_listener_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            listeners: Arc::new(DashMap::new()),
            next_listener_id: AtomicU64::new(1),
        }
    }

    /// Listen for events of one type, or every event with `"*"`
    #[must_use = "dropping the handle leaves the listener registered with no way to remove it"]
    pub fn listen<F>(&self, event_type: impl Into<EventType>, callback: F) -> ListenerHandle
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let event_type = event_type.into();
        let id = ListenerId(self.next_listener_id.fetch_add(1, Ordering::SeqCst));
        trace!(event_type = %event_type, listener = id.0, "Adding listener");

        self.listeners
            .entry(event_type.clone())
            .or_default()
            .push(Listener {
                id,
                callback: Arc::new(callback),
            });

        ListenerHandle {
            listeners: Arc::downgrade(&self.listeners),
            event_type,
            id,
        }
    }

    /// Fire an event
    ///
    /// Listeners of the event's type run first, then `"*"` listeners, each
    /// group in registration order. A listener may add or remove listeners
    /// while it runs.
    pub fn fire(&self, event: Event) {
        debug!(event_type = %event.event_type, "Firing event");

        let mut callbacks = self.callbacks_for(&event.event_type);
        if !event.event_type.is_match_all() {
            callbacks.extend(self.callbacks_for(&EventType::from(ha_core::MATCH_ALL)));
        }

        for callback in callbacks {
            callback(&event);
        }
    }

    /// Fire an event with a JSON payload and a fresh context
    pub fn fire_data(&self, event_type: impl Into<EventType>, data: serde_json::Value) {
        self.fire(Event::new(event_type, data, ha_core::Context::new()));
    }

    /// Number of listeners registered for an event type
    pub fn listener_count(&self, event_type: &str) -> usize {
        self.listeners
            .get(&EventType::from(event_type))
            .map(|listeners| listeners.len())
            .unwrap_or(0)
    }

    fn callbacks_for(&self, event_type: &EventType) -> Vec<EventCallback> {
        // Clone out so the shard lock is not held while callbacks run
        self.listeners
            .get(event_type)
            .map(|listeners| listeners.iter().map(|l| l.callback.clone()).collect())
            .unwrap_or_default()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Removal handle for a listener registered with [`EventBus::listen`]
pub struct ListenerHandle {
    listeners: Weak<ListenerMap>,
    event_type: EventType,
    id: ListenerId,
}

impl ListenerHandle {
    pub fn id(&self) -> ListenerId {
        self.id
    }

    /// Remove the listener
    ///
    /// Returns false if it was already gone or the bus has been dropped.
    pub fn remove(self) -> bool {
        let Some(listeners) = self.listeners.upgrade() else {
            return false;
        };

        let removed = match listeners.get_mut(&self.event_type) {
            Some(mut registered) => {
                let before = registered.len();
                registered.retain(|l| l.id != self.id);
                before != registered.len()
            }
            None => false,
        };
        listeners.remove_if(&self.event_type, |_, registered| registered.is_empty());

        if removed {
            trace!(event_type = %self.event_type, listener = self.id.0, "Removed listener");
        }
        removed
    }
}

impl std::fmt::Debug for ListenerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerHandle")
            .field("event_type", &self.event_type)
            .field("id", &self.id)
            .finish()
    }
}

/// Thread-safe wrapper for EventBus
pub type SharedEventBus = Arc<EventBus>;
