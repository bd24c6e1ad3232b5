//! Broadcast bus for change descriptions.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;

/// Callback invoked with every published change description.
pub type Listener = Arc<dyn Fn(&str) + Send + Sync>;

/// Identifier of a registered listener.
pub type ListenerId = u64;

/// Serialized broadcast of change descriptions.
///
/// Publishes never interleave: each one is delivered to every listener
/// registered at the time of the publish before the next one starts.
/// Listeners run on the publishing thread and must not publish themselves.
pub struct ChangeBus {
    listeners: DashMap<ListenerId, Listener>,
    next_listener_id: AtomicU64,
    publish_lock: Mutex<()>,
}

impl ChangeBus {
    /// Create a bus with no listeners.
    pub fn new() -> Self {
        Self {
            listeners: DashMap::new(),
            next_listener_id: AtomicU64::new(1),
            publish_lock: Mutex::new(()),
        }
    }

    /// Register a listener. Returns its id.
    pub fn subscribe(&self, listener: Listener) -> ListenerId {
        let id = self.next_listener_id.fetch_add(1, Ordering::SeqCst);
        self.listeners.insert(id, listener);
        id
    }

    /// Remove a listener. Returns true if it was registered.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.listeners.remove(&id).is_some()
    }

    /// Deliver a description to every listener.
    ///
    /// Returns the number of listeners reached.
    pub fn publish(&self, description: &str) -> usize {
        let _serialized = self.publish_lock.lock();

        // Snapshot so listeners may (un)subscribe without holding shard locks.
        let listeners: Vec<Listener> = self
            .listeners
            .iter()
            .map(|entry| entry.value().clone())
            .collect();

        for listener in &listeners {
            listener(description);
        }

        tracing::trace!(description, listeners = listeners.len(), "change published");
        listeners.len()
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

impl Default for ChangeBus {
    fn default() -> Self {
        Self::new()
    }
}
