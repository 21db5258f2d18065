//! # Behaviour Event Bus
//!
//! Type-keyed publish/subscribe for lifecycle events. Each server behaviour owns one bus; there
//! is no process-wide instance.
//!
//! Dispatch is synchronous and follows registration order. A listener that fails is logged and
//! skipped; it never prevents delivery to the listeners after it.

use super::types::{BehaviourEvent, BehaviourEventType};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, warn};

pub type ListenerError = Box<dyn std::error::Error + Send + Sync>;

/// Receives behaviour events for the types it was registered for
pub trait BehaviourListener: Send + Sync {
    fn handle(&self, event: &BehaviourEvent) -> Result<(), ListenerError>;

    fn listener_name(&self) -> &str {
        "unnamed_listener"
    }
}

#[derive(Default)]
pub struct BehaviourEventBus {
    listeners: DashMap<BehaviourEventType, Vec<Arc<dyn BehaviourListener>>>,
}

impl std::fmt::Debug for BehaviourEventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BehaviourEventBus")
            .field("event_types", &self.listeners.len())
            .finish()
    }
}

fn same_listener(a: &Arc<dyn BehaviourListener>, b: &Arc<dyn BehaviourListener>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

impl BehaviourEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener for each of `types`. Registering the same listener again for a type
    /// it already receives is a no-op.
    pub fn add_listener(&self, listener: Arc<dyn BehaviourListener>, types: &[BehaviourEventType]) {
        for event_type in types {
            let mut entry = self.listeners.entry(*event_type).or_default();
            if entry.iter().any(|existing| same_listener(existing, &listener)) {
                continue;
            }
            entry.push(Arc::clone(&listener));
            debug!(
                listener = listener.listener_name(),
                event_type = %event_type,
                "Registered behaviour listener"
            );
        }
    }

    /// Unregister a listener from every type
    pub fn remove_listener(&self, listener: &Arc<dyn BehaviourListener>) {
        for mut entry in self.listeners.iter_mut() {
            entry.retain(|existing| !same_listener(existing, listener));
        }
        self.listeners.retain(|_, listeners| !listeners.is_empty());
    }

    pub fn listener_count(&self, event_type: BehaviourEventType) -> usize {
        self.listeners
            .get(&event_type)
            .map(|listeners| listeners.len())
            .unwrap_or(0)
    }

    /// Deliver `event` to every listener registered for its type; returns how many handled it
    /// without error
    pub fn notify(&self, event: &BehaviourEvent) -> usize {
        // Clone the listener list so no map shard is locked while listeners run; a listener may
        // register or remove listeners from inside its handler
        let listeners = match self.listeners.get(&event.event_type) {
            Some(listeners) => listeners.clone(),
            None => return 0,
        };

        let mut delivered = 0;
        for listener in &listeners {
            match listener.handle(event) {
                Ok(()) => delivered += 1,
                Err(error) => warn!(
                    listener = listener.listener_name(),
                    event_type = %event.event_type,
                    error = %error,
                    "Behaviour listener failed"
                ),
            }
        }
        debug!(
            event_type = %event.event_type,
            application = event.application.as_deref(),
            delivered,
            "Dispatched behaviour event"
        );
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    struct Recorder {
        name: String,
        seen: Arc<Mutex<Vec<String>>>,
        fail: bool,
    }

    impl BehaviourListener for Recorder {
        fn handle(&self, event: &BehaviourEvent) -> Result<(), ListenerError> {
            self.seen.lock().push(format!("{}:{}", self.name, event.event_type));
            if self.fail {
                return Err("listener exploded".into());
            }
            Ok(())
        }

        fn listener_name(&self) -> &str {
            &self.name
        }
    }

    fn recorder(name: &str, seen: &Arc<Mutex<Vec<String>>>, fail: bool) -> Arc<dyn BehaviourListener> {
        Arc::new(Recorder {
            name: name.to_string(),
            seen: Arc::clone(seen),
            fail,
        })
    }

    #[test]
    fn test_registration_is_idempotent() {
        let bus = BehaviourEventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let listener = recorder("a", &seen, false);

        bus.add_listener(Arc::clone(&listener), &[BehaviourEventType::AppStarted]);
        bus.add_listener(
            Arc::clone(&listener),
            &[BehaviourEventType::AppStarted, BehaviourEventType::AppStopped],
        );

        assert_eq!(bus.listener_count(BehaviourEventType::AppStarted), 1);
        assert_eq!(bus.listener_count(BehaviourEventType::AppStopped), 1);

        let delivered = bus.notify(&BehaviourEvent::new(BehaviourEventType::AppStarted, "dev"));
        assert_eq!(delivered, 1);
        assert_eq!(seen.lock().as_slice(), ["a:app_started"]);
    }

    #[test]
    fn test_dispatch_in_registration_order_and_isolates_failures() {
        let bus = BehaviourEventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for (name, fail) in [("first", false), ("broken", true), ("last", false)] {
            bus.add_listener(recorder(name, &seen, fail), &[BehaviourEventType::AppDeleted]);
        }

        let delivered = bus.notify(&BehaviourEvent::new(BehaviourEventType::AppDeleted, "dev"));
        assert_eq!(delivered, 2);
        assert_eq!(
            seen.lock().as_slice(),
            ["first:app_deleted", "broken:app_deleted", "last:app_deleted"]
        );
    }

    #[test]
    fn test_remove_listener_from_all_types() {
        let bus = BehaviourEventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let listener = recorder("a", &seen, false);
        bus.add_listener(Arc::clone(&listener), &BehaviourEventType::ALL);

        bus.remove_listener(&listener);
        for event_type in BehaviourEventType::ALL {
            assert_eq!(bus.listener_count(event_type), 0);
        }
        assert_eq!(bus.notify(&BehaviourEvent::new(BehaviourEventType::AppUpdated, "dev")), 0);
        assert!(seen.lock().is_empty());
    }
}
