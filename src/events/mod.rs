//! # Events
//!
//! Two notification channels: typed behaviour events for lifecycle transitions, dispatched
//! synchronously to registered listeners, and a broadcast "refresh completed" stream for
//! observers of module state.

pub mod bus;
pub mod publisher;
pub mod types;

pub use bus::{BehaviourEventBus, BehaviourListener, ListenerError};
pub use publisher::{RefreshEvent, RefreshPublisher, RefreshScope};
pub use types::{BehaviourEvent, BehaviourEventType, EventPayload};
