use crate::models::ModuleId;
use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

/// What a refresh covered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshScope {
    /// A full pass over every remote application
    All,
    /// A single module after a foreground operation
    Module(ModuleId),
}

/// "Refresh completed" notification for observers repainting module state
#[derive(Debug, Clone)]
pub struct RefreshEvent {
    pub server: String,
    pub scope: RefreshScope,
    pub completed_at: DateTime<Utc>,
}

/// Broadcasts refresh-completed notifications
#[derive(Debug, Clone)]
pub struct RefreshPublisher {
    sender: broadcast::Sender<RefreshEvent>,
}

impl RefreshPublisher {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn publish(&self, server: impl Into<String>, scope: RefreshScope) {
        let event = RefreshEvent {
            server: server.into(),
            scope,
            completed_at: Utc::now(),
        };
        // No subscribers is fine; refreshes happen whether or not anyone is watching
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RefreshEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for RefreshPublisher {
    fn default() -> Self {
        Self::new(crate::constants::REFRESH_EVENT_CAPACITY)
    }
}
