use crate::framework::{ModuleFramework, RunState};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tracing::info;

/// Server connectivity as observed by remote requests
///
/// Every change is pushed to the host framework's server status indicator.
pub struct ServerStateTracker {
    server: String,
    state: AtomicU8,
    framework: Arc<dyn ModuleFramework>,
}

impl std::fmt::Debug for ServerStateTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerStateTracker")
            .field("server", &self.server)
            .field("state", &self.state())
            .finish()
    }
}

impl ServerStateTracker {
    pub fn new(server: impl Into<String>, framework: Arc<dyn ModuleFramework>) -> Self {
        Self {
            server: server.into(),
            state: AtomicU8::new(RunState::Unknown.as_u8()),
            framework,
        }
    }

    pub fn state(&self) -> RunState {
        RunState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Whether the last observation saw the server reachable
    pub fn is_reachable(&self) -> bool {
        self.state() == RunState::Started
    }

    /// Record an observed state; returns `true` if it changed
    pub async fn observe(&self, state: RunState) -> bool {
        let previous = RunState::from_u8(self.state.swap(state.as_u8(), Ordering::AcqRel));
        if previous == state {
            return false;
        }
        info!(
            server = %self.server,
            from = %previous,
            to = %state,
            "🔄 SERVER STATE: transition"
        );
        self.framework.set_server_state(state).await;
        true
    }
}
