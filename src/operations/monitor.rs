use crate::error::{DeployError, DeployResult};
use tokio_util::sync::CancellationToken;

/// Cooperative cancellation handle passed to every operation
///
/// Cancelling never aborts an in-flight remote call; it only prevents further attempts, polls
/// and steps.
#[derive(Debug, Clone, Default)]
pub struct OperationMonitor {
    token: CancellationToken,
}

impl OperationMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_token(token: CancellationToken) -> Self {
        Self { token }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Token for retry loops and polls; cancelled with this monitor
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// A monitor for a sub-task that can be cancelled on its own without cancelling this one
    pub fn sub_task(&self) -> OperationMonitor {
        Self {
            token: self.token.child_token(),
        }
    }

    pub fn check_cancelled(&self, what: &str) -> DeployResult<()> {
        if self.is_cancelled() {
            return Err(DeployError::Cancelled(what.to_string()));
        }
        Ok(())
    }
}
