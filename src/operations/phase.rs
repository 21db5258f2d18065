//! Per-invocation phases of an orchestrated operation.
//!
//! Phases are not persisted; a [`PhaseTracker`] lives for one run and rejects out-of-order
//! transitions so a step sequencing mistake surfaces as an internal error instead of a
//! silently wrong deployment.

use crate::error::{DeployError, DeployResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentPhase {
    Preparing,
    Validating,
    Archiving,
    Pushing,
    Starting,
    AwaitingStart,
    DebugConnecting,
    Started,
    Stopping,
    Stopped,
    Deleting,
    Deleted,
    Updating,
    Updated,
    Failed,
    Cancelled,
}

impl DeploymentPhase {
    /// No further transitions are allowed out of a terminal phase
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Started | Self::Deleted | Self::Updated | Self::Failed | Self::Cancelled
        )
    }
}

impl fmt::Display for DeploymentPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Preparing => "preparing",
            Self::Validating => "validating",
            Self::Archiving => "archiving",
            Self::Pushing => "pushing",
            Self::Starting => "starting",
            Self::AwaitingStart => "awaiting_start",
            Self::DebugConnecting => "debug_connecting",
            Self::Started => "started",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Deleting => "deleting",
            Self::Deleted => "deleted",
            Self::Updating => "updating",
            Self::Updated => "updated",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Whether `from -> to` is a legal step
pub fn can_transition(from: DeploymentPhase, to: DeploymentPhase) -> bool {
    use DeploymentPhase::*;

    if from.is_terminal() {
        return false;
    }

    matches!(
        (from, to),
        (_, Failed)
            | (_, Cancelled)
            | (Preparing, Validating)
            | (Preparing, Starting)
            | (Preparing, Stopping)
            | (Preparing, Deleting)
            | (Preparing, Updating)
            | (Validating, Archiving)
            | (Validating, Starting)
            | (Archiving, Pushing)
            | (Pushing, Starting)
            | (Starting, AwaitingStart)
            | (Starting, DebugConnecting)
            | (DebugConnecting, AwaitingStart)
            | (DebugConnecting, Started)
            | (AwaitingStart, DebugConnecting)
            | (AwaitingStart, Started)
            | (Stopping, Stopped)
            | (Stopped, Starting)
            | (Deleting, Deleted)
            | (Updating, Updated)
    )
}

#[derive(Debug, Clone)]
pub struct PhaseTracker {
    operation: String,
    history: Vec<DeploymentPhase>,
}

impl PhaseTracker {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            history: vec![DeploymentPhase::Preparing],
        }
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub fn current(&self) -> DeploymentPhase {
        self.history
            .last()
            .copied()
            .unwrap_or(DeploymentPhase::Preparing)
    }

    pub fn history(&self) -> &[DeploymentPhase] {
        &self.history
    }

    pub fn advance(&mut self, to: DeploymentPhase) -> DeployResult<()> {
        let from = self.current();
        if !can_transition(from, to) {
            return Err(DeployError::Internal(format!(
                "{}: invalid phase transition {from} -> {to}",
                self.operation
            )));
        }
        debug!(operation = %self.operation, from = %from, to = %to, "Operation phase transition");
        self.history.push(to);
        Ok(())
    }

    /// Record the outcome of a failed run; a no-op if the run already reached a terminal phase
    pub fn finish_with_error(&mut self, error: &DeployError) {
        let to = if error.is_cancellation() {
            DeploymentPhase::Cancelled
        } else {
            DeploymentPhase::Failed
        };
        if can_transition(self.current(), to) {
            self.history.push(to);
        }
    }
}
