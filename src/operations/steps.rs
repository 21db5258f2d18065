use serde::{Deserialize, Serialize};
use std::fmt;

/// The application operations that share one state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// Push the unit (creating the application if needed) and start it
    Deploy,
    /// Push and start with the debug agent enabled
    Debug,
    /// Stop and start whatever is already deployed
    Restart,
    Stop,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::Deploy => write!(f, "deploy"),
            OperationKind::Debug => write!(f, "debug"),
            OperationKind::Restart => write!(f, "restart"),
            OperationKind::Stop => write!(f, "stop"),
        }
    }
}

/// Which optional steps a run includes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationSteps {
    pub validate: bool,
    /// Build an archive and upload it; skipped for units without local resources
    pub push: bool,
    /// Build a delta archive when the unit allows it
    pub incremental: bool,
    pub stop: bool,
    pub start: bool,
    pub debug: bool,
}

impl OperationSteps {
    pub fn for_kind(kind: OperationKind) -> Self {
        let none = Self {
            validate: false,
            push: false,
            incremental: false,
            stop: false,
            start: false,
            debug: false,
        };
        match kind {
            OperationKind::Deploy => Self {
                validate: true,
                push: true,
                start: true,
                ..none
            },
            OperationKind::Debug => Self {
                validate: true,
                push: true,
                start: true,
                debug: true,
                ..none
            },
            OperationKind::Restart => Self {
                stop: true,
                start: true,
                ..none
            },
            OperationKind::Stop => Self { stop: true, ..none },
        }
    }

    pub fn incremental(mut self, incremental: bool) -> Self {
        self.incremental = incremental && self.push;
        self
    }
}
