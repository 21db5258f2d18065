//! # Orchestrated Operations
//!
//! Every user-facing operation implements [`CloudOperation`] and is run with an
//! [`OperationMonitor`] for cooperative cancellation. Application operations share one state
//! machine whose variants differ only in the [`OperationSteps`] they include.

pub mod application;
pub mod collaborators;
pub mod context;
pub mod delete;
pub mod monitor;
pub mod phase;
pub mod steps;
pub mod update;

pub use application::ApplicationOperation;
pub use collaborators::{
    AcceptDefaults, DebugLauncher, DeploymentInfoProvider, NoDebugger, NoTunnels, TunnelManager,
};
pub use context::{CloudOperation, OperationContext};
pub use delete::{DeleteOperation, DeleteServicesOperation};
pub use monitor::OperationMonitor;
pub use phase::{DeploymentPhase, PhaseTracker};
pub use steps::{OperationKind, OperationSteps};
pub use update::{ApplicationUpdate, UpdateOperation};
