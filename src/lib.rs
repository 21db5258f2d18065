#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # CF Deploy Core
//!
//! Deployment orchestration for applications on a Cloud Foundry style platform.
//!
//! ## Overview
//!
//! The crate sits between a host that owns local deployable units (an IDE, a CLI, a build
//! service) and a remote cloud controller client. It provides reliable remote operations with
//! typed retry policies, the deployment state machine (create, push, start, wait for start,
//! with debug and incremental-publish variants), and a background refresh that keeps a local
//! view of remote application state current while foreground operations run.
//!
//! ## Module Organization
//!
//! - [`behaviour`] - [`ServerBehaviour`], the entry point for one endpoint
//! - [`operations`] - Orchestrated operations and their state machine
//! - [`resilience`] - Retry policies and retrying requests
//! - [`wait`] - Conditional polling
//! - [`refresh`] - Background refresh with reference-counted pauses
//! - [`registry`] - Module registry keyed by stable module id
//! - [`models`] - Deployment descriptors and application modules
//! - [`events`] - Behaviour event bus and refresh notifications
//! - [`archive`] - Full and delta upload archives
//! - [`client`] - Remote client interface and session
//! - [`framework`] - Host framework interface
//! - [`config`] - Layered configuration
//! - [`error`] - Structured error handling
//!
//! ## Testing
//!
//! ```bash
//! cargo test --lib    # Unit tests
//! cargo test          # Unit and scenario tests against a scripted client
//! ```

pub mod archive;
pub mod behaviour;
pub mod client;
pub mod config;
pub mod constants;
pub mod error;
pub mod events;
pub mod framework;
pub mod logging;
pub mod models;
pub mod operations;
pub mod refresh;
pub mod registry;
pub mod resilience;
pub mod wait;

pub use behaviour::{ServerBehaviour, ServerBehaviourBuilder};
pub use config::DeployConfig;
pub use error::{ClientError, DeployError, DeployResult, ErrorCategory};
pub use events::{BehaviourEvent, BehaviourEventBus, BehaviourEventType, BehaviourListener};
pub use framework::{ModuleFramework, ModuleRef, PublishState, RunState};
pub use models::{ApplicationDeploymentInfo, ApplicationModule, ModuleId};
pub use operations::{CloudOperation, OperationMonitor};
