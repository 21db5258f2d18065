//! # Registry
//!
//! The owning server's registry of application modules.

pub mod module_registry;

pub use module_registry::{ModuleRegistry, ReconcileMode, ReconcileSummary};
