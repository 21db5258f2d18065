//! # Data Model
//!
//! Deployment descriptors, their short-lived working copies, and the application modules that
//! bind local deployable units to remote applications.

pub mod application_module;
pub mod deployment_info;
pub mod working_copy;

pub use application_module::{ApplicationModule, ModuleId};
pub use deployment_info::ApplicationDeploymentInfo;
pub use working_copy::DeploymentInfoWorkingCopy;
