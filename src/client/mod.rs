//! # Remote Client Layer
//!
//! The remote service interface ([`CloudClient`]), the values it returns, and the
//! [`ClientSession`] that owns the lazily created client handle for one server.

pub mod session;
pub mod traits;
pub mod types;

pub use session::{ClientSession, CloudCredentials};
pub use traits::{CloudClient, CloudClientFactory, SilentUploadCallback, UploadStatusCallback};
pub use types::{
    AppState, ApplicationStats, CloudApplication, CloudDomain, CloudSpace,
    CreateApplicationRequest, InstanceInfo, InstanceState, InstanceStats, InstancesInfo, Staging,
    StartingInfo,
};
