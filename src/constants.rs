//! # Operational Constants
//!
//! Timeouts, intervals and well-known names that bound every remote operation.
//! Most of these are defaults for [`crate::config::DeployConfig`] and can be overridden there.

use std::time::Duration;

/// Timeouts and polling intervals for remote operations
pub mod timeouts {
    use super::Duration;

    /// How long a started application may take to report `Started`
    pub const DEPLOYMENT_TIMEOUT: Duration = Duration::from_secs(10 * 60);

    /// Default wait between retries of a remote request
    pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(2);

    pub const ONE_SECOND_INTERVAL: Duration = Duration::from_secs(1);

    /// Total retry budget for an ordinary remote request
    pub const DEFAULT_CLIENT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

    /// Total retry budget for application uploads
    pub const UPLOAD_TIMEOUT: Duration = Duration::from_secs(60 * 60);

    /// Period of the background module refresh
    pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

    pub const LOGIN_INTERVAL: Duration = Duration::from_secs(2);
}

/// Attempt counts for bounded polls
pub mod attempts {
    pub const LOGIN_ATTEMPTS: u32 = 2;

    /// Polls for a newly created application to become visible remotely
    pub const APP_VISIBILITY_ATTEMPTS: u32 = 10;
}

/// Deployment descriptor defaults
pub mod defaults {
    pub const DEFAULT_MEMORY_MB: u64 = 1024;
    pub const DEFAULT_INSTANCES: u32 = 1;
}

/// Name of the remote application that proxies tunnels to bound services
pub const TUNNEL_SERVICE_APPLICATION: &str = "caldecott";

/// Capacity of the refresh notification channel
pub const REFRESH_EVENT_CAPACITY: usize = 256;
