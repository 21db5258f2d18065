//! Wait-interval policies for retrying remote requests.
//!
//! A policy looks at a failure and answers how long to wait before the next attempt, or `None`
//! to give up. Authentication failures are never retried by a policy; they are handled once by
//! the re-login in [`super::AuthenticatingRequest`].

use crate::error::{ClientError, ErrorCategory};
use std::fmt::Debug;
use std::time::Duration;

pub trait RetryPolicy: Send + Sync + Debug {
    /// Wait before attempt `attempt + 1`, or `None` to stop retrying
    fn wait_interval(&self, error: &ClientError, attempt: u32) -> Option<Duration>;

    fn name(&self) -> &'static str;
}

/// Never retries
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRetry;

impl RetryPolicy for NoRetry {
    fn wait_interval(&self, _error: &ClientError, _attempt: u32) -> Option<Duration> {
        None
    }

    fn name(&self) -> &'static str {
        "no_retry"
    }
}

/// Retries every failure except authentication failures at a fixed interval
#[derive(Debug, Clone, Copy)]
pub struct FixedInterval {
    pub interval: Duration,
}

impl FixedInterval {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl RetryPolicy for FixedInterval {
    fn wait_interval(&self, error: &ClientError, _attempt: u32) -> Option<Duration> {
        (!error.is_auth_failure()).then_some(self.interval)
    }

    fn name(&self) -> &'static str {
        "fixed_interval"
    }
}

/// Retries transient failures: connectivity, unfinished staging, stopped state and 5xx
/// responses
#[derive(Debug, Clone, Copy)]
pub struct TransientRetry {
    pub interval: Duration,
}

impl TransientRetry {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl RetryPolicy for TransientRetry {
    fn wait_interval(&self, error: &ClientError, _attempt: u32) -> Option<Duration> {
        (error.category() == ErrorCategory::Transient).then_some(self.interval)
    }

    fn name(&self) -> &'static str {
        "transient_retry"
    }
}

/// Retries connection errors only
#[derive(Debug, Clone, Copy)]
pub struct ConnectionRetry {
    pub interval: Duration,
}

impl ConnectionRetry {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl RetryPolicy for ConnectionRetry {
    fn wait_interval(&self, error: &ClientError, _attempt: u32) -> Option<Duration> {
        error.is_connection().then_some(self.interval)
    }

    fn name(&self) -> &'static str {
        "connection_retry"
    }
}

/// Keeps polling while the platform is still staging the application
#[derive(Debug, Clone, Copy)]
pub struct StagingAware {
    pub interval: Duration,
}

impl StagingAware {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl RetryPolicy for StagingAware {
    fn wait_interval(&self, error: &ClientError, _attempt: u32) -> Option<Duration> {
        match error {
            ClientError::StagingNotFinished { .. } | ClientError::Connection(_) => {
                Some(self.interval)
            }
            _ => None,
        }
    }

    fn name(&self) -> &'static str {
        "staging_aware"
    }
}

/// Retries requests rejected because the application is momentarily stopped
#[derive(Debug, Clone, Copy)]
pub struct AppInStoppedStateAware {
    pub interval: Duration,
}

impl AppInStoppedStateAware {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl RetryPolicy for AppInStoppedStateAware {
    fn wait_interval(&self, error: &ClientError, _attempt: u32) -> Option<Duration> {
        match error {
            ClientError::AppInStoppedState { .. } | ClientError::Connection(_) => {
                Some(self.interval)
            }
            _ => None,
        }
    }

    fn name(&self) -> &'static str {
        "app_in_stopped_state_aware"
    }
}
