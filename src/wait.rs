//! # Conditional Polling
//!
//! [`WaitWithProgress`] runs a [`WaitOperation`] until it produces a valid result, its attempt
//! budget runs out or the operation is cancelled.
//!
//! Running out of attempts without an error is not itself an error: the last (invalid) result is
//! returned and the caller decides what exhaustion means. A recorded error is raised only when
//! the loop ends without a valid result.

use crate::client::{AppState, CloudApplication, CloudClient};
use crate::error::{ClientError, DeployError, DeployResult};
use crate::resilience::ClientRequest;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[async_trait]
pub trait WaitOperation: Send + Sync {
    type Output: Send;

    fn label(&self) -> &str;

    async fn run_in_wait(&self) -> DeployResult<Option<Self::Output>>;

    fn is_valid(&self, result: Option<&Self::Output>) -> bool {
        result.is_some()
    }

    /// Whether to keep polling after `error`
    fn should_retry_on_error(&self, _error: &DeployError) -> bool {
        false
    }
}

#[derive(Debug, Clone)]
pub struct WaitWithProgress {
    attempts: u32,
    interval: Duration,
    cancel: Option<CancellationToken>,
}

impl WaitWithProgress {
    pub fn new(attempts: u32, interval: Duration) -> Self {
        Self {
            attempts,
            interval,
            cancel: None,
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled)
    }

    pub async fn run<W>(&self, operation: &W) -> DeployResult<Option<W::Output>>
    where
        W: WaitOperation + ?Sized,
    {
        let mut result = None;
        let mut last_error = None;

        for attempt in 1..=self.attempts {
            if self.is_cancelled() {
                debug!(wait = operation.label(), attempt, "Wait cancelled");
                break;
            }

            let reattempt = match operation.run_in_wait().await {
                Ok(value) => {
                    result = value;
                    !operation.is_valid(result.as_ref())
                }
                Err(error) => {
                    let retry = operation.should_retry_on_error(&error);
                    debug!(wait = operation.label(), attempt, error = %error, retry, "Wait attempt failed");
                    last_error = Some(error);
                    retry
                }
            };

            if !reattempt || attempt == self.attempts {
                break;
            }

            match &self.cancel {
                Some(token) => {
                    tokio::select! {
                        _ = token.cancelled() => break,
                        _ = tokio::time::sleep(self.interval) => {}
                    }
                }
                None => tokio::time::sleep(self.interval).await,
            }
        }

        match last_error {
            Some(error) if !operation.is_valid(result.as_ref()) => Err(error),
            _ => Ok(result),
        }
    }
}

/// Polls an application until it reports `expected`
///
/// Each fetch goes through `request`, whose policy decides which fetch errors are retried in
/// place. Staging-not-finished counts as not yet in the expected state; any other error that
/// escapes the request ends the wait.
pub struct WaitForApplicationState {
    client: Arc<dyn CloudClient>,
    request: ClientRequest,
    application: String,
    expected: AppState,
}

impl WaitForApplicationState {
    pub fn new(
        client: Arc<dyn CloudClient>,
        request: ClientRequest,
        application: impl Into<String>,
        expected: AppState,
    ) -> Self {
        Self {
            client,
            request,
            application: application.into(),
            expected,
        }
    }
}

#[async_trait]
impl WaitOperation for WaitForApplicationState {
    type Output = CloudApplication;

    fn label(&self) -> &str {
        self.request.label()
    }

    /// A fetch rejected because the platform is still staging counts as a poll without a result,
    /// so staging uses up attempts rather than the fetch's own budget
    async fn run_in_wait(&self) -> DeployResult<Option<CloudApplication>> {
        let name = self.application.as_str();
        match self
            .request
            .run(&self.client, |client| async move { client.application(name).await })
            .await
        {
            Ok(app) => Ok(Some(app)),
            Err(error) if error.client_error().is_some_and(ClientError::is_staging) => {
                debug!(application = name, "Application is still staging");
                Ok(None)
            }
            Err(error) => Err(error),
        }
    }

    fn is_valid(&self, result: Option<&CloudApplication>) -> bool {
        result.is_some_and(|app| app.state == self.expected)
    }
}

/// Polls until a newly created application is visible remotely
pub struct WaitForApplicationVisible {
    client: Arc<dyn CloudClient>,
    request: ClientRequest,
    application: String,
}

impl WaitForApplicationVisible {
    pub fn new(
        client: Arc<dyn CloudClient>,
        request: ClientRequest,
        application: impl Into<String>,
    ) -> Self {
        Self {
            client,
            request,
            application: application.into(),
        }
    }
}

#[async_trait]
impl WaitOperation for WaitForApplicationVisible {
    type Output = CloudApplication;

    fn label(&self) -> &str {
        self.request.label()
    }

    async fn run_in_wait(&self) -> DeployResult<Option<CloudApplication>> {
        let name = self.application.as_str();
        match self
            .request
            .run(&self.client, |client| async move { client.application(name).await })
            .await
        {
            Ok(app) => Ok(Some(app)),
            Err(error) if error.client_error().is_some_and(|e| e.is_not_found()) => Ok(None),
            Err(error) => Err(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Yields `outputs` in turn; `None` entries become errors
    struct Scripted {
        outputs: Vec<Option<u32>>,
        calls: AtomicU32,
        retry_on_error: bool,
    }

    impl Scripted {
        fn new(outputs: Vec<Option<u32>>, retry_on_error: bool) -> Self {
            Self {
                outputs,
                calls: AtomicU32::new(0),
                retry_on_error,
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl WaitOperation for Scripted {
        type Output = u32;

        fn label(&self) -> &str {
            "scripted"
        }

        async fn run_in_wait(&self) -> DeployResult<Option<u32>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) as usize;
            match self.outputs.get(call).copied().flatten() {
                Some(value) => Ok(Some(value)),
                None => Err(DeployError::Internal(format!("failure {call}"))),
            }
        }

        fn is_valid(&self, result: Option<&u32>) -> bool {
            result.is_some_and(|value| *value >= 10)
        }

        fn should_retry_on_error(&self, _error: &DeployError) -> bool {
            self.retry_on_error
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_at_first_valid_result() {
        let op = Scripted::new(vec![Some(1), Some(2), Some(10), Some(11)], false);
        let result = WaitWithProgress::new(5, Duration::from_secs(1)).run(&op).await.unwrap();
        assert_eq!(result, Some(10));
        assert_eq!(op.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_returns_last_invalid_result() {
        let op = Scripted::new(vec![Some(1), Some(2), Some(3)], false);
        let result = WaitWithProgress::new(3, Duration::from_secs(1)).run(&op).await.unwrap();
        assert_eq!(result, Some(3));
        assert_eq!(op.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_without_retry_is_raised() {
        let op = Scripted::new(vec![Some(1), None, Some(10)], false);
        let error = WaitWithProgress::new(5, Duration::from_secs(1)).run(&op).await.unwrap_err();
        assert_eq!(error, DeployError::Internal("failure 1".into()));
        assert_eq!(op.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recorded_error_is_ignored_once_valid() {
        let op = Scripted::new(vec![None, Some(12)], true);
        let result = WaitWithProgress::new(5, Duration::from_secs(1)).run(&op).await.unwrap();
        assert_eq!(result, Some(12));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_before_first_attempt() {
        let token = CancellationToken::new();
        token.cancel();
        let op = Scripted::new(vec![Some(10)], false);
        let result = WaitWithProgress::new(5, Duration::from_secs(1))
            .with_cancellation(token)
            .run(&op)
            .await
            .unwrap();
        assert_eq!(result, None);
        assert_eq!(op.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_does_not_sleep_after_final_attempt() {
        let op = Scripted::new(vec![Some(1), Some(2)], false);
        let started = tokio::time::Instant::now();
        WaitWithProgress::new(2, Duration::from_secs(5)).run(&op).await.unwrap();
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(5) && elapsed < Duration::from_secs(10));
    }
}
