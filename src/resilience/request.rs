//! # Retrying Remote Requests
//!
//! Three composable layers around a single remote call:
//!
//! - [`ClientRequest`] retries according to a [`RetryPolicy`] within a total budget. The budget
//!   is decremented by the interval the policy chose, not by measured wall-clock time, so a
//!   budget `B` with a fixed interval `I` allows exactly `B / I + 1` attempts however long
//!   each remote call takes.
//! - [`AuthenticatingRequest`] adds a single re-login and one extra attempt after the first
//!   authentication failure.
//! - [`BehaviourRequest`] resolves the session's client, validates the endpoint and reports
//!   observed connectivity to the [`ServerStateTracker`].

use super::policy::{ConnectionRetry, RetryPolicy};
use super::server_state::ServerStateTracker;
use crate::client::{ClientSession, CloudClient};
use crate::config::DeployConfig;
use crate::error::{ClientError, DeployError, DeployResult};
use crate::framework::RunState;
use crate::logging::log_request;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct ClientRequest {
    label: String,
    budget: Duration,
    policy: Arc<dyn RetryPolicy>,
    cancel: Option<CancellationToken>,
}

impl ClientRequest {
    pub fn new(label: impl Into<String>, budget: Duration, policy: Arc<dyn RetryPolicy>) -> Self {
        Self {
            label: label.into(),
            budget,
            policy,
            cancel: None,
        }
    }

    /// Stop issuing attempts once `token` is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled)
    }

    /// Run `op` against `client` until it succeeds, the policy gives up or the budget runs out
    pub async fn run<C, T, F, Fut>(&self, client: &Arc<C>, mut op: F) -> DeployResult<T>
    where
        C: ?Sized,
        F: FnMut(Arc<C>) -> Fut,
        Fut: Future<Output = Result<T, ClientError>>,
    {
        self.run_with(client, &mut op).await
    }

    pub(crate) async fn run_with<C, T, F, Fut>(&self, client: &Arc<C>, op: &mut F) -> DeployResult<T>
    where
        C: ?Sized,
        F: FnMut(Arc<C>) -> Fut,
        Fut: Future<Output = Result<T, ClientError>>,
    {
        let mut remaining = self.budget;
        let mut attempt = 0u32;

        loop {
            if self.is_cancelled() {
                return Err(DeployError::Cancelled(self.label.clone()));
            }
            attempt += 1;

            let error = match op(Arc::clone(client)).await {
                Ok(value) => {
                    if attempt > 1 {
                        log_request(&self.label, attempt, "succeeded", None);
                    }
                    return Ok(value);
                }
                Err(error) => error,
            };

            let interval = match self.policy.wait_interval(&error, attempt) {
                Some(interval) if !interval.is_zero() && interval <= remaining => interval,
                _ => {
                    log_request(&self.label, attempt, "failed", Some(&error.to_string()));
                    return Err(DeployError::remote(self.label.clone(), error));
                }
            };

            remaining -= interval;
            debug!(
                request = %self.label,
                attempt,
                policy = self.policy.name(),
                wait_ms = interval.as_millis() as u64,
                remaining_ms = remaining.as_millis() as u64,
                error = %error,
                "Retrying remote request"
            );

            match &self.cancel {
                Some(token) => {
                    tokio::select! {
                        _ = token.cancelled() => {
                            return Err(DeployError::Cancelled(self.label.clone()));
                        }
                        _ = tokio::time::sleep(interval) => {}
                    }
                }
                None => tokio::time::sleep(interval).await,
            }
        }
    }
}

/// A [`ClientRequest`] that recovers once from an authentication failure
///
/// After the first unauthorized or forbidden response the client logs in again (retrying only
/// connection errors, within `login_interval * (login_attempts - 1)`) and the operation gets
/// exactly one more attempt. If the login or that attempt fails, the original failure is
/// returned.
#[derive(Debug, Clone)]
pub struct AuthenticatingRequest {
    request: ClientRequest,
    login_attempts: u32,
    login_interval: Duration,
}

impl AuthenticatingRequest {
    pub fn new(request: ClientRequest, login_attempts: u32, login_interval: Duration) -> Self {
        Self {
            request,
            login_attempts,
            login_interval,
        }
    }

    pub fn label(&self) -> &str {
        self.request.label()
    }

    fn login_request(&self) -> ClientRequest {
        let budget = self.login_interval * self.login_attempts.saturating_sub(1);
        let login = ClientRequest::new(
            format!("login for {}", self.request.label),
            budget,
            Arc::new(ConnectionRetry::new(self.login_interval)),
        );
        match &self.request.cancel {
            Some(token) => login.with_cancellation(token.clone()),
            None => login,
        }
    }

    pub async fn run<T, F, Fut>(&self, client: &Arc<dyn CloudClient>, mut op: F) -> DeployResult<T>
    where
        F: FnMut(Arc<dyn CloudClient>) -> Fut,
        Fut: Future<Output = Result<T, ClientError>>,
    {
        let original = match self.request.run_with(client, &mut op).await {
            Err(error) if error.client_error().is_some_and(ClientError::is_auth_failure) => error,
            other => return other,
        };

        warn!(request = %self.request.label, error = %original, "🔑 Authentication failed, logging in again");
        if let Err(login_error) = self
            .login_request()
            .run(client, |client| async move { client.login().await })
            .await
        {
            warn!(request = %self.request.label, error = %login_error, "Re-login failed");
            return Err(original);
        }

        match op(Arc::clone(client)).await {
            Ok(value) => {
                log_request(&self.request.label, 2, "succeeded after re-login", None);
                Ok(value)
            }
            Err(error) => {
                warn!(
                    request = %self.request.label,
                    error = %error,
                    "Request failed again after re-login"
                );
                Err(original)
            }
        }
    }
}

/// A request issued on behalf of a server: resolves the session client, checks the endpoint and
/// keeps the server's connectivity state current
pub struct BehaviourRequest<'a> {
    session: &'a ClientSession,
    server_state: &'a ServerStateTracker,
    request: AuthenticatingRequest,
}

impl<'a> BehaviourRequest<'a> {
    pub fn new(
        session: &'a ClientSession,
        server_state: &'a ServerStateTracker,
        request: AuthenticatingRequest,
    ) -> Self {
        Self {
            session,
            server_state,
            request,
        }
    }

    pub async fn run<T, F, Fut>(&self, op: F) -> DeployResult<T>
    where
        F: FnMut(Arc<dyn CloudClient>) -> Fut,
        Fut: Future<Output = Result<T, ClientError>>,
    {
        self.session.check_endpoint()?;
        let client = self.session.client()?;

        if matches!(self.server_state.state(), RunState::Unknown | RunState::Stopped) {
            self.server_state.observe(RunState::Starting).await;
        }

        let result = self.request.run(&client, op).await;
        match &result {
            Ok(_) => {
                self.server_state.observe(RunState::Started).await;
            }
            Err(error) if error.client_error().is_some_and(ClientError::is_connection) => {
                self.server_state.observe(RunState::Stopped).await;
            }
            Err(_) => {}
        }
        result
    }
}

/// Builds requests with the budgets and login bounds from [`DeployConfig`]
#[derive(Debug, Clone, PartialEq)]
pub struct RequestFactory {
    budget: Duration,
    upload_budget: Duration,
    retry_interval: Duration,
    login_attempts: u32,
    login_interval: Duration,
}

impl RequestFactory {
    pub fn from_config(config: &DeployConfig) -> Self {
        Self {
            budget: config.request_timeout(),
            upload_budget: config.upload_timeout(),
            retry_interval: config.retry_interval(),
            login_attempts: config.login.attempts,
            login_interval: config.login_interval(),
        }
    }

    pub fn retry_interval(&self) -> Duration {
        self.retry_interval
    }

    /// An ordinary request with the default budget
    pub fn request(&self, label: impl Into<String>, policy: Arc<dyn RetryPolicy>) -> ClientRequest {
        ClientRequest::new(label, self.budget, policy)
    }

    /// A request with the upload budget
    pub fn upload_request(
        &self,
        label: impl Into<String>,
        policy: Arc<dyn RetryPolicy>,
    ) -> ClientRequest {
        ClientRequest::new(label, self.upload_budget, policy)
    }

    pub fn authenticated(&self, request: ClientRequest) -> AuthenticatingRequest {
        AuthenticatingRequest::new(request, self.login_attempts, self.login_interval)
    }
}
