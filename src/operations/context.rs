use super::collaborators::{DebugLauncher, DeploymentInfoProvider, TunnelManager};
use super::monitor::OperationMonitor;
use super::phase::PhaseTracker;
use crate::client::{ClientSession, CloudClient};
use crate::config::DeployConfig;
use crate::error::DeployResult;
use crate::events::{BehaviourEvent, BehaviourEventBus, BehaviourEventType, EventPayload, RefreshScope};
use crate::framework::{ModuleFramework, ModuleRef, PublishState, RunState};
use crate::logging::log_operation;
use crate::models::ModuleId;
use crate::refresh::RefreshController;
use crate::registry::ModuleRegistry;
use crate::resilience::{BehaviourRequest, ClientRequest, RequestFactory, RetryPolicy, ServerStateTracker};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Uniform entry point of every orchestrated operation
#[async_trait]
pub trait CloudOperation: Send + Sync {
    fn name(&self) -> String;

    async fn run(&self, monitor: &OperationMonitor) -> DeployResult<()>;
}

/// Everything an operation needs from the server it runs against
pub struct OperationContext {
    pub(crate) server: String,
    pub(crate) config: DeployConfig,
    pub(crate) requests: RequestFactory,
    pub(crate) session: Arc<ClientSession>,
    pub(crate) server_state: Arc<ServerStateTracker>,
    pub(crate) registry: Arc<ModuleRegistry>,
    pub(crate) events: Arc<BehaviourEventBus>,
    pub(crate) refresh: Arc<RefreshController>,
    pub(crate) framework: Arc<dyn ModuleFramework>,
    pub(crate) info_provider: Arc<dyn DeploymentInfoProvider>,
    pub(crate) debugger: Arc<dyn DebugLauncher>,
    pub(crate) tunnels: Arc<dyn TunnelManager>,
}

impl std::fmt::Debug for OperationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationContext")
            .field("server", &self.server)
            .field("modules", &self.registry.len())
            .finish()
    }
}

impl OperationContext {
    pub fn server(&self) -> &str {
        &self.server
    }

    pub fn config(&self) -> &DeployConfig {
        &self.config
    }

    pub(crate) fn client(&self) -> DeployResult<Arc<dyn CloudClient>> {
        self.session.check_endpoint()?;
        self.session.client()
    }

    fn behaviour_request(&self, request: ClientRequest, monitor: &OperationMonitor) -> BehaviourRequest<'_> {
        BehaviourRequest::new(
            &self.session,
            &self.server_state,
            self.requests
                .authenticated(request.with_cancellation(monitor.token())),
        )
    }

    /// A request with the default budget, cancelled with `monitor`
    pub(crate) fn request(
        &self,
        label: impl Into<String>,
        policy: Arc<dyn RetryPolicy>,
        monitor: &OperationMonitor,
    ) -> BehaviourRequest<'_> {
        self.behaviour_request(self.requests.request(label, policy), monitor)
    }

    /// A request with the upload budget, cancelled with `monitor`
    pub(crate) fn upload_request(
        &self,
        label: impl Into<String>,
        policy: Arc<dyn RetryPolicy>,
        monitor: &OperationMonitor,
    ) -> BehaviourRequest<'_> {
        self.behaviour_request(self.requests.upload_request(label, policy), monitor)
    }

    pub(crate) fn notify(
        &self,
        event_type: BehaviourEventType,
        module: Option<(ModuleId, &str)>,
        payload: EventPayload,
    ) -> usize {
        let mut event = BehaviourEvent::new(event_type, self.server.clone()).with_payload(payload);
        if let Some((id, application)) = module {
            event = event.for_module(id, application);
        }
        self.events.notify(&event)
    }

    /// Set a module's run state locally and on the host framework
    pub(crate) async fn set_module_state(&self, id: ModuleId, local: &ModuleRef, state: RunState) {
        if let Err(error) = self.registry.set_run_state(id, state) {
            warn!(module = %local, error = %error, "Could not record module run state");
        }
        self.framework.set_module_state(local, state).await;
    }

    async fn record_failure(&self, id: ModuleId, local: &ModuleRef, message: String) {
        if let Err(error) = self.registry.set_error(id, message) {
            warn!(module = %local, error = %error, "Could not record module error");
        }
        let stopped = self
            .registry
            .module(id)
            .is_some_and(|module| module.run_state() == RunState::Stopped);
        if !stopped {
            self.set_module_state(id, local, RunState::Unknown).await;
        }
        self.framework
            .set_publish_state(local, PublishState::Unknown)
            .await;
    }

    /// A cancelled run must not leave a module shown as starting or stopping
    async fn settle_cancelled(&self, id: ModuleId, local: &ModuleRef) {
        let transitional = self.registry.module(id).is_some_and(|module| {
            matches!(module.run_state(), RunState::Starting | RunState::Stopping)
        });
        if transitional {
            self.set_module_state(id, local, RunState::Unknown).await;
        }
    }

    /// Close out a run: record a failure on the module, then refresh the module and announce the
    /// refresh whatever the outcome was
    pub(crate) async fn conclude<T>(
        &self,
        phases: &mut PhaseTracker,
        module: Option<(ModuleId, &ModuleRef)>,
        result: DeployResult<T>,
    ) -> DeployResult<T> {
        match &result {
            Ok(_) => {}
            Err(failure) if failure.is_cancellation() => {
                phases.finish_with_error(failure);
                info!(operation = phases.operation(), reason = %failure, "🛑 Operation cancelled");
                if let Some((id, local)) = module {
                    self.settle_cancelled(id, local).await;
                }
            }
            Err(failure) => {
                phases.finish_with_error(failure);
                error!(operation = phases.operation(), error = %failure, "❌ Operation failed");
                if let Some((id, local)) = module {
                    self.record_failure(id, local, failure.to_string()).await;
                }
            }
        }

        match module {
            Some((id, local)) => {
                if self.registry.module(id).is_some() {
                    if let Err(refresh_error) = self.refresh.refresh_module(id).await {
                        warn!(module = %local, error = %refresh_error, "Final module refresh failed");
                    }
                }
                self.refresh.fire_refresh_event(RefreshScope::Module(id));
            }
            None => self.refresh.fire_refresh_event(RefreshScope::All),
        }

        let status = match &result {
            Ok(_) => "succeeded",
            Err(failure) if failure.is_cancellation() => "cancelled",
            Err(_) => "failed",
        };
        let phase = phases.current().to_string();
        log_operation(
            phases.operation(),
            module.map(|(_, local)| local.name.as_str()),
            status,
            Some(&phase),
        );
        result
    }
}
