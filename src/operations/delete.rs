use super::context::{CloudOperation, OperationContext};
use super::monitor::OperationMonitor;
use super::phase::{DeploymentPhase, PhaseTracker};
use crate::constants::TUNNEL_SERVICE_APPLICATION;
use crate::error::{DeployError, DeployResult};
use crate::events::{BehaviourEventType, EventPayload};
use crate::framework::{ModuleRef, PublishState, RunState};
use crate::models::ModuleId;
use crate::resilience::TransientRetry;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

/// Deletes a module's application, optionally with the services bound to it
///
/// Never creates a module: deleting a unit the registry does not know fails with
/// [`DeployError::ModuleNotFound`]. Modules that only existed remotely are removed from the
/// registry afterwards; modules backed by a local unit stay, with their remote state cleared.
#[derive(Debug)]
pub struct DeleteOperation {
    context: Arc<OperationContext>,
    module: ModuleRef,
    delete_services: bool,
}

impl DeleteOperation {
    pub fn new(context: Arc<OperationContext>, module: ModuleRef) -> Self {
        Self {
            context,
            module,
            delete_services: false,
        }
    }

    pub fn with_services(mut self, delete_services: bool) -> Self {
        self.delete_services = delete_services;
        self
    }

    async fn execute(
        &self,
        id: ModuleId,
        phases: &mut PhaseTracker,
        monitor: &OperationMonitor,
    ) -> DeployResult<()> {
        let context = &self.context;
        context.registry.clear_error(id)?;
        monitor.check_cancelled(phases.operation())?;
        phases.advance(DeploymentPhase::Deleting)?;

        let module = context
            .registry
            .module(id)
            .ok_or_else(|| DeployError::ModuleNotFound(self.module.to_string()))?;
        let name = module.deployed_name().to_string();
        let services = module
            .application()
            .map(|app| app.services.clone())
            .unwrap_or_default();

        if name == TUNNEL_SERVICE_APPLICATION {
            let closed = context.tunnels.close_tunnels(&context.server).await?;
            context.notify(
                BehaviourEventType::TunnelsRefreshed,
                Some((id, &name)),
                EventPayload::Tunnels(closed),
            );
        }

        let target = name.as_str();
        let deleted = context
            .request(
                format!("delete {name}"),
                Arc::new(TransientRetry::new(context.requests.retry_interval())),
                monitor,
            )
            .run(|client| async move { client.delete_application(target).await })
            .await;
        match deleted {
            Ok(()) => {}
            Err(error) if error.client_error().is_some_and(|e| e.is_not_found()) => {
                warn!(application = %name, "Application already gone remotely");
            }
            Err(error) => return Err(error),
        }

        if self.delete_services && !services.is_empty() {
            let removed = delete_services(context, &services, monitor).await?;
            context.notify(
                BehaviourEventType::ServicesDeleted,
                Some((id, &name)),
                EventPayload::Services(removed),
            );
        }

        context.registry.clear_remote_state(id)?;
        context.set_module_state(id, &self.module, RunState::Stopped).await;
        context
            .framework
            .set_publish_state(&self.module, PublishState::FullPublishRequired)
            .await;
        if module.local().externally_managed {
            context.registry.remove(id);
        }

        phases.advance(DeploymentPhase::Deleted)?;
        context.notify(BehaviourEventType::AppDeleted, Some((id, &name)), EventPayload::None);
        info!(application = %name, "🗑️ Deleted application");
        Ok(())
    }
}

/// Delete each service in turn, returning the names deleted
pub(crate) async fn delete_services(
    context: &OperationContext,
    services: &[String],
    monitor: &OperationMonitor,
) -> DeployResult<Vec<String>> {
    let mut removed = Vec::with_capacity(services.len());
    for service in services {
        monitor.check_cancelled("delete services")?;
        let target = service.as_str();
        context
            .request(
                format!("delete service {service}"),
                Arc::new(TransientRetry::new(context.requests.retry_interval())),
                monitor,
            )
            .run(|client| async move { client.delete_service(target).await })
            .await?;
        removed.push(service.clone());
    }
    Ok(removed)
}

#[async_trait]
impl CloudOperation for DeleteOperation {
    fn name(&self) -> String {
        format!("delete {}", self.module.name)
    }

    async fn run(&self, monitor: &OperationMonitor) -> DeployResult<()> {
        let pause = self.context.refresh.pause().await;
        let mut phases = PhaseTracker::new(self.name());

        let result = match self.context.registry.get(&self.module) {
            Ok(id) => {
                let outcome = self.execute(id, &mut phases, monitor).await;
                self.context
                    .conclude(&mut phases, Some((id, &self.module)), outcome)
                    .await
            }
            Err(error) => self.context.conclude(&mut phases, None, Err(error)).await,
        };

        drop(pause);
        result
    }
}

/// Deletes services that are not tied to one module
#[derive(Debug)]
pub struct DeleteServicesOperation {
    context: Arc<OperationContext>,
    services: Vec<String>,
}

impl DeleteServicesOperation {
    pub fn new(context: Arc<OperationContext>, services: Vec<String>) -> Self {
        Self { context, services }
    }
}

#[async_trait]
impl CloudOperation for DeleteServicesOperation {
    fn name(&self) -> String {
        format!("delete services {}", self.services.join(", "))
    }

    async fn run(&self, monitor: &OperationMonitor) -> DeployResult<()> {
        let pause = self.context.refresh.pause().await;
        let mut phases = PhaseTracker::new(self.name());

        let outcome = async {
            phases.advance(DeploymentPhase::Deleting)?;
            let removed = delete_services(&self.context, &self.services, monitor).await?;
            phases.advance(DeploymentPhase::Deleted)?;
            self.context
                .notify(BehaviourEventType::ServicesDeleted, None, EventPayload::Services(removed));
            Ok::<(), DeployError>(())
        }
        .await;
        let result = self.context.conclude(&mut phases, None, outcome).await;

        drop(pause);
        result
    }
}
