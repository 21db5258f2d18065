use super::context::{CloudOperation, OperationContext};
use super::monitor::OperationMonitor;
use super::phase::{DeploymentPhase, PhaseTracker};
use crate::error::{DeployError, DeployResult};
use crate::events::{BehaviourEventType, EventPayload};
use crate::framework::ModuleRef;
use crate::models::ModuleId;
use crate::resilience::{AppInStoppedStateAware, RetryPolicy, TransientRetry};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::info;

/// A single change to a deployed application
#[derive(Debug, Clone, PartialEq)]
pub enum ApplicationUpdate {
    Instances(u32),
    Memory(u64),
    Uris(Vec<String>),
    Env(BTreeMap<String, String>),
    Services(Vec<String>),
}

impl ApplicationUpdate {
    fn validate(&self) -> DeployResult<()> {
        match self {
            ApplicationUpdate::Instances(0) => Err(DeployError::Validation(
                "instance count must be at least 1".to_string(),
            )),
            ApplicationUpdate::Memory(0) => Err(DeployError::Validation(
                "memory must be greater than zero".to_string(),
            )),
            _ => Ok(()),
        }
    }
}

impl fmt::Display for ApplicationUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApplicationUpdate::Instances(count) => write!(f, "instances={count}"),
            ApplicationUpdate::Memory(mb) => write!(f, "memory={mb}MB"),
            ApplicationUpdate::Uris(uris) => write!(f, "uris=[{}]", uris.join(", ")),
            ApplicationUpdate::Env(env) => write!(f, "env({} vars)", env.len()),
            ApplicationUpdate::Services(services) => write!(f, "services=[{}]", services.join(", ")),
        }
    }
}

/// Applies an [`ApplicationUpdate`] remotely and mirrors it into the module's descriptor
#[derive(Debug)]
pub struct UpdateOperation {
    context: Arc<OperationContext>,
    module: ModuleRef,
    update: ApplicationUpdate,
}

impl UpdateOperation {
    pub fn new(context: Arc<OperationContext>, module: ModuleRef, update: ApplicationUpdate) -> Self {
        Self {
            context,
            module,
            update,
        }
    }

    async fn execute(
        &self,
        id: ModuleId,
        phases: &mut PhaseTracker,
        monitor: &OperationMonitor,
    ) -> DeployResult<()> {
        let context = &self.context;
        context.registry.clear_error(id)?;
        self.update.validate()?;
        monitor.check_cancelled(phases.operation())?;
        phases.advance(DeploymentPhase::Updating)?;

        let name = context
            .registry
            .module(id)
            .map(|module| module.deployed_name().to_string())
            .ok_or_else(|| DeployError::ModuleNotFound(self.module.to_string()))?;
        let target = name.as_str();
        let interval = context.requests.retry_interval();
        // Scaling is rejected while the application is briefly stopped
        let policy: Arc<dyn RetryPolicy> = match self.update {
            ApplicationUpdate::Instances(_) => Arc::new(AppInStoppedStateAware::new(interval)),
            _ => Arc::new(TransientRetry::new(interval)),
        };
        let request = context.request(format!("update {name} {}", self.update), policy, monitor);

        match &self.update {
            ApplicationUpdate::Instances(count) => {
                let count = *count;
                request
                    .run(|client| async move { client.update_application_instances(target, count).await })
                    .await?
            }
            ApplicationUpdate::Memory(memory_mb) => {
                let memory_mb = *memory_mb;
                request
                    .run(|client| async move { client.update_application_memory(target, memory_mb).await })
                    .await?
            }
            ApplicationUpdate::Uris(uris) => {
                request
                    .run(|client| async move { client.update_application_uris(target, uris).await })
                    .await?
            }
            ApplicationUpdate::Env(env) => {
                request
                    .run(|client| async move { client.update_application_env(target, env).await })
                    .await?
            }
            ApplicationUpdate::Services(services) => {
                request
                    .run(|client| async move { client.update_application_services(target, services).await })
                    .await?
            }
        }

        let mut working = context
            .registry
            .working_copy(id, context.config.deployment.default_domain.as_deref())?;
        let info = working.info_mut();
        match &self.update {
            ApplicationUpdate::Instances(count) => info.instances = *count,
            ApplicationUpdate::Memory(memory_mb) => info.memory_mb = *memory_mb,
            ApplicationUpdate::Uris(uris) => info.uris = uris.clone(),
            ApplicationUpdate::Env(env) => info.env = env.clone(),
            ApplicationUpdate::Services(services) => info.services = services.clone(),
        }
        working.save()?;

        phases.advance(DeploymentPhase::Updated)?;
        context.notify(BehaviourEventType::AppUpdated, Some((id, &name)), EventPayload::None);
        info!(application = %name, update = %self.update, "Updated application");
        Ok(())
    }
}

#[async_trait]
impl CloudOperation for UpdateOperation {
    fn name(&self) -> String {
        format!("update {}", self.module.name)
    }

    async fn run(&self, monitor: &OperationMonitor) -> DeployResult<()> {
        let pause = self.context.refresh.pause().await;
        let mut phases = PhaseTracker::new(self.name());

        let id = self.context.registry.get_or_create(&self.module);
        let outcome = self.execute(id, &mut phases, monitor).await;
        let result = self
            .context
            .conclude(&mut phases, Some((id, &self.module)), outcome)
            .await;

        drop(pause);
        result
    }
}
