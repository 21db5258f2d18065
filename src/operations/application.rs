//! # Application Operation
//!
//! The deployment state machine shared by deploy, debug, restart and stop. One run moves
//! through the phases in [`super::phase`] strictly in order:
//!
//! 1. Pause the background refresh for the whole run, resolve the module and clear its sticky
//!    error.
//! 2. Make sure the deployment descriptor is complete, asking the
//!    [`DeploymentInfoProvider`](super::DeploymentInfoProvider) when it is not.
//! 3. Build a full or delta archive of the unit's resources.
//! 4. Create the application if it does not exist yet and upload the archive.
//! 5. Wait for the application to become visible, push environment and instance count, then
//!    issue the start (or debug start) command.
//! 6. Poll until the application reports started or the deployment timeout elapses.
//!
//! Whatever happens, the run ends with a final module refresh and a refresh notification, and
//! only then is the background refresh released.

use super::context::{CloudOperation, OperationContext};
use super::monitor::OperationMonitor;
use super::phase::{DeploymentPhase, PhaseTracker};
use super::steps::{OperationKind, OperationSteps};
use crate::archive::{ApplicationArchive, ArchiveBuilder, UploadArchive};
use crate::client::{
    AppState, CloudApplication, CreateApplicationRequest, UploadStatusCallback,
};
use crate::constants::TUNNEL_SERVICE_APPLICATION;
use crate::error::{ClientError, DeployError, DeployResult};
use crate::events::{BehaviourEventType, EventPayload};
use crate::framework::{ModuleRef, PublishState, RunState};
use crate::models::{ApplicationDeploymentInfo, ModuleId};
use crate::resilience::{ConnectionRetry, TransientRetry};
use crate::wait::{WaitForApplicationState, WaitForApplicationVisible, WaitWithProgress};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct ApplicationOperation {
    context: Arc<OperationContext>,
    module: ModuleRef,
    kind: OperationKind,
    steps: OperationSteps,
}

impl std::fmt::Debug for ApplicationOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApplicationOperation")
            .field("module", &self.module)
            .field("kind", &self.kind)
            .field("steps", &self.steps)
            .finish()
    }
}

/// Forwards upload progress to the archive and the operation's cancellation
struct PushProgress<'a> {
    application: &'a str,
    archive: &'a dyn UploadArchive,
    monitor: &'a OperationMonitor,
}

impl UploadStatusCallback for PushProgress<'_> {
    fn on_check_resources(&self) {
        debug!(
            application = self.application,
            entries = self.archive.manifest().len(),
            "Checking which resources the platform already holds"
        );
    }

    fn on_matched_file_names(&self, matched: &HashSet<String>) {
        debug!(application = self.application, matched = matched.len(), "Resources matched remotely");
        self.archive.record_matched(matched);
    }

    fn on_process_matched_resources(&self, length: usize) {
        debug!(application = self.application, bytes = length, "Uploading unmatched resources");
    }

    fn should_cancel(&self) -> bool {
        self.monitor.is_cancelled()
    }
}

impl ApplicationOperation {
    pub fn new(context: Arc<OperationContext>, module: ModuleRef, kind: OperationKind) -> Self {
        Self {
            context,
            module,
            kind,
            steps: OperationSteps::for_kind(kind),
        }
    }

    /// Prefer a delta archive when pushing
    pub fn incremental(mut self, incremental: bool) -> Self {
        self.steps = self.steps.incremental(incremental);
        self
    }

    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    pub fn steps(&self) -> OperationSteps {
        self.steps
    }

    fn deployed_name(&self, id: ModuleId) -> DeployResult<String> {
        self.context
            .registry
            .module(id)
            .map(|module| module.deployed_name().to_string())
            .ok_or_else(|| DeployError::ModuleNotFound(self.module.to_string()))
    }

    async fn execute(
        &self,
        id: ModuleId,
        phases: &mut PhaseTracker,
        monitor: &OperationMonitor,
    ) -> DeployResult<()> {
        self.context.registry.clear_error(id)?;
        monitor.check_cancelled(phases.operation())?;

        if self.steps.stop {
            self.stop(id, phases, monitor).await?;
            if !self.steps.start {
                return Ok(());
            }
        }

        let info = if self.steps.validate {
            phases.advance(DeploymentPhase::Validating)?;
            Some(self.validated_info(id, monitor).await?)
        } else {
            None
        };

        if let Some(info) = &info {
            if self.steps.push && (info.archive.is_some() || !self.module.externally_managed) {
                phases.advance(DeploymentPhase::Archiving)?;
                let archive = self.build_archive(info).await?;
                monitor.check_cancelled(phases.operation())?;

                phases.advance(DeploymentPhase::Pushing)?;
                self.push(info, archive.as_ref(), monitor).await?;
            }
        }
        monitor.check_cancelled(phases.operation())?;

        phases.advance(DeploymentPhase::Starting)?;
        self.start(id, info.as_ref(), phases, monitor).await
    }

    /// The committed descriptor if it is complete, otherwise one completed by the provider and
    /// committed through a working copy
    async fn validated_info(
        &self,
        id: ModuleId,
        monitor: &OperationMonitor,
    ) -> DeployResult<ApplicationDeploymentInfo> {
        let registry = &self.context.registry;
        let module = registry
            .module(id)
            .ok_or_else(|| DeployError::ModuleNotFound(self.module.to_string()))?;
        let domain = match (module.deployment_info(), module.application()) {
            (None, None) => self.default_domain(monitor).await,
            _ => self.context.config.deployment.default_domain.clone(),
        };
        let mut working = registry.working_copy(id, domain.as_deref())?;

        match (module.deployment_info(), module.application()) {
            (Some(committed), _) if committed.is_complete() => return Ok(committed.copy()),
            (None, Some(application)) => {
                let derived = ApplicationDeploymentInfo::from_application(application);
                if derived.is_complete() {
                    working.set_info(&derived);
                    working.save()?;
                    return Ok(derived);
                }
                working.set_info(&derived);
            }
            _ => {}
        }

        let candidate = working.info().copy();
        let completed = self
            .context
            .info_provider
            .complete(&module, candidate)
            .await?
            .ok_or_else(|| {
                DeployError::Cancelled(format!("deployment details for {}", module.deployed_name()))
            })?;

        let missing = completed.missing_fields();
        if !missing.is_empty() {
            return Err(DeployError::Validation(format!(
                "deployment descriptor for {} is missing {}",
                completed.deployment_name(),
                missing.join(", ")
            )));
        }

        working.set_info(&completed);
        working.save()?;
        Ok(completed)
    }

    /// Domain for the default route of a first deployment: the configured one, otherwise the
    /// first domain the platform offers
    async fn default_domain(&self, monitor: &OperationMonitor) -> Option<String> {
        if let Some(domain) = &self.context.config.deployment.default_domain {
            return Some(domain.clone());
        }
        let policy = Arc::new(ConnectionRetry::new(self.context.requests.retry_interval()));
        match self
            .context
            .request("list domains", policy, monitor)
            .run(|client| async move { client.domains().await })
            .await
        {
            Ok(domains) => domains.into_iter().next().map(|domain| domain.name),
            Err(error) => {
                warn!(module = %self.module, error = %error, "Could not list domains, deploying without a default route");
                None
            }
        }
    }

    async fn build_archive(&self, info: &ApplicationDeploymentInfo) -> DeployResult<Box<dyn UploadArchive>> {
        if let Some(path) = &info.archive {
            info!(application = info.deployment_name(), path = %path.display(), "📦 Using pre-built archive");
            return Ok(Box::new(ApplicationArchive::from_file(path)?));
        }

        let framework = self.context.framework.as_ref();
        let incremental = self.steps.incremental
            && framework.publish_state(&self.module).await != PublishState::FullPublishRequired;
        ArchiveBuilder::new(framework)
            .build(&self.module, info.deployment_name(), incremental)
            .await
    }

    /// Create the application if needed and upload the archive, in one retried request
    async fn push(
        &self,
        info: &ApplicationDeploymentInfo,
        archive: &dyn UploadArchive,
        monitor: &OperationMonitor,
    ) -> DeployResult<()> {
        let create = CreateApplicationRequest {
            name: info.deployment_name().to_string(),
            staging: info.staging.clone().unwrap_or_default(),
            memory_mb: info.memory_mb,
            uris: info.uris.clone(),
            services: info.services.clone(),
        };
        let create = &create;
        let progress = PushProgress {
            application: info.deployment_name(),
            archive,
            monitor,
        };
        let progress = &progress;
        let policy = Arc::new(TransientRetry::new(self.context.requests.retry_interval()));

        self.context
            .upload_request(format!("push {}", create.name), policy, monitor)
            .run(|client| async move {
                let existing = client.applications().await?;
                if !existing.iter().any(|app| app.name == create.name) {
                    info!(application = %create.name, memory_mb = create.memory_mb, "Creating application");
                    client.create_application(create).await?;
                }
                client.upload_application(&create.name, archive, progress).await
            })
            .await?;

        self.context
            .framework
            .set_publish_state(&self.module, PublishState::None)
            .await;
        info!(application = %create.name, "⬆️ Pushed application");
        Ok(())
    }

    async fn stop(
        &self,
        id: ModuleId,
        phases: &mut PhaseTracker,
        monitor: &OperationMonitor,
    ) -> DeployResult<()> {
        phases.advance(DeploymentPhase::Stopping)?;
        let name = self.deployed_name(id)?;
        self.context
            .set_module_state(id, &self.module, RunState::Stopping)
            .await;

        if name == TUNNEL_SERVICE_APPLICATION {
            let closed = self.context.tunnels.close_tunnels(&self.context.server).await?;
            info!(server = %self.context.server, tunnels = closed.len(), "Closed tunnels before stopping the tunnel gateway");
            self.context.notify(
                BehaviourEventType::TunnelsRefreshed,
                Some((id, &name)),
                EventPayload::Tunnels(closed),
            );
        }

        let policy = Arc::new(TransientRetry::new(self.context.requests.retry_interval()));
        let target = name.as_str();
        self.context
            .request(format!("stop {name}"), policy, monitor)
            .run(|client| async move { client.stop_application(target).await })
            .await?;

        self.context
            .set_module_state(id, &self.module, RunState::Stopped)
            .await;
        phases.advance(DeploymentPhase::Stopped)?;
        self.context
            .notify(BehaviourEventType::AppStopped, Some((id, &name)), EventPayload::None);
        info!(application = %name, "⏹️ Stopped application");
        Ok(())
    }

    async fn start(
        &self,
        id: ModuleId,
        info: Option<&ApplicationDeploymentInfo>,
        phases: &mut PhaseTracker,
        monitor: &OperationMonitor,
    ) -> DeployResult<()> {
        let context = &self.context;
        let name = self.deployed_name(id)?;
        let target = name.as_str();
        let retry_interval = context.requests.retry_interval();
        context
            .set_module_state(id, &self.module, RunState::Starting)
            .await;

        // Creation and upload are eventually consistent; wait until the application shows up
        let client = context.client()?;
        let lookup = context
            .requests
            .request(format!("find {name}"), Arc::new(ConnectionRetry::new(retry_interval)))
            .with_cancellation(monitor.token());
        let visible = WaitWithProgress::new(
            context.config.deployment.visibility_attempts,
            context.config.visibility_interval(),
        )
        .with_cancellation(monitor.token())
        .run(&WaitForApplicationVisible::new(Arc::clone(&client), lookup, target))
        .await?;
        monitor.check_cancelled(phases.operation())?;
        let application = visible.ok_or_else(|| {
            DeployError::remote(format!("find {name}"), ClientError::NotFound(name.clone()))
        })?;
        let already_running = application.is_started();

        if let Some(info) = info {
            self.configure(info, &application, monitor).await?;
        }

        // Staging failures surface here instead of being retried
        let debugging = self.steps.debug;
        let starting = context
            .request(
                format!("start {name}"),
                Arc::new(ConnectionRetry::new(retry_interval)),
                monitor,
            )
            .run(|client| async move {
                if debugging {
                    client.debug_application(target).await
                } else {
                    client.start_application(target).await
                }
            })
            .await?;
        context.registry.set_starting_info(id, Some(starting))?;

        let started = if debugging && already_running {
            phases.advance(DeploymentPhase::DebugConnecting)?;
            context.debugger.connect(target, None).await?;
            application
        } else {
            if debugging {
                phases.advance(DeploymentPhase::DebugConnecting)?;
                context.debugger.connect(target, None).await?;
            }
            phases.advance(DeploymentPhase::AwaitingStart)?;
            self.await_start(id, &client, target, monitor).await?
        };

        phases.advance(DeploymentPhase::Started)?;
        context.registry.set_cloud_application(id, Some(started.clone()))?;
        context
            .set_module_state(id, &self.module, RunState::Started)
            .await;
        if let Err(error) = context.refresh.refresh_instances(id).await {
            warn!(application = %name, error = %error, "Could not refresh instance stats");
        }
        context.notify(
            BehaviourEventType::AppStarted,
            Some((id, &name)),
            EventPayload::Application(Box::new(started)),
        );
        info!(application = %name, debug_mode = debugging, "✅ Application started");
        Ok(())
    }

    /// Push environment and scale instances before starting, so the started process sees its
    /// final configuration
    async fn configure(
        &self,
        info: &ApplicationDeploymentInfo,
        application: &CloudApplication,
        monitor: &OperationMonitor,
    ) -> DeployResult<()> {
        let name = info.deployment_name();
        let retry_interval = self.context.requests.retry_interval();

        if info.env != application.env {
            let env = &info.env;
            self.context
                .request(
                    format!("update environment of {name}"),
                    Arc::new(TransientRetry::new(retry_interval)),
                    monitor,
                )
                .run(|client| async move { client.update_application_env(name, env).await })
                .await?;
        }

        if info.instances > 1 {
            let instances = info.instances;
            self.context
                .request(
                    format!("scale {name}"),
                    Arc::new(TransientRetry::new(retry_interval)),
                    monitor,
                )
                .run(|client| async move { client.update_application_instances(name, instances).await })
                .await?;
        }
        Ok(())
    }

    async fn await_start(
        &self,
        id: ModuleId,
        client: &Arc<dyn crate::client::CloudClient>,
        name: &str,
        monitor: &OperationMonitor,
    ) -> DeployResult<CloudApplication> {
        let config = &self.context.config;
        let interval = config.poll_interval();
        // Staging is tolerated poll by poll inside the wait, so only connectivity is retried in place
        let fetch = self
            .context
            .requests
            .request(
                format!("await start of {name}"),
                Arc::new(ConnectionRetry::new(self.context.requests.retry_interval())),
            )
            .with_cancellation(monitor.token());
        let wait = WaitForApplicationState::new(Arc::clone(client), fetch, name, AppState::Started);

        let result = WaitWithProgress::new(config.start_poll_attempts(), interval)
            .with_cancellation(monitor.token())
            .run(&wait)
            .await?;
        monitor.check_cancelled(&format!("waiting for {name} to start"))?;

        match result {
            Some(application) if application.is_started() => Ok(application),
            _ => {
                self.context
                    .set_module_state(id, &self.module, RunState::Stopped)
                    .await;
                Err(DeployError::Timeout {
                    operation: format!("{name} to start"),
                    elapsed: config.deployment_timeout(),
                })
            }
        }
    }
}

#[async_trait]
impl CloudOperation for ApplicationOperation {
    fn name(&self) -> String {
        format!("{} {}", self.kind, self.module.name)
    }

    async fn run(&self, monitor: &OperationMonitor) -> DeployResult<()> {
        let pause = self.context.refresh.pause().await;
        let mut phases = PhaseTracker::new(self.name());

        let resolved = match self.kind {
            OperationKind::Stop => self.context.registry.get(&self.module),
            _ => Ok(self.context.registry.get_or_create(&self.module)),
        };

        let result = match resolved {
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
