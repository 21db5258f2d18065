//! # Server Behaviour
//!
//! The top-level object for one cloud controller endpoint. It owns the client session, the
//! module registry, the behaviour event bus and the background refresh, and is the entry point
//! for every orchestrated operation against that endpoint.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use cf_deploy_core::behaviour::ServerBehaviour;
//! use cf_deploy_core::client::{CloudClientFactory, CloudCredentials};
//! use cf_deploy_core::framework::{ModuleFramework, ModuleRef};
//! use cf_deploy_core::operations::OperationMonitor;
//! use std::sync::Arc;
//!
//! # async fn example(
//! #     factory: Arc<dyn CloudClientFactory>,
//! #     framework: Arc<dyn ModuleFramework>,
//! # ) -> cf_deploy_core::error::DeployResult<()> {
//! let behaviour = ServerBehaviour::builder(
//!     "dev",
//!     factory,
//!     framework,
//!     CloudCredentials::new("https://api.example.com", "dev@example.com", "secret"),
//! )
//! .build()?;
//!
//! behaviour.connect().await?;
//! behaviour
//!     .start_module(&ModuleRef::new("p1", "web"), &OperationMonitor::new())
//!     .await?;
//! # Ok(())
//! # }
//! ```

use crate::client::{
    ClientSession, CloudClientFactory, CloudCredentials, CloudDomain, CloudSpace,
};
use crate::config::DeployConfig;
use crate::error::{DeployError, DeployResult};
use crate::events::{BehaviourEventBus, BehaviourEventType, EventPayload, RefreshScope};
use crate::framework::{ModuleFramework, ModuleRef, RunState};
use crate::models::{ApplicationDeploymentInfo, ApplicationModule, DeploymentInfoWorkingCopy};
use crate::operations::{
    AcceptDefaults, ApplicationOperation, ApplicationUpdate, CloudOperation, DebugLauncher,
    DeleteOperation, DeleteServicesOperation, DeploymentInfoProvider, NoDebugger, NoTunnels,
    OperationContext, OperationKind, OperationMonitor, TunnelManager, UpdateOperation,
};
use crate::refresh::RefreshController;
use crate::registry::{ModuleRegistry, ReconcileSummary};
use crate::resilience::{ConnectionRetry, RequestFactory, ServerStateTracker};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

pub struct ServerBehaviourBuilder {
    server: String,
    factory: Arc<dyn CloudClientFactory>,
    framework: Arc<dyn ModuleFramework>,
    credentials: CloudCredentials,
    config: DeployConfig,
    info_provider: Arc<dyn DeploymentInfoProvider>,
    debugger: Arc<dyn DebugLauncher>,
    tunnels: Arc<dyn TunnelManager>,
}

impl ServerBehaviourBuilder {
    pub fn config(mut self, config: DeployConfig) -> Self {
        self.config = config;
        self
    }

    pub fn info_provider(mut self, provider: Arc<dyn DeploymentInfoProvider>) -> Self {
        self.info_provider = provider;
        self
    }

    pub fn debug_launcher(mut self, debugger: Arc<dyn DebugLauncher>) -> Self {
        self.debugger = debugger;
        self
    }

    pub fn tunnel_manager(mut self, tunnels: Arc<dyn TunnelManager>) -> Self {
        self.tunnels = tunnels;
        self
    }

    pub fn build(self) -> DeployResult<ServerBehaviour> {
        self.config.validate()?;

        let session = Arc::new(ClientSession::new(self.factory, self.credentials));
        let server_state = Arc::new(ServerStateTracker::new(
            self.server.clone(),
            Arc::clone(&self.framework),
        ));
        let registry = Arc::new(ModuleRegistry::new());
        let refresh = Arc::new(RefreshController::new(
            self.server.clone(),
            Arc::clone(&session),
            Arc::clone(&server_state),
            Arc::clone(&registry),
            &self.config,
        ));

        let context = OperationContext {
            server: self.server,
            requests: RequestFactory::from_config(&self.config),
            config: self.config,
            session,
            server_state,
            registry,
            events: Arc::new(BehaviourEventBus::new()),
            refresh,
            framework: self.framework,
            info_provider: self.info_provider,
            debugger: self.debugger,
            tunnels: self.tunnels,
        };
        Ok(ServerBehaviour {
            context: Arc::new(context),
        })
    }
}

#[derive(Debug, Clone)]
pub struct ServerBehaviour {
    context: Arc<OperationContext>,
}

impl ServerBehaviour {
    pub fn builder(
        server: impl Into<String>,
        factory: Arc<dyn CloudClientFactory>,
        framework: Arc<dyn ModuleFramework>,
        credentials: CloudCredentials,
    ) -> ServerBehaviourBuilder {
        ServerBehaviourBuilder {
            server: server.into(),
            factory,
            framework,
            credentials,
            config: DeployConfig::default(),
            info_provider: Arc::new(AcceptDefaults),
            debugger: Arc::new(NoDebugger),
            tunnels: Arc::new(NoTunnels),
        }
    }

    pub fn server(&self) -> &str {
        &self.context.server
    }

    pub fn context(&self) -> &Arc<OperationContext> {
        &self.context
    }

    pub fn events(&self) -> &Arc<BehaviourEventBus> {
        &self.context.events
    }

    pub fn registry(&self) -> &Arc<ModuleRegistry> {
        &self.context.registry
    }

    pub fn refresh(&self) -> &Arc<RefreshController> {
        &self.context.refresh
    }

    pub fn server_state(&self) -> RunState {
        self.context.server_state.state()
    }

    pub fn module(&self, local: &ModuleRef) -> Option<ApplicationModule> {
        let id = self.context.registry.get(local).ok()?;
        self.context.registry.module(id)
    }

    /// Log in, load every remote application and start the background refresh
    pub async fn connect(&self) -> DeployResult<()> {
        let monitor = OperationMonitor::new();
        self.context
            .request(
                "login",
                Arc::new(ConnectionRetry::new(self.context.requests.retry_interval())),
                &monitor,
            )
            .run(|client| async move { client.login().await })
            .await?;

        self.context.refresh.refresh_all().await;
        self.context.refresh.start();
        info!(server = %self.context.server, "🔌 Connected");
        Ok(())
    }

    /// Stop the background refresh and drop the client
    pub async fn disconnect(&self) {
        self.context.refresh.shutdown().await;
        self.context.session.invalidate();
        self.context.server_state.observe(RunState::Stopped).await;
        info!(server = %self.context.server, "Disconnected");
    }

    /// Replace credentials; the next request creates a new client with them
    pub fn update_credentials(&self, credentials: CloudCredentials) {
        let url = credentials.url.clone();
        self.context.session.update_credentials(credentials);
        self.context.notify(
            BehaviourEventType::CredentialsPrompted,
            None,
            EventPayload::Credentials { url },
        );
    }

    pub async fn run(&self, operation: &dyn CloudOperation, monitor: &OperationMonitor) -> DeployResult<()> {
        operation.run(monitor).await
    }

    fn application_operation(&self, module: &ModuleRef, kind: OperationKind) -> ApplicationOperation {
        ApplicationOperation::new(Arc::clone(&self.context), module.clone(), kind)
    }

    /// Deploy the unit if needed and start it
    pub async fn start_module(&self, module: &ModuleRef, monitor: &OperationMonitor) -> DeployResult<()> {
        self.application_operation(module, OperationKind::Deploy)
            .run(monitor)
            .await
    }

    /// Push the unit, as a delta when `incremental` and the unit allows it, and start it
    pub async fn publish_module(
        &self,
        module: &ModuleRef,
        incremental: bool,
        monitor: &OperationMonitor,
    ) -> DeployResult<()> {
        self.application_operation(module, OperationKind::Deploy)
            .incremental(incremental)
            .run(monitor)
            .await
    }

    pub async fn debug_module(&self, module: &ModuleRef, monitor: &OperationMonitor) -> DeployResult<()> {
        self.application_operation(module, OperationKind::Debug)
            .run(monitor)
            .await
    }

    pub async fn restart_module(&self, module: &ModuleRef, monitor: &OperationMonitor) -> DeployResult<()> {
        self.application_operation(module, OperationKind::Restart)
            .run(monitor)
            .await
    }

    pub async fn stop_module(&self, module: &ModuleRef, monitor: &OperationMonitor) -> DeployResult<()> {
        self.application_operation(module, OperationKind::Stop)
            .run(monitor)
            .await
    }

    pub async fn delete_module(
        &self,
        module: &ModuleRef,
        delete_services: bool,
        monitor: &OperationMonitor,
    ) -> DeployResult<()> {
        DeleteOperation::new(Arc::clone(&self.context), module.clone())
            .with_services(delete_services)
            .run(monitor)
            .await
    }

    pub async fn delete_services(&self, services: Vec<String>, monitor: &OperationMonitor) -> DeployResult<()> {
        DeleteServicesOperation::new(Arc::clone(&self.context), services)
            .run(monitor)
            .await
    }

    pub async fn update_application(
        &self,
        module: &ModuleRef,
        update: ApplicationUpdate,
        monitor: &OperationMonitor,
    ) -> DeployResult<()> {
        UpdateOperation::new(Arc::clone(&self.context), module.clone(), update)
            .run(monitor)
            .await
    }

    pub async fn update_instances(&self, module: &ModuleRef, instances: u32, monitor: &OperationMonitor) -> DeployResult<()> {
        self.update_application(module, ApplicationUpdate::Instances(instances), monitor)
            .await
    }

    pub async fn update_memory(&self, module: &ModuleRef, memory_mb: u64, monitor: &OperationMonitor) -> DeployResult<()> {
        self.update_application(module, ApplicationUpdate::Memory(memory_mb), monitor)
            .await
    }

    pub async fn update_uris(&self, module: &ModuleRef, uris: Vec<String>, monitor: &OperationMonitor) -> DeployResult<()> {
        self.update_application(module, ApplicationUpdate::Uris(uris), monitor)
            .await
    }

    pub async fn update_env(
        &self,
        module: &ModuleRef,
        env: BTreeMap<String, String>,
        monitor: &OperationMonitor,
    ) -> DeployResult<()> {
        self.update_application(module, ApplicationUpdate::Env(env), monitor)
            .await
    }

    pub async fn update_services(
        &self,
        module: &ModuleRef,
        services: Vec<String>,
        monitor: &OperationMonitor,
    ) -> DeployResult<()> {
        self.update_application(module, ApplicationUpdate::Services(services), monitor)
            .await
    }

    /// Re-fetch one module's application and announce the refresh
    pub async fn refresh_module(&self, module: &ModuleRef) -> DeployResult<()> {
        let id = self.context.registry.get(module)?;
        self.context.refresh.refresh_module(id).await?;
        self.context.refresh.fire_refresh_event(RefreshScope::Module(id));
        Ok(())
    }

    pub async fn refresh_instances(&self, module: &ModuleRef) -> DeployResult<()> {
        let id = self.context.registry.get(module)?;
        self.context.refresh.refresh_instances(id).await?;
        self.context.refresh.fire_refresh_event(RefreshScope::Module(id));
        Ok(())
    }

    pub async fn refresh_all(&self) -> Option<ReconcileSummary> {
        self.context.refresh.refresh_all().await
    }

    pub async fn domains(&self) -> DeployResult<Vec<CloudDomain>> {
        self.context
            .request(
                "list domains",
                Arc::new(ConnectionRetry::new(self.context.requests.retry_interval())),
                &OperationMonitor::new(),
            )
            .run(|client| async move { client.domains().await })
            .await
    }

    pub async fn spaces(&self) -> DeployResult<Vec<CloudSpace>> {
        self.context
            .request(
                "list spaces",
                Arc::new(ConnectionRetry::new(self.context.requests.retry_interval())),
                &OperationMonitor::new(),
            )
            .run(|client| async move { client.spaces().await })
            .await
    }

    /// Start editing a module's deployment descriptor; the module is created if needed
    pub fn working_copy(&self, module: &ModuleRef) -> DeployResult<DeploymentInfoWorkingCopy> {
        let id = self.context.registry.get_or_create(module);
        self.context
            .registry
            .working_copy(id, self.context.config.deployment.default_domain.as_deref())
    }

    /// The committed descriptor of a module, if any
    pub fn deployment_info(&self, module: &ModuleRef) -> DeployResult<Option<ApplicationDeploymentInfo>> {
        let id = self.context.registry.get(module)?;
        self.context
            .registry
            .module(id)
            .map(|module| module.deployment_info().cloned())
            .ok_or_else(|| DeployError::ModuleNotFound(module.to_string()))
    }
}
