//! Mock Host Framework and Collaborators
//!
//! Records every status indicator the core publishes to the host, serves in-memory resources
//! for archives, and provides recording stand-ins for the tunnel manager, debugger, descriptor
//! provider and behaviour listeners.

use async_trait::async_trait;
use cf_deploy_core::client::InstancesInfo;
use cf_deploy_core::error::DeployResult;
use cf_deploy_core::events::{BehaviourEvent, BehaviourEventType, BehaviourListener, ListenerError};
use cf_deploy_core::framework::{
    ModuleFramework, ModuleRef, ModuleResource, PublishState, ResourceDelta, RunState,
};
use cf_deploy_core::models::{ApplicationDeploymentInfo, ApplicationModule};
use cf_deploy_core::operations::{DebugLauncher, DeploymentInfoProvider, TunnelManager};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::mock_cloud::MockCloudState;

#[derive(Debug, Default, Clone)]
pub struct MockFrameworkState {
    /// Every module run state published, in order
    pub module_states: Vec<(String, RunState)>,
    /// Every server run state published, in order
    pub server_states: Vec<RunState>,
    pub publish_states: HashMap<String, PublishState>,
    pub resources: HashMap<String, Vec<ModuleResource>>,
    pub deltas: HashMap<String, Vec<ResourceDelta>>,
    pub children: HashMap<String, Vec<ModuleRef>>,
}

#[derive(Debug, Clone, Default)]
pub struct MockFramework {
    state: Arc<Mutex<MockFrameworkState>>,
}

impl MockFramework {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_resources(self, module: &ModuleRef, resources: Vec<ModuleResource>) -> Self {
        self.set_resources(module, resources);
        self
    }

    pub fn set_resources(&self, module: &ModuleRef, resources: Vec<ModuleResource>) {
        self.state
            .lock()
            .unwrap()
            .resources
            .insert(module.id.clone(), resources);
    }

    pub fn set_delta(&self, module: &ModuleRef, deltas: Vec<ResourceDelta>) {
        self.state
            .lock()
            .unwrap()
            .deltas
            .insert(module.id.clone(), deltas);
    }

    pub fn get_state(&self) -> MockFrameworkState {
        self.state.lock().unwrap().clone()
    }

    /// Run states published for one module, in order
    pub fn states_of(&self, module: &ModuleRef) -> Vec<RunState> {
        self.state
            .lock()
            .unwrap()
            .module_states
            .iter()
            .filter(|(id, _)| id == &module.id)
            .map(|(_, state)| *state)
            .collect()
    }

    pub fn publish_state_of(&self, module: &ModuleRef) -> PublishState {
        self.state
            .lock()
            .unwrap()
            .publish_states
            .get(&module.id)
            .copied()
            .unwrap_or_default()
    }

    pub fn reset(&self) {
        *self.state.lock().unwrap() = MockFrameworkState::default();
    }
}

#[async_trait]
impl ModuleFramework for MockFramework {
    async fn publish_state(&self, module: &ModuleRef) -> PublishState {
        self.publish_state_of(module)
    }

    async fn set_publish_state(&self, module: &ModuleRef, state: PublishState) {
        self.state
            .lock()
            .unwrap()
            .publish_states
            .insert(module.id.clone(), state);
    }

    async fn set_module_state(&self, module: &ModuleRef, state: RunState) {
        self.state
            .lock()
            .unwrap()
            .module_states
            .push((module.id.clone(), state));
    }

    async fn set_server_state(&self, state: RunState) {
        self.state.lock().unwrap().server_states.push(state);
    }

    async fn child_modules(&self, module: &ModuleRef) -> Vec<ModuleRef> {
        self.state
            .lock()
            .unwrap()
            .children
            .get(&module.id)
            .cloned()
            .unwrap_or_default()
    }

    async fn resources(&self, module: &ModuleRef) -> DeployResult<Vec<ModuleResource>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .resources
            .get(&module.id)
            .cloned()
            .unwrap_or_default())
    }

    async fn published_delta(&self, module: &ModuleRef) -> DeployResult<Vec<ResourceDelta>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .deltas
            .get(&module.id)
            .cloned()
            .unwrap_or_default())
    }
}

/// Closes a fixed set of tunnels, logging the call into the controller's call log so ordering
/// against remote calls can be asserted
#[derive(Debug, Clone)]
pub struct MockTunnels {
    cloud: Arc<Mutex<MockCloudState>>,
    open: Vec<String>,
}

impl MockTunnels {
    pub fn new(cloud: Arc<Mutex<MockCloudState>>, open: &[&str]) -> Self {
        Self {
            cloud,
            open: open.iter().map(|name| name.to_string()).collect(),
        }
    }
}

#[async_trait]
impl TunnelManager for MockTunnels {
    async fn close_tunnels(&self, server: &str) -> DeployResult<Vec<String>> {
        self.cloud
            .lock()
            .unwrap()
            .calls
            .push(format!("close_tunnels:{server}"));
        Ok(self.open.clone())
    }
}

#[derive(Debug, Clone, Default)]
pub struct MockDebugger {
    connected: Arc<Mutex<Vec<String>>>,
    cloud: Option<Arc<Mutex<MockCloudState>>>,
}

impl MockDebugger {
    /// Also log each connection into the controller's call log as `debug_connect:<app>`
    pub fn logging_into(cloud: Arc<Mutex<MockCloudState>>) -> Self {
        Self {
            cloud: Some(cloud),
            ..Default::default()
        }
    }

    pub fn connected(&self) -> Vec<String> {
        self.connected.lock().unwrap().clone()
    }
}

#[async_trait]
impl DebugLauncher for MockDebugger {
    async fn connect(&self, application: &str, _instances: Option<&InstancesInfo>) -> DeployResult<()> {
        self.connected.lock().unwrap().push(application.to_string());
        if let Some(cloud) = &self.cloud {
            cloud
                .lock()
                .unwrap()
                .calls
                .push(format!("debug_connect:{application}"));
        }
        Ok(())
    }
}

/// Descriptor provider that either cancels or applies a fixed set of edits
#[derive(Debug, Clone, Default)]
pub struct ScriptedProvider {
    cancel: bool,
    memory_mb: Option<u64>,
    instances: Option<u32>,
    asked: Arc<Mutex<u32>>,
}

impl ScriptedProvider {
    pub fn cancelling() -> Self {
        Self {
            cancel: true,
            ..Default::default()
        }
    }

    pub fn with_memory(mut self, memory_mb: u64) -> Self {
        self.memory_mb = Some(memory_mb);
        self
    }

    pub fn with_instances(mut self, instances: u32) -> Self {
        self.instances = Some(instances);
        self
    }

    pub fn asked(&self) -> u32 {
        *self.asked.lock().unwrap()
    }
}

#[async_trait]
impl DeploymentInfoProvider for ScriptedProvider {
    async fn complete(
        &self,
        _module: &ApplicationModule,
        mut candidate: ApplicationDeploymentInfo,
    ) -> DeployResult<Option<ApplicationDeploymentInfo>> {
        *self.asked.lock().unwrap() += 1;
        if self.cancel {
            return Ok(None);
        }
        if let Some(memory_mb) = self.memory_mb {
            candidate.memory_mb = memory_mb;
        }
        if let Some(instances) = self.instances {
            candidate.instances = instances;
        }
        Ok(Some(candidate))
    }
}

/// Listener that keeps every event it receives
#[derive(Debug, Default)]
pub struct RecordingListener {
    events: Mutex<Vec<BehaviourEvent>>,
}

impl RecordingListener {
    pub fn events(&self) -> Vec<BehaviourEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, event_type: BehaviourEventType) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|event| event.event_type == event_type)
            .count()
    }

    pub fn last(&self, event_type: BehaviourEventType) -> Option<BehaviourEvent> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|event| event.event_type == event_type)
            .cloned()
    }
}

impl BehaviourListener for RecordingListener {
    fn handle(&self, event: &BehaviourEvent) -> Result<(), ListenerError> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }

    fn listener_name(&self) -> &str {
        "recording"
    }
}
