//! # Application Module
//!
//! The binding between a local deployable unit and a remote application. Modules live inside the
//! [`crate::registry::ModuleRegistry`]; callers receive cloned snapshots and mutate only through
//! the registry, which keeps the name index consistent.

use super::ApplicationDeploymentInfo;
use crate::client::{ApplicationStats, CloudApplication, InstancesInfo, StartingInfo};
use crate::framework::{ModuleRef, RunState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Stable registry key for a module, independent of its (mutable) deployed name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModuleId(Uuid);

impl ModuleId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ModuleId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApplicationModule {
    id: ModuleId,
    local: ModuleRef,
    deployed_name: String,
    application: Option<CloudApplication>,
    deployment_info: Option<ApplicationDeploymentInfo>,
    stats: Option<ApplicationStats>,
    instances: Option<InstancesInfo>,
    starting_info: Option<StartingInfo>,
    error: Option<String>,
    run_state: RunState,
    last_refreshed: Option<DateTime<Utc>>,
}

impl ApplicationModule {
    pub(crate) fn new(local: ModuleRef) -> Self {
        Self {
            id: ModuleId::new(),
            deployed_name: local.name.clone(),
            local,
            application: None,
            deployment_info: None,
            stats: None,
            instances: None,
            starting_info: None,
            error: None,
            run_state: RunState::Unknown,
            last_refreshed: None,
        }
    }

    pub fn id(&self) -> ModuleId {
        self.id
    }

    pub fn local(&self) -> &ModuleRef {
        &self.local
    }

    pub fn deployed_name(&self) -> &str {
        &self.deployed_name
    }

    /// Last fetched remote snapshot; `None` when not deployed or deleted
    pub fn application(&self) -> Option<&CloudApplication> {
        self.application.as_ref()
    }

    pub fn is_deployed(&self) -> bool {
        self.application.is_some()
    }

    pub fn deployment_info(&self) -> Option<&ApplicationDeploymentInfo> {
        self.deployment_info.as_ref()
    }

    pub fn stats(&self) -> Option<&ApplicationStats> {
        self.stats.as_ref()
    }

    pub fn instances(&self) -> Option<&InstancesInfo> {
        self.instances.as_ref()
    }

    pub fn starting_info(&self) -> Option<&StartingInfo> {
        self.starting_info.as_ref()
    }

    /// Sticky error from the last failed operation
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn run_state(&self) -> RunState {
        self.run_state
    }

    pub fn last_refreshed(&self) -> Option<DateTime<Utc>> {
        self.last_refreshed
    }

    /// Replace the remote snapshot. Returns the previous deployed name when the snapshot
    /// renamed the module.
    pub(crate) fn set_cloud_application(
        &mut self,
        application: Option<CloudApplication>,
    ) -> Option<String> {
        self.last_refreshed = Some(Utc::now());
        let renamed = match &application {
            Some(app) if app.name != self.deployed_name => {
                Some(std::mem::replace(&mut self.deployed_name, app.name.clone()))
            }
            _ => None,
        };
        self.application = application;
        renamed
    }

    /// Replace the deployment descriptor. Returns the previous deployed name when the
    /// descriptor renamed the module.
    pub(crate) fn set_deployment_info(
        &mut self,
        info: Option<ApplicationDeploymentInfo>,
    ) -> Option<String> {
        let renamed = match &info {
            Some(info) if info.deployment_name() != self.deployed_name => Some(std::mem::replace(
                &mut self.deployed_name,
                info.deployment_name().to_string(),
            )),
            _ => None,
        };
        self.deployment_info = info;
        renamed
    }

    pub(crate) fn set_local(&mut self, local: ModuleRef) {
        self.local = local;
    }

    pub(crate) fn set_stats(&mut self, stats: Option<ApplicationStats>, instances: Option<InstancesInfo>) {
        self.stats = stats;
        self.instances = instances;
    }

    pub(crate) fn set_starting_info(&mut self, info: Option<StartingInfo>) {
        self.starting_info = info;
    }

    pub(crate) fn set_error(&mut self, error: Option<String>) {
        self.error = error;
    }

    pub(crate) fn set_run_state(&mut self, state: RunState) {
        self.run_state = state;
    }

    /// Forget everything learned from the remote side
    pub(crate) fn clear_remote_state(&mut self) {
        self.application = None;
        self.deployment_info = None;
        self.stats = None;
        self.instances = None;
        self.starting_info = None;
        self.run_state = RunState::Stopped;
    }
}
