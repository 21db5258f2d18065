//! # Deployment Descriptor
//!
//! The declarative target state of an application. Descriptors are plain values: cloning one
//! (or calling [`ApplicationDeploymentInfo::copy`]) yields a fully independent copy, so a
//! working copy can be edited without touching the committed descriptor.

use crate::client::{CloudApplication, Staging};
use crate::constants::defaults::{DEFAULT_INSTANCES, DEFAULT_MEMORY_MB};
use crate::error::{DeployError, DeployResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationDeploymentInfo {
    deployment_name: String,
    pub memory_mb: u64,
    pub instances: u32,
    pub staging: Option<Staging>,
    pub uris: Vec<String>,
    pub services: Vec<String>,
    pub env: BTreeMap<String, String>,
    /// Pre-built archive to upload instead of the unit's resources
    pub archive: Option<PathBuf>,
}

impl ApplicationDeploymentInfo {
    /// An empty descriptor; memory and staging still need filling in
    pub fn new(deployment_name: impl Into<String>) -> Self {
        Self {
            deployment_name: deployment_name.into(),
            memory_mb: 0,
            instances: DEFAULT_INSTANCES,
            staging: None,
            uris: Vec::new(),
            services: Vec::new(),
            env: BTreeMap::new(),
            archive: None,
        }
    }

    /// Computed defaults for a first deployment: default memory, one instance, default
    /// staging and a single route on `domain` when one is known.
    pub fn defaults_for(deployment_name: impl Into<String>, domain: Option<&str>) -> Self {
        let mut info = Self::new(deployment_name);
        info.memory_mb = DEFAULT_MEMORY_MB;
        info.staging = Some(Staging::default());
        if let Some(domain) = domain {
            info.uris = vec![format!("{}.{domain}", info.deployment_name)];
        }
        info
    }

    /// Descriptor matching what is currently deployed
    pub fn from_application(application: &CloudApplication) -> Self {
        Self {
            deployment_name: application.name.clone(),
            memory_mb: application.memory_mb,
            instances: application.instances,
            staging: Some(application.staging.clone()),
            uris: application.uris.clone(),
            services: application.services.clone(),
            env: application.env.clone(),
            archive: None,
        }
    }

    pub fn deployment_name(&self) -> &str {
        &self.deployment_name
    }

    pub fn set_deployment_name(&mut self, name: impl Into<String>) -> DeployResult<()> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DeployError::Validation(
                "deployment name must not be empty".to_string(),
            ));
        }
        self.deployment_name = name;
        Ok(())
    }

    /// Independent copy of this descriptor
    pub fn copy(&self) -> Self {
        self.clone()
    }

    /// Overwrite every field with a copy of `other`
    pub fn set_info(&mut self, other: &ApplicationDeploymentInfo) {
        *self = other.copy();
    }

    /// Fields a deployment cannot proceed without
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.deployment_name.trim().is_empty() {
            missing.push("deployment_name");
        }
        if self.memory_mb == 0 {
            missing.push("memory_mb");
        }
        if self.instances == 0 {
            missing.push("instances");
        }
        if self.staging.is_none() {
            missing.push("staging");
        }
        missing
    }

    pub fn is_complete(&self) -> bool {
        self.missing_fields().is_empty()
    }
}
