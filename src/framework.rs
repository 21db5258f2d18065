//! # Local Deployable-Unit Framework
//!
//! The host side of a deployment: the local registry of deployable units, their publish state,
//! the resources they contain, and the run-state indicators the host displays for modules and
//! for the server as a whole.

use crate::error::DeployResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Identity of a local deployable unit
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModuleRef {
    /// Stable identifier assigned by the host
    pub id: String,
    /// Default application name for the unit
    pub name: String,
    /// Units without local resources (for example an application that only exists remotely)
    pub externally_managed: bool,
}

impl ModuleRef {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            externally_managed: false,
        }
    }

    /// A placeholder unit for an application discovered remotely
    pub fn external(application: impl Into<String>) -> Self {
        let name = application.into();
        Self {
            id: format!("external:{name}"),
            name,
            externally_managed: true,
        }
    }
}

impl fmt::Display for ModuleRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.id)
    }
}

/// Run state shown for a module or for the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    #[default]
    Unknown,
    Starting,
    Started,
    Stopping,
    Stopped,
}

impl RunState {
    pub(crate) fn as_u8(self) -> u8 {
        match self {
            RunState::Unknown => 0,
            RunState::Starting => 1,
            RunState::Started => 2,
            RunState::Stopping => 3,
            RunState::Stopped => 4,
        }
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => RunState::Starting,
            2 => RunState::Started,
            3 => RunState::Stopping,
            4 => RunState::Stopped,
            _ => RunState::Unknown,
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Unknown => write!(f, "unknown"),
            RunState::Starting => write!(f, "starting"),
            RunState::Started => write!(f, "started"),
            RunState::Stopping => write!(f, "stopping"),
            RunState::Stopped => write!(f, "stopped"),
        }
    }
}

/// What the host believes must be uploaded for a unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishState {
    #[default]
    Unknown,
    /// Remote copy is current
    None,
    IncrementalPublishRequired,
    FullPublishRequired,
}

/// Where a resource's bytes live
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceSource {
    Memory(Arc<Vec<u8>>),
    File(PathBuf),
}

impl ResourceSource {
    pub fn read(&self) -> std::io::Result<Vec<u8>> {
        match self {
            ResourceSource::Memory(bytes) => Ok(bytes.as_ref().clone()),
            ResourceSource::File(path) => std::fs::read(path),
        }
    }

    /// Size in bytes without reading file content
    pub fn size(&self) -> std::io::Result<u64> {
        match self {
            ResourceSource::Memory(bytes) => Ok(u64::try_from(bytes.len()).unwrap_or(u64::MAX)),
            ResourceSource::File(path) => Ok(std::fs::metadata(path)?.len()),
        }
    }
}

/// A file inside a deployable unit, addressed by its archive-relative path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleResource {
    pub path: String,
    pub source: ResourceSource,
}

impl ModuleResource {
    pub fn in_memory(path: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            source: ResourceSource::Memory(Arc::new(content.into())),
        }
    }

    pub fn file(path: impl Into<String>, file: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            source: ResourceSource::File(file.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeltaKind {
    Added,
    Changed,
    Removed,
    NoChange,
}

/// A resource's change since the last successful publish
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceDelta {
    pub resource: ModuleResource,
    pub kind: DeltaKind,
    /// Content hash recorded at the last publish, known for unchanged resources
    pub published_hash: Option<String>,
}

/// The host framework that owns deployable units and their status indicators
#[async_trait]
pub trait ModuleFramework: Send + Sync {
    async fn publish_state(&self, module: &ModuleRef) -> PublishState;

    async fn set_publish_state(&self, module: &ModuleRef, state: PublishState);

    async fn set_module_state(&self, module: &ModuleRef, state: RunState);

    async fn set_server_state(&self, state: RunState);

    async fn child_modules(&self, module: &ModuleRef) -> Vec<ModuleRef>;

    /// Every resource of the unit, for a full archive
    async fn resources(&self, module: &ModuleRef) -> DeployResult<Vec<ModuleResource>>;

    /// Resource changes since the last publish, for a delta archive
    async fn published_delta(&self, module: &ModuleRef) -> DeployResult<Vec<ResourceDelta>>;
}
