//! Value types returned by the remote platform.
//!
//! Snapshots are treated as immutable once fetched: a refresh replaces them wholesale.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Coarse application state reported by the cloud controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppState {
    Started,
    Stopped,
    Updating,
}

impl fmt::Display for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppState::Started => write!(f, "started"),
            AppState::Stopped => write!(f, "stopped"),
            AppState::Updating => write!(f, "updating"),
        }
    }
}

/// Buildpack and stack selection for staging
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Staging {
    pub buildpack: Option<String>,
    pub stack: Option<String>,
    pub command: Option<String>,
}

impl Staging {
    pub fn with_buildpack(buildpack: impl Into<String>) -> Self {
        Self {
            buildpack: Some(buildpack.into()),
            ..Default::default()
        }
    }
}

/// Snapshot of a deployed application
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloudApplication {
    pub name: String,
    pub state: AppState,
    pub instances: u32,
    pub running_instances: u32,
    pub memory_mb: u64,
    pub uris: Vec<String>,
    pub services: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub staging: Staging,
}

impl CloudApplication {
    pub fn new(name: impl Into<String>, state: AppState) -> Self {
        Self {
            name: name.into(),
            state,
            instances: 1,
            running_instances: 0,
            memory_mb: crate::constants::defaults::DEFAULT_MEMORY_MB,
            uris: Vec::new(),
            services: Vec::new(),
            env: BTreeMap::new(),
            staging: Staging::default(),
        }
    }

    pub fn is_started(&self) -> bool {
        self.state == AppState::Started
    }
}

/// Everything needed to create an application remotely
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateApplicationRequest {
    pub name: String,
    pub staging: Staging,
    pub memory_mb: u64,
    pub uris: Vec<String>,
    pub services: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceState {
    Starting,
    Running,
    Crashed,
    Flapping,
    Down,
    Unknown,
}

/// Resource usage of one running instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceStats {
    pub index: u32,
    pub state: InstanceState,
    pub cpu_percent: f64,
    pub memory_bytes: u64,
    pub uptime_secs: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApplicationStats {
    pub records: Vec<InstanceStats>,
}

impl ApplicationStats {
    pub fn running(&self) -> usize {
        self.records
            .iter()
            .filter(|stats| stats.state == InstanceState::Running)
            .count()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceInfo {
    pub index: u32,
    pub state: InstanceState,
    pub since: Option<DateTime<Utc>>,
    pub debug_port: Option<u16>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstancesInfo {
    pub instances: Vec<InstanceInfo>,
}

/// Returned by the start command; locates the staging log for streaming
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartingInfo {
    pub staging_file: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudDomain {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudSpace {
    pub name: String,
    pub organization: String,
}
