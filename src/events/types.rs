use crate::client::CloudApplication;
use crate::models::ModuleId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle transitions announced on the [`super::BehaviourEventBus`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BehaviourEventType {
    AppStarted,
    AppStopped,
    AppDeleted,
    AppUpdated,
    CredentialsPrompted,
    TunnelsRefreshed,
    ServicesDeleted,
}

impl BehaviourEventType {
    pub const ALL: [BehaviourEventType; 7] = [
        BehaviourEventType::AppStarted,
        BehaviourEventType::AppStopped,
        BehaviourEventType::AppDeleted,
        BehaviourEventType::AppUpdated,
        BehaviourEventType::CredentialsPrompted,
        BehaviourEventType::TunnelsRefreshed,
        BehaviourEventType::ServicesDeleted,
    ];
}

impl fmt::Display for BehaviourEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BehaviourEventType::AppStarted => "app_started",
            BehaviourEventType::AppStopped => "app_stopped",
            BehaviourEventType::AppDeleted => "app_deleted",
            BehaviourEventType::AppUpdated => "app_updated",
            BehaviourEventType::CredentialsPrompted => "credentials_prompted",
            BehaviourEventType::TunnelsRefreshed => "tunnels_refreshed",
            BehaviourEventType::ServicesDeleted => "services_deleted",
        };
        f.write_str(name)
    }
}

/// Typed result carried by an event
#[derive(Debug, Clone, PartialEq, Default)]
pub enum EventPayload {
    #[default]
    None,
    /// Remote snapshot after the transition, when one was fetched
    Application(Box<CloudApplication>),
    /// Names of tunnels that were closed
    Tunnels(Vec<String>),
    /// Names of services that were deleted
    Services(Vec<String>),
    /// Endpoint whose credentials were replaced
    Credentials { url: String },
}

/// An immutable record of one lifecycle transition, alive only for the duration of dispatch
#[derive(Debug, Clone, PartialEq)]
pub struct BehaviourEvent {
    pub event_type: BehaviourEventType,
    pub server: String,
    pub module: Option<ModuleId>,
    pub application: Option<String>,
    pub payload: EventPayload,
    pub occurred_at: DateTime<Utc>,
}

impl BehaviourEvent {
    pub fn new(event_type: BehaviourEventType, server: impl Into<String>) -> Self {
        Self {
            event_type,
            server: server.into(),
            module: None,
            application: None,
            payload: EventPayload::None,
            occurred_at: Utc::now(),
        }
    }

    pub fn for_module(mut self, module: ModuleId, application: impl Into<String>) -> Self {
        self.module = Some(module);
        self.application = Some(application.into());
        self
    }

    pub fn with_payload(mut self, payload: EventPayload) -> Self {
        self.payload = payload;
        self
    }
}
