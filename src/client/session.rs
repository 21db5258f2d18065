//! # Client Session
//!
//! Owns the single active client handle for a server. The handle is created lazily on first use,
//! cached for the lifetime of the session, and dropped wholesale whenever credentials change or
//! the server disconnects; the next use creates a fresh one.

use super::traits::{CloudClient, CloudClientFactory};
use crate::error::{ClientError, DeployError, DeployResult};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Endpoint and login for one cloud controller
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudCredentials {
    pub url: String,
    pub username: String,
    pub password: String,
    pub organization: Option<String>,
    pub space: Option<String>,
}

impl CloudCredentials {
    pub fn new(
        url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            username: username.into(),
            password: password.into(),
            organization: None,
            space: None,
        }
    }

    pub fn with_space(mut self, organization: impl Into<String>, space: impl Into<String>) -> Self {
        self.organization = Some(organization.into());
        self.space = Some(space.into());
        self
    }

    /// Check the endpoint is usable before any network traffic is attempted
    pub fn validate_endpoint(&self) -> DeployResult<()> {
        let url = self.url.trim();
        if url.is_empty() {
            return Err(DeployError::Validation(
                "cloud controller URL is not set".to_string(),
            ));
        }
        if !(url.starts_with("https://") || url.starts_with("http://")) {
            return Err(DeployError::Validation(format!(
                "cloud controller URL must use http or https: {url}"
            )));
        }
        Ok(())
    }

    fn masked_password(&self) -> String {
        if self.password.is_empty() {
            "[EMPTY]".to_string()
        } else {
            "[MASKED]".to_string()
        }
    }
}

impl fmt::Debug for CloudCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloudCredentials")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &self.masked_password())
            .field("organization", &self.organization)
            .field("space", &self.space)
            .finish()
    }
}

pub struct ClientSession {
    factory: Arc<dyn CloudClientFactory>,
    credentials: RwLock<CloudCredentials>,
    client: RwLock<Option<Arc<dyn CloudClient>>>,
}

impl fmt::Debug for ClientSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientSession")
            .field("credentials", &*self.credentials.read())
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl ClientSession {
    pub fn new(factory: Arc<dyn CloudClientFactory>, credentials: CloudCredentials) -> Self {
        Self {
            factory,
            credentials: RwLock::new(credentials),
            client: RwLock::new(None),
        }
    }

    /// The cached client, created on first use
    pub fn client(&self) -> DeployResult<Arc<dyn CloudClient>> {
        if let Some(client) = self.client.read().as_ref() {
            return Ok(Arc::clone(client));
        }

        let mut slot = self.client.write();
        // Another caller may have created it while we waited for the write lock
        if let Some(client) = slot.as_ref() {
            return Ok(Arc::clone(client));
        }

        let credentials = self.credentials.read().clone();
        credentials.validate_endpoint()?;
        let client = self
            .factory
            .create(&credentials)
            .map_err(|source| DeployError::remote("create client", source))?;
        debug!(url = %credentials.url, "Created cloud controller client");
        *slot = Some(Arc::clone(&client));
        Ok(client)
    }

    /// Whether a client handle is currently cached
    pub fn is_connected(&self) -> bool {
        self.client.read().is_some()
    }

    /// Drop the cached client; the next [`ClientSession::client`] call creates a new one
    pub fn invalidate(&self) {
        if self.client.write().take().is_some() {
            info!("Invalidated cloud controller client");
        }
    }

    /// Replace credentials and invalidate the cached client
    pub fn update_credentials(&self, credentials: CloudCredentials) {
        *self.credentials.write() = credentials;
        self.invalidate();
    }

    pub fn credentials(&self) -> CloudCredentials {
        self.credentials.read().clone()
    }

    /// Validate the endpoint without creating a client
    pub fn check_endpoint(&self) -> DeployResult<()> {
        self.credentials.read().validate_endpoint()
    }
}
