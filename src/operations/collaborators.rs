//! External collaborators an operation calls out to: descriptor completion (a prompt in an
//! interactive host), debugger attachment, and tunnel management.

use crate::client::InstancesInfo;
use crate::error::DeployResult;
use crate::models::{ApplicationDeploymentInfo, ApplicationModule};
use async_trait::async_trait;
use tracing::debug;

/// Fills in a deployment descriptor before a first or incomplete deployment
#[async_trait]
pub trait DeploymentInfoProvider: Send + Sync {
    /// Return the completed descriptor, or `None` if the user cancelled
    async fn complete(
        &self,
        module: &ApplicationModule,
        candidate: ApplicationDeploymentInfo,
    ) -> DeployResult<Option<ApplicationDeploymentInfo>>;
}

/// Accepts the computed defaults unchanged
#[derive(Debug, Default)]
pub struct AcceptDefaults;

#[async_trait]
impl DeploymentInfoProvider for AcceptDefaults {
    async fn complete(
        &self,
        _module: &ApplicationModule,
        candidate: ApplicationDeploymentInfo,
    ) -> DeployResult<Option<ApplicationDeploymentInfo>> {
        Ok(Some(candidate))
    }
}

/// Attaches a debugger to an application started in debug mode
#[async_trait]
pub trait DebugLauncher: Send + Sync {
    async fn connect(&self, application: &str, instances: Option<&InstancesInfo>) -> DeployResult<()>;
}

#[derive(Debug, Default)]
pub struct NoDebugger;

#[async_trait]
impl DebugLauncher for NoDebugger {
    async fn connect(&self, application: &str, _instances: Option<&InstancesInfo>) -> DeployResult<()> {
        debug!(application, "No debugger configured, skipping attach");
        Ok(())
    }
}

/// Manages tunnels to bound services through the tunnel gateway application
#[async_trait]
pub trait TunnelManager: Send + Sync {
    /// Close every open tunnel for `server`, returning the names of the closed tunnels
    async fn close_tunnels(&self, server: &str) -> DeployResult<Vec<String>>;
}

#[derive(Debug, Default)]
pub struct NoTunnels;

#[async_trait]
impl TunnelManager for NoTunnels {
    async fn close_tunnels(&self, _server: &str) -> DeployResult<Vec<String>> {
        Ok(Vec::new())
    }
}
