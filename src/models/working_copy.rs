use super::{ApplicationDeploymentInfo, ModuleId};
use crate::error::DeployResult;
use crate::registry::ModuleRegistry;
use std::sync::Arc;

/// Editable copy of a module's deployment descriptor
///
/// Filled from the committed descriptor when one exists, otherwise from computed defaults.
/// Nothing changes on the module until [`DeploymentInfoWorkingCopy::save`]; dropping the working
/// copy discards the edits.
#[derive(Debug)]
pub struct DeploymentInfoWorkingCopy {
    registry: Arc<ModuleRegistry>,
    module: ModuleId,
    info: ApplicationDeploymentInfo,
}

impl DeploymentInfoWorkingCopy {
    pub(crate) fn new(
        registry: Arc<ModuleRegistry>,
        module: ModuleId,
        info: ApplicationDeploymentInfo,
    ) -> Self {
        Self {
            registry,
            module,
            info,
        }
    }

    pub fn module(&self) -> ModuleId {
        self.module
    }

    pub fn info(&self) -> &ApplicationDeploymentInfo {
        &self.info
    }

    pub fn info_mut(&mut self) -> &mut ApplicationDeploymentInfo {
        &mut self.info
    }

    /// Replace the edited descriptor wholesale
    pub fn set_info(&mut self, info: &ApplicationDeploymentInfo) {
        self.info.set_info(info);
    }

    /// Commit the edits to the module
    pub fn save(self) -> DeployResult<()> {
        self.registry.set_deployment_info(self.module, Some(self.info))
    }
}
