//! # Application Module Registry
//!
//! Arena of [`ApplicationModule`]s keyed by stable [`ModuleId`], with secondary indexes by local
//! unit id and by deployed application name.
//!
//! Structural changes (add, remove, rename) take the registry-wide write lock; field updates
//! take only the owning module's lock. The registry lock is always acquired before a module lock
//! and never while one is held, so the two levels cannot deadlock.

use crate::client::{ApplicationStats, CloudApplication, InstancesInfo, StartingInfo};
use crate::error::{DeployError, DeployResult};
use crate::framework::{ModuleRef, RunState};
use crate::models::{
    ApplicationDeploymentInfo, ApplicationModule, DeploymentInfoWorkingCopy, ModuleId,
};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// How a reconcile treats modules whose application is missing from the snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReconcileMode {
    /// Leave the last known snapshot in place
    #[default]
    KeepMissing,
    /// Clear the snapshot of modules the remote side no longer reports
    ClearMissing,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub added: usize,
    pub updated: usize,
    pub missing: usize,
    pub cleared: usize,
}

#[derive(Debug, Default)]
struct RegistryInner {
    modules: HashMap<ModuleId, Arc<Mutex<ApplicationModule>>>,
    by_local: HashMap<String, ModuleId>,
    by_name: HashMap<String, ModuleId>,
}

#[derive(Debug, Default)]
pub struct ModuleRegistry {
    inner: RwLock<RegistryInner>,
    reindex_count: AtomicU64,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve the module bound to a local unit, failing if there is none
    pub fn get(&self, local: &ModuleRef) -> DeployResult<ModuleId> {
        let inner = self.inner.read();
        inner
            .by_local
            .get(&local.id)
            .or_else(|| inner.by_name.get(&local.name))
            .copied()
            .ok_or_else(|| DeployError::ModuleNotFound(local.to_string()))
    }

    /// Resolve the module bound to a local unit, creating it if needed
    ///
    /// A module created earlier for a remotely discovered application of the same name is
    /// rebound to the local unit instead of being duplicated.
    pub fn get_or_create(&self, local: &ModuleRef) -> ModuleId {
        let mut inner = self.inner.write();

        if let Some(id) = inner.by_local.get(&local.id) {
            return *id;
        }

        if let Some(id) = inner.by_name.get(&local.name).copied() {
            let rebound = inner.modules.get(&id).and_then(|entry| {
                let mut module = entry.lock();
                if module.local().externally_managed && !local.externally_managed {
                    let previous = module.local().id.clone();
                    module.set_local(local.clone());
                    Some(previous)
                } else {
                    None
                }
            });
            if let Some(previous) = rebound {
                inner.by_local.remove(&previous);
                inner.by_local.insert(local.id.clone(), id);
                debug!(module = %local, "Rebound remotely discovered module to local unit");
                return id;
            }
        }

        let module = ApplicationModule::new(local.clone());
        let id = module.id();
        inner.by_local.insert(local.id.clone(), id);
        inner.by_name.insert(module.deployed_name().to_string(), id);
        inner.modules.insert(id, Arc::new(Mutex::new(module)));
        info!(module = %local, id = %id, "Created application module");
        id
    }

    pub fn find_by_name(&self, name: &str) -> Option<ModuleId> {
        self.inner.read().by_name.get(name).copied()
    }

    /// Snapshot of one module
    pub fn module(&self, id: ModuleId) -> Option<ApplicationModule> {
        let entry = self.inner.read().modules.get(&id).cloned()?;
        let module = entry.lock().clone();
        Some(module)
    }

    /// Snapshots of all modules, ordered by deployed name
    pub fn modules(&self) -> Vec<ApplicationModule> {
        let entries: Vec<_> = self.inner.read().modules.values().cloned().collect();
        let mut modules: Vec<_> = entries.iter().map(|entry| entry.lock().clone()).collect();
        modules.sort_by(|a, b| a.deployed_name().cmp(b.deployed_name()));
        modules
    }

    pub fn len(&self) -> usize {
        self.inner.read().modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of name re-indexes performed since creation
    pub fn reindex_count(&self) -> u64 {
        self.reindex_count.load(Ordering::Acquire)
    }

    fn entry(&self, id: ModuleId) -> DeployResult<Arc<Mutex<ApplicationModule>>> {
        self.inner
            .read()
            .modules
            .get(&id)
            .cloned()
            .ok_or_else(|| DeployError::ModuleNotFound(id.to_string()))
    }

    fn update<R>(&self, id: ModuleId, f: impl FnOnce(&mut ApplicationModule) -> R) -> DeployResult<R> {
        let entry = self.entry(id)?;
        let mut module = entry.lock();
        Ok(f(&mut module))
    }

    fn reindex(&self, id: ModuleId, old_name: &str, new_name: &str) {
        let mut inner = self.inner.write();
        if inner.by_name.get(old_name) == Some(&id) {
            inner.by_name.remove(old_name);
        }
        if let Some(other) = inner.by_name.insert(new_name.to_string(), id) {
            if other != id {
                warn!(name = new_name, displaced = %other, "Module rename displaced another module from the name index");
            }
        }
        self.reindex_count.fetch_add(1, Ordering::AcqRel);
        debug!(id = %id, from = old_name, to = new_name, "Re-indexed module");
    }

    /// Replace a module's remote snapshot, re-indexing it if the snapshot renamed it
    pub fn set_cloud_application(
        &self,
        id: ModuleId,
        application: Option<CloudApplication>,
    ) -> DeployResult<()> {
        let renamed = self.update(id, |module| {
            module
                .set_cloud_application(application)
                .map(|old| (old, module.deployed_name().to_string()))
        })?;
        if let Some((old, new)) = renamed {
            self.reindex(id, &old, &new);
        }
        Ok(())
    }

    /// Commit a deployment descriptor, re-indexing the module if the descriptor renamed it
    pub fn set_deployment_info(
        &self,
        id: ModuleId,
        info: Option<ApplicationDeploymentInfo>,
    ) -> DeployResult<()> {
        let renamed = self.update(id, |module| {
            module
                .set_deployment_info(info)
                .map(|old| (old, module.deployed_name().to_string()))
        })?;
        if let Some((old, new)) = renamed {
            self.reindex(id, &old, &new);
        }
        Ok(())
    }

    pub fn set_run_state(&self, id: ModuleId, state: RunState) -> DeployResult<()> {
        self.update(id, |module| module.set_run_state(state))
    }

    pub fn set_error(&self, id: ModuleId, error: impl Into<String>) -> DeployResult<()> {
        let error = error.into();
        self.update(id, |module| module.set_error(Some(error)))
    }

    pub fn clear_error(&self, id: ModuleId) -> DeployResult<()> {
        self.update(id, |module| module.set_error(None))
    }

    pub fn set_stats(
        &self,
        id: ModuleId,
        stats: Option<ApplicationStats>,
        instances: Option<InstancesInfo>,
    ) -> DeployResult<()> {
        self.update(id, |module| module.set_stats(stats, instances))
    }

    pub fn set_starting_info(&self, id: ModuleId, info: Option<StartingInfo>) -> DeployResult<()> {
        self.update(id, |module| module.set_starting_info(info))
    }

    /// Forget remote state after the application was deleted
    pub fn clear_remote_state(&self, id: ModuleId) -> DeployResult<()> {
        self.update(id, ApplicationModule::clear_remote_state)
    }

    /// Start editing a module's deployment descriptor
    pub fn working_copy(
        self: &Arc<Self>,
        id: ModuleId,
        default_domain: Option<&str>,
    ) -> DeployResult<DeploymentInfoWorkingCopy> {
        let info = self.update(id, |module| {
            module.deployment_info().map(ApplicationDeploymentInfo::copy).unwrap_or_else(|| {
                ApplicationDeploymentInfo::defaults_for(module.deployed_name(), default_domain)
            })
        })?;
        Ok(DeploymentInfoWorkingCopy::new(Arc::clone(self), id, info))
    }

    /// Reconcile a name-keyed snapshot of every remote application into the registry
    pub fn reconcile(
        &self,
        applications: HashMap<String, CloudApplication>,
        mode: ReconcileMode,
    ) -> DeployResult<ReconcileSummary> {
        let mut summary = ReconcileSummary::default();
        let seen: HashSet<String> = applications.keys().cloned().collect();

        for (name, application) in applications {
            match self.find_by_name(&name) {
                Some(id) => {
                    self.set_cloud_application(id, Some(application))?;
                    summary.updated += 1;
                }
                None => {
                    let id = self.get_or_create(&ModuleRef::external(name));
                    self.set_cloud_application(id, Some(application))?;
                    summary.added += 1;
                }
            }
        }

        let stale: Vec<ModuleId> = self
            .modules()
            .into_iter()
            .filter(|module| module.is_deployed() && !seen.contains(module.deployed_name()))
            .map(|module| module.id())
            .collect();
        summary.missing = stale.len();

        if mode == ReconcileMode::ClearMissing {
            for id in stale {
                self.set_cloud_application(id, None)?;
                summary.cleared += 1;
            }
        }

        debug!(
            added = summary.added,
            updated = summary.updated,
            missing = summary.missing,
            cleared = summary.cleared,
            "Reconciled remote applications"
        );
        Ok(summary)
    }

    /// Remove a module and its index entries
    pub fn remove(&self, id: ModuleId) -> Option<ApplicationModule> {
        let mut inner = self.inner.write();
        let entry = inner.modules.remove(&id)?;
        inner.by_local.retain(|_, value| *value != id);
        inner.by_name.retain(|_, value| *value != id);
        let module = entry.lock().clone();
        info!(module = %module.local(), id = %id, "Removed application module");
        Some(module)
    }
}
