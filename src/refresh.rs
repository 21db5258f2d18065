//! # Background Refresh
//!
//! Periodically re-fetches every remote application and reconciles the snapshot into the
//! [`ModuleRegistry`]. A refresh pass never fails: errors are logged and the pass is skipped.
//!
//! Foreground operations hold a [`RefreshPauseGuard`] while they mutate a module. Pauses are
//! reference counted, so concurrent operations each hold their own guard and the periodic cycle
//! resumes only when the last guard is dropped. Taking a pause waits for a periodic pass that is
//! already reconciling, so no pass overlaps a running operation.

use crate::client::{ClientSession, CloudApplication};
use crate::config::DeployConfig;
use crate::error::{DeployError, DeployResult};
use crate::events::{RefreshEvent, RefreshPublisher, RefreshScope};
use crate::models::ModuleId;
use crate::registry::{ModuleRegistry, ReconcileMode, ReconcileSummary};
use crate::resilience::{
    BehaviourRequest, ConnectionRetry, RequestFactory, RetryPolicy, ServerStateTracker, StagingAware,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, OwnedRwLockReadGuard, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub struct RefreshController {
    server: String,
    session: Arc<ClientSession>,
    server_state: Arc<ServerStateTracker>,
    registry: Arc<ModuleRegistry>,
    requests: RequestFactory,
    publisher: RefreshPublisher,
    enabled: bool,
    interval: Duration,
    /// Held shared by paused operations and exclusively by a periodic pass
    gate: Arc<RwLock<()>>,
    pauses: AtomicUsize,
    resumes: AtomicU64,
    passes: AtomicU64,
    worker: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

impl std::fmt::Debug for RefreshController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshController")
            .field("server", &self.server)
            .field("interval", &self.interval)
            .field("paused", &self.is_paused())
            .field("running", &self.is_running())
            .finish()
    }
}

impl RefreshController {
    pub fn new(
        server: impl Into<String>,
        session: Arc<ClientSession>,
        server_state: Arc<ServerStateTracker>,
        registry: Arc<ModuleRegistry>,
        config: &DeployConfig,
    ) -> Self {
        Self {
            server: server.into(),
            session,
            server_state,
            registry,
            requests: RequestFactory::from_config(config),
            publisher: RefreshPublisher::new(config.refresh.event_capacity),
            enabled: config.refresh.enabled,
            interval: config.refresh_interval(),
            gate: Arc::new(RwLock::new(())),
            pauses: AtomicUsize::new(0),
            resumes: AtomicU64::new(0),
            passes: AtomicU64::new(0),
            worker: Mutex::new(None),
        }
    }

    /// Suspend periodic passes until the returned guard is dropped, first letting an in-flight
    /// periodic pass finish
    pub async fn pause(self: &Arc<Self>) -> RefreshPauseGuard {
        let gate = Arc::clone(&self.gate).read_owned().await;
        let depth = self.pauses.fetch_add(1, Ordering::AcqRel) + 1;
        debug!(server = %self.server, depth, "Paused background refresh");
        RefreshPauseGuard {
            controller: Arc::clone(self),
            _gate: gate,
        }
    }

    fn release_pause(&self) {
        let previous = self.pauses.fetch_sub(1, Ordering::AcqRel);
        if previous == 1 {
            self.resumes.fetch_add(1, Ordering::AcqRel);
            debug!(server = %self.server, "Resumed background refresh");
        }
    }

    pub fn is_paused(&self) -> bool {
        self.pauses.load(Ordering::Acquire) > 0
    }

    /// Number of times the last outstanding pause was released
    pub fn resume_count(&self) -> u64 {
        self.resumes.load(Ordering::Acquire)
    }

    /// Number of completed full refresh passes
    pub fn pass_count(&self) -> u64 {
        self.passes.load(Ordering::Acquire)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RefreshEvent> {
        self.publisher.subscribe()
    }

    pub fn fire_refresh_event(&self, scope: RefreshScope) {
        self.publisher.publish(self.server.clone(), scope);
    }

    fn connection_request(&self, label: String) -> BehaviourRequest<'_> {
        self.behaviour_request(label, Arc::new(ConnectionRetry::new(self.requests.retry_interval())))
    }

    fn behaviour_request(&self, label: String, policy: Arc<dyn RetryPolicy>) -> BehaviourRequest<'_> {
        BehaviourRequest::new(
            &self.session,
            &self.server_state,
            self.requests.authenticated(self.requests.request(label, policy)),
        )
    }

    /// One full pass: list every application and reconcile. Failures are logged, never returned.
    pub async fn refresh_all(&self) -> Option<ReconcileSummary> {
        match self.try_refresh_all().await {
            Ok(summary) => {
                self.passes.fetch_add(1, Ordering::AcqRel);
                self.fire_refresh_event(RefreshScope::All);
                Some(summary)
            }
            Err(error) => {
                warn!(server = %self.server, error = %error, "Background refresh failed");
                None
            }
        }
    }

    async fn try_refresh_all(&self) -> DeployResult<ReconcileSummary> {
        let applications = self
            .connection_request("list applications".to_string())
            .run(|client| async move { client.applications().await })
            .await?;

        let snapshot: HashMap<String, CloudApplication> = applications
            .into_iter()
            .map(|app| (app.name.clone(), app))
            .collect();
        self.registry.reconcile(snapshot, ReconcileMode::KeepMissing)
    }

    /// Re-fetch one module's application. An application that no longer exists clears the
    /// module's snapshot.
    pub async fn refresh_module(&self, id: ModuleId) -> DeployResult<()> {
        let module = self
            .registry
            .module(id)
            .ok_or_else(|| DeployError::ModuleNotFound(id.to_string()))?;
        let name = module.deployed_name();

        let fetched = self
            .connection_request(format!("refresh {name}"))
            .run(|client| async move { client.application(name).await })
            .await;

        match fetched {
            Ok(app) => {
                let started = app.is_started();
                self.registry.set_cloud_application(id, Some(app))?;
                if started {
                    self.refresh_instances(id).await?;
                } else {
                    self.registry.set_stats(id, None, None)?;
                }
            }
            Err(error) if error.client_error().is_some_and(|e| e.is_not_found()) => {
                debug!(application = name, "Application no longer exists remotely");
                self.registry.set_cloud_application(id, None)?;
                self.registry.set_stats(id, None, None)?;
            }
            Err(error) => return Err(error),
        }
        Ok(())
    }

    /// Re-fetch instance stats for one module. Stats of a just started application may still be
    /// staging, so those fetches wait staging out.
    pub async fn refresh_instances(&self, id: ModuleId) -> DeployResult<()> {
        let module = self
            .registry
            .module(id)
            .ok_or_else(|| DeployError::ModuleNotFound(id.to_string()))?;
        let name = module.deployed_name();

        let policy: Arc<dyn RetryPolicy> = Arc::new(StagingAware::new(self.requests.retry_interval()));
        let stats = self
            .behaviour_request(format!("stats for {name}"), Arc::clone(&policy))
            .run(|client| async move { client.application_stats(name).await })
            .await?;
        let instances = self
            .behaviour_request(format!("instances for {name}"), policy)
            .run(|client| async move { client.application_instances(name).await })
            .await?;

        debug!(application = name, running = stats.running(), "Refreshed instance stats");
        self.registry.set_stats(id, Some(stats), Some(instances))
    }

    pub fn is_running(&self) -> bool {
        self.worker
            .lock()
            .as_ref()
            .is_some_and(|(_, handle)| !handle.is_finished())
    }

    /// Start the periodic cycle; returns `false` if disabled or already running
    pub fn start(self: &Arc<Self>) -> bool {
        if !self.enabled {
            debug!(server = %self.server, "Background refresh disabled");
            return false;
        }

        let mut worker = self.worker.lock();
        if worker.as_ref().is_some_and(|(_, handle)| !handle.is_finished()) {
            return false;
        }

        let token = CancellationToken::new();
        let controller = Arc::clone(self);
        let shutdown = token.clone();
        let handle = tokio::spawn(async move {
            let start = tokio::time::Instant::now() + controller.interval;
            let mut ticker = tokio::time::interval_at(start, controller.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let Ok(_pass) = Arc::clone(&controller.gate).try_write_owned() else {
                            debug!(server = %controller.server, "Skipping refresh pass while paused");
                            continue;
                        };
                        controller.refresh_all().await;
                    }
                }
            }
            debug!(server = %controller.server, "Background refresh loop exited");
        });

        *worker = Some((token, handle));
        info!(
            server = %self.server,
            interval_ms = self.interval.as_millis() as u64,
            "🔄 Started background refresh"
        );
        true
    }

    /// Stop the periodic cycle and wait for an in-flight pass to finish
    pub async fn shutdown(&self) {
        let worker = self.worker.lock().take();
        if let Some((token, handle)) = worker {
            token.cancel();
            if let Err(error) = handle.await {
                warn!(server = %self.server, error = %error, "Background refresh task ended abnormally");
            }
            info!(server = %self.server, "Stopped background refresh");
        }
    }
}

/// Holds the background refresh paused; dropping it releases the pause
#[derive(Debug)]
pub struct RefreshPauseGuard {
    controller: Arc<RefreshController>,
    _gate: OwnedRwLockReadGuard<()>,
}

impl Drop for RefreshPauseGuard {
    fn drop(&mut self) {
        self.controller.release_pause();
    }
}
