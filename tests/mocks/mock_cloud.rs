//! Scripted Cloud Controller
//!
//! An in-memory cloud controller that records every call in order and can be told to fail the
//! next calls with authentication or connection errors, or to keep applications staging or in
//! the `updating` state for a number of polls after they are started.

use async_trait::async_trait;
use cf_deploy_core::archive::UploadArchive;
use cf_deploy_core::client::{
    AppState, ApplicationStats, CloudApplication, CloudClient, CloudClientFactory,
    CloudCredentials, CloudDomain, CloudSpace, CreateApplicationRequest, InstanceInfo,
    InstanceState, InstanceStats, InstancesInfo, StartingInfo, UploadStatusCallback,
};
use cf_deploy_core::error::ClientError;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Recorded calls and scripted behaviour of the mock controller
#[derive(Debug, Default, Clone)]
pub struct MockCloudState {
    /// Every call in the order it was made, as `operation:argument`
    pub calls: Vec<String>,
    /// Deployed applications by name, as stored (not as reported while starting)
    pub applications: HashMap<String, CloudApplication>,
    /// Applications with a start command in flight, and how often each was fetched since
    pub starting: HashMap<String, u32>,
    /// Fetches after a start that still report `updating`
    pub updating_polls: u32,
    /// Fetches after a start rejected because the platform is still staging
    pub staging_polls: u32,
    /// Started applications never report `started`
    pub never_start: bool,
    /// How long listing applications takes
    pub list_delay: Option<Duration>,
    /// Fail the next N non-login calls as unauthorized
    pub auth_failures: u32,
    /// Fail the next N non-login calls with a connection error
    pub connection_failures: u32,
    /// Every login attempt is rejected
    pub reject_login: bool,
    pub login_count: u32,
    /// Content hashes already held remotely
    pub remote_hashes: HashSet<String>,
    /// Entry names actually transmitted, per upload
    pub uploads: Vec<(String, Vec<String>)>,
    pub deleted_services: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct MockCloudClient {
    state: Arc<Mutex<MockCloudState>>,
}

impl MockCloudClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared_state(&self) -> Arc<Mutex<MockCloudState>> {
        Arc::clone(&self.state)
    }

    pub fn get_state(&self) -> MockCloudState {
        self.state.lock().unwrap().clone()
    }

    pub fn with_application(self, application: CloudApplication) -> Self {
        self.state
            .lock()
            .unwrap()
            .applications
            .insert(application.name.clone(), application);
        self
    }

    pub fn with_updating_polls(self, polls: u32) -> Self {
        self.state.lock().unwrap().updating_polls = polls;
        self
    }

    pub fn with_staging_polls(self, polls: u32) -> Self {
        self.state.lock().unwrap().staging_polls = polls;
        self
    }

    pub fn with_list_delay(self, delay: Duration) -> Self {
        self.state.lock().unwrap().list_delay = Some(delay);
        self
    }

    pub fn never_starting(self) -> Self {
        self.state.lock().unwrap().never_start = true;
        self
    }

    pub fn fail_next_with_auth(&self, count: u32) {
        self.state.lock().unwrap().auth_failures = count;
    }

    pub fn fail_next_with_connection(&self, count: u32) {
        self.state.lock().unwrap().connection_failures = count;
    }

    pub fn reject_login(&self) {
        self.state.lock().unwrap().reject_login = true;
    }

    pub fn remove_application(&self, name: &str) {
        self.state.lock().unwrap().applications.remove(name);
    }

    pub fn call_count(&self, call: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|recorded| recorded.as_str() == call)
            .count()
    }

    /// Position of the first recorded `call`
    pub fn position(&self, call: &str) -> Option<usize> {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .position(|recorded| recorded.as_str() == call)
    }

    /// Record a call and apply any scripted failure
    fn enter(&self, call: String) -> Result<(), ClientError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(call);
        if state.auth_failures > 0 {
            state.auth_failures -= 1;
            return Err(ClientError::Unauthorized("token expired".to_string()));
        }
        if state.connection_failures > 0 {
            state.connection_failures -= 1;
            return Err(ClientError::Connection("connection reset".to_string()));
        }
        Ok(())
    }

    fn with_app<T>(
        &self,
        name: &str,
        f: impl FnOnce(&mut CloudApplication) -> T,
    ) -> Result<T, ClientError> {
        let mut state = self.state.lock().unwrap();
        state
            .applications
            .get_mut(name)
            .map(f)
            .ok_or_else(|| ClientError::NotFound(name.to_string()))
    }

    fn begin_start(&self, name: &str) -> Result<StartingInfo, ClientError> {
        let mut state = self.state.lock().unwrap();
        if !state.applications.contains_key(name) {
            return Err(ClientError::NotFound(name.to_string()));
        }
        state.starting.insert(name.to_string(), 0);
        Ok(StartingInfo {
            staging_file: Some(format!("logs/{name}/staging_task.log")),
        })
    }
}

#[async_trait]
impl CloudClient for MockCloudClient {
    async fn login(&self) -> Result<(), ClientError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("login".to_string());
        state.login_count += 1;
        if state.reject_login {
            return Err(ClientError::Unauthorized("bad credentials".to_string()));
        }
        Ok(())
    }

    async fn applications(&self) -> Result<Vec<CloudApplication>, ClientError> {
        self.enter("applications".to_string())?;
        let delay = self.state.lock().unwrap().list_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let state = self.state.lock().unwrap();
        let mut applications: Vec<_> = state.applications.values().cloned().collect();
        applications.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(applications)
    }

    async fn application(&self, name: &str) -> Result<CloudApplication, ClientError> {
        self.enter(format!("application:{name}"))?;
        let mut state = self.state.lock().unwrap();
        let mut application = state
            .applications
            .get(name)
            .cloned()
            .ok_or_else(|| ClientError::NotFound(name.to_string()))?;

        let updating_polls = state.updating_polls;
        let staging_polls = state.staging_polls;
        let never_start = state.never_start;
        if let Some(polls) = state.starting.get_mut(name) {
            *polls += 1;
            if *polls <= staging_polls {
                return Err(ClientError::StagingNotFinished { app: name.to_string() });
            }
            if never_start || *polls <= updating_polls {
                application.state = AppState::Updating;
            } else {
                application.state = AppState::Started;
                application.running_instances = application.instances;
            }
        }
        Ok(application)
    }

    async fn create_application(&self, request: &CreateApplicationRequest) -> Result<(), ClientError> {
        self.enter(format!("create_application:{}", request.name))?;
        let mut application = CloudApplication::new(request.name.clone(), AppState::Stopped);
        application.memory_mb = request.memory_mb;
        application.uris = request.uris.clone();
        application.services = request.services.clone();
        application.staging = request.staging.clone();
        self.state
            .lock()
            .unwrap()
            .applications
            .insert(request.name.clone(), application);
        Ok(())
    }

    async fn upload_application(
        &self,
        name: &str,
        archive: &dyn UploadArchive,
        callback: &dyn UploadStatusCallback,
    ) -> Result<(), ClientError> {
        self.enter(format!("upload_application:{name}"))?;
        self.with_app(name, |_| ())?;

        callback.on_check_resources();
        let matched: HashSet<String> = {
            let state = self.state.lock().unwrap();
            archive
                .manifest()
                .iter()
                .filter(|entry| state.remote_hashes.contains(&entry.sha))
                .map(|entry| entry.name.clone())
                .collect()
        };
        callback.on_matched_file_names(&matched);
        if callback.should_cancel() {
            return Err(ClientError::Upload("upload cancelled".to_string()));
        }

        let bundle = archive
            .materialize()
            .map_err(|error| ClientError::Upload(error.to_string()))?;
        callback.on_process_matched_resources(bundle.total_bytes());

        let mut state = self.state.lock().unwrap();
        state
            .remote_hashes
            .extend(archive.manifest().iter().map(|entry| entry.sha.clone()));
        let names = bundle.names().into_iter().map(str::to_string).collect();
        state.uploads.push((name.to_string(), names));
        Ok(())
    }

    async fn start_application(&self, name: &str) -> Result<StartingInfo, ClientError> {
        self.enter(format!("start_application:{name}"))?;
        self.begin_start(name)
    }

    async fn debug_application(&self, name: &str) -> Result<StartingInfo, ClientError> {
        self.enter(format!("debug_application:{name}"))?;
        self.begin_start(name)
    }

    async fn stop_application(&self, name: &str) -> Result<(), ClientError> {
        self.enter(format!("stop_application:{name}"))?;
        self.state.lock().unwrap().starting.remove(name);
        self.with_app(name, |app| {
            app.state = AppState::Stopped;
            app.running_instances = 0;
        })
    }

    async fn delete_application(&self, name: &str) -> Result<(), ClientError> {
        self.enter(format!("delete_application:{name}"))?;
        let mut state = self.state.lock().unwrap();
        state.starting.remove(name);
        state
            .applications
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| ClientError::NotFound(name.to_string()))
    }

    async fn update_application_instances(&self, name: &str, instances: u32) -> Result<(), ClientError> {
        self.enter(format!("update_application_instances:{name}:{instances}"))?;
        self.with_app(name, |app| app.instances = instances)
    }

    async fn update_application_memory(&self, name: &str, memory_mb: u64) -> Result<(), ClientError> {
        self.enter(format!("update_application_memory:{name}:{memory_mb}"))?;
        self.with_app(name, |app| app.memory_mb = memory_mb)
    }

    async fn update_application_uris(&self, name: &str, uris: &[String]) -> Result<(), ClientError> {
        self.enter(format!("update_application_uris:{name}"))?;
        self.with_app(name, |app| app.uris = uris.to_vec())
    }

    async fn update_application_env(
        &self,
        name: &str,
        env: &BTreeMap<String, String>,
    ) -> Result<(), ClientError> {
        self.enter(format!("update_application_env:{name}"))?;
        self.with_app(name, |app| app.env = env.clone())
    }

    async fn update_application_services(
        &self,
        name: &str,
        services: &[String],
    ) -> Result<(), ClientError> {
        self.enter(format!("update_application_services:{name}"))?;
        self.with_app(name, |app| app.services = services.to_vec())
    }

    async fn delete_service(&self, service: &str) -> Result<(), ClientError> {
        self.enter(format!("delete_service:{service}"))?;
        self.state
            .lock()
            .unwrap()
            .deleted_services
            .push(service.to_string());
        Ok(())
    }

    async fn application_stats(&self, name: &str) -> Result<ApplicationStats, ClientError> {
        self.enter(format!("application_stats:{name}"))?;
        let running = self.with_app(name, |app| app.instances)?;
        Ok(ApplicationStats {
            records: (0..running)
                .map(|index| InstanceStats {
                    index,
                    state: InstanceState::Running,
                    cpu_percent: 1.5,
                    memory_bytes: 64 * 1024 * 1024,
                    uptime_secs: 30,
                })
                .collect(),
        })
    }

    async fn application_instances(&self, name: &str) -> Result<InstancesInfo, ClientError> {
        self.enter(format!("application_instances:{name}"))?;
        let count = self.with_app(name, |app| app.instances)?;
        Ok(InstancesInfo {
            instances: (0..count)
                .map(|index| InstanceInfo {
                    index,
                    state: InstanceState::Running,
                    since: None,
                    debug_port: None,
                })
                .collect(),
        })
    }

    async fn domains(&self) -> Result<Vec<CloudDomain>, ClientError> {
        self.enter("domains".to_string())?;
        Ok(vec![CloudDomain {
            name: "apps.example.com".to_string(),
        }])
    }

    async fn spaces(&self) -> Result<Vec<CloudSpace>, ClientError> {
        self.enter("spaces".to_string())?;
        Ok(vec![CloudSpace {
            name: "development".to_string(),
            organization: "example".to_string(),
        }])
    }
}

/// Hands out the same scripted client for every set of credentials
#[derive(Debug, Clone)]
pub struct MockClientFactory {
    client: MockCloudClient,
    created: Arc<Mutex<Vec<String>>>,
}

impl MockClientFactory {
    pub fn new(client: MockCloudClient) -> Self {
        Self {
            client,
            created: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// URLs of every client created so far
    pub fn created(&self) -> Vec<String> {
        self.created.lock().unwrap().clone()
    }
}

impl CloudClientFactory for MockClientFactory {
    fn create(&self, credentials: &CloudCredentials) -> Result<Arc<dyn CloudClient>, ClientError> {
        self.created.lock().unwrap().push(credentials.url.clone());
        Ok(Arc::new(self.client.clone()))
    }
}
