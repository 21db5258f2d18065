//! # Remote Service Interface
//!
//! The operations this core consumes from a cloud controller client. Every call is a single
//! remote round trip; retrying, re-authentication and connectivity tracking are layered on top
//! by [`crate::resilience`].

use super::types::{
    ApplicationStats, CloudApplication, CloudDomain, CloudSpace, CreateApplicationRequest,
    InstancesInfo, StartingInfo,
};
use crate::archive::UploadArchive;
use crate::error::ClientError;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

/// Progress notifications raised by the client while uploading an archive
///
/// The client reports which manifest entries the remote side already holds before it asks the
/// archive for its payload, so an archive can build only the entries that are really missing.
pub trait UploadStatusCallback: Send + Sync {
    fn on_check_resources(&self) {}

    fn on_matched_file_names(&self, _matched: &HashSet<String>) {}

    fn on_process_matched_resources(&self, _length: usize) {}

    /// Polled by the client between upload phases; returning `true` aborts the upload
    fn should_cancel(&self) -> bool {
        false
    }
}

/// A no-op callback for uploads nobody observes
#[derive(Debug, Default)]
pub struct SilentUploadCallback;

impl UploadStatusCallback for SilentUploadCallback {}

/// Client for one cloud controller endpoint and one set of credentials
#[async_trait]
pub trait CloudClient: Send + Sync {
    async fn login(&self) -> Result<(), ClientError>;

    async fn applications(&self) -> Result<Vec<CloudApplication>, ClientError>;

    async fn application(&self, name: &str) -> Result<CloudApplication, ClientError>;

    async fn create_application(&self, request: &CreateApplicationRequest)
        -> Result<(), ClientError>;

    async fn upload_application(
        &self,
        name: &str,
        archive: &dyn UploadArchive,
        callback: &dyn UploadStatusCallback,
    ) -> Result<(), ClientError>;

    async fn start_application(&self, name: &str) -> Result<StartingInfo, ClientError>;

    /// Start the application with its debug agent enabled
    async fn debug_application(&self, name: &str) -> Result<StartingInfo, ClientError>;

    async fn stop_application(&self, name: &str) -> Result<(), ClientError>;

    async fn delete_application(&self, name: &str) -> Result<(), ClientError>;

    async fn update_application_instances(&self, name: &str, instances: u32)
        -> Result<(), ClientError>;

    async fn update_application_memory(&self, name: &str, memory_mb: u64)
        -> Result<(), ClientError>;

    async fn update_application_uris(&self, name: &str, uris: &[String])
        -> Result<(), ClientError>;

    async fn update_application_env(
        &self,
        name: &str,
        env: &BTreeMap<String, String>,
    ) -> Result<(), ClientError>;

    async fn update_application_services(
        &self,
        name: &str,
        services: &[String],
    ) -> Result<(), ClientError>;

    async fn delete_service(&self, service: &str) -> Result<(), ClientError>;

    async fn application_stats(&self, name: &str) -> Result<ApplicationStats, ClientError>;

    async fn application_instances(&self, name: &str) -> Result<InstancesInfo, ClientError>;

    async fn domains(&self) -> Result<Vec<CloudDomain>, ClientError>;

    async fn spaces(&self) -> Result<Vec<CloudSpace>, ClientError>;
}

/// Creates clients for a set of credentials
///
/// Creation is local (no network); the first remote call is `login`.
pub trait CloudClientFactory: Send + Sync {
    fn create(
        &self,
        credentials: &super::CloudCredentials,
    ) -> Result<Arc<dyn CloudClient>, ClientError>;
}
