//! # Application Archives
//!
//! Payloads uploaded to the remote platform. Every archive exposes a manifest of all its entries
//! with content hashes; the remote side answers with the entry names it already holds (resource
//! matching), and only then does the archive materialize the bundle of entries still missing.
//!
//! - [`ApplicationArchive`] reads every resource up front (full publish).
//! - [`DeltaArchive`] hashes only resources changed since the last publish and reuses recorded
//!   hashes for the rest, reading unchanged content only if the remote side turns out not to
//!   hold it (incremental publish).

mod delta;
mod full;

pub use delta::DeltaArchive;
pub use full::ApplicationArchive;

use crate::error::{DeployError, DeployResult};
use crate::framework::{ModuleFramework, ModuleRef};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use tracing::{debug, info};

/// One line of an archive manifest
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ManifestEntry {
    pub name: String,
    pub sha: String,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleEntry {
    pub name: String,
    pub content: Vec<u8>,
}

/// The entries actually transmitted by an upload
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadBundle {
    pub entries: Vec<BundleEntry>,
}

impl UploadBundle {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|entry| entry.name.as_str()).collect()
    }

    pub fn total_bytes(&self) -> usize {
        self.entries.iter().map(|entry| entry.content.len()).sum()
    }
}

/// An upload payload negotiated by content hash
pub trait UploadArchive: Send + Sync {
    fn filename(&self) -> &str;

    fn manifest(&self) -> &[ManifestEntry];

    /// Record the entry names the remote side already holds
    fn record_matched(&self, matched: &HashSet<String>);

    /// Build the bundle of entries not recorded as matched
    fn materialize(&self) -> std::io::Result<UploadBundle>;
}

pub(crate) fn content_hash(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    format!("{:x}", hasher.finalize())
}

fn byte_len(content: &[u8]) -> u64 {
    u64::try_from(content.len()).unwrap_or(u64::MAX)
}

/// Chooses and builds the archive for a publish
pub struct ArchiveBuilder<'a> {
    framework: &'a dyn ModuleFramework,
}

impl<'a> ArchiveBuilder<'a> {
    pub fn new(framework: &'a dyn ModuleFramework) -> Self {
        Self { framework }
    }

    /// Build a delta archive when an incremental publish is requested and the unit has no
    /// nested modules; otherwise a full archive.
    pub async fn build(
        &self,
        module: &ModuleRef,
        application: &str,
        incremental: bool,
    ) -> DeployResult<Box<dyn UploadArchive>> {
        let filename = format!("{application}.zip");

        if incremental && self.framework.child_modules(module).await.is_empty() {
            let deltas = self.framework.published_delta(module).await?;
            if !deltas.is_empty() {
                let archive = DeltaArchive::from_deltas(filename, deltas)?;
                if archive.manifest().is_empty() {
                    return Err(DeployError::NoArchive(module.to_string()));
                }
                info!(
                    module = %module,
                    entries = archive.manifest().len(),
                    changed = archive.changed_count(),
                    "📦 Built delta archive"
                );
                return Ok(Box::new(archive));
            }
            debug!(module = %module, "No publish delta recorded, falling back to full archive");
        }

        let resources = self.framework.resources(module).await?;
        let archive = ApplicationArchive::from_resources(filename, &resources)?;
        if archive.manifest().is_empty() {
            return Err(DeployError::NoArchive(module.to_string()));
        }
        info!(module = %module, entries = archive.manifest().len(), "📦 Built full archive");
        Ok(Box::new(archive))
    }
}
