use super::{byte_len, content_hash, BundleEntry, ManifestEntry, UploadArchive, UploadBundle};
use crate::error::DeployResult;
use crate::framework::{DeltaKind, ResourceDelta, ResourceSource};
use parking_lot::Mutex;
use std::collections::HashSet;
use tracing::debug;

#[derive(Debug)]
struct DeltaEntry {
    source: ResourceSource,
    /// Content read while hashing; present for added and changed resources
    content: Option<Vec<u8>>,
}

/// Incremental archive built from the resource delta since the last publish
///
/// Removed resources are dropped from the manifest. Unchanged resources keep the hash recorded
/// at the last publish and are only read if the remote side does not match them.
#[derive(Debug)]
pub struct DeltaArchive {
    filename: String,
    manifest: Vec<ManifestEntry>,
    entries: Vec<DeltaEntry>,
    matched: Mutex<HashSet<String>>,
}

impl DeltaArchive {
    pub fn from_deltas(filename: impl Into<String>, deltas: Vec<ResourceDelta>) -> DeployResult<Self> {
        let mut manifest = Vec::with_capacity(deltas.len());
        let mut entries = Vec::with_capacity(deltas.len());

        for delta in deltas {
            let ResourceDelta {
                resource,
                kind,
                published_hash,
            } = delta;

            let (sha, size, content) = match (kind, published_hash) {
                (DeltaKind::Removed, _) => continue,
                (DeltaKind::NoChange, Some(hash)) => (hash, resource.source.size()?, None),
                _ => {
                    let content = resource.source.read()?;
                    (content_hash(&content), byte_len(&content), Some(content))
                }
            };

            manifest.push(ManifestEntry {
                name: resource.path,
                sha,
                size,
            });
            entries.push(DeltaEntry {
                source: resource.source,
                content,
            });
        }

        Ok(Self {
            filename: filename.into(),
            manifest,
            entries,
            matched: Mutex::new(HashSet::new()),
        })
    }

    /// Entries whose content was read because they changed since the last publish
    pub fn changed_count(&self) -> usize {
        self.entries.iter().filter(|e| e.content.is_some()).count()
    }
}

impl UploadArchive for DeltaArchive {
    fn filename(&self) -> &str {
        &self.filename
    }

    fn manifest(&self) -> &[ManifestEntry] {
        &self.manifest
    }

    fn record_matched(&self, matched: &HashSet<String>) {
        *self.matched.lock() = matched.clone();
    }

    fn materialize(&self) -> std::io::Result<UploadBundle> {
        let matched = self.matched.lock();
        let mut bundle = UploadBundle::default();

        for (manifest, entry) in self.manifest.iter().zip(&self.entries) {
            if matched.contains(&manifest.name) {
                continue;
            }
            let content = match &entry.content {
                Some(content) => content.clone(),
                None => {
                    debug!(entry = %manifest.name, "Unchanged entry not held remotely, reading content");
                    entry.source.read()?
                }
            };
            bundle.entries.push(BundleEntry {
                name: manifest.name.clone(),
                content,
            });
        }
        Ok(bundle)
    }
}
