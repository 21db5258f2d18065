use super::{byte_len, content_hash, BundleEntry, ManifestEntry, UploadArchive, UploadBundle};
use crate::error::DeployResult;
use crate::framework::ModuleResource;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::path::Path;

/// Archive with every resource read and hashed up front
#[derive(Debug)]
pub struct ApplicationArchive {
    filename: String,
    manifest: Vec<ManifestEntry>,
    contents: Vec<Vec<u8>>,
    matched: Mutex<HashSet<String>>,
}

impl ApplicationArchive {
    pub fn from_resources(
        filename: impl Into<String>,
        resources: &[ModuleResource],
    ) -> DeployResult<Self> {
        let mut manifest = Vec::with_capacity(resources.len());
        let mut contents = Vec::with_capacity(resources.len());
        for resource in resources {
            let content = resource.source.read()?;
            manifest.push(ManifestEntry {
                name: resource.path.clone(),
                sha: content_hash(&content),
                size: byte_len(&content),
            });
            contents.push(content);
        }

        Ok(Self {
            filename: filename.into(),
            manifest,
            contents,
            matched: Mutex::new(HashSet::new()),
        })
    }

    /// A pre-built archive file uploaded as a single entry
    pub fn from_file(path: &Path) -> DeployResult<Self> {
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "application.zip".to_string());
        Self::from_resources(name.clone(), &[ModuleResource::file(name, path)])
    }
}

impl UploadArchive for ApplicationArchive {
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
        let entries = self
            .manifest
            .iter()
            .zip(&self.contents)
            .filter(|(entry, _)| !matched.contains(&entry.name))
            .map(|(entry, content)| BundleEntry {
                name: entry.name.clone(),
                content: content.clone(),
            })
            .collect();
        Ok(UploadBundle { entries })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resources() -> Vec<ModuleResource> {
        vec![
            ModuleResource::in_memory("index.html", b"<html/>".to_vec()),
            ModuleResource::in_memory("app.js", b"console.log(1)".to_vec()),
        ]
    }

    #[test]
    fn test_manifest_covers_all_resources() {
        let archive = ApplicationArchive::from_resources("web.zip", &resources()).unwrap();
        assert_eq!(archive.filename(), "web.zip");
        let names: Vec<_> = archive.manifest().iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["index.html", "app.js"]);
        assert_eq!(archive.manifest()[0].size, 7);
    }

    #[test]
    fn test_matched_entries_are_not_uploaded() {
        let archive = ApplicationArchive::from_resources("web.zip", &resources()).unwrap();
        archive.record_matched(&HashSet::from(["index.html".to_string()]));

        let bundle = archive.materialize().unwrap();
        assert_eq!(bundle.names(), vec!["app.js"]);
    }

    #[test]
    fn test_from_file_uses_file_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prebuilt.war");
        std::fs::write(&path, b"war-bytes").unwrap();

        let archive = ApplicationArchive::from_file(&path).unwrap();
        assert_eq!(archive.filename(), "prebuilt.war");
        assert_eq!(archive.materialize().unwrap().total_bytes(), 9);
    }
}
