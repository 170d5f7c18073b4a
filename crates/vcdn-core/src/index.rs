//! Derived indexes: `versions.json`, `_index/index.json` and the bundle.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, warn};
use vcdn_schema::{
    BundleManifest, Channel, GlobalIndex, Meta, VersionEntry, VersionIndex, VersionManifest,
};

use crate::io::{self as fsio, JsonFileError};
use crate::layout::{INDEX_DIR, Layout};

#[derive(Error, Debug)]
pub enum IndexError {
    #[error(transparent)]
    Json(#[from] JsonFileError),

    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone)]
pub struct IndexMaintainer {
    layout: Layout,
}

impl IndexMaintainer {
    pub fn new(layout: Layout) -> Self {
        Self { layout }
    }

    pub fn versions(&self, package: &str) -> Result<VersionIndex, IndexError> {
        Ok(fsio::read_json(&self.layout.versions_json(package))?.unwrap_or_default())
    }

    pub fn global(&self) -> Result<GlobalIndex, IndexError> {
        Ok(fsio::read_json(&self.layout.index_json())?.unwrap_or_default())
    }

    /// Upsert a published version into the package's version index and
    /// refresh its row in the global index.
    pub fn record_publish(
        &self,
        package: &str,
        version: &str,
        channel: Option<Channel>,
        built_at: DateTime<Utc>,
        meta: Option<Meta>,
    ) -> Result<VersionIndex, IndexError> {
        let mut versions = self.versions(package)?;
        versions.upsert(VersionEntry {
            version: version.to_string(),
            channel,
            built_at,
        });
        fsio::write_json_atomic(&self.layout.versions_json(package), &versions)?;

        let mut global = self.global()?;
        global.refresh(package, &versions, meta);
        fsio::write_json_atomic(&self.layout.index_json(), &global)?;

        debug!(package, version, entries = versions.len(), "index updated");
        Ok(versions)
    }

    /// Regenerate `_index/bundle-manifest.json` from the version directories
    /// on disk. Pointer and alias directories are recognised by their
    /// manifest naming a different version than the directory itself.
    pub fn rebuild_bundle(&self) -> Result<BundleManifest, IndexError> {
        let mut bundle = BundleManifest {
            generated_at: Some(Utc::now()),
            index: self.global()?,
            packages: BTreeMap::new(),
        };

        for package_dir in subdirs(self.layout.root())? {
            let Some(package) = dir_name(&package_dir) else {
                continue;
            };
            if package == INDEX_DIR || package.starts_with('.') {
                continue;
            }

            let mut versions = BTreeMap::new();
            for version_dir in subdirs(&package_dir)? {
                let Some(label) = dir_name(&version_dir).filter(|n| n.starts_with('v')) else {
                    continue;
                };
                if let Some(manifest) = read_manifest(&version_dir) {
                    if manifest.version == label {
                        versions.insert(label, manifest);
                    }
                }
            }
            if !versions.is_empty() {
                bundle.packages.insert(package, versions);
            }
        }

        fsio::write_json_atomic(&self.layout.bundle_json(), &bundle)?;
        debug!(manifests = bundle.manifest_count(), "bundle manifest rebuilt");
        Ok(bundle)
    }
}

fn subdirs(dir: &Path) -> Result<Vec<PathBuf>, IndexError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(IndexError::Io {
                path: dir.to_path_buf(),
                source,
            });
        }
    };
    let mut dirs: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();
    dirs.sort();
    Ok(dirs)
}

fn dir_name(path: &Path) -> Option<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
}

fn read_manifest(dir: &Path) -> Option<VersionManifest> {
    match fsio::read_json(&Layout::manifest_path(dir)) {
        Ok(found) => found,
        Err(e) => {
            warn!(error = %e, "skipping unreadable manifest");
            None
        }
    }
}
