//! Writes version directories and repoints channel and alias directories.
//!
//! `manifest.json` is the commit point of every directory written here: a
//! directory is cleared, repopulated, and only then given its manifest.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, info, warn};
use vcdn_schema::{Channel, Meta, Provenance, Target, VersionManifest};

use crate::artifact::ArtifactFile;
use crate::integrity;
use crate::io::{self as fsio, JsonFileError};
use crate::layout::{Layout, Pointer, is_safe_version_id, version_label};
use crate::version::stable_alias_parts;

#[derive(Error, Debug)]
pub enum PublishError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Json(#[from] JsonFileError),

    #[error("unsafe output file name '{0}'")]
    UnsafeName(String),

    #[error("unsafe version id '{0}'")]
    UnsafeVersion(String),

    #[error("nothing to publish for {0}")]
    Empty(String),
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> PublishError + '_ {
    move |source| PublishError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Everything needed to publish one version and the pointers that follow it.
#[derive(Debug, Clone)]
pub struct PublishRequest {
    pub package: String,
    /// Bare id, e.g. `1.4.0` or `abc1234`.
    pub version_id: String,
    pub channel: Option<Channel>,
    /// May be empty when the version directory is known to be reusable.
    pub files: Vec<ArtifactFile>,
    pub provenance: Provenance,
    pub meta: Option<Meta>,
    pub built_at: DateTime<Utc>,
    pub pointers: Vec<Target>,
}

#[derive(Debug, Clone)]
pub struct PublishOutcome {
    pub manifest: VersionManifest,
    /// The version directory already held this exact upstream release.
    pub reused: bool,
    /// Every pointer and alias directory rebuilt, in order.
    pub pointers: Vec<Pointer>,
}

#[derive(Debug, Clone)]
pub struct Publisher {
    layout: Layout,
}

impl Publisher {
    pub fn new(layout: Layout) -> Self {
        Self { layout }
    }

    /// Manifest of an already-published version, if any.
    ///
    /// A manifest that cannot be parsed counts as absent so the version is
    /// written again.
    pub fn existing_manifest(
        &self,
        package: &str,
        version_id: &str,
    ) -> Result<Option<VersionManifest>, PublishError> {
        let path = Layout::manifest_path(&self.layout.version_dir(package, version_id));
        match fsio::read_json(&path) {
            Ok(found) => Ok(found),
            Err(JsonFileError::Json { path, source }) => {
                warn!(path = %path.display(), error = %source, "discarding unreadable manifest");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn publish(&self, req: PublishRequest) -> Result<PublishOutcome, PublishError> {
        if !is_safe_version_id(&req.version_id) {
            return Err(PublishError::UnsafeVersion(req.version_id));
        }
        let existing = self.existing_manifest(&req.package, &req.version_id)?;
        let (manifest, reused) = match existing {
            Some(m) if m.upstream == req.provenance => {
                debug!(package = %req.package, version = %m.version, "version directory unchanged");
                (m, true)
            }
            _ => (self.write_version(&req)?, false),
        };

        let mut pointers: Vec<Pointer> = req.pointers.iter().copied().map(Pointer::from).collect();
        if manifest.channel == Some(Channel::Stable) {
            if let Some((major, minor)) = stable_alias_parts(&req.version_id) {
                pointers.push(Pointer::Major(major));
                pointers.push(Pointer::Minor(major, minor));
            }
        }
        pointers.retain(|p| !self.shadows_version(&req.package, *p));
        for pointer in &pointers {
            self.rebuild_pointer(&req.package, *pointer, &manifest)?;
        }

        info!(
            package = %req.package,
            version = %manifest.version,
            files = manifest.files.len(),
            pointers = ?pointers.iter().map(Pointer::dir_name).collect::<Vec<_>>(),
            reused,
            "published"
        );
        Ok(PublishOutcome {
            manifest,
            reused,
            pointers,
        })
    }

    fn write_version(&self, req: &PublishRequest) -> Result<VersionManifest, PublishError> {
        let label = version_label(&req.version_id);
        if req.files.is_empty() {
            return Err(PublishError::Empty(format!("{}@{label}", req.package)));
        }
        for file in &req.files {
            check_name(&file.name)?;
        }

        let dir = self.layout.version_dir(&req.package, &req.version_id);
        fsio::clear_dir(&dir).map_err(io_err(&dir))?;

        let mut files = BTreeMap::new();
        for file in &req.files {
            let path = dir.join(&file.name);
            write_file(&path, &file.bytes)?;
            files.insert(file.name.clone(), integrity::digest(&file.bytes));
        }

        let manifest = VersionManifest {
            package: req.package.clone(),
            version: label,
            channel: req.channel,
            built_at: req.built_at,
            upstream: req.provenance.clone(),
            meta: req.meta.clone(),
            files,
        };
        fsio::write_json_atomic(&Layout::manifest_path(&dir), &manifest)?;
        Ok(manifest)
    }

    /// Whether `pointer`'s directory is a real version directory (a
    /// non-semver id such as `1.4` collides with the `v1.4` alias).
    fn shadows_version(&self, package: &str, pointer: Pointer) -> bool {
        let dir = self.layout.pointer_dir(package, pointer);
        let clash = fsio::read_json::<VersionManifest>(&Layout::manifest_path(&dir))
            .ok()
            .flatten()
            .is_some_and(|m| m.version == pointer.dir_name());
        if clash {
            warn!(package, dir = %pointer.dir_name(), "alias would overwrite a version directory; skipped");
        }
        clash
    }

    /// Make `pointer` an exact mirror of the version `manifest` describes.
    ///
    /// The only way pointer directories are written.
    pub fn rebuild_pointer(
        &self,
        package: &str,
        pointer: Pointer,
        manifest: &VersionManifest,
    ) -> Result<(), PublishError> {
        let source = self.layout.package_dir(package).join(&manifest.version);
        let target = self.layout.pointer_dir(package, pointer);

        fsio::clear_dir(&target).map_err(io_err(&target))?;
        for name in manifest.files.keys() {
            let from = source.join(name);
            let bytes = fs::read(&from).map_err(io_err(&from))?;
            write_file(&target.join(name), &bytes)?;
        }
        fsio::write_json_atomic(&Layout::manifest_path(&target), manifest)?;
        debug!(package, pointer = %pointer.dir_name(), version = %manifest.version, "pointer rebuilt");
        Ok(())
    }
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<(), PublishError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_err(parent))?;
    }
    fs::write(path, bytes).map_err(io_err(path))
}

/// Output names must stay inside the version directory and must not shadow
/// the manifest.
fn check_name(name: &str) -> Result<(), PublishError> {
    let path = Path::new(name);
    let safe = !name.is_empty()
        && name != vcdn_schema::MANIFEST_FILE
        && path.components().all(|c| matches!(c, Component::Normal(_)));
    if safe {
        Ok(())
    } else {
        Err(PublishError::UnsafeName(name.to_string()))
    }
}
