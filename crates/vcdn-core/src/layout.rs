//! Output tree layout.
//!
//! ```text
//! <root>/
//! ├── <package>/
//! │   ├── v1.4.0/            # immutable version directory
//! │   ├── @latest/ @stable/ @beta/
//! │   ├── v1/ v1.4/          # stable aliases
//! │   └── versions.json
//! └── _index/
//!     ├── index.json
//!     ├── bundle-manifest.json
//!     ├── external-state.json
//!     └── sync-report.json
//! ```

use std::path::{Component, Path, PathBuf};

use vcdn_schema::{MANIFEST_FILE, Target, VERSIONS_FILE};

/// Name of the directory holding the global files.
pub const INDEX_DIR: &str = "_index";

/// A directory under a package that mirrors exactly one version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pointer {
    /// `@latest`, `@stable` or `@beta`.
    Channel(Target),
    /// `v<major>`
    Major(u64),
    /// `v<major>.<minor>`
    Minor(u64, u64),
}

impl Pointer {
    /// Directory name under the package directory.
    pub fn dir_name(&self) -> String {
        match self {
            Self::Channel(target) => target.dir_name().to_string(),
            Self::Major(major) => format!("v{major}"),
            Self::Minor(major, minor) => format!("v{major}.{minor}"),
        }
    }
}

impl From<Target> for Pointer {
    fn from(target: Target) -> Self {
        Self::Channel(target)
    }
}

/// Version label (`v1.4.0`) for a bare version id (`1.4.0`).
pub fn version_label(version_id: &str) -> String {
    format!("v{version_id}")
}

/// Whether `version_id` names exactly one directory under the package.
///
/// Tags such as `foo/v1.0.0` or `..` would escape or nest below it.
pub fn is_safe_version_id(version_id: &str) -> bool {
    let mut components = Path::new(version_id).components();
    !version_id.starts_with('.')
        && !version_id.contains(['/', '\\'])
        && matches!(components.next(), Some(Component::Normal(_)))
        && components.next().is_none()
}

/// Paths inside one output root.
#[derive(Debug, Clone)]
pub struct Layout {
    root: PathBuf,
}

impl Layout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn package_dir(&self, package: &str) -> PathBuf {
        self.root.join(package)
    }

    /// Immutable directory of one version: `<root>/<package>/v<version_id>`.
    pub fn version_dir(&self, package: &str, version_id: &str) -> PathBuf {
        self.package_dir(package).join(version_label(version_id))
    }

    pub fn pointer_dir(&self, package: &str, pointer: Pointer) -> PathBuf {
        self.package_dir(package).join(pointer.dir_name())
    }

    pub fn manifest_path(dir: &Path) -> PathBuf {
        dir.join(MANIFEST_FILE)
    }

    pub fn versions_json(&self, package: &str) -> PathBuf {
        self.package_dir(package).join(VERSIONS_FILE)
    }

    pub fn index_dir(&self) -> PathBuf {
        self.root.join(INDEX_DIR)
    }

    pub fn index_json(&self) -> PathBuf {
        self.index_dir().join("index.json")
    }

    pub fn bundle_json(&self) -> PathBuf {
        self.index_dir().join("bundle-manifest.json")
    }

    pub fn state_json(&self) -> PathBuf {
        self.index_dir().join("external-state.json")
    }

    pub fn report_json(&self) -> PathBuf {
        self.index_dir().join("sync-report.json")
    }
}
