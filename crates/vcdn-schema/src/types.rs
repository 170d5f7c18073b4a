use serde::{Deserialize, Serialize};
use std::fmt;

/// Free-form descriptive block attached to a package (description, homepage, ...).
///
/// The engine never interprets it; it is copied into manifests and the
/// global index verbatim.
pub type Meta = serde_json::Map<String, serde_json::Value>;

/// Release channel of a published version.
///
/// A version with no channel (raw-file snapshots) is represented as
/// `Option::<Channel>::None` and serialized as `null`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    /// A release without a pre-release component.
    Stable,
    /// A pre-release (`-beta.1`, `-rc.2`, ...).
    Beta,
}

impl Channel {
    /// Lowercase wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stable => "stable",
            Self::Beta => "beta",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A floating channel pointer that an upstream target drives.
///
/// Each target is tracked independently in the sync state, so a change to
/// one never forces work on the others.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Target {
    /// `@latest`: whatever the upstream considers its latest release.
    Latest,
    /// `@stable`: highest non-prerelease semantic version.
    Stable,
    /// `@beta`: highest prerelease semantic version.
    Beta,
}

impl Target {
    /// Key used in the sync state file.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Latest => "latest",
            Self::Stable => "stable",
            Self::Beta => "beta",
        }
    }

    /// Directory name of the pointer under the package directory.
    pub fn dir_name(self) -> &'static str {
        match self {
            Self::Latest => "@latest",
            Self::Stable => "@stable",
            Self::Beta => "@beta",
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}
