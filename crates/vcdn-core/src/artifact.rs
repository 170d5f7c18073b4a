use std::collections::BTreeSet;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("two files map to the same output name '{0}'")]
pub struct DuplicateName(pub String);

/// One output file of a version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactFile {
    /// Output path inside the version directory, `/`-separated.
    pub name: String,
    pub bytes: Vec<u8>,
}

/// The files making up one version, before publishing. Names are unique.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArtifactSet {
    files: Vec<ArtifactFile>,
    names: BTreeSet<String>,
}

impl ArtifactSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, bytes: Vec<u8>) -> Result<(), DuplicateName> {
        let name = name.into();
        if !self.names.insert(name.clone()) {
            return Err(DuplicateName(name));
        }
        self.files.push(ArtifactFile { name, bytes });
        Ok(())
    }

    /// Move every file of `other` into this set.
    pub fn extend(&mut self, other: ArtifactSet) -> Result<(), DuplicateName> {
        for file in other.files {
            self.push(file.name, file.bytes)?;
        }
        Ok(())
    }

    pub fn files(&self) -> &[ArtifactFile] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn into_files(self) -> Vec<ArtifactFile> {
        self.files
    }
}
