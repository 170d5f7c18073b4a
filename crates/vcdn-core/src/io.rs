//! Filesystem helpers shared by the publisher, index maintainer and state.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum JsonFileError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl JsonFileError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Read and parse a JSON file. A missing file is `Ok(None)`.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, JsonFileError> {
    let content = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(JsonFileError::io(path, e)),
    };
    serde_json::from_str(&content)
        .map(Some)
        .map_err(|source| JsonFileError::Json {
            path: path.to_path_buf(),
            source,
        })
}

/// Pretty-print `value` to `path` through a sibling temp file and a rename,
/// so readers never observe a half-written file.
pub fn write_json_atomic<T: Serialize + ?Sized>(
    path: &Path,
    value: &T,
) -> Result<(), JsonFileError> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).map_err(|e| JsonFileError::io(parent, e))?;

    let mut content = serde_json::to_vec_pretty(value).map_err(|source| JsonFileError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    content.push(b'\n');

    let mut tmp = tempfile::NamedTempFile::new_in(parent).map_err(|e| JsonFileError::io(path, e))?;
    tmp.write_all(&content)
        .map_err(|e| JsonFileError::io(path, e))?;
    tmp.persist(path)
        .map_err(|e| JsonFileError::io(path, e.error))?;
    Ok(())
}

/// Remove everything under `dir` and recreate it empty.
pub fn clear_dir(dir: &Path) -> io::Result<()> {
    match fs::remove_dir_all(dir) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    fs::create_dir_all(dir)
}

/// Recursively copy the contents of `src` into `dst`, overwriting.
pub fn copy_dir_all(src: &Path, dst: &Path) -> io::Result<()> {
    fs::create_dir_all(dst)?;
    fs_extra::dir::copy(
        src,
        dst,
        &fs_extra::dir::CopyOptions::new()
            .content_only(true)
            .overwrite(true),
    )
    .map_err(|e| io::Error::other(format!("copy {} failed: {e}", src.display())))?;
    Ok(())
}
