//! Archive handling: zip release assets and gzipped repository tarballs.

use std::fs;
use std::io::{self, Cursor, Read};
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use thiserror::Error;
use tracing::warn;
use zip::ZipArchive;

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Archive error: {0}")]
    Archive(String),

    #[error("Unsafe path in archive: {0}")]
    UnsafePath(String),

    #[error("Expected exactly one top-level directory, found {0}")]
    Layout(usize),
}

/// A file read out of an archive, with a `/`-separated relative name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub name: String,
    pub bytes: Vec<u8>,
}

/// Whether an asset should be treated as a zip archive.
pub fn is_zip(name: &str, bytes: &[u8]) -> bool {
    name.to_ascii_lowercase().ends_with(".zip") || bytes.starts_with(b"PK\x03\x04")
}

/// Read every file of an in-memory zip. Directory entries are skipped;
/// entries whose name escapes the archive root are dropped with a warning.
pub fn zip_entries(bytes: &[u8]) -> Result<Vec<ArchiveEntry>, ArchiveError> {
    let mut archive =
        ZipArchive::new(Cursor::new(bytes)).map_err(|e| ArchiveError::Archive(e.to_string()))?;

    let mut entries = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let mut file = archive
            .by_index(i)
            .map_err(|e| ArchiveError::Archive(e.to_string()))?;
        if file.is_dir() {
            continue;
        }
        let Some(relative) = file.enclosed_name() else {
            warn!(entry = file.name(), "skipping zip entry outside archive root");
            continue;
        };
        let name = to_slash(&relative);

        let mut data = Vec::with_capacity(usize::try_from(file.size()).unwrap_or(0));
        file.read_to_end(&mut data)?;
        entries.push(ArchiveEntry { name, bytes: data });
    }
    Ok(entries)
}

/// Unpack a `.tar.gz` held in memory into `dest_dir`.
///
/// Only regular files and directories are written. Any entry with an
/// absolute path or a `..` component aborts the extraction.
pub fn extract_tar_gz(bytes: &[u8], dest_dir: &Path) -> Result<(), ArchiveError> {
    fs::create_dir_all(dest_dir)?;
    let mut archive = tar::Archive::new(GzDecoder::new(bytes));

    for entry in archive.entries()? {
        let mut entry = entry?;
        let entry_type = entry.header().entry_type();
        if !entry_type.is_file() && !entry_type.is_dir() {
            continue;
        }

        let entry_path = entry.path()?.into_owned();
        let relative = sanitize(&entry_path)?;
        let absolute_path = dest_dir.join(&relative);

        if entry_type.is_dir() {
            fs::create_dir_all(&absolute_path)?;
            continue;
        }
        if let Some(parent) = absolute_path.parent() {
            fs::create_dir_all(parent)?;
        }
        entry.unpack(&absolute_path)?;
    }
    Ok(())
}

/// The only directory directly under `dir`, ignoring hidden entries.
pub fn single_top_level_dir(dir: &Path) -> Result<PathBuf, ArchiveError> {
    let entries: Vec<_> = fs::read_dir(dir)?
        .filter_map(Result::ok)
        .filter(|e| !e.file_name().to_string_lossy().starts_with('.'))
        .collect();

    match entries.as_slice() {
        [only] if only.file_type()?.is_dir() => Ok(only.path()),
        other => Err(ArchiveError::Layout(other.len())),
    }
}

fn sanitize(path: &Path) -> Result<PathBuf, ArchiveError> {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            _ => return Err(ArchiveError::UnsafePath(path.display().to_string())),
        }
    }
    Ok(out)
}

/// `/`-joined form of a relative path.
pub fn to_slash(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
