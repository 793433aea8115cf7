//! Package container access.
//!
//! A release package is a zip archive: one spec file and one content-types
//! file at the root plus arbitrary payload entries. Entry paths may use
//! either slash and may carry percent-escaped characters, so extraction
//! decodes each path segment independently before rejoining with the host
//! separator - mismatched encodings must never let an entry escape the
//! extraction root.

use percent_encoding::percent_decode_str;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;
use walkdir::WalkDir;
use zip::ZipArchive;
use zip::write::SimpleFileOptions;

use crate::spec::SPEC_EXTENSION;

/// Transient dir-create and file-write failures (file locks, AV scanners)
/// are retried this many times before escalating.
const EXTRACT_ATTEMPTS: u32 = 5;

/// Errors produced by container operations.
#[derive(Error, Debug)]
pub enum ContainerError {
    /// Underlying I/O failure (after retries, where applicable).
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The zip archive is unreadable or structurally invalid.
    #[error("archive error: {0}")]
    Archive(String),

    /// An entry path decodes to something outside the extraction root.
    #[error("invalid path in archive: `{0}`")]
    InvalidPath(String),

    /// The container has no root-level spec file.
    #[error("package {0} contains no spec file")]
    MissingSpec(String),
}

impl From<zip::result::ZipError> for ContainerError {
    fn from(e: zip::result::ZipError) -> Self {
        ContainerError::Archive(e.to_string())
    }
}

/// Read the single root-level `*.pspec` entry out of a package.
///
/// # Errors
///
/// Fails when the archive is unreadable or carries no spec file.
pub fn read_spec(package_path: &Path) -> Result<(String, String), ContainerError> {
    let file = File::open(package_path)?;
    let mut archive = ZipArchive::new(file)?;

    let spec_name = archive
        .file_names()
        .find(|name| {
            !name.contains('/')
                && !name.contains('\\')
                && Path::new(name)
                    .extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| e.eq_ignore_ascii_case(SPEC_EXTENSION))
        })
        .map(str::to_string)
        .ok_or_else(|| ContainerError::MissingSpec(package_path.display().to_string()))?;

    let mut entry = archive.by_name(&spec_name)?;
    let mut text = String::new();
    entry.read_to_string(&mut text)?;
    Ok((spec_name, text))
}

/// Extract every entry of a package into `dest`, decoding each path
/// segment independently.
///
/// Directory creation and file writes are retried on transient failures;
/// traversal outside `dest` is rejected outright.
///
/// # Errors
///
/// Fails on unreadable archives, illegal entry paths, or I/O errors that
/// survive the retry budget.
pub fn extract_with_escaping(package_path: &Path, dest: &Path) -> Result<(), ContainerError> {
    let file = File::open(package_path)?;
    let mut archive = ZipArchive::new(file)?;

    fs::create_dir_all(dest)?;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let raw_name = entry.name().to_string();
        let is_dir = entry.is_dir();

        let target = decode_entry_path(dest, &raw_name)?;

        if is_dir {
            retry(EXTRACT_ATTEMPTS, || fs::create_dir_all(&target))?;
            continue;
        }

        if let Some(parent) = target.parent() {
            retry(EXTRACT_ATTEMPTS, || fs::create_dir_all(parent))?;
        }

        // Read once so a write retry never has to rewind the zip stream.
        let mut bytes = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut bytes)?;
        retry(EXTRACT_ATTEMPTS, || {
            let mut out = File::create(&target)?;
            out.write_all(&bytes)
        })?;
    }

    Ok(())
}

/// Decode one entry path: split on either slash, percent-decode each
/// segment, rejoin below `dest` with the host separator.
fn decode_entry_path(dest: &Path, raw_name: &str) -> Result<PathBuf, ContainerError> {
    let mut target = dest.to_path_buf();
    for segment in raw_name.split(['/', '\\']).filter(|s| !s.is_empty()) {
        let decoded = percent_decode_str(segment)
            .decode_utf8()
            .map_err(|_| ContainerError::InvalidPath(raw_name.to_string()))?;
        if decoded == ".." || decoded == "." || decoded.contains(['/', '\\']) {
            return Err(ContainerError::InvalidPath(raw_name.to_string()));
        }
        target.push(decoded.as_ref());
    }

    if !target.starts_with(dest) || target == dest {
        return Err(ContainerError::InvalidPath(raw_name.to_string()));
    }
    Ok(target)
}

/// Zip the contents of a directory into `out_path`, overwriting any
/// existing file. Entry names use forward slashes; the walk is sorted so
/// output is deterministic for identical input trees.
///
/// # Errors
///
/// Fails on I/O or archive-write errors.
pub fn zip_directory(dir: &Path, out_path: &Path) -> Result<(), ContainerError> {
    if out_path.exists() {
        fs::remove_file(out_path)?;
    }

    let file = File::create(out_path)?;
    let mut writer = zip::ZipWriter::new(file);
    let options = SimpleFileOptions::default();

    for dirent in WalkDir::new(dir).sort_by_file_name() {
        let dirent = dirent.map_err(|e| ContainerError::Archive(e.to_string()))?;
        if !dirent.file_type().is_file() {
            continue;
        }

        let rel = dirent
            .path()
            .strip_prefix(dir)
            .map_err(|e| ContainerError::Archive(e.to_string()))?;
        let name = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        writer.start_file(name, options)?;
        let mut src = File::open(dirent.path())?;
        io::copy(&mut src, &mut writer)?;
    }

    writer.finish()?;
    Ok(())
}

/// Run `op` up to `attempts` times, returning the first success or the
/// last error.
fn retry<T>(attempts: u32, mut op: impl FnMut() -> io::Result<T>) -> io::Result<T> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op() {
            Ok(v) => return Ok(v),
            Err(e) if attempt < attempts => {
                warn!(attempt, error = %e, "transient extraction failure, retrying");
            }
            Err(e) => return Err(e),
        }
    }
}
