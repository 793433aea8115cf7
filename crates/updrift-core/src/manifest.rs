//! The `RELEASES` manifest codec.
//!
//! A manifest is a plain text file, one release entry per line:
//! `<sha1> <filename-or-url> <filesize>[ # <percent>%]`. Blank and
//! comment-only lines are skipped; a line failing the core grammar aborts
//! the whole parse - there is no partial-success manifest. Serialization
//! orders entries ascending by version with delta entries before full
//! entries of the same version, and files are always replaced atomically.

use crate::entry::{ReleaseEntry, StagingUserId};
use anyhow::Context;
use percent_encoding::percent_decode_str;
use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;
use tokio::task::JoinSet;
use tracing::{debug, info};
use updrift_schema::{PACKAGE_EXTENSION, Sha1Hash};

/// Canonical manifest filename within a release directory or feed.
pub const MANIFEST_FILE_NAME: &str = "RELEASES";

static ENTRY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([0-9a-fA-F]{40})\s+(\S+)\s+(\d+)\s*$").unwrap());

static COMMENT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s*#.*$").unwrap());

// Tested against the raw line, before comment stripping: the staging
// marker is itself a trailing comment.
static STAGING_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"#\s+(\d{1,3})%$").unwrap());

/// Errors produced by the manifest codec.
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    /// A line matched neither the blank/comment shape nor the core grammar.
    #[error("invalid release entry: `{0}`")]
    MalformedLine(String),

    /// The location field was an absolute URL that could not be split into
    /// base and filename.
    #[error("invalid URL in release entry: `{0}`")]
    InvalidUrl(String),

    /// The location field was neither an absolute http(s) URL nor a legal
    /// bare filename.
    #[error("filename must be a bare file name or an absolute http(s) URL: `{0}`")]
    IllegalFilename(String),

    /// Serializing zero entries is a caller error, distinct from any
    /// malformed-entry condition.
    #[error("cannot serialize an empty manifest")]
    Empty,

    /// Entry-level validation failed.
    #[error(transparent)]
    Entry(#[from] crate::entry::EntryError),
}

/// Parse a single manifest line.
///
/// Returns `Ok(None)` for blank and comment-only lines - a normal outcome
/// during file parsing, not a failure.
///
/// # Errors
///
/// Returns [`ManifestError::MalformedLine`] when the core grammar does not
/// match, and URL/filename errors per the location field rules.
pub fn parse_line(line: &str) -> Result<Option<ReleaseEntry>, ManifestError> {
    // Staging must be read off the raw line first; comment stripping below
    // would otherwise eat the marker.
    let staging_percentage = STAGING_RE
        .captures(line)
        .map(|caps| caps[1].parse::<f32>().unwrap_or(0.0) / 100.0);

    let line = COMMENT_RE.replace(line, "");
    if line.trim().is_empty() {
        return Ok(None);
    }

    let caps = ENTRY_RE
        .captures(&line)
        .ok_or_else(|| ManifestError::MalformedLine(line.to_string()))?;

    // The core grammar already guarantees 40 hex characters.
    let sha1 = Sha1Hash::validated(&caps[1])
        .map_err(|_| ManifestError::MalformedLine(line.to_string()))?;
    let location = &caps[2];
    let filesize: u64 = caps[3]
        .parse()
        .map_err(|_| ManifestError::MalformedLine(line.to_string()))?;

    let (base_url, filename, query) = split_location(location)?;

    Ok(Some(ReleaseEntry::new(
        sha1,
        filename,
        filesize,
        base_url,
        query,
        staging_percentage,
    )?))
}

/// Split the location field into `(base_url, filename, query)`.
///
/// Absolute http(s) URLs split at the last path separator; the filename
/// segment is percent-decoded. Anything else must be a legal bare
/// filename.
fn split_location(
    location: &str,
) -> Result<(Option<String>, String, Option<String>), ManifestError> {
    if is_http_url(location) {
        let url = url::Url::parse(location)
            .map_err(|_| ManifestError::InvalidUrl(location.to_string()))?;

        // scheme://authority/path, without query or fragment.
        let without_query = &url[..url::Position::AfterPath];
        let split = without_query
            .rfind('/')
            .ok_or_else(|| ManifestError::InvalidUrl(location.to_string()))?;

        let base = &without_query[..split];
        let encoded_name = &without_query[split + 1..];
        if encoded_name.is_empty() || base.is_empty() {
            return Err(ManifestError::InvalidUrl(location.to_string()));
        }

        let filename = percent_decode_str(encoded_name)
            .decode_utf8()
            .map_err(|_| ManifestError::InvalidUrl(location.to_string()))?
            .into_owned();

        return Ok((
            Some(base.to_string()),
            filename,
            url.query().map(str::to_string),
        ));
    }

    // A non-URL location containing path-illegal characters signals a
    // malformed manifest, not a legitimate remote reference.
    if location.chars().any(is_illegal_filename_char) {
        return Err(ManifestError::IllegalFilename(location.to_string()));
    }

    Ok((None, location.to_string(), None))
}

fn is_http_url(s: &str) -> bool {
    let lower = s.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

fn is_illegal_filename_char(c: char) -> bool {
    matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|') || c.is_control()
}

/// Parse the full text of a `RELEASES` manifest.
///
/// A leading byte-order mark is tolerated and stripped; blank and
/// comment-only lines yield no entries. Empty input yields an empty list.
///
/// # Errors
///
/// Any line failing the core grammar is fatal for the whole parse.
pub fn parse_manifest(text: &str) -> Result<Vec<ReleaseEntry>, ManifestError> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);

    let mut entries = Vec::new();
    for line in text.split('\n') {
        if line.trim().is_empty() {
            continue;
        }
        if let Some(entry) = parse_line(line)? {
            entries.push(entry);
        }
    }
    Ok(entries)
}

/// Parse a manifest and drop entries the given user is not staged into.
///
/// Staging filtering never raises; ineligible entries are simply omitted.
///
/// # Errors
///
/// Same failure modes as [`parse_manifest`].
pub fn parse_manifest_with_staging(
    text: &str,
    user: Option<&StagingUserId>,
) -> Result<Vec<ReleaseEntry>, ManifestError> {
    let entries = parse_manifest(text)?;
    Ok(entries
        .into_iter()
        .filter(|e| e.is_staging_eligible(user))
        .collect())
}

/// Serialize entries into manifest text: ascending by version, delta
/// entries before full entries of the same version, lines joined by a
/// single line feed with no trailing terminator.
///
/// # Errors
///
/// Returns [`ManifestError::Empty`] for an empty entry set.
pub fn serialize_manifest(entries: &[ReleaseEntry]) -> Result<String, ManifestError> {
    if entries.is_empty() {
        return Err(ManifestError::Empty);
    }

    let mut sorted: Vec<&ReleaseEntry> = entries.iter().collect();
    sorted.sort_by(|a, b| {
        a.version()
            .cmp(&b.version())
            .then_with(|| b.is_delta().cmp(&a.is_delta()))
    });

    Ok(sorted
        .iter()
        .map(|e| e.to_line())
        .collect::<Vec<_>>()
        .join("\n"))
}

/// Load and parse a manifest file.
///
/// # Errors
///
/// Fails when the file cannot be read or its contents do not parse.
pub async fn load_manifest(path: &Path) -> anyhow::Result<Vec<ReleaseEntry>> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    Ok(parse_manifest(&text)?)
}

/// Atomically persist entries as a manifest file at the given path.
///
/// The text is written to a temporary sibling first and then moved into
/// place, so readers never observe a partially written manifest.
///
/// # Errors
///
/// Fails on serialization or file system errors.
pub async fn write_manifest(path: &Path, entries: &[ReleaseEntry]) -> anyhow::Result<()> {
    let text = serialize_manifest(entries)?;
    replace_file_atomically(path, &text).await
}

async fn replace_file_atomically(path: &Path, contents: &str) -> anyhow::Result<()> {
    let temp_path = path.with_extension("tmp");
    tokio::fs::write(&temp_path, contents)
        .await
        .with_context(|| format!("failed to write {}", temp_path.display()))?;
    if tokio::fs::try_exists(path).await.unwrap_or(false) {
        tokio::fs::remove_file(path)
            .await
            .with_context(|| format!("failed to remove {}", path.display()))?;
    }
    tokio::fs::rename(&temp_path, path)
        .await
        .with_context(|| format!("failed to move manifest into {}", path.display()))?;
    Ok(())
}

/// Scan a directory of release packages and rebuild its `RELEASES` file.
///
/// Every package-extension file is hashed independently; the hashing fans
/// out across blocking tasks and the results are collected before the
/// single-threaded serialize-and-replace step. A directory without
/// packages still gets an (empty) manifest file, matching what publishers
/// expect after deleting their last release.
///
/// # Errors
///
/// Fails when the directory cannot be read, any package cannot be hashed,
/// or the manifest cannot be written.
pub async fn build_from_directory(dir: &Path) -> anyhow::Result<Vec<ReleaseEntry>> {
    let mut read_dir = tokio::fs::read_dir(dir)
        .await
        .with_context(|| format!("failed to read release directory {}", dir.display()))?;

    let mut packages = Vec::new();
    while let Some(dirent) = read_dir.next_entry().await? {
        let path = dirent.path();
        let is_package = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(PACKAGE_EXTENSION));
        if is_package && dirent.file_type().await?.is_file() {
            packages.push(path);
        }
    }

    debug!(dir = %dir.display(), count = packages.len(), "hashing release packages");

    // Fan-out: each file hash is independent and produces an immutable
    // entry; fan-in collects them before anything touches the manifest.
    let mut set = JoinSet::new();
    for path in packages {
        set.spawn_blocking(move || ReleaseEntry::from_package_file(&path, None));
    }

    let mut entries = Vec::new();
    while let Some(joined) = set.join_next().await {
        entries.push(joined.context("hash task panicked")??);
    }

    entries.sort_by(|a, b| {
        a.version()
            .cmp(&b.version())
            .then_with(|| b.is_delta().cmp(&a.is_delta()))
    });

    let text = if entries.is_empty() {
        String::new()
    } else {
        serialize_manifest(&entries)?
    };

    let target = dir.join(MANIFEST_FILE_NAME);
    replace_file_atomically(&target, &text).await?;

    info!(manifest = %target.display(), entries = entries.len(), "manifest rebuilt");
    Ok(entries)
}
