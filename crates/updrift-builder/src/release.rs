//! Release package construction.
//!
//! Takes a built application package, enforces release policy (valid id,
//! exactly one target platform, no dependencies), rewrites the spec and
//! content types inside a scratch directory, and re-zips the result as the
//! distribution-ready release package.

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

use updrift_core::{ReleaseEntry, select_previous_release};
use updrift_schema::{PackageIdentity, PackageVersion, PlatformTag};

use crate::container::{self, ContainerError};
use crate::content_types;
use crate::spec::{PackageSpec, SpecError, is_valid_package_id};

/// Errors produced while building a release package.
#[derive(Error, Debug)]
pub enum BuildError {
    /// The spec declares more than one target platform.
    #[error("package `{package}` targets multiple platforms ({targets}); release packages must target exactly one")]
    MultipleTargets {
        /// Package id from the spec.
        package: String,
        /// The offending targets, joined for the message.
        targets: String,
    },

    /// The spec declares no target platform at all.
    #[error("package `{0}` declares no target platform")]
    NoTarget(String),

    /// The spec still carries dependencies.
    #[error("package `{package}` has {count} dependencies; release packages must have none")]
    HasDependencies {
        /// Package id from the spec.
        package: String,
        /// Number of declared dependencies.
        count: usize,
    },

    /// The spec's package id is syntactically unacceptable.
    #[error("invalid package id `{0}`")]
    InvalidPackageId(String),

    /// Container read/extract/write failure.
    #[error(transparent)]
    Container(#[from] ContainerError),

    /// Spec file failure.
    #[error(transparent)]
    Spec(#[from] SpecError),

    /// Plain I/O failure outside the container layer.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Builds a release package out of an input application package.
///
/// Construction is lazy; nothing is read until
/// [`create_release_package`](Self::create_release_package) runs. The
/// output path is memoized, so a second call returns the already-built
/// file, and a builder constructed over an existing release package via
/// [`from_release_package`](Self::from_release_package) returns its input
/// untouched.
#[derive(Debug)]
pub struct ReleasePackageBuilder {
    input_package_file: PathBuf,
    release_package_file: Option<PathBuf>,
}

impl ReleasePackageBuilder {
    /// Builder over a not-yet-transformed application package.
    pub fn new(input_package_file: impl Into<PathBuf>) -> Self {
        Self {
            input_package_file: input_package_file.into(),
            release_package_file: None,
        }
    }

    /// Builder over a package that is already a release package;
    /// [`create_release_package`](Self::create_release_package) becomes a
    /// no-op returning this path.
    pub fn from_release_package(release_package_file: impl Into<PathBuf>) -> Self {
        let path = release_package_file.into();
        Self {
            input_package_file: path.clone(),
            release_package_file: Some(path),
        }
    }

    /// Path of the input package file.
    pub fn input_package_file(&self) -> &Path {
        &self.input_package_file
    }

    /// Path of the built release package, if built (or pre-supplied).
    pub fn release_package_file(&self) -> Option<&Path> {
        self.release_package_file.as_deref()
    }

    /// Identity decoded from the input filename. Unrecognized filenames
    /// decode to the default identity rather than failing.
    pub fn identity(&self) -> PackageIdentity {
        self.input_package_file
            .file_name()
            .and_then(|n| n.to_str())
            .map(PackageIdentity::decode)
            .and_then(Result::ok)
            .unwrap_or_default()
    }

    /// Build the release package.
    ///
    /// Policy is validated before anything is extracted or written, so a
    /// rejected package leaves no output behind. The rewrite happens in a
    /// scratch directory that is removed on every exit path;
    /// `output_resolver` picks the final path from the scratch directory
    /// contents and the parsed spec, and the scratch tree is then zipped
    /// there, overwriting any existing file.
    ///
    /// When `release_notes_transform` is supplied and the spec carries
    /// non-blank release notes, the transformed notes are injected as
    /// `release_notes_html`; absent notes are logged, not an error.
    ///
    /// # Errors
    ///
    /// Fails on policy violations, on unreadable or malformed containers
    /// and specs, and on I/O errors that survive the extraction retries.
    pub fn create_release_package(
        &mut self,
        output_resolver: impl FnOnce(&Path, &PackageSpec) -> PathBuf,
        release_notes_transform: Option<&dyn Fn(&str) -> String>,
    ) -> Result<PathBuf, BuildError> {
        if let Some(existing) = &self.release_package_file {
            return Ok(existing.clone());
        }

        let (spec_name, spec_text) = container::read_spec(&self.input_package_file)?;
        let mut spec = PackageSpec::parse(&spec_text)?;

        if !is_valid_package_id(spec.id()) {
            return Err(BuildError::InvalidPackageId(spec.id().to_string()));
        }

        let targets = spec.targets();
        match targets.len() {
            0 => return Err(BuildError::NoTarget(spec.id().to_string())),
            1 => {}
            _ => {
                return Err(BuildError::MultipleTargets {
                    package: spec.id().to_string(),
                    targets: targets.join("; "),
                });
            }
        }

        let dependency_count = spec.dependency_count();
        if dependency_count > 0 {
            return Err(BuildError::HasDependencies {
                package: spec.id().to_string(),
                count: dependency_count,
            });
        }

        info!(
            package = spec.id(),
            version = spec.version(),
            input = %self.input_package_file.display(),
            "building release package"
        );

        let scratch = tempfile::Builder::new()
            .prefix("updrift-release-")
            .tempdir()?;

        container::extract_with_escaping(&self.input_package_file, scratch.path())?;

        spec.remove_dependencies();
        match (release_notes_transform, spec.release_notes()) {
            (Some(transform), Some(notes)) => {
                let html = transform(notes);
                spec.inject_release_notes_html(&html);
            }
            (Some(_), None) => {
                info!(package = spec.id(), "no release notes to render");
            }
            (None, _) => {}
        }
        std::fs::write(scratch.path().join(&spec_name), spec.to_string())?;

        let types_path = scratch.path().join(content_types::CONTENT_TYPES_FILE_NAME);
        let types_text = match std::fs::read_to_string(&types_path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e.into()),
        };
        std::fs::write(&types_path, content_types::repair(&types_text)?)?;

        let output = output_resolver(scratch.path(), &spec);
        container::zip_directory(scratch.path(), &output)?;

        info!(output = %output.display(), "release package written");
        self.release_package_file = Some(output.clone());
        Ok(output)
    }
}

/// Canonical release package filename for an identity:
/// `{id}-{version}[-{platform}]-{full|delta}.nupkg`.
pub fn suggested_file_name(
    id: &str,
    version: &PackageVersion,
    platform: Option<&PlatformTag>,
    is_delta: bool,
) -> String {
    PackageIdentity::encode(id, version, platform, is_delta)
}

/// Find the release package to diff a new full package against: the
/// newest full release older than `target` whose platform the predicate
/// accepts, located in `package_dir` by its canonical filename.
pub fn previous_release_package(
    entries: &[ReleaseEntry],
    target: &PackageIdentity,
    package_dir: &Path,
    is_compatible: impl FnMut(Option<&PlatformTag>) -> bool,
) -> Option<ReleasePackageBuilder> {
    let previous = select_previous_release(entries, target, is_compatible)?;
    Some(ReleasePackageBuilder::from_release_package(
        package_dir.join(previous.filename()),
    ))
}
