//! The filename identity codec.
//!
//! Release package filenames encode the full identity of a release:
//! `{name}-{version}[-{platform}]-{full|delta}.nupkg`. Decoding runs a
//! small ordered set of anchored patterns whose precedence matters: the
//! full/delta suffix is stripped first, then the first version-start match
//! splits name from version, then a trailing platform tag is peeled off the
//! version tail, and only then is the remainder parsed as a version.

use crate::platform::PlatformTag;
use crate::version::{PackageVersion, VersionError};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

/// File extension of release packages, without the leading dot.
pub const PACKAGE_EXTENSION: &str = "nupkg";

static SUFFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(-full|-delta)?\.nupkg$").unwrap());

static VERSION_START_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\.-](0|[1-9]\d*)\.(0|[1-9]\d*)($|[^\d])").unwrap());

static PLATFORM_SUFFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)-(osx|win)\.?([\d.]+)?(?:-((?:x|arm)\d{2}))?$").unwrap());

/// Errors produced by [`PackageIdentity::decode`].
///
/// Only a malformed version is fatal; filenames that simply do not look
/// like packages decode to an all-default identity instead.
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    /// The version text embedded in the filename failed to parse.
    #[error("invalid version in package filename `{filename}`")]
    Version {
        /// The offending filename.
        filename: String,
        /// The underlying version parse failure.
        #[source]
        source: VersionError,
    },
}

/// Identity of a release package, as encoded in its filename.
///
/// All fields are defaulted when the filename does not carry the package
/// extension or no version can be located - the "not a package" case is a
/// normal value, not an error, since directory scans routinely encounter
/// unrelated files.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PackageIdentity {
    /// Package name, e.g. `MyCoolApp`.
    pub name: Option<String>,
    /// Release version parsed from the filename.
    pub version: Option<PackageVersion>,
    /// Whether the package is a delta against an older full release.
    pub is_delta: bool,
    /// Runtime platform constraint, absent for platform-agnostic packages.
    pub platform: Option<PlatformTag>,
}

impl PackageIdentity {
    /// Decode a filename (or path; only the last component is examined)
    /// into its identity.
    ///
    /// Filenames without the package extension decode to a default
    /// identity. A filename with the extension but no locatable version
    /// keeps only the delta flag.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::Version`] when the version portion of an
    /// otherwise well-formed package filename is malformed - that is an
    /// input error the caller must surface, not a soft condition.
    pub fn decode(filename: &str) -> Result<Self, IdentityError> {
        let base = filename
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(filename);

        let lower = base.to_ascii_lowercase();
        let Some(stem) = lower.strip_suffix(&format!(".{PACKAGE_EXTENSION}")) else {
            return Ok(Self::default());
        };

        let is_delta = stem.ends_with("-delta");

        let name_and_ver = SUFFIX_RE.replace(base, "");

        let Some(m) = VERSION_START_RE.find(&name_and_ver) else {
            return Ok(Self {
                name: None,
                version: None,
                is_delta,
                platform: None,
            });
        };

        // The match starts at the separator; name is everything before it,
        // the raw version tail everything after it.
        let name = &name_and_ver[..m.start()];
        let mut tail = &name_and_ver[m.start() + 1..];

        let platform = match PLATFORM_SUFFIX_RE.find(tail) {
            Some(pm) => {
                let token = &tail[pm.start() + 1..];
                let tag = token
                    .parse::<PlatformTag>()
                    .expect("platform suffix match implies parseable tag");
                tail = &tail[..pm.start()];
                Some(tag)
            }
            None => None,
        };

        let version = tail
            .parse::<PackageVersion>()
            .map_err(|source| IdentityError::Version {
                filename: base.to_string(),
                source,
            })?;

        Ok(Self {
            name: Some(name.to_string()),
            version: Some(version),
            is_delta,
            platform,
        })
    }

    /// Encode an identity back into its canonical filename:
    /// `{name}-{version}[-{platform}]-{full|delta}.nupkg`.
    pub fn encode(
        name: &str,
        version: &PackageVersion,
        platform: Option<&PlatformTag>,
        is_delta: bool,
    ) -> String {
        let tail = if is_delta { "delta" } else { "full" };
        match platform {
            Some(tag) => format!("{name}-{version}-{tag}-{tail}.{PACKAGE_EXTENSION}"),
            None => format!("{name}-{version}-{tail}.{PACKAGE_EXTENSION}"),
        }
    }

    /// Whether a name and version were recovered from the filename.
    pub fn is_recognized(&self) -> bool {
        self.name.is_some() && self.version.is_some()
    }
}

impl fmt::Display for PackageIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.name, &self.version) {
            (Some(name), Some(ver)) => write!(f, "{name} {ver}"),
            _ => write!(f, "(unrecognized)"),
        }
    }
}
