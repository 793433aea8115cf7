//! A single validated release record.
//!
//! One `ReleaseEntry` corresponds to one line of the `RELEASES` manifest:
//! checksum, filename (or remote location), size, and an optional staged
//! rollout percentage. The package identity is derived from the filename
//! at construction and the record is immutable afterwards.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use updrift_schema::{IdentityError, PackageIdentity, PackageVersion, Sha1Hash};

/// Errors produced when constructing a [`ReleaseEntry`].
#[derive(Debug, thiserror::Error)]
pub enum EntryError {
    /// The filename contains a path separator.
    #[error("release filename must not contain path separators: `{0}`")]
    PathSeparator(String),

    /// The file size is zero.
    #[error("release filesize must be greater than zero: `{0}`")]
    ZeroFilesize(String),

    /// The staging percentage is outside `[0, 1]`.
    #[error("staging percentage must be within [0, 1], got {0}")]
    StagingOutOfRange(f32),

    /// The filename carried an unparseable version.
    #[error(transparent)]
    Identity(#[from] IdentityError),
}

/// Opaque 16-byte identifier used for deterministic staged-rollout
/// bucketing. Clients generate one per installation and persist it; the
/// same identifier always lands in the same cohort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StagingUserId([u8; 16]);

impl StagingUserId {
    /// Wrap raw identifier bytes.
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Borrow the raw identifier bytes.
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// The deterministic pseudo-uniform bucket value in `[0, 1)` for this
    /// identifier: bytes 12..16 as a little-endian u32, divided by 2^32.
    pub fn bucket(&self) -> f64 {
        let tail = [self.0[12], self.0[13], self.0[14], self.0[15]];
        f64::from(u32::from_le_bytes(tail)) / (u64::from(u32::MAX) + 1) as f64
    }
}

impl FromStr for StagingUserId {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 16];
        hex::decode_to_slice(s, &mut bytes)?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for StagingUserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// A single release as described by one manifest line.
///
/// Immutable once constructed; the `identity` field is always derived from
/// `filename`, never set independently.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReleaseEntry {
    sha1: Sha1Hash,
    filename: String,
    filesize: u64,
    base_url: Option<String>,
    query: Option<String>,
    staging_percentage: Option<f32>,
    identity: PackageIdentity,
}

impl ReleaseEntry {
    /// Construct a validated entry.
    ///
    /// # Errors
    ///
    /// Fails when the filename contains a path separator, the size is
    /// zero, the staging percentage is outside `[0, 1]`, or the filename
    /// carries a malformed version.
    pub fn new(
        sha1: Sha1Hash,
        filename: impl Into<String>,
        filesize: u64,
        base_url: Option<String>,
        query: Option<String>,
        staging_percentage: Option<f32>,
    ) -> Result<Self, EntryError> {
        let filename = filename.into();

        if filename.contains(['/', '\\']) {
            return Err(EntryError::PathSeparator(filename));
        }
        if filesize == 0 {
            return Err(EntryError::ZeroFilesize(filename));
        }
        if let Some(pct) = staging_percentage {
            if !(0.0..=1.0).contains(&pct) {
                return Err(EntryError::StagingOutOfRange(pct));
            }
        }

        let identity = PackageIdentity::decode(&filename)?;

        Ok(Self {
            sha1,
            filename,
            filesize,
            base_url,
            query,
            staging_percentage,
            identity,
        })
    }

    /// Hash and size a package file on disk into an entry with no staging
    /// percentage.
    ///
    /// # Errors
    ///
    /// Fails on I/O errors, on a path without a file name component, or
    /// when entry validation rejects the result.
    pub fn from_package_file(
        path: &Path,
        base_url: Option<String>,
    ) -> anyhow::Result<Self> {
        use anyhow::Context;

        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .with_context(|| format!("package path has no file name: {}", path.display()))?;

        let sha1 = Sha1Hash::compute_file(path)
            .with_context(|| format!("failed to hash {}", path.display()))?;
        let filesize = std::fs::metadata(path)
            .with_context(|| format!("failed to stat {}", path.display()))?
            .len();

        Ok(Self::new(sha1, filename, filesize, base_url, None, None)?)
    }

    /// The SHA-1 checksum of the package file.
    pub fn sha1(&self) -> &Sha1Hash {
        &self.sha1
    }

    /// The bare package filename (never contains path separators).
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Size of the package file in bytes.
    pub fn filesize(&self) -> u64 {
        self.filesize
    }

    /// Entry-specific download base URL, without a trailing slash, when the
    /// manifest line carried an absolute URL.
    pub fn base_url(&self) -> Option<&str> {
        self.base_url.as_deref()
    }

    /// Query string (without the leading `?`) captured from an absolute
    /// manifest URL.
    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// Fraction of users this release is staged to, when set.
    pub fn staging_percentage(&self) -> Option<f32> {
        self.staging_percentage
    }

    /// Identity decoded from the filename.
    pub fn identity(&self) -> &PackageIdentity {
        &self.identity
    }

    /// Whether this entry is a delta package.
    pub fn is_delta(&self) -> bool {
        self.identity.is_delta
    }

    /// Version decoded from the filename, when recognized.
    pub fn version(&self) -> Option<&PackageVersion> {
        self.identity.version.as_ref()
    }

    /// Package name decoded from the filename, when recognized.
    pub fn package_name(&self) -> Option<&str> {
        self.identity.name.as_deref()
    }

    /// Whether the given user falls into this release's staging cohort.
    ///
    /// No staging percentage means everyone is eligible; a percentage with
    /// no user identifier means no one is. Otherwise the user's
    /// deterministic bucket value must be strictly below the percentage.
    /// Stable across processes and platforms: no randomness, no clock.
    pub fn is_staging_eligible(&self, user: Option<&StagingUserId>) -> bool {
        let Some(percentage) = self.staging_percentage else {
            return true;
        };
        let Some(user) = user else {
            return false;
        };
        user.bucket() < f64::from(percentage)
    }

    /// Serialize this entry as one manifest line:
    /// `{sha1} {location} {filesize}[ # {percent}%]`.
    ///
    /// The staging percentage displays rounded to a whole percent; the
    /// stored value keeps full precision. The query string is a transport
    /// detail and is not reserialized.
    pub fn to_line(&self) -> String {
        let location = match &self.base_url {
            Some(base) => format!("{base}/{}", self.filename),
            None => self.filename.clone(),
        };
        match self.staging_percentage {
            Some(pct) => format!(
                "{} {} {} # {:.0}%",
                self.sha1,
                location,
                self.filesize,
                f64::from(pct) * 100.0
            ),
            None => format!("{} {} {}", self.sha1, location, self.filesize),
        }
    }
}

impl fmt::Display for ReleaseEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.filename)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sha(c: char) -> Sha1Hash {
        Sha1Hash::validated(&c.to_string().repeat(40)).unwrap()
    }

    fn entry(filename: &str, staging: Option<f32>) -> ReleaseEntry {
        ReleaseEntry::new(sha('a'), filename, 1024, None, None, staging).unwrap()
    }

    #[test]
    fn construction_derives_identity() {
        let e = entry("MyCoolApp-1.2-delta.nupkg", None);
        assert_eq!(e.package_name(), Some("MyCoolApp"));
        assert_eq!(e.version().unwrap().as_str(), "1.2");
        assert!(e.is_delta());
    }

    #[test]
    fn rejects_path_separators_and_zero_size() {
        assert!(ReleaseEntry::new(sha('a'), "dir/app.nupkg", 1, None, None, None).is_err());
        assert!(ReleaseEntry::new(sha('a'), "dir\\app.nupkg", 1, None, None, None).is_err());
        assert!(ReleaseEntry::new(sha('a'), "app.nupkg", 0, None, None, None).is_err());
    }

    #[test]
    fn rejects_out_of_range_staging() {
        assert!(ReleaseEntry::new(sha('a'), "a-1.0.nupkg", 1, None, None, Some(1.5)).is_err());
        assert!(ReleaseEntry::new(sha('a'), "a-1.0.nupkg", 1, None, None, Some(-0.1)).is_err());
    }

    #[test]
    fn staging_unset_everyone_eligible() {
        let e = entry("App-1.0-full.nupkg", None);
        assert!(e.is_staging_eligible(None));
        assert!(e.is_staging_eligible(Some(&StagingUserId::from_bytes([7; 16]))));
    }

    #[test]
    fn staging_set_requires_user() {
        let e = entry("App-1.0-full.nupkg", Some(0.5));
        assert!(!e.is_staging_eligible(None));
    }

    #[test]
    fn staging_zero_excludes_everyone() {
        let e = entry("App-1.0-full.nupkg", Some(0.0));
        for seed in 0..=255u8 {
            let user = StagingUserId::from_bytes([seed; 16]);
            assert!(!e.is_staging_eligible(Some(&user)));
        }
    }

    #[test]
    fn staging_full_includes_everyone_with_id() {
        let e = entry("App-1.0-full.nupkg", Some(1.0));
        for seed in 0..=255u8 {
            let user = StagingUserId::from_bytes([seed; 16]);
            assert!(e.is_staging_eligible(Some(&user)));
        }
    }

    #[test]
    fn staging_is_deterministic() {
        let e = entry("App-1.0-full.nupkg", Some(0.3));
        let user: StagingUserId = "0102030405060708090a0b0c0d0e0f10".parse().unwrap();
        let first = e.is_staging_eligible(Some(&user));
        for _ in 0..100 {
            assert_eq!(e.is_staging_eligible(Some(&user)), first);
        }
    }

    #[test]
    fn bucket_uses_trailing_four_bytes_little_endian() {
        let mut bytes = [0u8; 16];
        bytes[12..16].copy_from_slice(&0x8000_0000u32.to_le_bytes());
        let user = StagingUserId::from_bytes(bytes);
        let bucket = user.bucket();
        assert!((bucket - 0.5).abs() < 1e-9);

        let e = entry("App-1.0-full.nupkg", Some(0.5));
        // Strictly-less comparison: exactly at the boundary is excluded.
        assert!(!e.is_staging_eligible(Some(&user)));
    }

    #[test]
    fn line_format_without_staging() {
        let e = entry("MyCoolApp-1.0.nupkg", None);
        assert_eq!(
            e.to_line(),
            format!("{} MyCoolApp-1.0.nupkg 1024", "a".repeat(40))
        );
    }

    #[test]
    fn line_format_rounds_percentage_for_display() {
        let e = entry("MyCoolApp-1.0.nupkg", Some(0.25));
        assert!(e.to_line().ends_with(" # 25%"));
        // Stored value keeps full float precision.
        assert_eq!(e.staging_percentage(), Some(0.25));
    }

    #[test]
    fn line_format_with_base_url() {
        let e = ReleaseEntry::new(
            sha('b'),
            "App-1.0-full.nupkg",
            99,
            Some("https://host/Folder".to_string()),
            None,
            None,
        )
        .unwrap();
        assert_eq!(
            e.to_line(),
            format!("{} https://host/Folder/App-1.0-full.nupkg 99", "b".repeat(40))
        );
    }

    #[test]
    fn user_id_hex_round_trip() {
        let user: StagingUserId = "000102030405060708090a0b0c0d0e0f".parse().unwrap();
        assert_eq!(user.to_string(), "000102030405060708090a0b0c0d0e0f");
        assert!("zz".parse::<StagingUserId>().is_err());
    }
}
