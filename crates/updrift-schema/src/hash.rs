//! SHA-1 checksums as used by the `RELEASES` manifest.

use serde::{Deserialize, Deserializer, Serialize};
use sha1::{Digest, Sha1};
use std::io::Read;
use std::path::Path;

/// Errors produced when validating a [`Sha1Hash`].
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum HashError {
    /// The text is not exactly 40 ASCII hex characters.
    #[error("invalid SHA1: expected 40 hex chars, got `{0}`")]
    Invalid(String),
}

/// A validated SHA-1 digest (40 hex characters).
///
/// The manifest format predates this engine and is fixed on SHA-1; the
/// digest is an integrity check against transfer corruption, not a
/// security boundary. The original casing is preserved so manifest lines
/// round-trip unchanged; equality ignores case, since published manifests
/// carry either.
#[derive(Debug, Clone, Serialize)]
#[serde(transparent)]
pub struct Sha1Hash(String);

impl PartialEq for Sha1Hash {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl Eq for Sha1Hash {}

impl std::hash::Hash for Sha1Hash {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        for b in self.0.bytes() {
            b.to_ascii_lowercase().hash(state);
        }
    }
}

impl Sha1Hash {
    /// Create a validated `Sha1Hash` from existing hex text.
    ///
    /// # Errors
    ///
    /// Returns [`HashError::Invalid`] unless `s` is exactly 40 ASCII hex
    /// characters.
    pub fn validated(s: &str) -> Result<Self, HashError> {
        if s.len() == 40 && s.bytes().all(|b| b.is_ascii_hexdigit()) {
            Ok(Self(s.to_string()))
        } else {
            Err(HashError::Invalid(s.to_string()))
        }
    }

    /// Compute the SHA-1 of a byte slice.
    pub fn compute(data: &[u8]) -> Self {
        let mut hasher = Sha1::new();
        hasher.update(data);
        Self(hex::encode(hasher.finalize()))
    }

    /// Compute the SHA-1 of a file, streaming it in 64 KiB chunks.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be opened or read.
    pub fn compute_file(path: &Path) -> std::io::Result<Self> {
        let mut file = std::fs::File::open(path)?;
        let mut hasher = Sha1::new();
        let mut buf = vec![0u8; 64 * 1024];
        loop {
            let n = file.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        Ok(Self(hex::encode(hasher.finalize())))
    }

    /// Return the hex digest as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Sha1Hash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for Sha1Hash {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for Sha1Hash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::validated(&s).map_err(serde::de::Error::custom)
    }
}
