//! Lenient release versions.
//!
//! Release filenames carry 2-4 part dotted versions with an optional
//! prerelease tail (`1.0`, `1.2.3`, `1.0.1-build.23`). Strict semver
//! rejects the two-part form, so this is a hand-rolled parse that keeps
//! the original text for display.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Errors produced when parsing a [`PackageVersion`].
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum VersionError {
    /// The version text is empty.
    #[error("empty version string")]
    Empty,

    /// A numeric component is missing, non-numeric, or out of range.
    #[error("invalid version `{0}`: expected 2-4 dotted numeric parts")]
    InvalidNumericParts(String),

    /// The prerelease tail is empty or contains illegal characters.
    #[error("invalid prerelease in version `{0}`")]
    InvalidPrerelease(String),
}

/// A release version as encoded in package filenames and the manifest.
///
/// Comparison pads the numeric parts with zeros (`1.0 == 1.0.0`) and orders
/// prerelease versions below their release counterpart, semver-style.
/// `Display` reproduces the original text byte-for-byte so filenames and
/// manifest lines round-trip.
#[derive(Debug, Clone)]
pub struct PackageVersion {
    raw: String,
    parts: Vec<u64>,
    pre: Option<String>,
}

impl PackageVersion {
    /// Return the version exactly as it was written.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Whether this version carries a prerelease tail.
    pub fn is_prerelease(&self) -> bool {
        self.pre.is_some()
    }

    fn part(&self, idx: usize) -> u64 {
        self.parts.get(idx).copied().unwrap_or(0)
    }
}

impl FromStr for PackageVersion {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(VersionError::Empty);
        }

        let (numeric, pre) = match s.split_once('-') {
            Some((n, p)) => (n, Some(p)),
            None => (s, None),
        };

        let parts = numeric
            .split('.')
            .map(|p| {
                if p.is_empty() || !p.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(VersionError::InvalidNumericParts(s.to_string()));
                }
                p.parse::<u64>()
                    .map_err(|_| VersionError::InvalidNumericParts(s.to_string()))
            })
            .collect::<Result<Vec<u64>, _>>()?;

        if parts.len() < 2 || parts.len() > 4 {
            return Err(VersionError::InvalidNumericParts(s.to_string()));
        }

        if let Some(pre) = pre {
            let valid = !pre.is_empty()
                && pre.split('.').all(|id| {
                    !id.is_empty()
                        && id
                            .bytes()
                            .all(|b| b.is_ascii_alphanumeric() || b == b'-')
                });
            if !valid {
                return Err(VersionError::InvalidPrerelease(s.to_string()));
            }
        }

        Ok(Self {
            raw: s.to_string(),
            parts,
            pre: pre.map(str::to_string),
        })
    }
}

impl fmt::Display for PackageVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

impl PartialEq for PackageVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for PackageVersion {}

impl Ord for PackageVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        for i in 0..4 {
            match self.part(i).cmp(&other.part(i)) {
                Ordering::Equal => {}
                ord => return ord,
            }
        }

        match (&self.pre, &other.pre) {
            (None, None) => Ordering::Equal,
            // A release outranks any prerelease of the same numeric version.
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (Some(a), Some(b)) => cmp_prerelease(a, b),
        }
    }
}

impl PartialOrd for PackageVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl std::hash::Hash for PackageVersion {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        for i in 0..4 {
            self.part(i).hash(state);
        }
        self.pre.hash(state);
    }
}

/// Semver-style prerelease comparison: numeric identifiers compare
/// numerically and rank below alphanumeric ones; ties break on length.
fn cmp_prerelease(a: &str, b: &str) -> Ordering {
    let mut lhs = a.split('.');
    let mut rhs = b.split('.');

    loop {
        match (lhs.next(), rhs.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => {
                let ord = match (x.parse::<u64>(), y.parse::<u64>()) {
                    (Ok(xn), Ok(yn)) => xn.cmp(&yn),
                    (Ok(_), Err(_)) => Ordering::Less,
                    (Err(_), Ok(_)) => Ordering::Greater,
                    (Err(_), Err(_)) => x.cmp(y),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
    }
}

impl Serialize for PackageVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for PackageVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> PackageVersion {
        s.parse().unwrap()
    }

    #[test]
    fn parses_two_part_versions() {
        let ver = v("1.0");
        assert_eq!(ver.as_str(), "1.0");
        assert!(!ver.is_prerelease());
    }

    #[test]
    fn parses_prerelease() {
        let ver = v("1.0.1-build.23");
        assert!(ver.is_prerelease());
        assert_eq!(ver.to_string(), "1.0.1-build.23");
    }

    #[test]
    fn rejects_malformed_versions() {
        assert!("".parse::<PackageVersion>().is_err());
        assert!("1".parse::<PackageVersion>().is_err());
        assert!("1.a".parse::<PackageVersion>().is_err());
        assert!("1.2.3.4.5".parse::<PackageVersion>().is_err());
        assert!("1.0-".parse::<PackageVersion>().is_err());
        assert!("1..0".parse::<PackageVersion>().is_err());
    }

    #[test]
    fn pads_missing_parts_for_comparison() {
        assert_eq!(v("1.0"), v("1.0.0"));
        assert!(v("1.0") < v("1.0.1"));
        assert!(v("0.10.4") < v("0.11.5"));
        assert!(v("1.11.5") > v("1.10.4"));
    }

    #[test]
    fn prerelease_orders_below_release() {
        assert!(v("1.0.0-beta") < v("1.0.0"));
        assert!(v("1.0.0-alpha") < v("1.0.0-beta"));
        assert!(v("1.0.0-build.2") < v("1.0.0-build.10"));
    }

    #[test]
    fn serde_round_trip() {
        let ver = v("2.1.0-rc.1");
        let json = serde_json::to_string(&ver).unwrap();
        assert_eq!(json, "\"2.1.0-rc.1\"");
        let back: PackageVersion = serde_json::from_str(&json).unwrap();
        assert_eq!(ver, back);
    }
}
