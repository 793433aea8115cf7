//! Runtime platform tags encoded in package filenames.
//!
//! A platform tag is a filename suffix like `win.10.0-x64` or `osx-arm64`:
//! an OS token, an optional dotted OS version, and an optional architecture
//! token. Packages without a tag are platform-agnostic.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(osx|win)\.?([\d.]+)?(?:-((?:x|arm)\d{2}))?$").unwrap()
});

/// Operating systems a package can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Os {
    /// Windows, encoded as `win`.
    #[serde(rename = "win")]
    Windows,
    /// macOS, encoded as `osx`.
    #[serde(rename = "osx")]
    MacOS,
}

impl Os {
    /// The filename token for this OS.
    pub fn as_token(self) -> &'static str {
        match self {
            Os::Windows => "win",
            Os::MacOS => "osx",
        }
    }
}

impl fmt::Display for Os {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_token())
    }
}

/// Errors produced when parsing a [`PlatformTag`].
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PlatformError {
    /// The text does not match the `os[.ver][-arch]` shape.
    #[error("unrecognized platform tag `{0}`")]
    Unrecognized(String),
}

/// A parsed runtime platform tag: OS, optional OS version, optional arch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlatformTag {
    /// Target operating system.
    pub os: Os,
    /// Dotted minimum OS version, when the tag carries one (e.g. `10.0`).
    pub os_version: Option<String>,
    /// Architecture token (`x64`, `x86`, `arm64`), when present.
    pub arch: Option<String>,
}

impl PlatformTag {
    /// Construct a tag for the given OS with no version or arch constraint.
    pub fn new(os: Os) -> Self {
        Self {
            os,
            os_version: None,
            arch: None,
        }
    }

    /// Builder-style setter for the OS version.
    pub fn with_os_version(mut self, ver: impl Into<String>) -> Self {
        self.os_version = Some(ver.into());
        self
    }

    /// Builder-style setter for the architecture token.
    pub fn with_arch(mut self, arch: impl Into<String>) -> Self {
        self.arch = Some(arch.into());
        self
    }
}

impl FromStr for PlatformTag {
    type Err = PlatformError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let caps = TAG_RE
            .captures(s)
            .ok_or_else(|| PlatformError::Unrecognized(s.to_string()))?;

        let os = match caps[1].to_ascii_lowercase().as_str() {
            "win" => Os::Windows,
            "osx" => Os::MacOS,
            _ => unreachable!("anchored alternation"),
        };

        Ok(Self {
            os,
            os_version: caps
                .get(2)
                .map(|m| m.as_str().trim_matches('.').to_string())
                .filter(|v| !v.is_empty()),
            arch: caps.get(3).map(|m| m.as_str().to_ascii_lowercase()),
        })
    }
}

impl fmt::Display for PlatformTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.os)?;
        if let Some(ver) = &self.os_version {
            write!(f, ".{ver}")?;
        }
        if let Some(arch) = &self.arch {
            write!(f, "-{arch}")?;
        }
        Ok(())
    }
}
