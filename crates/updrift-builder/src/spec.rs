//! Package spec file (`*.pspec`).
//!
//! A TOML document with a `[package]` table (`id`, `version`, optional
//! `title`, `release_notes`, `targets`) and an optional `[dependencies]`
//! table. The document is held as a [`toml_edit::DocumentMut`] so that
//! rewrites touch only the keys they mean to and leave the author's
//! formatting alone.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use toml_edit::{DocumentMut, Item, Value};

/// File extension of the package spec, without the dot.
pub const SPEC_EXTENSION: &str = "pspec";

/// Errors produced when loading or querying a package spec.
#[derive(Error, Debug)]
pub enum SpecError {
    /// The document is not valid TOML.
    #[error("spec file is not valid TOML: {0}")]
    Parse(#[from] toml_edit::TomlError),

    /// The document has no `[package]` table.
    #[error("spec file has no [package] table")]
    MissingPackageTable,

    /// The `[package]` table has no `id` key.
    #[error("spec file has no package id")]
    MissingId,

    /// The `[package]` table has no `version` key.
    #[error("spec file has no package version")]
    MissingVersion,
}

/// A parsed, editable package spec document.
#[derive(Debug, Clone)]
pub struct PackageSpec {
    doc: DocumentMut,
}

impl PackageSpec {
    /// Parse a spec document, requiring `[package]` with `id` and
    /// `version`.
    ///
    /// # Errors
    ///
    /// Fails on malformed TOML or when the required keys are absent.
    pub fn parse(text: &str) -> Result<Self, SpecError> {
        let doc = DocumentMut::from_str(text)?;
        let spec = Self { doc };
        if spec.package_str("id").is_none() {
            if spec.doc.get("package").is_none() {
                return Err(SpecError::MissingPackageTable);
            }
            return Err(SpecError::MissingId);
        }
        if spec.package_str("version").is_none() {
            return Err(SpecError::MissingVersion);
        }
        Ok(spec)
    }

    fn package_str(&self, key: &str) -> Option<&str> {
        self.doc.get("package")?.get(key)?.as_str()
    }

    /// Package id, as declared.
    pub fn id(&self) -> &str {
        self.package_str("id").unwrap_or_default()
    }

    /// Package version string, as declared.
    pub fn version(&self) -> &str {
        self.package_str("version").unwrap_or_default()
    }

    /// Optional human-readable title.
    pub fn title(&self) -> Option<&str> {
        self.package_str("title")
    }

    /// Raw release notes, if declared and non-blank.
    pub fn release_notes(&self) -> Option<&str> {
        self.package_str("release_notes")
            .filter(|s| !s.trim().is_empty())
    }

    /// Rendered release notes, if a previous rewrite injected them.
    pub fn release_notes_html(&self) -> Option<&str> {
        self.package_str("release_notes_html")
    }

    /// Declared target platforms, in document order.
    pub fn targets(&self) -> Vec<String> {
        self.doc
            .get("package")
            .and_then(|p| p.get("targets"))
            .and_then(Item::as_array)
            .map(|arr| {
                arr.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Number of declared dependencies.
    pub fn dependency_count(&self) -> usize {
        self.doc
            .get("dependencies")
            .and_then(Item::as_table)
            .map_or(0, toml_edit::Table::len)
    }

    /// Drop the `[dependencies]` table entirely. Idempotent.
    pub fn remove_dependencies(&mut self) {
        self.doc.remove("dependencies");
    }

    /// Store rendered release notes under `release_notes_html`, wrapped in
    /// a CDATA envelope so downstream consumers treat the markup as
    /// opaque.
    pub fn inject_release_notes_html(&mut self, html: &str) {
        if let Some(package) = self.doc.get_mut("package").and_then(Item::as_table_mut) {
            package["release_notes_html"] =
                toml_edit::value(format!("<![CDATA[\n{html}\n]]>"));
        }
    }
}

impl fmt::Display for PackageSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.doc.fmt(f)
    }
}

/// Whether a package id is syntactically acceptable: non-empty ASCII
/// alphanumerics plus `.`, `_`, `-`, starting and ending alphanumeric.
pub fn is_valid_package_id(id: &str) -> bool {
    let bytes = id.as_bytes();
    if bytes.is_empty() {
        return false;
    }
    if !bytes[0].is_ascii_alphanumeric() || !bytes[bytes.len() - 1].is_ascii_alphanumeric() {
        return false;
    }
    bytes
        .iter()
        .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-'))
}
