//! Content-type declarations (`content-types.toml`).
//!
//! The container declares a content type per file extension in a `[types]`
//! table. Delta tooling adds `diff`, `bsdiff` and `shasum` payloads whose
//! extensions the original package never declared, and hand-edited
//! declarations sometimes carry junk values. `repair` fixes both in one
//! pass.

use std::str::FromStr;
use toml_edit::{DocumentMut, Item};

use crate::spec::SpecError;

/// Name of the content-type declaration file at the container root.
pub const CONTENT_TYPES_FILE_NAME: &str = "content-types.toml";

/// Extensions every release package must declare, with their types.
const REQUIRED_TYPES: &[(&str, &str)] = &[
    ("diff", "application/octet-stream"),
    ("bsdiff", "application/octet-stream"),
    ("shasum", "text/plain"),
];

/// Merge the required delta extensions into a content-types document and
/// drop declarations whose value is not a non-empty string. Accepts empty
/// input, so a container missing the file repairs to a minimal valid one.
///
/// # Errors
///
/// Fails when the input is not valid TOML.
pub fn repair(text: &str) -> Result<String, SpecError> {
    let mut doc = DocumentMut::from_str(text)?;

    // A missing or non-table [types] is itself a defect to repair.
    let mut types = doc
        .remove("types")
        .and_then(|item| item.into_table().ok())
        .unwrap_or_default();

    let junk: Vec<String> = types
        .iter()
        .filter(|(_, item)| !item.as_str().is_some_and(|s| !s.is_empty()))
        .map(|(key, _)| key.to_string())
        .collect();
    for key in junk {
        types.remove(&key);
    }

    for (extension, content_type) in REQUIRED_TYPES {
        if !types.contains_key(extension) {
            types[extension] = toml_edit::value(*content_type);
        }
    }

    doc["types"] = Item::Table(types);
    Ok(doc.to_string())
}
