//! Delta baseline selection.
//!
//! A delta package only makes sense against a specific older full
//! release. Given the manifest and the release being produced or applied,
//! the baseline is the newest full release older than the target that the
//! requesting environment can run.

use crate::entry::ReleaseEntry;
use updrift_schema::{PackageIdentity, PlatformTag};

/// Pick the delta baseline: the newest compatible full release strictly
/// older than the target.
///
/// Platform compatibility is the caller's capability - the predicate
/// receives each entry's platform tag (or `None` for platform-agnostic
/// packages). Returns `None` when nothing qualifies; an empty manifest or
/// a delta-only manifest is a benign "no baseline" result, never an error.
pub fn select_previous_release<'a, F>(
    entries: &'a [ReleaseEntry],
    target: &PackageIdentity,
    mut is_compatible: F,
) -> Option<&'a ReleaseEntry>
where
    F: FnMut(Option<&PlatformTag>) -> bool,
{
    let target_version = target.version.as_ref()?;

    entries
        .iter()
        .filter(|e| is_compatible(e.identity().platform.as_ref()))
        .filter(|e| !e.is_delta())
        .filter(|e| e.version().is_some_and(|v| v < target_version))
        .max_by(|a, b| a.version().cmp(&b.version()))
}
