//! Release manifest engine for updrift.
//!
//! This crate owns everything an update client or release pipeline needs
//! to produce and consume the `RELEASES` manifest: the validated
//! [`entry::ReleaseEntry`] record with its deterministic staged-rollout
//! bucketing, the manifest codec with its ordering and atomic-replace
//! rules, the delta-baseline selector, and the feed source URL contract.

pub mod baseline;
pub mod entry;
pub mod feed;
pub mod manifest;

pub use baseline::select_previous_release;
pub use entry::{EntryError, ReleaseEntry, StagingUserId};
#[cfg(feature = "network")]
pub use feed::HttpFileDownloader;
pub use feed::{FeedError, FileDownloader, SimpleWebSource, entry_download_url, release_feed_url};
pub use manifest::{
    MANIFEST_FILE_NAME, ManifestError, build_from_directory, load_manifest, parse_line,
    parse_manifest, parse_manifest_with_staging, serialize_manifest, write_manifest,
};

/// User agent string for feed requests.
pub const USER_AGENT: &str = concat!("updrift/", env!("CARGO_PKG_VERSION"));
