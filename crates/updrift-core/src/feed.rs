//! Feed source protocol: where the manifest and packages live.
//!
//! The contract is deliberately small. The manifest is fetched from
//! `{base}/RELEASES` with the base address's query parameters preserved;
//! each package comes from the entry's own base URL when the manifest
//! carried an absolute URL, and from the source's base address otherwise.
//! Query parameters are a property of the source, not the entry, and ride
//! along on both kinds of request.

use crate::entry::{ReleaseEntry, StagingUserId};
use crate::manifest::{MANIFEST_FILE_NAME, parse_manifest_with_staging};
use anyhow::Context;
use async_trait::async_trait;
use std::path::Path;
use tracing::debug;
use url::Url;

/// Errors produced when constructing feed URLs.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    /// The base address cannot carry path segments (e.g. `data:` URLs).
    #[error("feed base address cannot carry a path: `{0}`")]
    CannotBeABase(String),

    /// An entry's own base URL combined into something unparseable.
    #[error("invalid download URL `{0}`")]
    InvalidUrl(String),
}

/// Build the manifest URL for a base address: path `RELEASES` appended,
/// every query parameter of the base preserved unchanged.
///
/// # Errors
///
/// Fails only for base addresses that cannot carry path segments.
pub fn release_feed_url(base: &Url) -> Result<Url, FeedError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|()| FeedError::CannotBeABase(base.to_string()))?
        .pop_if_empty()
        .push(MANIFEST_FILE_NAME);
    Ok(url)
}

/// Resolve the download URL for one release entry.
///
/// Entries parsed from an absolute URL keep their own location (base URL
/// plus any captured query), ignoring the source's base address entirely.
/// Bare-filename entries resolve against the source base, re-attaching the
/// source's query parameters.
///
/// # Errors
///
/// Fails when the entry's own base URL does not combine into a valid URL,
/// or the source base cannot carry path segments.
pub fn entry_download_url(base: &Url, entry: &ReleaseEntry) -> Result<Url, FeedError> {
    if let Some(entry_base) = entry.base_url() {
        let mut raw = format!("{entry_base}/{}", entry.filename());
        if let Some(query) = entry.query() {
            raw.push('?');
            raw.push_str(query);
        }
        return Url::parse(&raw).map_err(|_| FeedError::InvalidUrl(raw));
    }

    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|()| FeedError::CannotBeABase(base.to_string()))?
        .pop_if_empty()
        .push(entry.filename());
    Ok(url)
}

/// Transport seam for fetching feed resources. The engine only constructs
/// URLs; how bytes move is the implementation's business.
#[async_trait]
pub trait FileDownloader: Send + Sync {
    /// Fetch a small text resource (the manifest).
    async fn download_string(&self, url: &Url) -> anyhow::Result<String>;

    /// Fetch a (potentially large) resource to a local file.
    async fn download_file(&self, url: &Url, dest: &Path) -> anyhow::Result<()>;
}

/// An update feed rooted at a single HTTP(S) base address.
#[derive(Debug)]
pub struct SimpleWebSource<D> {
    base: Url,
    downloader: D,
}

impl<D: FileDownloader> SimpleWebSource<D> {
    /// Create a source for the given base address and transport.
    pub fn new(base: Url, downloader: D) -> Self {
        Self { base, downloader }
    }

    /// The configured base address.
    pub fn base(&self) -> &Url {
        &self.base
    }

    /// Fetch and parse the release manifest, dropping entries the given
    /// user is not staged into.
    ///
    /// # Errors
    ///
    /// Fails on transport errors and on a malformed manifest.
    pub async fn fetch_release_feed(
        &self,
        staging_user: Option<&StagingUserId>,
    ) -> anyhow::Result<Vec<ReleaseEntry>> {
        let url = release_feed_url(&self.base)?;
        debug!(%url, "fetching release manifest");
        let text = self
            .downloader
            .download_string(&url)
            .await
            .with_context(|| format!("failed to fetch release manifest from {url}"))?;
        Ok(parse_manifest_with_staging(&text, staging_user)?)
    }

    /// Resolve the download URL for an entry of this feed.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`entry_download_url`].
    pub fn entry_url(&self, entry: &ReleaseEntry) -> Result<Url, FeedError> {
        entry_download_url(&self.base, entry)
    }

    /// Download one release package to `dest` and verify its checksum.
    ///
    /// # Errors
    ///
    /// Fails on transport errors or when the downloaded bytes do not match
    /// the entry's SHA-1.
    pub async fn download_entry(
        &self,
        entry: &ReleaseEntry,
        dest: &Path,
    ) -> anyhow::Result<()> {
        let url = self.entry_url(entry)?;
        debug!(%url, dest = %dest.display(), "downloading release package");
        self.downloader
            .download_file(&url, dest)
            .await
            .with_context(|| format!("failed to download {url}"))?;

        let dest = dest.to_path_buf();
        let actual = tokio::task::spawn_blocking(move || {
            updrift_schema::Sha1Hash::compute_file(&dest)
        })
        .await
        .context("hash task panicked")??;

        if &actual != entry.sha1() {
            anyhow::bail!(
                "checksum mismatch for {}: expected {}, got {}",
                entry.filename(),
                entry.sha1(),
                actual
            );
        }
        Ok(())
    }
}

/// Plain reqwest-backed transport.
#[cfg(feature = "network")]
#[derive(Debug, Default)]
pub struct HttpFileDownloader {
    client: reqwest::Client,
}

#[cfg(feature = "network")]
impl HttpFileDownloader {
    /// Create a downloader with a fresh client.
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(feature = "network")]
#[async_trait]
impl FileDownloader for HttpFileDownloader {
    async fn download_string(&self, url: &Url) -> anyhow::Result<String> {
        let resp = self
            .client
            .get(url.clone())
            .header(reqwest::header::USER_AGENT, crate::USER_AGENT)
            .send()
            .await?
            .error_for_status()?;
        Ok(resp.text().await?)
    }

    async fn download_file(&self, url: &Url, dest: &Path) -> anyhow::Result<()> {
        use futures::StreamExt;
        use tokio::io::AsyncWriteExt;

        let resp = self
            .client
            .get(url.clone())
            .header(reqwest::header::USER_AGENT, crate::USER_AGENT)
            .send()
            .await?
            .error_for_status()?;

        let mut file = tokio::fs::File::create(dest).await?;
        let mut stream = resp.bytes_stream();
        while let Some(chunk) = stream.next().await {
            file.write_all(&chunk?).await?;
        }
        file.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::parse_line;
    use std::sync::Mutex;

    /// Records requested URLs and replays canned bodies.
    struct FakeDownloader {
        body: String,
        requested: Mutex<Vec<String>>,
    }

    impl FakeDownloader {
        fn new(body: &str) -> Self {
            Self {
                body: body.to_string(),
                requested: Mutex::new(Vec::new()),
            }
        }

        fn last_url(&self) -> String {
            self.requested.lock().unwrap().last().cloned().unwrap()
        }
    }

    #[async_trait]
    impl FileDownloader for FakeDownloader {
        async fn download_string(&self, url: &Url) -> anyhow::Result<String> {
            self.requested.lock().unwrap().push(url.to_string());
            Ok(self.body.clone())
        }

        async fn download_file(&self, url: &Url, dest: &Path) -> anyhow::Result<()> {
            self.requested.lock().unwrap().push(url.to_string());
            tokio::fs::write(dest, self.body.as_bytes()).await?;
            Ok(())
        }
    }

    #[test]
    fn manifest_url_appends_releases_segment() {
        let base = Url::parse("https://example.com/files").unwrap();
        assert_eq!(
            release_feed_url(&base).unwrap().as_str(),
            "https://example.com/files/RELEASES"
        );
    }

    #[test]
    fn manifest_url_preserves_query_parameters() {
        let base = Url::parse("https://example.com/files?auth=token&c=3").unwrap();
        assert_eq!(
            release_feed_url(&base).unwrap().as_str(),
            "https://example.com/files/RELEASES?auth=token&c=3"
        );
    }

    #[test]
    fn manifest_url_tolerates_trailing_slash() {
        let base = Url::parse("https://example.com/files/").unwrap();
        assert_eq!(
            release_feed_url(&base).unwrap().as_str(),
            "https://example.com/files/RELEASES"
        );
    }

    #[test]
    fn entry_url_uses_source_base_and_query_for_bare_filenames() {
        let base = Url::parse("https://example.com/files?key=value").unwrap();
        let entry = parse_line(
            "94689fede03fed7ab59c24337673a27837f0c3ec MyCoolApp-1.0.nupkg 1004502",
        )
        .unwrap()
        .unwrap();
        assert_eq!(
            entry_download_url(&base, &entry).unwrap().as_str(),
            "https://example.com/files/MyCoolApp-1.0.nupkg?key=value"
        );
    }

    #[test]
    fn entry_url_prefers_entry_base_url() {
        let base = Url::parse("https://example.com/files?key=value").unwrap();
        let line = format!(
            "{} https://www.test.org/Folder/MyCoolApp-1.2-delta.nupkg?query=param 1231953",
            "0".repeat(40)
        );
        let entry = parse_line(&line).unwrap().unwrap();
        assert_eq!(
            entry_download_url(&base, &entry).unwrap().as_str(),
            "https://www.test.org/Folder/MyCoolApp-1.2-delta.nupkg?query=param"
        );
    }

    #[tokio::test]
    async fn source_fetches_manifest_from_releases_url() {
        let body = "94689fede03fed7ab59c24337673a27837f0c3ec MyCoolApp-1.0.nupkg 1004502";
        let source = SimpleWebSource::new(
            Url::parse("https://example.com/files?auth=tok").unwrap(),
            FakeDownloader::new(body),
        );
        let entries = source.fetch_release_feed(None).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(
            source.downloader.last_url(),
            "https://example.com/files/RELEASES?auth=tok"
        );
    }

    #[tokio::test]
    async fn source_applies_staging_filter() {
        let body = format!(
            "{0} App-1.0-full.nupkg 10\n{0} App-1.1-full.nupkg 11 # 0%",
            "0".repeat(40)
        );
        let source = SimpleWebSource::new(
            Url::parse("https://example.com/files").unwrap(),
            FakeDownloader::new(&body),
        );
        let entries = source.fetch_release_feed(None).await.unwrap();
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn download_entry_verifies_checksum() {
        let body = "package bytes";
        let sha = updrift_schema::Sha1Hash::compute(body.as_bytes());
        let line = format!("{sha} App-1.0-full.nupkg {}", body.len());
        let entry = parse_line(&line).unwrap().unwrap();

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join(entry.filename());
        let source = SimpleWebSource::new(
            Url::parse("https://example.com/files").unwrap(),
            FakeDownloader::new(body),
        );
        source.download_entry(&entry, &dest).await.unwrap();

        // A tampered manifest hash must be rejected.
        let bad_line = format!("{} App-1.0-full.nupkg {}", "0".repeat(40), body.len());
        let bad_entry = parse_line(&bad_line).unwrap().unwrap();
        assert!(source.download_entry(&bad_entry, &dest).await.is_err());
    }
}
