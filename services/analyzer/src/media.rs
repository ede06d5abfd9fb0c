//! Post media cached in the bucket.
//!
//! Remote images are stored once under a key derived from their URL
//! (`https://pbs.twimg.com/media/<hash>.png` -> `<prefix><hash>.png`), so a
//! photo shared by many posts is downloaded and uploaded a single time.

use crate::clients::{ClientError, MediaDownloader, ObjectLocation, ObjectStore};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tracing::{debug, info, instrument, warn};

/// Extensions accepted by image recognition
const SUPPORTED_EXTENSIONS: &[&str] = &["jpg", "png"];

fn media_path_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        // Anchored at the start only: anything after the 3-char extension
        // (e.g. `:large`) is ignored.
        Regex::new(r"^.*/(?P<mediahash>[^.]*)\.(?P<ext>[^.]{3})")
            .expect("media path pattern is valid")
    })
}

/// File name (`<hash>.<ext>`) of a supported image URL, `None` otherwise
pub fn media_file_name(url: &str) -> Option<String> {
    let captures = media_path_pattern().captures(url)?;
    let hash = captures.name("mediahash")?.as_str();
    let ext = captures.name("ext")?.as_str();

    if !SUPPORTED_EXTENSIONS.contains(&ext) {
        return None;
    }

    Some(format!("{hash}.{ext}"))
}

/// Cache key of a supported image URL under `prefix`
pub fn cache_key(url: &str, prefix: &str) -> Option<String> {
    media_file_name(url).map(|name| format!("{prefix}{name}"))
}

/// Replace anything that could escape the scratch directory
fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.' => c,
            _ => '_',
        })
        .collect()
}

/// Stores remote post images in the bucket, fetching each one at most once
pub struct MediaCache {
    store: Arc<dyn ObjectStore>,
    downloader: Arc<dyn MediaDownloader>,
    bucket: String,
    key_prefix: String,
    scratch_dir: PathBuf,
}

impl MediaCache {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        downloader: Arc<dyn MediaDownloader>,
        bucket: impl Into<String>,
        key_prefix: impl Into<String>,
        scratch_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            store,
            downloader,
            bucket: bucket.into(),
            key_prefix: key_prefix.into(),
            scratch_dir: scratch_dir.into(),
        }
    }

    /// Location an image URL is cached under, `None` for unsupported URLs
    pub fn location_for(&self, url: &str) -> Option<ObjectLocation> {
        cache_key(url, &self.key_prefix).map(|key| ObjectLocation::new(&self.bucket, key))
    }

    /// Make sure the image behind `url` is in the bucket.
    ///
    /// Returns `Ok(None)` when the URL does not name a supported image.
    #[instrument(skip(self))]
    pub async fn ensure_stored(&self, url: &str) -> Result<Option<ObjectLocation>, ClientError> {
        let Some(location) = self.location_for(url) else {
            debug!("Unsupported media URL, skipping");
            return Ok(None);
        };

        if self.store.exists(&location).await? {
            debug!(image = %location, "Image already cached");
            metrics::counter!("analyzer.images.cached").increment(1);
            return Ok(Some(location));
        }

        let file_name = location
            .key
            .strip_prefix(&self.key_prefix)
            .unwrap_or(&location.key);
        let scratch = self.scratch_dir.join(sanitize_file_name(file_name));

        let result = self.fetch_and_upload(url, &location, &scratch).await;
        remove_scratch(&scratch).await;
        result?;

        info!(image = %location, "Image cached");
        Ok(Some(location))
    }

    async fn fetch_and_upload(
        &self,
        url: &str,
        location: &ObjectLocation,
        scratch: &Path,
    ) -> Result<(), ClientError> {
        self.downloader.download(url, scratch).await?;
        self.store.upload_file(location, scratch).await
    }
}

async fn remove_scratch(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove scratch file"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::{MockMediaDownloader, MockObjectStore};

    #[test]
    fn test_media_file_name() {
        assert_eq!(
            media_file_name("https://pbs.twimg.com/media/D_h3Nx1U8AAPOAj.jpg"),
            Some("D_h3Nx1U8AAPOAj.jpg".to_string())
        );
        assert_eq!(
            media_file_name("http://pbs.twimg.com/media/ABC.png"),
            Some("ABC.png".to_string())
        );
        assert_eq!(
            media_file_name("https://pbs.twimg.com/media/ABC.jpg:large"),
            Some("ABC.jpg".to_string())
        );
    }

    #[test]
    fn test_unsupported_extensions_are_rejected() {
        assert_eq!(media_file_name("https://pbs.twimg.com/media/ABC.gif"), None);
        assert_eq!(media_file_name("https://pbs.twimg.com/media/ABC.JPG"), None);
        assert_eq!(media_file_name("https://pbs.twimg.com/media/ABC.jpeg"), None);
    }

    #[test]
    fn test_malformed_urls_are_rejected() {
        assert_eq!(media_file_name("ABC.jpg"), None);
        assert_eq!(media_file_name("https://pbs.twimg.com/media/ABC"), None);
        assert_eq!(media_file_name(""), None);
    }

    #[test]
    fn test_cache_key_uses_prefix() {
        assert_eq!(
            cache_key("https://pbs.twimg.com/media/ABC.png", "tmp/"),
            Some("tmp/ABC.png".to_string())
        );
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("ABC-1_x.jpg"), "ABC-1_x.jpg");
        assert_eq!(sanitize_file_name("../etc/passwd.png"), ".._etc_passwd.png");
    }

    #[tokio::test]
    async fn test_cached_image_is_not_fetched_again() {
        let mut store = MockObjectStore::new();
        store
            .expect_exists()
            .withf(|location| location.key == "tmp/ABC.jpg")
            .times(1)
            .returning(|_| Ok(true));
        let downloader = MockMediaDownloader::new();

        let scratch = tempfile::tempdir().unwrap();
        let cache = MediaCache::new(
            Arc::new(store),
            Arc::new(downloader),
            "bucket",
            "tmp/",
            scratch.path(),
        );

        let location = cache
            .ensure_stored("https://pbs.twimg.com/media/ABC.jpg")
            .await
            .unwrap();
        assert_eq!(location, Some(ObjectLocation::new("bucket", "tmp/ABC.jpg")));
    }

    #[tokio::test]
    async fn test_new_image_is_fetched_uploaded_and_removed() {
        let scratch = tempfile::tempdir().unwrap();
        let expected_path = scratch.path().join("ABC.png");

        let mut downloader = MockMediaDownloader::new();
        let download_path = expected_path.clone();
        downloader
            .expect_download()
            .withf(move |url, dest| {
                url == "https://pbs.twimg.com/media/ABC.png" && dest == download_path.as_path()
            })
            .times(1)
            .returning(|_, dest| {
                std::fs::write(dest, b"png-bytes").unwrap();
                Ok(())
            });

        let mut store = MockObjectStore::new();
        store.expect_exists().times(1).returning(|_| Ok(false));
        store
            .expect_upload_file()
            .withf(|location, path| location.key == "tmp/ABC.png" && path.exists())
            .times(1)
            .returning(|_, _| Ok(()));

        let cache = MediaCache::new(
            Arc::new(store),
            Arc::new(downloader),
            "bucket",
            "tmp/",
            scratch.path(),
        );

        let location = cache
            .ensure_stored("https://pbs.twimg.com/media/ABC.png")
            .await
            .unwrap();

        assert_eq!(location, Some(ObjectLocation::new("bucket", "tmp/ABC.png")));
        assert!(!expected_path.exists());
    }

    #[tokio::test]
    async fn test_failed_upload_still_removes_scratch_file() {
        let scratch = tempfile::tempdir().unwrap();
        let expected_path = scratch.path().join("ABC.jpg");

        let mut downloader = MockMediaDownloader::new();
        downloader.expect_download().times(1).returning(|_, dest| {
            std::fs::write(dest, b"jpg-bytes").unwrap();
            Ok(())
        });

        let mut store = MockObjectStore::new();
        store.expect_exists().returning(|_| Ok(false));
        store
            .expect_upload_file()
            .returning(|_, _| Err(ClientError::service("PutObject", "SlowDown")));

        let cache = MediaCache::new(
            Arc::new(store),
            Arc::new(downloader),
            "bucket",
            "tmp/",
            scratch.path(),
        );

        let result = cache.ensure_stored("https://pbs.twimg.com/media/ABC.jpg").await;
        assert!(result.is_err());
        assert!(!expected_path.exists());
    }

    #[tokio::test]
    async fn test_unsupported_url_touches_nothing() {
        let cache = MediaCache::new(
            Arc::new(MockObjectStore::new()),
            Arc::new(MockMediaDownloader::new()),
            "bucket",
            "tmp/",
            "/tmp",
        );

        let location = cache
            .ensure_stored("https://pbs.twimg.com/media/ABC.gif")
            .await
            .unwrap();
        assert_eq!(location, None);
    }
}
