//! Fetch-and-cache collaborator for remote public-data archives.
//!
//! Every source file is downloaded at most once: the local file name is
//! derived from a digest of the URL, and an existing cache entry is always
//! returned as-is (there is no freshness check).

use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::fs;
use tokio::time::sleep;
use tracing::{debug, info};

/// Default cache location, relative to the working directory.
pub const DEFAULT_CACHE_DIR: &str = "data/raw/data_gouv_cache";

/// Hex characters of the URL digest kept in the cache file name.
const DIGEST_PREFIX_LEN: usize = 12;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("http error fetching {url}: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("cache i/o error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T, E = FetchError> = std::result::Result<T, E>;

/// Content-addressed download cache.
#[derive(Debug, Clone)]
pub struct FetchCache {
    dir: PathBuf,
    client: reqwest::Client,
    rate_limit: Duration,
}

impl FetchCache {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(300))
            .user_agent("idf-electoral-etl/0.1 (open data ingestion)")
            .build()
            .map_err(|source| FetchError::Http {
                url: String::new(),
                source,
            })?;
        Ok(Self {
            dir: dir.into(),
            client,
            rate_limit: Duration::ZERO,
        })
    }

    /// Wait this long before every network request (cache hits are free).
    pub fn with_rate_limit(mut self, rate_limit: Duration) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Local path a URL is cached under: `<digest>_<last url segment>`.
    pub fn cache_path(&self, url: &str) -> PathBuf {
        self.dir.join(cache_file_name(url))
    }

    /// Return the cached file for `url`, downloading it first if absent.
    pub async fn fetch_cached(&self, url: &str) -> Result<PathBuf> {
        self.fetch(url, false).await
    }

    /// Like [`fetch_cached`](Self::fetch_cached); `force` re-downloads even
    /// when a cache entry exists.
    pub async fn fetch(&self, url: &str, force: bool) -> Result<PathBuf> {
        let path = self.cache_path(url);
        if !force && fs::try_exists(&path).await.unwrap_or(false) {
            debug!(url, path = %path.display(), "cache hit");
            return Ok(path);
        }

        fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| FetchError::Io {
                path: self.dir.clone(),
                source,
            })?;

        if !self.rate_limit.is_zero() {
            sleep(self.rate_limit).await;
        }

        info!(url, "fetching");
        let http_err = |source| FetchError::Http {
            url: url.to_string(),
            source,
        };
        let bytes = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|resp| resp.error_for_status())
            .map_err(http_err)?
            .bytes()
            .await
            .map_err(http_err)?;

        // Write next to the target and rename so a partial download never
        // shows up as a cache hit.
        let partial = path.with_extension("part");
        fs::write(&partial, &bytes)
            .await
            .map_err(|source| FetchError::Io {
                path: partial.clone(),
                source,
            })?;
        fs::rename(&partial, &path)
            .await
            .map_err(|source| FetchError::Io {
                path: path.clone(),
                source,
            })?;

        info!(url, bytes = bytes.len(), path = %path.display(), "cached");
        Ok(path)
    }
}

/// Cache file name for a URL. Deterministic: same URL, same name.
pub fn cache_file_name(url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    let file_name = url.trim_end_matches('/').rsplit('/').next().unwrap_or("");
    format!("{}_{}", &digest[..DIGEST_PREFIX_LEN], file_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_cache_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "collector-test-{}-{}",
            name,
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn test_cache_file_name_is_deterministic() {
        let url = "https://example.org/files/PR17_BVot_T1_FE.txt";
        assert_eq!(cache_file_name(url), cache_file_name(url));
    }

    #[test]
    fn test_cache_file_name_keeps_last_segment() {
        let name = cache_file_name("https://example.org/a/b/ODD_CSV.zip");
        assert!(name.ends_with("_ODD_CSV.zip"));
        assert_eq!(name.len(), DIGEST_PREFIX_LEN + 1 + "ODD_CSV.zip".len());
    }

    #[test]
    fn test_cache_file_name_ignores_trailing_slash() {
        let name = cache_file_name("https://example.org/a/data/");
        assert!(name.ends_with("_data"));
    }

    #[test]
    fn test_cache_file_name_differs_per_url() {
        let a = cache_file_name("https://example.org/2007/file.xlsx");
        let b = cache_file_name("https://example.org/2012/file.xlsx");
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_fetch_cached_returns_existing_entry_without_network() {
        let dir = temp_cache_dir("hit");
        let cache = FetchCache::new(&dir).unwrap();
        // Unroutable URL: a network attempt would fail the test.
        let url = "http://127.0.0.1:9/never/fetched.csv";
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(cache.cache_path(url), b"cached").unwrap();

        let path = cache.fetch_cached(url).await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"cached");
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_fetch_failure_leaves_no_cache_entry() {
        let dir = temp_cache_dir("miss");
        let cache = FetchCache::new(&dir).unwrap();
        let url = "http://127.0.0.1:9/unreachable.csv";

        assert!(cache.fetch_cached(url).await.is_err());
        assert!(!cache.cache_path(url).exists());
        let _ = std::fs::remove_dir_all(&dir);
    }
}
