use std::path::Path;
use std::time::Duration;

use reqwest::header::IF_NONE_MATCH;
use reqwest::{Client, StatusCode};
use tokio::time::timeout;
use tracing::{debug, info, warn};
use url::Url;

use super::errors::{CrlError, CrlResult};
use super::store::{self, CacheLayout, CachedFile};
use super::types::FetchOutcome;

const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Conditional CRL downloader writing into the cache
#[derive(Debug, Clone)]
pub struct CrlFetcher {
    client: Client,
    request_timeout: Duration,
    max_size: u64,
    layout: CacheLayout,
}

impl CrlFetcher {
    pub fn new(layout: CacheLayout, request_timeout: Duration, max_size: u64) -> CrlResult<Self> {
        let client = Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self::with_client(client, layout, request_timeout, max_size))
    }

    pub fn with_client(
        client: Client,
        layout: CacheLayout,
        request_timeout: Duration,
        max_size: u64,
    ) -> Self {
        Self {
            client,
            request_timeout,
            max_size,
            layout,
        }
    }

    pub fn layout(&self) -> &CacheLayout {
        &self.layout
    }

    /// Download `url` into `dest` unless the cached copy is still current.
    ///
    /// The existing file is only replaced once a complete, non-empty body
    /// has been written next to it.
    pub async fn fetch(&self, url: &str, dest: &Path) -> CrlResult<FetchOutcome> {
        let url = clean_url(url)?;
        if !self.layout.contains(dest) {
            return Err(CrlError::OutsideCache(dest.to_path_buf()));
        }

        let cached = CachedFile::open(dest).await?;
        if let Some(cached) = &cached {
            debug!("Cached copy of {} is {} bytes, {}", url, cached.len, cached.fingerprint);
        }
        let fingerprint = cached.as_ref().map(|c| c.fingerprint.as_str());

        match timeout(self.request_timeout, self.download(&url, fingerprint)).await {
            Ok(Ok(Some(body))) => {
                let bytes = body.len() as u64;
                write_atomic(dest, &body).await?;
                info!("Downloaded {} ({} bytes) to {}", url, bytes, dest.display());
                Ok(FetchOutcome::Downloaded { bytes })
            }
            Ok(Ok(None)) => {
                debug!("{} not modified", url);
                Ok(FetchOutcome::NotModified)
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(CrlError::Timeout(url.to_string())),
        }
    }

    /// Returns `None` on `304 Not Modified`.
    async fn download(&self, url: &Url, fingerprint: Option<&str>) -> CrlResult<Option<Vec<u8>>> {
        let mut request = self.client.get(url.clone());
        if let Some(fingerprint) = fingerprint {
            request = request.header(IF_NONE_MATCH, fingerprint);
        }

        let mut response = request.send().await?;
        let status = response.status();
        if status == StatusCode::NOT_MODIFIED {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(CrlError::Status {
                status,
                url: url.to_string(),
            });
        }

        if let Some(declared) = response.content_length()
            && declared > self.max_size
        {
            return Err(CrlError::TooLarge {
                url: url.to_string(),
                size: declared,
                limit: self.max_size,
            });
        }

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            let size = (body.len() + chunk.len()) as u64;
            if size > self.max_size {
                return Err(CrlError::TooLarge {
                    url: url.to_string(),
                    size,
                    limit: self.max_size,
                });
            }
            body.extend_from_slice(&chunk);
        }

        if body.is_empty() {
            return Err(CrlError::EmptyBody(url.to_string()));
        }
        Ok(Some(body))
    }
}

/// Write `data` to `<dest>.part` and rename it over `dest`.
async fn write_atomic(dest: &Path, data: &[u8]) -> CrlResult<()> {
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| CrlError::io(parent, e))?;
    }

    let partial = store::partial_path(dest);
    if let Err(e) = tokio::fs::write(&partial, data).await {
        let _ = tokio::fs::remove_file(&partial).await;
        return Err(CrlError::io(&partial, e));
    }
    if let Err(e) = tokio::fs::rename(&partial, dest).await {
        warn!("Failed to move {} into place", partial.display());
        let _ = tokio::fs::remove_file(&partial).await;
        return Err(CrlError::io(dest, e));
    }
    Ok(())
}

/// Strip control and invisible formatting characters from a feed URL and
/// require an absolute http(s) URL.
pub fn clean_url(raw: &str) -> CrlResult<Url> {
    let cleaned: String = raw
        .chars()
        .filter(|&c| !c.is_control() && !is_format_char(c))
        .collect();
    let cleaned = cleaned.trim();

    let url = Url::parse(cleaned).map_err(|e| CrlError::InvalidUrl(format!("{cleaned:?}: {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(CrlError::InvalidUrl(format!(
            "{cleaned:?}: unsupported scheme {scheme}"
        ))),
    }
}

/// Unicode general category Cf
fn is_format_char(c: char) -> bool {
    matches!(
        c,
        '\u{00AD}'
            | '\u{0600}'..='\u{0605}'
            | '\u{061C}'
            | '\u{06DD}'
            | '\u{070F}'
            | '\u{0890}'..='\u{0891}'
            | '\u{08E2}'
            | '\u{180E}'
            | '\u{200B}'..='\u{200F}'
            | '\u{202A}'..='\u{202E}'
            | '\u{2060}'..='\u{2064}'
            | '\u{2066}'..='\u{206F}'
            | '\u{FEFF}'
            | '\u{FFF9}'..='\u{FFFB}'
            | '\u{110BD}'
            | '\u{110CD}'
            | '\u{13430}'..='\u{1343F}'
            | '\u{1BCA0}'..='\u{1BCA3}'
            | '\u{1D173}'..='\u{1D17A}'
            | '\u{E0001}'
            | '\u{E0020}'..='\u{E007F}'
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_url_strips_invisible_characters() {
        let url = clean_url("\u{FEFF} http://crl.example.com/\u{200B}ca.crl\r\n").unwrap();
        assert_eq!(url.as_str(), "http://crl.example.com/ca.crl");
    }

    #[test]
    fn test_clean_url_rejects_other_schemes() {
        assert!(matches!(
            clean_url("ldap://ldap.example.com/cn=CA"),
            Err(CrlError::InvalidUrl(_))
        ));
        assert!(matches!(clean_url("not a url"), Err(CrlError::InvalidUrl(_))));
    }

    #[tokio::test]
    async fn test_destination_outside_cache_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = CrlFetcher::new(
            CacheLayout::new(dir.path().join("crls")),
            Duration::from_secs(1),
            1024,
        )
        .unwrap();

        let result = fetcher
            .fetch("http://127.0.0.1:9/ca.crl", &dir.path().join("elsewhere.crl"))
            .await;
        assert!(matches!(result, Err(CrlError::OutsideCache(_))));
    }
}
