//! On-disk layout of the CRL cache
//!
//! Files live at `root/<organization>/<common name>/<file name>`, every
//! component sanitized so that nothing taken from the feed can escape the
//! cache root.

use std::path::{Path, PathBuf};

use md5::{Digest, Md5};
use url::Url;

use crate::feed::FeedRecord;

use super::errors::{CrlError, CrlResult};

/// Suffix of files still being downloaded
pub const PARTIAL_SUFFIX: &str = "part";

const FALLBACK_COMPONENT: &str = "unknown";
const FALLBACK_FILE_NAME: &str = "default.crl";

/// Maps feed records and URLs to cache paths
#[derive(Debug, Clone)]
pub struct CacheLayout {
    root: PathBuf,
}

impl CacheLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding every CRL published by the CA of `record`.
    pub fn issuer_dir(&self, record: &FeedRecord) -> PathBuf {
        self.root
            .join(sanitize_component(&record.organization))
            .join(sanitize_component(&record.common_name))
    }

    pub fn destination(&self, record: &FeedRecord, url: &str) -> PathBuf {
        self.issuer_dir(record).join(file_name_for_url(url))
    }

    /// Whether `path` lies below the cache root. Only compares path
    /// components, so `..` components are rejected outright.
    pub fn contains(&self, path: &Path) -> bool {
        path.starts_with(&self.root)
            && !path
                .components()
                .any(|c| matches!(c, std::path::Component::ParentDir))
    }
}

/// Make a DN attribute safe to use as a single path component. Leading dots
/// are dropped so the layout never produces hidden entries.
pub fn sanitize_component(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c => c,
        })
        .collect();

    let trimmed = replaced.trim().trim_start_matches('.');
    if trimmed.is_empty() {
        FALLBACK_COMPONENT.to_string()
    } else {
        trimmed.to_string()
    }
}

/// File name for a CRL URL: the last path segment with query-like
/// characters replaced.
pub fn file_name_for_url(url: &str) -> String {
    let segment = match Url::parse(url) {
        Ok(parsed) => parsed
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .map(str::to_string)
            .unwrap_or_default(),
        Err(_) => url.rsplit('/').next().unwrap_or_default().to_string(),
    };

    let name: String = segment
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '&' | '=' => '_',
            c => c,
        })
        .collect();

    let name = name.trim().trim_start_matches('.');
    if name.is_empty() {
        FALLBACK_FILE_NAME.to_string()
    } else {
        name.to_string()
    }
}

/// Quoted hex MD5 of `data`, as used for `ETag` and `If-None-Match`.
pub fn fingerprint_bytes(data: &[u8]) -> String {
    format!("\"{}\"", hex::encode(Md5::digest(data)))
}

/// A CRL already present in the cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedFile {
    pub path: PathBuf,
    /// Quoted hex MD5 of the contents, recomputed on every open
    pub fingerprint: String,
    pub len: u64,
}

impl CachedFile {
    /// Read the file at `path`, or `None` when it does not exist.
    pub async fn open(path: &Path) -> CrlResult<Option<Self>> {
        match tokio::fs::read(path).await {
            Ok(data) => Ok(Some(Self {
                path: path.to_path_buf(),
                fingerprint: fingerprint_bytes(&data),
                len: data.len() as u64,
            })),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CrlError::io(path, e)),
        }
    }
}

/// Path of the temporary file a download into `dest` is written to.
pub fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".");
    name.push(PARTIAL_SUFFIX);
    dest.with_file_name(name)
}

pub fn is_partial(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == PARTIAL_SUFFIX)
}

/// Dot files and directories are never written by the layout.
pub fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with('.'))
}
