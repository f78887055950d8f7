use std::path::PathBuf;

use thiserror::Error;
use x509_parser::prelude::X509Error;

/// CRL-related errors
#[derive(Error, Debug)]
pub enum CrlError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP error {status} when fetching CRL from {url}")]
    Status {
        status: reqwest::StatusCode,
        url: String,
    },

    #[error("Timeout while fetching CRL from {0}")]
    Timeout(String),

    #[error("Invalid CRL URL: {0}")]
    InvalidUrl(String),

    #[error("Empty response body from {0}")]
    EmptyBody(String),

    #[error("CRL from {url} is {size} bytes, limit is {limit}")]
    TooLarge { url: String, size: u64, limit: u64 },

    #[error("Destination {0} is outside the CRL cache")]
    OutsideCache(PathBuf),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("CRL parsing failed: {0}")]
    Parse(#[from] X509Error),

    #[error("CRL has {0} bytes of trailing data")]
    TrailingData(usize),

    #[error("Malformed PEM: {0}")]
    Pem(String),

    #[error("CRL signature verification failed")]
    SignatureVerification,

    #[error("Issuer not authorized for CRL signing")]
    UnauthorizedIssuer,
}

impl CrlError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CrlError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Convenient Result type alias
pub type CrlResult<T> = Result<T, CrlError>;
