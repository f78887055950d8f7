//! Certificate Revocation List (CRL) monitoring
//!
//! # Features
//! - Conditional downloads into an on-disk cache (`If-None-Match` with the
//!   MD5 fingerprint of the cached copy)
//! - Bounded parallel refresh of every CRL named by the feed
//! - Strict decoding and signature verification against the trust store
//! - Per-file lint and statistics during the cache walk

mod checker;
mod errors;
mod fetcher;
pub mod store;
mod types;
mod updater;
pub mod validation;

pub use checker::{CheckedFile, CrlChecker};
pub use errors::{CrlError, CrlResult};
pub use fetcher::{CrlFetcher, clean_url};
pub use store::{CacheLayout, CachedFile};
pub use types::{
    CrlValidation, FetchOutcome, FetchTask, Freshness, ParsedCrl, RevokedEntry,
    ValidationOutcome,
};
pub use updater::{CrlUpdater, FetchSummary};
pub use validation::validate;
