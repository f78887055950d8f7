//! Run statistics
//!
//! Counters are updated from the fetch workers and the check walk through a
//! shared reference, then frozen into a [`RunSummary`] at the end of the run.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::lint::LintOutcome;
use crate::pki::crl::{Freshness, ValidationOutcome};

#[derive(Debug, Default)]
pub struct RunStatistics {
    feed_records: AtomicU64,
    malformed_rows: AtomicU64,

    downloaded: AtomicU64,
    downloaded_bytes: AtomicU64,
    not_modified: AtomicU64,
    fetch_failures: AtomicU64,

    crl_files: AtomicU64,
    crl_bytes: AtomicU64,
    deleted_empty: AtomicU64,
    revoked_certificates: AtomicU64,
    verified: AtomicU64,
    issuer_unknown: AtomicU64,
    signature_invalid: AtomicU64,
    decode_failed: AtomicU64,
    expired: AtomicU64,
    unbounded: AtomicU64,

    lint_checked: AtomicU64,
    lint_unparseable: AtomicU64,
    lint_failed_crls: AtomicU64,
    lint_violations: AtomicU64,
}

fn bump(counter: &AtomicU64, by: u64) {
    counter.fetch_add(by, Ordering::Relaxed);
}

impl RunStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_feed_record(&self) {
        bump(&self.feed_records, 1);
    }

    pub fn record_malformed_row(&self) {
        bump(&self.malformed_rows, 1);
    }

    pub fn record_download(&self, bytes: u64) {
        bump(&self.downloaded, 1);
        bump(&self.downloaded_bytes, bytes);
    }

    pub fn record_not_modified(&self) {
        bump(&self.not_modified, 1);
    }

    pub fn record_fetch_failure(&self) {
        bump(&self.fetch_failures, 1);
    }

    /// A cached file was read during the check walk.
    pub fn record_crl_file(&self, bytes: u64) {
        bump(&self.crl_files, 1);
        bump(&self.crl_bytes, bytes);
    }

    pub fn record_deleted_empty(&self) {
        bump(&self.deleted_empty, 1);
    }

    pub fn record_revocations(&self, count: u64) {
        bump(&self.revoked_certificates, count);
    }

    pub fn record_outcome(&self, outcome: &ValidationOutcome) {
        let counter = match outcome {
            ValidationOutcome::Verified { .. } => &self.verified,
            ValidationOutcome::IssuerUnknown { .. } => &self.issuer_unknown,
            ValidationOutcome::SignatureInvalid { .. } => &self.signature_invalid,
            ValidationOutcome::DecodeFailed { .. } => &self.decode_failed,
        };
        bump(counter, 1);
    }

    pub fn record_freshness(&self, freshness: Freshness) {
        match freshness {
            Freshness::Current => {}
            Freshness::Expired => bump(&self.expired, 1),
            Freshness::Unbounded => bump(&self.unbounded, 1),
        }
    }

    pub fn record_lint(&self, outcome: &LintOutcome) {
        match outcome {
            LintOutcome::Checked(report) => {
                bump(&self.lint_checked, 1);
                let failures = report.failure_count() as u64;
                bump(&self.lint_violations, failures);
                if failures > 0 {
                    bump(&self.lint_failed_crls, 1);
                }
            }
            LintOutcome::Unparseable { .. } => bump(&self.lint_unparseable, 1),
        }
    }

    pub fn revoked_certificates(&self) -> u64 {
        self.revoked_certificates.load(Ordering::Relaxed)
    }

    pub fn summary(&self) -> RunSummary {
        let get = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        RunSummary {
            feed_records: get(&self.feed_records),
            malformed_rows: get(&self.malformed_rows),
            downloaded: get(&self.downloaded),
            downloaded_bytes: get(&self.downloaded_bytes),
            not_modified: get(&self.not_modified),
            fetch_failures: get(&self.fetch_failures),
            crl_files: get(&self.crl_files),
            crl_bytes: get(&self.crl_bytes),
            deleted_empty: get(&self.deleted_empty),
            revoked_certificates: get(&self.revoked_certificates),
            verified: get(&self.verified),
            issuer_unknown: get(&self.issuer_unknown),
            signature_invalid: get(&self.signature_invalid),
            decode_failed: get(&self.decode_failed),
            expired: get(&self.expired),
            unbounded: get(&self.unbounded),
            lint_checked: get(&self.lint_checked),
            lint_unparseable: get(&self.lint_unparseable),
            lint_failed_crls: get(&self.lint_failed_crls),
            lint_violations: get(&self.lint_violations),
        }
    }
}

/// Snapshot of [`RunStatistics`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub feed_records: u64,
    pub malformed_rows: u64,
    pub downloaded: u64,
    pub downloaded_bytes: u64,
    pub not_modified: u64,
    pub fetch_failures: u64,
    pub crl_files: u64,
    pub crl_bytes: u64,
    pub deleted_empty: u64,
    pub revoked_certificates: u64,
    pub verified: u64,
    pub issuer_unknown: u64,
    pub signature_invalid: u64,
    pub decode_failed: u64,
    pub expired: u64,
    pub unbounded: u64,
    pub lint_checked: u64,
    pub lint_unparseable: u64,
    pub lint_failed_crls: u64,
    pub lint_violations: u64,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Feed:       {} records, {} malformed rows",
            self.feed_records, self.malformed_rows
        )?;
        writeln!(
            f,
            "Fetch:      {} downloaded ({}), {} not modified, {} failed",
            self.downloaded,
            format_bytes(self.downloaded_bytes),
            self.not_modified,
            self.fetch_failures
        )?;
        writeln!(
            f,
            "Cache:      {} CRLs ({}), {} empty files removed",
            self.crl_files,
            format_bytes(self.crl_bytes),
            self.deleted_empty
        )?;
        writeln!(
            f,
            "Validation: {} verified, {} issuer unknown, {} signature invalid, {} undecodable",
            self.verified, self.issuer_unknown, self.signature_invalid, self.decode_failed
        )?;
        writeln!(
            f,
            "Freshness:  {} expired, {} without nextUpdate",
            self.expired, self.unbounded
        )?;
        writeln!(f, "Revoked:    {} certificates", self.revoked_certificates)?;
        write!(
            f,
            "Lint:       {} checked, {} with failures ({} violations), {} unparseable",
            self.lint_checked, self.lint_failed_crls, self.lint_violations, self.lint_unparseable
        )
    }
}

/// Render a byte count in binary units.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];

    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.2} {}", UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::Arc;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(1023), "1023 B");
        assert_eq!(format_bytes(1024), "1.00 KiB");
        assert_eq!(format_bytes(1536), "1.50 KiB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.00 MiB");
        assert_eq!(format_bytes(3 * 1024 * 1024 * 1024), "3.00 GiB");
        assert_eq!(format_bytes(2048 * 1024 * 1024 * 1024), "2048.00 GiB");
    }

    #[test]
    fn test_revocations_sum_in_any_order() {
        for order in [[5, 0, 12], [12, 5, 0], [0, 12, 5]] {
            let stats = RunStatistics::new();
            for count in order {
                stats.record_revocations(count);
            }
            assert_eq!(stats.summary().revoked_certificates, 17);
        }
    }

    #[test]
    fn test_concurrent_updates() {
        let stats = Arc::new(RunStatistics::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let stats = Arc::clone(&stats);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        stats.record_download(10);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let summary = stats.summary();
        assert_eq!(summary.downloaded, 800);
        assert_eq!(summary.downloaded_bytes, 8000);
    }

    #[test]
    fn test_outcomes_are_counted_separately() {
        let stats = RunStatistics::new();
        let path = PathBuf::from("a.crl");
        stats.record_outcome(&ValidationOutcome::Verified {
            path: path.clone(),
            message: String::new(),
        });
        stats.record_outcome(&ValidationOutcome::IssuerUnknown {
            path: path.clone(),
            message: String::new(),
        });
        stats.record_outcome(&ValidationOutcome::IssuerUnknown {
            path,
            message: String::new(),
        });
        stats.record_freshness(Freshness::Expired);
        stats.record_freshness(Freshness::Current);

        let summary = stats.summary();
        assert_eq!(summary.verified, 1);
        assert_eq!(summary.issuer_unknown, 2);
        assert_eq!(summary.expired, 1);
        assert_eq!(summary.unbounded, 0);
    }

    #[test]
    fn test_summary_serializes() {
        let stats = RunStatistics::new();
        stats.record_crl_file(2048);
        let json = serde_json::to_value(stats.summary()).unwrap();
        assert_eq!(json["crl_files"], 1);
        assert_eq!(json["crl_bytes"], 2048);
        assert!(stats.summary().to_string().contains("2.00 KiB"));
    }
}
