use std::path::Path;
use std::sync::Arc;

use time::OffsetDateTime;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use crate::lint::{CrlLinter, LintOutcome};
use crate::pki::truststore::TrustStore;
use crate::report::RunStatistics;

use super::store;
use super::types::{Freshness, ValidationOutcome};
use super::validation::validate;

/// What the check phase learned about one cached file
#[derive(Debug, Clone)]
pub struct CheckedFile {
    pub outcome: ValidationOutcome,
    pub freshness: Option<Freshness>,
    pub revoked: usize,
    /// `None` when linting was skipped
    pub lint: Option<LintOutcome>,
    pub deleted: bool,
}

/// Walks the cache and validates and lints every CRL in it
#[derive(Debug)]
pub struct CrlChecker {
    trust_store: Arc<TrustStore>,
    linter: CrlLinter,
    stats: Arc<RunStatistics>,
    show_lint_errors: bool,
}

impl CrlChecker {
    pub fn new(trust_store: Arc<TrustStore>, linter: CrlLinter, stats: Arc<RunStatistics>) -> Self {
        Self {
            trust_store,
            linter,
            stats,
            show_lint_errors: false,
        }
    }

    /// Log every individual lint violation, not only the per-CRL count.
    pub fn show_lint_errors(mut self, show: bool) -> Self {
        self.show_lint_errors = show;
        self
    }

    /// Check every cached file below `root`, in file name order. In-flight
    /// downloads and hidden entries are skipped.
    pub async fn run(&self, root: &Path, now: OffsetDateTime) -> Vec<CheckedFile> {
        info!("Checking CRLs in {}", root.display());
        let mut checked = Vec::new();

        let entries = WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !store::is_hidden(e.path()));
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Failed to walk {}: {}", root.display(), e);
                    continue;
                }
            };
            let path = entry.path();
            if !entry.file_type().is_file() || store::is_partial(path) {
                continue;
            }

            match tokio::fs::read(path).await {
                Ok(data) => checked.push(self.check_file(path, &data, now).await),
                Err(e) => warn!("Failed to read {}: {}", path.display(), e),
            }
        }

        info!("Checked {} CRL files", checked.len());
        checked
    }

    /// Validate and lint one file already read into memory.
    pub async fn check_file(&self, path: &Path, data: &[u8], now: OffsetDateTime) -> CheckedFile {
        self.stats.record_crl_file(data.len() as u64);
        let validation = validate(path, data, &self.trust_store, now);
        self.stats.record_outcome(&validation.outcome);

        let mut deleted = false;
        if validation.corrupt {
            match tokio::fs::remove_file(path).await {
                Ok(()) => {
                    info!("Removed empty CRL file {}", path.display());
                    self.stats.record_deleted_empty();
                    deleted = true;
                }
                Err(e) => warn!("Failed to remove empty file {}: {}", path.display(), e),
            }
        }

        let mut revoked = 0;
        if let Some(crl) = &validation.crl {
            revoked = crl.revoked_count();
            self.stats.record_revocations(revoked as u64);
            debug!(
                "{}: {} issued by {}, next update {}, {} revoked",
                path.display(),
                crl.signature_algorithm,
                crl.issuer,
                crl.next_update
                    .map(|t| t.to_string())
                    .unwrap_or_else(|| "none".to_string()),
                revoked
            );
        }

        if let Some(freshness) = validation.freshness {
            self.stats.record_freshness(freshness);
            if freshness == Freshness::Expired {
                warn!("{} is expired", path.display());
            }
        }

        match &validation.outcome {
            ValidationOutcome::Verified { .. } => {}
            ValidationOutcome::IssuerUnknown { .. } => info!("{}", validation.outcome),
            ValidationOutcome::SignatureInvalid { .. } | ValidationOutcome::DecodeFailed { .. } => {
                warn!("{}", validation.outcome)
            }
        }

        let lint = match validation.outcome {
            ValidationOutcome::IssuerUnknown { .. } => None,
            _ if validation.corrupt => None,
            _ => Some(self.lint(path, &validation.der)),
        };

        CheckedFile {
            outcome: validation.outcome,
            freshness: validation.freshness,
            revoked,
            lint,
            deleted,
        }
    }

    fn lint(&self, path: &Path, der: &[u8]) -> LintOutcome {
        let outcome = self.linter.lint(der);
        self.stats.record_lint(&outcome);

        match &outcome {
            LintOutcome::Checked(report) if !report.is_clean() => {
                error!(
                    "{}: {} lint errors (AKI {}, issuer {})",
                    path.display(),
                    report.failure_count(),
                    report.authority_key_id.as_deref().unwrap_or("-"),
                    report.issuer
                );
                if self.show_lint_errors {
                    for violation in report.failures() {
                        error!(
                            "  {} [{}] {}: {}",
                            violation.rule,
                            violation.severity,
                            violation.description,
                            violation.details.as_deref().unwrap_or("")
                        );
                    }
                }
            }
            LintOutcome::Checked(_) => {}
            LintOutcome::Unparseable { reason } => {
                warn!("{}: lint decoder rejected CRL: {}", path.display(), reason);
            }
        }
        outcome
    }
}
