use std::fmt;

use serde::{Deserialize, Serialize};

/// Severity of a lint finding, ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warn,
    Error,
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Info => "info",
            Severity::Warn => "warn",
            Severity::Error => "error",
            Severity::Fatal => "fatal",
        };
        f.write_str(s)
    }
}

/// Status produced by a single rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LintStatus {
    Pass,
    NotApplicable,
    Info,
    Warn,
    Error,
    Fatal,
}

impl LintStatus {
    /// Severity of a finding, `None` when the rule passed or did not apply.
    pub fn severity(self) -> Option<Severity> {
        match self {
            LintStatus::Pass | LintStatus::NotApplicable => None,
            LintStatus::Info => Some(Severity::Info),
            LintStatus::Warn => Some(Severity::Warn),
            LintStatus::Error => Some(Severity::Error),
            LintStatus::Fatal => Some(Severity::Fatal),
        }
    }
}

/// Result of running one rule against one CRL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleResult {
    pub status: LintStatus,
    pub details: Option<String>,
}

impl RuleResult {
    pub fn pass() -> Self {
        Self {
            status: LintStatus::Pass,
            details: None,
        }
    }

    pub fn not_applicable() -> Self {
        Self {
            status: LintStatus::NotApplicable,
            details: None,
        }
    }

    pub fn with_status(status: LintStatus, details: impl Into<String>) -> Self {
        Self {
            status,
            details: Some(details.into()),
        }
    }
}

/// A rule finding at `Info` severity or above
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LintViolation {
    pub rule: String,
    pub severity: Severity,
    pub description: String,
    pub details: Option<String>,
}

/// Findings for one CRL together with the context needed to triage them
#[derive(Debug, Clone, Serialize)]
pub struct LintReport {
    pub violations: Vec<LintViolation>,
    pub threshold: Severity,
    /// Hex encoded key identifier from the authority key identifier extension
    pub authority_key_id: Option<String>,
    pub issuer: String,
}

impl LintReport {
    /// Findings at or above the configured threshold.
    pub fn failures(&self) -> impl Iterator<Item = &LintViolation> {
        self.violations
            .iter()
            .filter(move |v| v.severity >= self.threshold)
    }

    pub fn failure_count(&self) -> usize {
        self.failures().count()
    }

    pub fn is_clean(&self) -> bool {
        self.failure_count() == 0
    }
}

/// Outcome of linting a CRL.
///
/// `Unparseable` is never reported as a clean result.
#[derive(Debug, Clone)]
pub enum LintOutcome {
    Checked(LintReport),
    Unparseable { reason: String },
}

impl LintOutcome {
    pub fn report(&self) -> Option<&LintReport> {
        match self {
            LintOutcome::Checked(report) => Some(report),
            LintOutcome::Unparseable { .. } => None,
        }
    }
}
