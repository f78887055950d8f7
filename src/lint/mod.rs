//! CRL compliance linting
//!
//! Runs a configurable set of standards-compliance rules over a CRL.
//!
//! The linter decodes the CRL on its own, with a decoder that tolerates
//! defects the strict validation decoder rejects, so compliance findings are
//! reported even for CRLs that fail validation.
//!
//! # Features
//! - Rule registry with include/exclude filtering
//! - Per-rule settings loaded from a TOML rule filter
//! - Severity threshold separating failures from informational findings

mod engine;
mod errors;
mod registry;
pub mod rules;
mod types;

pub use engine::CrlLinter;
pub use errors::{LintError, LintResult};
pub use registry::{LintRegistry, RuleFilter};
pub use types::{LintOutcome, LintReport, LintStatus, LintViolation, RuleResult, Severity};
