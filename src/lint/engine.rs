use tracing::debug;
use x509_cert::crl::CertificateList;
use x509_cert::der::{Decode, SliceReader};
use x509_cert::ext::pkix::AuthorityKeyIdentifier;

use super::errors::LintResult;
use super::registry::{LintRegistry, RuleFilter};
use super::rules::OID_AUTHORITY_KEY_IDENTIFIER;
use super::types::{LintOutcome, LintReport, LintViolation, Severity};

/// Runs a filtered rule registry over CRLs
#[derive(Debug)]
pub struct CrlLinter {
    registry: LintRegistry,
    threshold: Severity,
}

impl CrlLinter {
    pub fn new(registry: LintRegistry, threshold: Severity) -> Self {
        Self {
            registry,
            threshold,
        }
    }

    /// Build a linter over the built-in rules selected by `filter`.
    pub fn from_filter(filter: &RuleFilter, threshold: Severity) -> LintResult<Self> {
        let registry = LintRegistry::builtin().filter(filter)?;
        Ok(Self::new(registry, threshold))
    }

    pub fn threshold(&self) -> Severity {
        self.threshold
    }

    /// Lint DER encoded CRL bytes.
    pub fn lint(&self, der: &[u8]) -> LintOutcome {
        let crl = match decode_lenient(der) {
            Ok(crl) => crl,
            Err(e) => {
                debug!("Lint decoder rejected CRL: {}", e);
                return LintOutcome::Unparseable {
                    reason: e.to_string(),
                };
            }
        };

        let violations = self
            .registry
            .iter()
            .filter_map(|lint| {
                let result = lint.execute(&crl);
                let severity = result.status.severity()?;
                let metadata = lint.metadata();
                Some(LintViolation {
                    rule: metadata.name.to_string(),
                    severity,
                    description: metadata.description.to_string(),
                    details: result.details,
                })
            })
            .collect();

        LintOutcome::Checked(LintReport {
            violations,
            threshold: self.threshold,
            authority_key_id: authority_key_id(&crl),
            issuer: crl.tbs_cert_list.issuer.to_string(),
        })
    }
}

/// Decode a `CertificateList` from the start of `der`, ignoring anything
/// that follows it.
fn decode_lenient(der: &[u8]) -> x509_cert::der::Result<CertificateList> {
    let mut reader = SliceReader::new(der)?;
    CertificateList::decode(&mut reader)
}

fn authority_key_id(crl: &CertificateList) -> Option<String> {
    let ext = crl
        .tbs_cert_list
        .crl_extensions
        .as_ref()?
        .iter()
        .find(|ext| ext.extn_id == OID_AUTHORITY_KEY_IDENTIFIER)?;
    let aki = AuthorityKeyIdentifier::from_der(ext.extn_value.as_bytes()).ok()?;
    aki.key_identifier.map(|id| hex::encode(id.as_bytes()))
}
