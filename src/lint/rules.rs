//! Built-in CRL rules
//!
//! Each rule inspects a decoded [`CertificateList`]. Rule names follow the
//! usual `e_`/`w_` prefix convention for the severity a failure produces.

use config::{Config, ConfigError};
use serde::Deserialize;
use time::{Duration, OffsetDateTime};
use x509_cert::crl::CertificateList;
use x509_cert::der::asn1::ObjectIdentifier;
use x509_cert::time::Time;
use x509_cert::Version;

use super::types::{LintStatus, RuleResult};

pub const OID_AUTHORITY_KEY_IDENTIFIER: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("2.5.29.35");
pub const OID_CRL_NUMBER: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.29.20");

/// Static description of a rule
#[derive(Debug)]
pub struct LintMetadata {
    pub name: &'static str,
    pub description: &'static str,
    pub citation: &'static str,
}

/// A single compliance rule
pub trait CrlLint: Send + Sync {
    fn metadata(&self) -> &LintMetadata;

    /// Apply rule settings from the rule filter. Rules without settings keep
    /// the default implementation.
    fn configure(&mut self, _settings: &Config) -> Result<(), ConfigError> {
        Ok(())
    }

    fn execute(&self, crl: &CertificateList) -> RuleResult;
}

/// Every rule shipped with the crate, in registry order.
pub fn builtin() -> Vec<Box<dyn CrlLint>> {
    vec![
        Box::new(NextUpdateInvalid::default()),
        Box::new(MissingNextUpdate),
        Box::new(MissingAuthorityKeyIdentifier),
        Box::new(MissingCrlNumber),
        Box::new(EmptyRevokedCertificates),
        Box::new(VersionNotV2),
    ]
}

fn to_datetime(time: &Time) -> Option<OffsetDateTime> {
    let secs = i64::try_from(time.to_unix_duration().as_secs()).ok()?;
    OffsetDateTime::from_unix_timestamp(secs).ok()
}

fn has_extension(crl: &CertificateList, oid: ObjectIdentifier) -> bool {
    crl.tbs_cert_list
        .crl_extensions
        .as_ref()
        .is_some_and(|exts| exts.iter().any(|ext| ext.extn_id == oid))
}

#[derive(Debug, Deserialize)]
struct NextUpdateSettings {
    #[serde(default = "default_subscriber_crl")]
    subscriber_crl: bool,
}

fn default_subscriber_crl() -> bool {
    true
}

/// nextUpdate must not be more than 10 days after thisUpdate for CRLs
/// covering subscriber certificates, or 12 months for CRLs covering CA
/// certificates.
#[derive(Debug)]
pub struct NextUpdateInvalid {
    subscriber_crl: bool,
}

impl Default for NextUpdateInvalid {
    fn default() -> Self {
        Self {
            subscriber_crl: default_subscriber_crl(),
        }
    }
}

impl NextUpdateInvalid {
    const METADATA: LintMetadata = LintMetadata {
        name: "e_crl_next_update_invalid",
        description: "nextUpdate must be at most 10 days (subscriber CRLs) or 12 months (CA CRLs) after thisUpdate",
        citation: "BRs: 4.9.7",
    };

    pub fn subscriber_crl(&self) -> bool {
        self.subscriber_crl
    }
}

impl CrlLint for NextUpdateInvalid {
    fn metadata(&self) -> &LintMetadata {
        &Self::METADATA
    }

    fn configure(&mut self, settings: &Config) -> Result<(), ConfigError> {
        match settings.get::<NextUpdateSettings>(Self::METADATA.name) {
            Ok(s) => self.subscriber_crl = s.subscriber_crl,
            Err(ConfigError::NotFound(_)) => {}
            Err(e) => return Err(e),
        }
        Ok(())
    }

    fn execute(&self, crl: &CertificateList) -> RuleResult {
        let tbs = &crl.tbs_cert_list;
        let Some(next_update) = tbs.next_update.as_ref() else {
            return RuleResult::not_applicable();
        };
        let (Some(this_update), Some(next_update)) =
            (to_datetime(&tbs.this_update), to_datetime(next_update))
        else {
            return RuleResult::with_status(LintStatus::Fatal, "CRL times are out of range");
        };

        if next_update < this_update {
            return RuleResult::with_status(LintStatus::Error, "nextUpdate precedes thisUpdate");
        }

        let limit = if self.subscriber_crl {
            this_update.checked_add(Duration::days(10))
        } else {
            this_update
                .replace_year(this_update.year() + 1)
                .ok()
                .or_else(|| this_update.checked_add(Duration::days(365)))
        };
        let Some(limit) = limit else {
            return RuleResult::with_status(
                LintStatus::Fatal,
                format!("thisUpdate {this_update} leaves no room for a nextUpdate limit"),
            );
        };

        if next_update > limit {
            return RuleResult::with_status(
                LintStatus::Error,
                format!("nextUpdate {next_update} is later than {limit}"),
            );
        }
        RuleResult::pass()
    }
}

/// CRLs must carry a nextUpdate field.
#[derive(Debug)]
pub struct MissingNextUpdate;

impl MissingNextUpdate {
    const METADATA: LintMetadata = LintMetadata {
        name: "e_crl_missing_next_update",
        description: "CRLs must include the nextUpdate field",
        citation: "RFC 5280: 5.1.2.5",
    };
}

impl CrlLint for MissingNextUpdate {
    fn metadata(&self) -> &LintMetadata {
        &Self::METADATA
    }

    fn execute(&self, crl: &CertificateList) -> RuleResult {
        if crl.tbs_cert_list.next_update.is_some() {
            RuleResult::pass()
        } else {
            RuleResult::with_status(LintStatus::Error, "nextUpdate is absent")
        }
    }
}

#[derive(Debug)]
pub struct MissingAuthorityKeyIdentifier;

impl MissingAuthorityKeyIdentifier {
    const METADATA: LintMetadata = LintMetadata {
        name: "e_crl_missing_authority_key_identifier",
        description: "CRLs must include the authority key identifier extension",
        citation: "RFC 5280: 5.2.1",
    };
}

impl CrlLint for MissingAuthorityKeyIdentifier {
    fn metadata(&self) -> &LintMetadata {
        &Self::METADATA
    }

    fn execute(&self, crl: &CertificateList) -> RuleResult {
        if has_extension(crl, OID_AUTHORITY_KEY_IDENTIFIER) {
            RuleResult::pass()
        } else {
            RuleResult::with_status(LintStatus::Error, "authorityKeyIdentifier is absent")
        }
    }
}

#[derive(Debug)]
pub struct MissingCrlNumber;

impl MissingCrlNumber {
    const METADATA: LintMetadata = LintMetadata {
        name: "e_crl_missing_crl_number",
        description: "CRLs must include the CRL number extension",
        citation: "RFC 5280: 5.2.3",
    };
}

impl CrlLint for MissingCrlNumber {
    fn metadata(&self) -> &LintMetadata {
        &Self::METADATA
    }

    fn execute(&self, crl: &CertificateList) -> RuleResult {
        if has_extension(crl, OID_CRL_NUMBER) {
            RuleResult::pass()
        } else {
            RuleResult::with_status(LintStatus::Error, "cRLNumber is absent")
        }
    }
}

/// When there are no revoked certificates the field must be omitted rather
/// than encoded as an empty sequence.
#[derive(Debug)]
pub struct EmptyRevokedCertificates;

impl EmptyRevokedCertificates {
    const METADATA: LintMetadata = LintMetadata {
        name: "e_crl_empty_revoked_certificates",
        description: "revokedCertificates must be absent when no certificates are revoked",
        citation: "RFC 5280: 5.1.2.6",
    };
}

impl CrlLint for EmptyRevokedCertificates {
    fn metadata(&self) -> &LintMetadata {
        &Self::METADATA
    }

    fn execute(&self, crl: &CertificateList) -> RuleResult {
        match &crl.tbs_cert_list.revoked_certificates {
            Some(revoked) if revoked.is_empty() => RuleResult::with_status(
                LintStatus::Error,
                "revokedCertificates is present but empty",
            ),
            _ => RuleResult::pass(),
        }
    }
}

#[derive(Debug)]
pub struct VersionNotV2;

impl VersionNotV2 {
    const METADATA: LintMetadata = LintMetadata {
        name: "e_crl_version_not_v2",
        description: "CRLs carrying extensions must be version 2",
        citation: "RFC 5280: 5.1.2.1",
    };
}

impl CrlLint for VersionNotV2 {
    fn metadata(&self) -> &LintMetadata {
        &Self::METADATA
    }

    fn execute(&self, crl: &CertificateList) -> RuleResult {
        let tbs = &crl.tbs_cert_list;
        if tbs.crl_extensions.is_none() {
            return RuleResult::not_applicable();
        }
        if tbs.version == Version::V2 {
            RuleResult::pass()
        } else {
            RuleResult::with_status(
                LintStatus::Error,
                format!("version is {:?} but extensions are present", tbs.version),
            )
        }
    }
}
