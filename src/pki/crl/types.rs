use std::fmt;
use std::path::{Path, PathBuf};

use ::time::OffsetDateTime;
use x509_parser::extensions::ParsedExtension;
use x509_parser::objects::{oid_registry, oid2sn};
use x509_parser::prelude::*;

use crate::pki::truststore::{IntermediateCertificate, normalize_dn};

use super::errors::{CrlError, CrlResult};

/// One revoked certificate listed in a CRL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevokedEntry {
    /// Serial number as colon separated hex
    pub serial: String,
    pub revocation_time: OffsetDateTime,
}

/// A CRL that passed the strict decoder
#[derive(Debug, Clone)]
pub struct ParsedCrl {
    pub issuer: String,
    pub signature_algorithm: String,
    pub this_update: OffsetDateTime,
    pub next_update: Option<OffsetDateTime>,
    pub revoked: Vec<RevokedEntry>,
    /// Hex encoded key identifier of the authority key identifier extension
    pub authority_key_id: Option<String>,
    pub crl_number: Option<String>,
    /// The raw CRL data in DER format
    pub der_data: Vec<u8>,
}

impl ParsedCrl {
    /// Decode a DER encoded CRL.
    ///
    /// Trailing bytes after the CRL structure are rejected.
    pub fn from_der(der_data: Vec<u8>) -> CrlResult<Self> {
        let (rem, crl) =
            CertificateRevocationList::from_der(&der_data).map_err(|e| CrlError::Parse(e.into()))?;
        if !rem.is_empty() {
            return Err(CrlError::TrailingData(rem.len()));
        }

        let revoked = crl
            .iter_revoked_certificates()
            .map(|entry| RevokedEntry {
                serial: entry.raw_serial_as_string(),
                revocation_time: entry.revocation_date.to_datetime(),
            })
            .collect();

        let authority_key_id = crl
            .extensions()
            .iter()
            .find_map(|ext| match ext.parsed_extension() {
                ParsedExtension::AuthorityKeyIdentifier(aki) => {
                    aki.key_identifier.as_ref().map(|id| hex::encode(id.0))
                }
                _ => None,
            });

        let issuer = normalize_dn(&crl.issuer().to_string());
        let signature_algorithm = signature_algorithm_name(&crl.signature_algorithm);
        let this_update = crl.last_update().to_datetime();
        let next_update = crl.next_update().map(|t| t.to_datetime());
        let crl_number = crl.crl_number().map(|n| n.to_string());
        drop(crl);

        Ok(Self {
            issuer,
            signature_algorithm,
            this_update,
            next_update,
            revoked,
            authority_key_id,
            crl_number,
            der_data,
        })
    }

    /// Parse the CRL from the stored DER bytes
    fn parse(&self) -> CrlResult<CertificateRevocationList<'_>> {
        let (_, crl) = CertificateRevocationList::from_der(&self.der_data)
            .map_err(|e| CrlError::Parse(e.into()))?;
        Ok(crl)
    }

    pub fn revoked_count(&self) -> usize {
        self.revoked.len()
    }

    /// Verify the CRL signature with the key of `issuer`.
    ///
    /// An issuer certificate whose key usage extension lacks `cRLSign` is not
    /// allowed to sign CRLs, whatever the signature says.
    pub fn verify_signature(&self, issuer: &IntermediateCertificate) -> CrlResult<()> {
        let crl = self.parse()?;
        let issuer_cert = issuer.parse()?;

        if let Ok(Some(key_usage)) = issuer_cert.key_usage()
            && !key_usage.value.crl_sign()
        {
            return Err(CrlError::UnauthorizedIssuer);
        }

        x509_parser::verify::verify_signature(
            issuer_cert.public_key(),
            &crl.signature_algorithm,
            &crl.signature_value,
            crl.tbs_cert_list.as_ref(),
        )
        .map_err(|_| CrlError::SignatureVerification)
    }

    pub fn freshness(&self, now: OffsetDateTime) -> Freshness {
        Freshness::classify(self.next_update, now)
    }
}

fn signature_algorithm_name(algorithm: &AlgorithmIdentifier) -> String {
    oid2sn(&algorithm.algorithm, oid_registry())
        .map(str::to_string)
        .unwrap_or_else(|_| algorithm.algorithm.to_id_string())
}

/// Whether a CRL is still within its validity window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Current,
    Expired,
    /// The CRL has no nextUpdate
    Unbounded,
}

impl Freshness {
    /// A CRL is expired strictly after its nextUpdate.
    pub fn classify(next_update: Option<OffsetDateTime>, now: OffsetDateTime) -> Self {
        match next_update {
            None => Freshness::Unbounded,
            Some(next_update) if now > next_update => Freshness::Expired,
            Some(_) => Freshness::Current,
        }
    }
}

/// Terminal state of validating one cached file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationOutcome {
    Verified { path: PathBuf, message: String },
    IssuerUnknown { path: PathBuf, message: String },
    SignatureInvalid { path: PathBuf, message: String },
    DecodeFailed { path: PathBuf, message: String },
}

impl ValidationOutcome {
    pub fn path(&self) -> &Path {
        match self {
            ValidationOutcome::Verified { path, .. }
            | ValidationOutcome::IssuerUnknown { path, .. }
            | ValidationOutcome::SignatureInvalid { path, .. }
            | ValidationOutcome::DecodeFailed { path, .. } => path,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ValidationOutcome::Verified { message, .. }
            | ValidationOutcome::IssuerUnknown { message, .. }
            | ValidationOutcome::SignatureInvalid { message, .. }
            | ValidationOutcome::DecodeFailed { message, .. } => message,
        }
    }

    pub fn is_verified(&self) -> bool {
        matches!(self, ValidationOutcome::Verified { .. })
    }
}

impl fmt::Display for ValidationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ValidationOutcome::Verified { .. } => "verified",
            ValidationOutcome::IssuerUnknown { .. } => "issuer unknown",
            ValidationOutcome::SignatureInvalid { .. } => "signature invalid",
            ValidationOutcome::DecodeFailed { .. } => "decode failed",
        };
        write!(f, "{}: {} ({})", self.path().display(), label, self.message())
    }
}

/// Everything learned about one cached file
#[derive(Debug, Clone)]
pub struct CrlValidation {
    pub outcome: ValidationOutcome,
    /// Present whenever the strict decode succeeded
    pub crl: Option<ParsedCrl>,
    pub freshness: Option<Freshness>,
    /// CRL bytes with any PEM envelope removed
    pub der: Vec<u8>,
    /// The file was empty and should be removed from the cache
    pub corrupt: bool,
}

/// Result of a conditional download
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    Downloaded { bytes: u64 },
    NotModified,
}

/// One URL to download into one cache file
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FetchTask {
    pub url: String,
    pub dest: PathBuf,
}
