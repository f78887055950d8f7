use std::path::Path;

use time::OffsetDateTime;
use tracing::debug;
use x509_parser::pem::parse_x509_pem;

use crate::pki::truststore::TrustStore;

use super::errors::{CrlError, CrlResult};
use super::types::{CrlValidation, ParsedCrl, ValidationOutcome};

const PEM_LABEL_CRL: &str = "X509 CRL";

/// Strip a PEM envelope if present. DER input is returned unchanged.
pub fn unwrap_pem(data: &[u8]) -> CrlResult<Vec<u8>> {
    let trimmed = data.trim_ascii_start();
    if !trimmed.starts_with(b"-----BEGIN") {
        return Ok(data.to_vec());
    }

    let (_, pem) = parse_x509_pem(trimmed).map_err(|e| CrlError::Pem(e.to_string()))?;
    if pem.label != PEM_LABEL_CRL {
        return Err(CrlError::Pem(format!(
            "expected {} block, found {}",
            PEM_LABEL_CRL, pem.label
        )));
    }
    Ok(pem.contents)
}

/// Decode a cached CRL file and verify it against the trust store.
///
/// Never fails: every problem ends up in the returned outcome.
pub fn validate(
    path: &Path,
    data: &[u8],
    trust_store: &TrustStore,
    now: OffsetDateTime,
) -> CrlValidation {
    let path = path.to_path_buf();

    if data.is_empty() {
        return CrlValidation {
            outcome: ValidationOutcome::DecodeFailed {
                path,
                message: "empty file".to_string(),
            },
            crl: None,
            freshness: None,
            der: Vec::new(),
            corrupt: true,
        };
    }

    let der = match unwrap_pem(data) {
        Ok(der) => der,
        Err(e) => {
            return CrlValidation {
                outcome: ValidationOutcome::DecodeFailed {
                    path,
                    message: e.to_string(),
                },
                crl: None,
                freshness: None,
                der: data.to_vec(),
                corrupt: false,
            };
        }
    };

    let crl = match ParsedCrl::from_der(der.clone()) {
        Ok(crl) => crl,
        Err(e) => {
            debug!("Failed to decode {}: {}", path.display(), e);
            return CrlValidation {
                outcome: ValidationOutcome::DecodeFailed {
                    path,
                    message: e.to_string(),
                },
                crl: None,
                freshness: None,
                der,
                corrupt: false,
            };
        }
    };

    let freshness = Some(crl.freshness(now));

    let outcome = match trust_store.get_by_subject(&crl.issuer) {
        None => ValidationOutcome::IssuerUnknown {
            path,
            message: format!("no trusted certificate for {}", crl.issuer),
        },
        Some(issuer) => match crl.verify_signature(issuer) {
            Ok(()) => ValidationOutcome::Verified {
                path,
                message: format!("signed by {}", issuer.subject),
            },
            Err(e) => ValidationOutcome::SignatureInvalid {
                path,
                message: e.to_string(),
            },
        },
    };

    CrlValidation {
        outcome,
        crl: Some(crl),
        freshness,
        der,
        corrupt: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_der_passes_through() {
        let data = [0x30, 0x03, 0x02, 0x01, 0x00];
        assert_eq!(unwrap_pem(&data).unwrap(), data.to_vec());
    }

    #[test]
    fn test_pem_label_must_be_crl() {
        let pem = b"-----BEGIN CERTIFICATE-----\nMAA=\n-----END CERTIFICATE-----\n";
        assert!(matches!(unwrap_pem(pem), Err(CrlError::Pem(_))));
    }

    #[test]
    fn test_pem_crl_is_unwrapped() {
        let pem = b"-----BEGIN X509 CRL-----\nMAA=\n-----END X509 CRL-----\n";
        assert_eq!(unwrap_pem(pem).unwrap(), vec![0x30, 0x00]);
    }

    #[test]
    fn test_empty_file_is_corrupt() {
        let result = validate(
            &PathBuf::from("crls/empty.crl"),
            &[],
            &TrustStore::default(),
            OffsetDateTime::now_utc(),
        );
        assert!(result.corrupt);
        assert!(matches!(result.outcome, ValidationOutcome::DecodeFailed { .. }));
    }

    #[test]
    fn test_garbage_is_decode_failure() {
        let result = validate(
            &PathBuf::from("crls/bad.crl"),
            b"garbage",
            &TrustStore::default(),
            OffsetDateTime::now_utc(),
        );
        assert!(!result.corrupt);
        assert!(result.crl.is_none());
        assert!(result.freshness.is_none());
        assert!(matches!(result.outcome, ValidationOutcome::DecodeFailed { .. }));
    }
}
