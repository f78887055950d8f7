use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::path::Path;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};
use walkdir::WalkDir;
use x509_parser::pem::Pem;
use x509_parser::prelude::*;

/// Error type for trust store operations.
#[derive(Debug, Error)]
pub enum TrustStoreError {
    #[error("X.509 error in {source_name}: {error}")]
    X509 {
        source_name: String,
        error: X509Error,
    },

    #[error("Malformed PEM in {source_name}: {error}")]
    Pem {
        source_name: String,
        error: String,
    },

    #[error("Duplicate subject in trust store: {0}")]
    DuplicateSubject(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<walkdir::Error> for TrustStoreError {
    fn from(e: walkdir::Error) -> Self {
        TrustStoreError::Io(e.into())
    }
}

/// A trusted intermediate certificate.
#[derive(Debug, Clone)]
pub struct IntermediateCertificate {
    pub raw: Arc<Vec<u8>>,
    pub subject: String,
    pub serial_number: String,
}

impl IntermediateCertificate {
    /// Create a certificate entry from DER-encoded bytes
    pub fn from_der(der: impl AsRef<[u8]>) -> Result<Self, X509Error> {
        let der_bytes = der.as_ref();
        let (_, cert) = X509Certificate::from_der(der_bytes)?;

        Ok(Self {
            raw: Arc::new(der_bytes.to_vec()),
            subject: normalize_dn(&cert.subject().to_string()),
            serial_number: cert.raw_serial_as_string(),
        })
    }

    /// Parse the certificate from stored DER bytes
    pub fn parse(&self) -> Result<X509Certificate<'_>, X509Error> {
        let (_, cert) = X509Certificate::from_der(&self.raw)?;
        Ok(cert)
    }
}

/// Normalized form of a distinguished name used as trust store key.
pub fn normalize_dn(dn: &str) -> String {
    dn.trim().to_string()
}

/// Read-only set of trusted intermediates keyed by subject DN.
#[derive(Debug, Clone, Default)]
pub struct TrustStore {
    certificates: HashMap<String, IntermediateCertificate>,
}

impl TrustStore {
    /// Load a PEM bundle, or every bundle below a directory.
    ///
    /// Any certificate that fails to decode aborts the load: a partial trust
    /// store would silently turn verifiable CRLs into unknown ones.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, TrustStoreError> {
        let path = path.as_ref();
        let mut store = Self::default();

        if path.is_dir() {
            for entry in WalkDir::new(path).sort_by_file_name() {
                let entry = entry?;
                let file = entry.path();
                if entry.file_type().is_file() && has_certificate_extension(file) {
                    let data = std::fs::read(file)?;
                    store.add_bundle(&data, &file.display().to_string())?;
                }
            }
        } else {
            let data = std::fs::read(path)?;
            store.add_bundle(&data, &path.display().to_string())?;
        }

        info!(
            "Loaded {} trusted intermediates from {}",
            store.len(),
            path.display()
        );
        Ok(store)
    }

    /// Build a trust store from an in-memory PEM bundle.
    pub fn from_pem(data: &[u8]) -> Result<Self, TrustStoreError> {
        let mut store = Self::default();
        store.add_bundle(data, "<memory>")?;
        Ok(store)
    }

    /// Add all certificates of a bundle. Bundles without a PEM header are
    /// treated as a single DER certificate.
    fn add_bundle(&mut self, data: &[u8], source_name: &str) -> Result<(), TrustStoreError> {
        if !contains_pem_header(data) {
            let cert = IntermediateCertificate::from_der(data).map_err(|error| {
                TrustStoreError::X509 {
                    source_name: source_name.to_string(),
                    error,
                }
            })?;
            return self.insert(cert);
        }

        for pem in Pem::iter_from_buffer(data) {
            let pem = pem.map_err(|e| TrustStoreError::Pem {
                source_name: source_name.to_string(),
                error: e.to_string(),
            })?;

            if pem.label != "CERTIFICATE" {
                debug!("Skipping PEM block {} in {}", pem.label, source_name);
                continue;
            }

            let cert = IntermediateCertificate::from_der(&pem.contents).map_err(|error| {
                TrustStoreError::X509 {
                    source_name: source_name.to_string(),
                    error,
                }
            })?;
            self.insert(cert)?;
        }
        Ok(())
    }

    fn insert(&mut self, cert: IntermediateCertificate) -> Result<(), TrustStoreError> {
        match self.certificates.entry(cert.subject.clone()) {
            Entry::Vacant(slot) => {
                slot.insert(cert);
                Ok(())
            }
            Entry::Occupied(existing) if existing.get().raw == cert.raw => {
                debug!("Ignoring repeated certificate {}", cert.subject);
                Ok(())
            }
            Entry::Occupied(_) => Err(TrustStoreError::DuplicateSubject(cert.subject)),
        }
    }

    /// Look up the certificate whose subject equals `dn`.
    pub fn get_by_subject(&self, dn: &str) -> Option<&IntermediateCertificate> {
        self.certificates.get(&normalize_dn(dn))
    }

    pub fn len(&self) -> usize {
        self.certificates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.certificates.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &IntermediateCertificate> {
        self.certificates.values()
    }
}

fn has_certificate_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .is_some_and(|ext| {
            ["pem", "crt", "cer", "der"]
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
}

fn contains_pem_header(data: &[u8]) -> bool {
    data.windows(b"-----BEGIN".len())
        .any(|window| window == b"-----BEGIN")
}
