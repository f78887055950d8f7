pub mod crl;
pub mod truststore;

// Re-export commonly used types
pub use truststore::{IntermediateCertificate, TrustStore, TrustStoreError};
