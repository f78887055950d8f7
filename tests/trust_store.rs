mod common;

use common::{gen_ca, gen_ca_with_restricted_twin};
use crl_watch::pki::{TrustStore, TrustStoreError};

#[test]
fn test_load_bundle() {
    let a = gen_ca("Intermediate A", "Example Org");
    let b = gen_ca("Intermediate B", "Example Org");
    let bundle = format!("{}{}", a.cert_pem, b.cert_pem);

    let store = TrustStore::from_pem(bundle.as_bytes()).unwrap();
    assert_eq!(store.len(), 2);
    assert!(
        store
            .get_by_subject("CN=Intermediate A, O=Example Org")
            .is_some()
    );
    assert!(store.get_by_subject("CN=Nobody, O=Example Org").is_none());
}

#[test]
fn test_identical_duplicates_are_collapsed() {
    let a = gen_ca("Intermediate A", "Example Org");
    let bundle = format!("{}{}", a.cert_pem, a.cert_pem);

    let store = TrustStore::from_pem(bundle.as_bytes()).unwrap();
    assert_eq!(store.len(), 1);
}

#[test]
fn test_conflicting_subjects_are_rejected() {
    let (ca, twin) = gen_ca_with_restricted_twin("Intermediate A", "Example Org");
    let bundle = format!("{}{}", ca.cert_pem, twin);

    let err = TrustStore::from_pem(bundle.as_bytes()).unwrap_err();
    assert!(matches!(err, TrustStoreError::DuplicateSubject(dn) if dn.contains("Intermediate A")));
}

#[test]
fn test_load_directory() {
    let dir = tempfile::tempdir().unwrap();
    let a = gen_ca("Intermediate A", "Example Org");
    let b = gen_ca("Intermediate B", "Other Org");

    std::fs::write(dir.path().join("a.pem"), &a.cert_pem).unwrap();
    std::fs::create_dir(dir.path().join("nested")).unwrap();
    std::fs::write(dir.path().join("nested").join("b.der"), &b.cert_der).unwrap();
    std::fs::write(dir.path().join("README.txt"), "not a certificate").unwrap();

    let store = TrustStore::load(dir.path()).unwrap();
    assert_eq!(store.len(), 2);
    assert!(store.get_by_subject("CN=Intermediate B, O=Other Org").is_some());
}

#[test]
fn test_undecodable_certificate_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let a = gen_ca("Intermediate A", "Example Org");
    let broken = "-----BEGIN CERTIFICATE-----\nMIIBAAAA\n-----END CERTIFICATE-----\n";
    let path = dir.path().join("bundle.pem");
    std::fs::write(&path, format!("{}{}", a.cert_pem, broken)).unwrap();

    assert!(matches!(
        TrustStore::load(&path),
        Err(TrustStoreError::X509 { .. })
    ));
}
