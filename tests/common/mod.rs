#![allow(dead_code)]

use rcgen::{
    BasicConstraints, CertificateParams, CertificateRevocationListParams, DistinguishedName,
    DnType, IsCa, Issuer, KeyIdMethod, KeyPair, KeyUsagePurpose, RevokedCertParams, SerialNumber,
};
use time::{Duration, OffsetDateTime};

/// A CA able to sign CRLs, together with its self-signed certificate.
pub struct TestCa {
    pub issuer: Issuer<'static, KeyPair>,
    pub cert_der: Vec<u8>,
    pub cert_pem: String,
}

fn ca_params(common_name: &str, organization: &str, crl_sign: bool) -> CertificateParams {
    let mut params = CertificateParams::default();
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, common_name);
    dn.push(DnType::OrganizationName, organization);
    params.distinguished_name = dn;
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params.key_usages = if crl_sign {
        vec![KeyUsagePurpose::KeyCertSign, KeyUsagePurpose::CrlSign]
    } else {
        vec![KeyUsagePurpose::KeyCertSign]
    };
    params
}

pub fn gen_ca(common_name: &str, organization: &str) -> TestCa {
    let key_pair = KeyPair::generate().unwrap();
    let params = ca_params(common_name, organization, true);
    let cert = params.self_signed(&key_pair).unwrap();
    TestCa {
        cert_der: cert.der().to_vec(),
        cert_pem: cert.pem(),
        issuer: Issuer::new(params, key_pair),
    }
}

/// A CA plus a second certificate with the same subject and key whose key
/// usage lacks `cRLSign`.
pub fn gen_ca_with_restricted_twin(common_name: &str, organization: &str) -> (TestCa, String) {
    let key_pair = KeyPair::generate().unwrap();
    let restricted = ca_params(common_name, organization, false)
        .self_signed(&key_pair)
        .unwrap()
        .pem();

    let params = ca_params(common_name, organization, true);
    let cert = params.self_signed(&key_pair).unwrap();
    let ca = TestCa {
        cert_der: cert.der().to_vec(),
        cert_pem: cert.pem(),
        issuer: Issuer::new(params, key_pair),
    };
    (ca, restricted)
}

pub struct CrlOptions {
    pub revoked: u64,
    pub this_update: OffsetDateTime,
    pub next_update: OffsetDateTime,
}

impl Default for CrlOptions {
    fn default() -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            revoked: 0,
            this_update: now - Duration::hours(1),
            next_update: now + Duration::days(7),
        }
    }
}

fn crl_params(options: CrlOptions) -> CertificateRevocationListParams {
    let revoked_certs = (1..=options.revoked)
        .map(|serial| RevokedCertParams {
            serial_number: SerialNumber::from(serial),
            revocation_time: options.this_update,
            reason_code: None,
            invalidity_date: None,
        })
        .collect();

    CertificateRevocationListParams {
        this_update: options.this_update,
        next_update: options.next_update,
        crl_number: SerialNumber::from(1u64),
        issuing_distribution_point: None,
        revoked_certs,
        key_identifier_method: KeyIdMethod::Sha256,
    }
}

pub fn gen_crl_with(ca: &TestCa, options: CrlOptions) -> Vec<u8> {
    crl_params(options)
        .signed_by(&ca.issuer)
        .unwrap()
        .der()
        .to_vec()
}

/// PEM encoded CRL listing `revoked` certificates.
pub fn gen_crl_pem(ca: &TestCa, revoked: u64) -> String {
    crl_params(CrlOptions {
        revoked,
        ..Default::default()
    })
    .signed_by(&ca.issuer)
    .unwrap()
    .pem()
    .unwrap()
}

/// DER encoded CRL listing `revoked` certificates, valid for a week.
pub fn gen_crl(ca: &TestCa, revoked: u64) -> Vec<u8> {
    gen_crl_with(
        ca,
        CrlOptions {
            revoked,
            ..Default::default()
        },
    )
}

