//! Signature verification seam and IdP certificate checks.
//!
//! XML canonicalization and signature cryptography are delegated to a
//! [`SignatureVerifier`]. This module only decodes and structurally
//! validates the configured X.509 certificate.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use x509_parser::prelude::{FromDer, X509Certificate};

use crate::error::{SamlError, SamlResult};

/// Verifies XML signatures on SAML responses.
pub trait SignatureVerifier: Send + Sync {
    /// Verifies the signature(s) in `xml` against the IdP certificate.
    ///
    /// Returns an error when the signature does not verify.
    fn verify(&self, xml: &str, certificate_der: &[u8]) -> SamlResult<()>;
}

/// Summary of a parsed certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateInfo {
    /// Subject distinguished name.
    pub subject: String,
    /// Issuer distinguished name.
    pub issuer: String,
    /// Start of validity.
    pub not_before: DateTime<Utc>,
    /// End of validity.
    pub not_after: DateTime<Utc>,
}

/// Decodes a PEM or bare base64 certificate to DER.
pub fn certificate_der(certificate: &str) -> SamlResult<Vec<u8>> {
    let body: String = if certificate.contains("-----BEGIN") {
        certificate
            .lines()
            .filter(|line| !line.starts_with("-----"))
            .collect()
    } else {
        certificate.to_string()
    };
    let compact: String = body.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    if compact.is_empty() {
        return Err(SamlError::InvalidCertificate("certificate is empty".to_string()));
    }
    STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| SamlError::InvalidCertificate(format!("not base64: {e}")))
}

/// Parses a certificate and checks that it is valid at `now`.
pub fn validate_certificate(certificate: &str, now: DateTime<Utc>) -> SamlResult<CertificateInfo> {
    let der = certificate_der(certificate)?;
    let (_, cert) = X509Certificate::from_der(&der)
        .map_err(|e| SamlError::InvalidCertificate(format!("not an X.509 certificate: {e}")))?;

    let validity = cert.validity();
    let not_before = timestamp(validity.not_before.timestamp())?;
    let not_after = timestamp(validity.not_after.timestamp())?;

    let info = CertificateInfo {
        subject: cert.subject().to_string(),
        issuer: cert.issuer().to_string(),
        not_before,
        not_after,
    };

    if now > not_after {
        return Err(SamlError::InvalidCertificate(format!(
            "certificate expired at {}",
            not_after.to_rfc3339()
        )));
    }
    if now < not_before {
        return Err(SamlError::InvalidCertificate(format!(
            "certificate not valid before {}",
            not_before.to_rfc3339()
        )));
    }
    Ok(info)
}

fn timestamp(secs: i64) -> SamlResult<DateTime<Utc>> {
    Utc.timestamp_opt(secs, 0)
        .single()
        .ok_or_else(|| SamlError::InvalidCertificate(format!("validity out of range: {secs}")))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use rcgen::{date_time_ymd, CertificateParams, DnType, KeyPair};

    pub(crate) fn test_certificate_pem() -> String {
        let mut params = CertificateParams::default();
        params
            .distinguished_name
            .push(DnType::CommonName, "idp.example.com");
        let key_pair = KeyPair::generate().unwrap();
        params.self_signed(&key_pair).unwrap().pem()
    }

    fn expired_certificate_pem() -> String {
        let mut params = CertificateParams::default();
        params
            .distinguished_name
            .push(DnType::CommonName, "old.example.com");
        params.not_before = date_time_ymd(2001, 1, 1);
        params.not_after = date_time_ymd(2002, 1, 1);
        let key_pair = KeyPair::generate().unwrap();
        params.self_signed(&key_pair).unwrap().pem()
    }

    #[test]
    fn accepts_pem() {
        let info = validate_certificate(&test_certificate_pem(), Utc::now()).unwrap();
        assert!(info.subject.contains("idp.example.com"));
        assert!(info.not_after > Utc::now());
    }

    #[test]
    fn accepts_bare_base64_der() {
        let pem = test_certificate_pem();
        let bare: String = pem.lines().filter(|l| !l.starts_with("-----")).collect();
        assert!(validate_certificate(&bare, Utc::now()).is_ok());
    }

    #[test]
    fn rejects_expired() {
        let err = validate_certificate(&expired_certificate_pem(), Utc::now()).unwrap_err();
        assert!(err.to_string().contains("expired"), "{err}");
    }

    #[test]
    fn rejects_garbage() {
        assert!(validate_certificate("", Utc::now()).is_err());
        assert!(validate_certificate("!!!", Utc::now()).is_err());
        let not_a_cert = STANDARD.encode(b"hello world");
        assert!(matches!(
            validate_certificate(&not_a_cert, Utc::now()),
            Err(SamlError::InvalidCertificate(_))
        ));
    }
}
