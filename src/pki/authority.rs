//! Self-signed certificate authority for the webhook serving certificate

use chrono::{DateTime, Utc};
use rcgen::{Certificate, CertificateParams, DistinguishedName, DnType, IsCa, KeyPair};
use tracing::debug;

use super::extensions::{self, KeyUsage};
use super::{
    generate_key_pair, key_identifier, load_key_pair, validity_window, SerialNumberSource,
};
use crate::error::{Error, Result};

/// A CA certificate together with its key pair.
///
/// `cert_pem` is kept verbatim: a CA loaded from storage re-publishes the
/// exact bytes it was loaded from, never a re-encoding.
pub struct CertificateAuthority {
    /// Issuer handle used by rcgen when signing leaves
    issuer: Certificate,
    cert_pem: String,
    key_pair: KeyPair,
}

impl CertificateAuthority {
    /// Rebuild a CA from its stored certificate and private key
    pub fn from_pem(cert_pem: &str, key_pem: &str) -> Result<Self> {
        let key_pair = load_key_pair(key_pem)?;

        let params = CertificateParams::from_ca_cert_pem(cert_pem)
            .map_err(|e| Error::CryptoError(format!("failed to parse CA certificate: {e}")))?;

        // rcgen signs leaves against a `Certificate`; only its subject DN and
        // the key are used, so the re-signed copy never leaves this struct.
        let issuer = params
            .self_signed(&key_pair)
            .map_err(|e| Error::CryptoError(format!("failed to load CA issuer: {e}")))?;

        Ok(Self {
            issuer,
            cert_pem: cert_pem.to_string(),
            key_pair,
        })
    }

    /// PEM-encoded CA certificate, as published in the webhook caBundle
    pub fn cert_pem(&self) -> &str {
        &self.cert_pem
    }

    /// PKCS#8 PEM of the CA private key
    pub fn key_pem(&self) -> String {
        self.key_pair.serialize_pem()
    }

    pub fn key_pair(&self) -> &KeyPair {
        &self.key_pair
    }

    /// Give up the key pair, e.g. to reissue the certificate around it
    pub fn into_key_pair(self) -> KeyPair {
        self.key_pair
    }

    /// subjectKeyIdentifier of this CA; every leaf's authorityKeyIdentifier
    pub fn subject_key_id(&self) -> Vec<u8> {
        key_identifier(&self.key_pair)
    }

    pub(crate) fn issuer(&self) -> &Certificate {
        &self.issuer
    }
}

impl std::fmt::Debug for CertificateAuthority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateAuthority")
            .field("cert_pem", &self.cert_pem)
            .finish_non_exhaustive()
    }
}

/// Issues the self-signed CA
#[derive(Debug, Clone)]
pub struct CertificateAuthorityIssuer {
    common_name: String,
    serials: SerialNumberSource,
}

impl CertificateAuthorityIssuer {
    pub fn new(common_name: impl Into<String>) -> Self {
        Self {
            common_name: common_name.into(),
            serials: SerialNumberSource::new(),
        }
    }

    /// Issue a CA certificate valid from `now`.
    ///
    /// With `existing_key` the certificate is reissued around that key, so
    /// leaves signed by the previous certificate still verify against the new
    /// one. Without it a fresh key pair is generated.
    pub fn issue(
        &self,
        existing_key: Option<KeyPair>,
        now: DateTime<Utc>,
    ) -> Result<CertificateAuthority> {
        let reused = existing_key.is_some();
        let key_pair = match existing_key {
            Some(key) => key,
            None => generate_key_pair()?,
        };

        let (not_before, not_after) = validity_window(now)?;

        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, self.common_name.as_str());

        let mut params = CertificateParams::default();
        params.distinguished_name = dn;
        params.serial_number = Some(self.serials.next());
        params.not_before = not_before;
        params.not_after = not_after;
        // Extensions are written by hand below; keep rcgen from adding its own.
        params.is_ca = IsCa::NoCa;
        params.custom_extensions = vec![
            extensions::basic_constraints(true),
            extensions::subject_key_identifier(&key_identifier(&key_pair)),
            extensions::key_usage(&[
                KeyUsage::KeyCertSign,
                KeyUsage::CrlSign,
                KeyUsage::DigitalSignature,
                KeyUsage::KeyEncipherment,
            ]),
        ];

        let issuer = params
            .self_signed(&key_pair)
            .map_err(|e| Error::CryptoError(format!("failed to create CA certificate: {e}")))?;

        debug!(
            common_name = %self.common_name,
            reused_key = reused,
            "Issued CA certificate"
        );

        Ok(CertificateAuthority {
            cert_pem: issuer.pem(),
            issuer,
            key_pair,
        })
    }
}
