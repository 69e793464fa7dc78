//! Serving certificate for the webhook endpoint

use chrono::{DateTime, Utc};
use rcgen::{CertificateParams, DistinguishedName, DnType, IsCa};
use tracing::debug;

use super::extensions::{self, KeyUsage};
use super::{generate_key_pair, validity_window, CertificateAuthority, SerialNumberSource};
use crate::error::{Error, Result};

/// A signed leaf certificate and its private key, both PEM
#[derive(Clone, PartialEq, Eq)]
pub struct LeafCertificate {
    pub cert_pem: String,
    pub key_pem: String,
}

impl std::fmt::Debug for LeafCertificate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeafCertificate")
            .field("cert_pem", &self.cert_pem)
            .finish_non_exhaustive()
    }
}

/// Issues the webhook's serving certificate for one DNS name
#[derive(Debug, Clone)]
pub struct LeafCertificateIssuer {
    dns_endpoint: String,
    serials: SerialNumberSource,
}

impl LeafCertificateIssuer {
    pub fn new(dns_endpoint: impl Into<String>) -> Self {
        Self {
            dns_endpoint: dns_endpoint.into(),
            serials: SerialNumberSource::new(),
        }
    }

    /// Issue a leaf signed by `ca`, valid from `now`.
    ///
    /// A new key pair is generated on every call; renewing a leaf always
    /// rotates its key.
    pub fn issue(&self, ca: &CertificateAuthority, now: DateTime<Utc>) -> Result<LeafCertificate> {
        let key_pair = generate_key_pair()?;
        let (not_before, not_after) = validity_window(now)?;

        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, self.dns_endpoint.as_str());

        let mut params = CertificateParams::default();
        params.distinguished_name = dn;
        params.serial_number = Some(self.serials.next());
        params.not_before = not_before;
        params.not_after = not_after;
        params.is_ca = IsCa::NoCa;
        params.use_authority_key_identifier_extension = false;
        params.custom_extensions = vec![
            extensions::basic_constraints(false),
            extensions::authority_key_identifier(&ca.subject_key_id()),
            extensions::key_usage(&[KeyUsage::DigitalSignature, KeyUsage::KeyEncipherment]),
            extensions::server_auth_extended_key_usage(),
            extensions::dns_subject_alt_name(&self.dns_endpoint),
        ];

        let cert = params
            .signed_by(&key_pair, ca.issuer(), ca.key_pair())
            .map_err(|e| Error::CryptoError(format!("failed to sign leaf certificate: {e}")))?;

        debug!(dns_endpoint = %self.dns_endpoint, "Issued leaf certificate");

        Ok(LeafCertificate {
            cert_pem: cert.pem(),
            key_pem: key_pair.serialize_pem(),
        })
    }
}
