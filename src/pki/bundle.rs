//! The persisted trust bundle and its wire encoding
//!
//! In the Secret each PEM document lives under a fixed key, base64-encoded
//! like any other Secret `data` value:
//!
//! | field       | key        |
//! |-------------|------------|
//! | CA cert     | `ca.cert`  |
//! | CA key      | `ca.key`   |
//! | leaf cert   | `tls.cert` |
//! | leaf key    | `tls.key`  |

use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use k8s_openapi::ByteString;

use super::{CertificateAuthority, LeafCertificate};
use crate::error::{Error, Result};

pub const CA_CERT_KEY: &str = "ca.cert";
pub const CA_KEY_KEY: &str = "ca.key";
pub const TLS_CERT_KEY: &str = "tls.cert";
pub const TLS_KEY_KEY: &str = "tls.key";

/// CA and leaf material, all PEM. The unit that is persisted and published.
#[derive(Clone, PartialEq, Eq)]
pub struct TrustBundle {
    pub ca_cert: String,
    pub ca_key: String,
    pub leaf_cert: String,
    pub leaf_key: String,
}

impl std::fmt::Debug for TrustBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrustBundle")
            .field("ca_cert", &self.ca_cert)
            .field("leaf_cert", &self.leaf_cert)
            .finish_non_exhaustive()
    }
}

impl TrustBundle {
    pub fn new(ca: &CertificateAuthority, leaf: LeafCertificate) -> Self {
        Self {
            ca_cert: ca.cert_pem().to_string(),
            ca_key: ca.key_pem(),
            leaf_cert: leaf.cert_pem,
            leaf_key: leaf.key_pem,
        }
    }

    /// Rebuild the CA held in this bundle
    pub fn certificate_authority(&self) -> Result<CertificateAuthority> {
        CertificateAuthority::from_pem(&self.ca_cert, &self.ca_key)
    }

    /// Secret `data` map with base64 values, ready for a JSON patch body
    pub fn to_wire(&self) -> BTreeMap<String, String> {
        self.fields()
            .into_iter()
            .map(|(key, pem)| (key.to_string(), encode_field(pem)))
            .collect()
    }

    /// Inverse of [`TrustBundle::to_wire`]
    pub fn from_wire(data: &BTreeMap<String, String>) -> Result<Self> {
        let field = |key: &str| -> Result<String> {
            let value = data
                .get(key)
                .ok_or_else(|| Error::EncodingError(format!("missing key {key}")))?;
            decode_field(value)
                .map_err(|e| Error::EncodingError(format!("{key}: {e}")))
        };
        Ok(Self {
            ca_cert: field(CA_CERT_KEY)?,
            ca_key: field(CA_KEY_KEY)?,
            leaf_cert: field(TLS_CERT_KEY)?,
            leaf_key: field(TLS_KEY_KEY)?,
        })
    }

    /// Decode from a Secret's `data`, whose base64 layer the API client has
    /// already removed.
    pub fn from_secret_data(data: &BTreeMap<String, ByteString>) -> Result<Self> {
        let field = |key: &str| -> Result<String> {
            let value = data
                .get(key)
                .ok_or_else(|| Error::EncodingError(format!("missing key {key}")))?;
            pem_from_bytes(&value.0).map_err(|e| Error::EncodingError(format!("{key}: {e}")))
        };
        Ok(Self {
            ca_cert: field(CA_CERT_KEY)?,
            ca_key: field(CA_KEY_KEY)?,
            leaf_cert: field(TLS_CERT_KEY)?,
            leaf_key: field(TLS_KEY_KEY)?,
        })
    }

    fn fields(&self) -> [(&'static str, &str); 4] {
        [
            (CA_CERT_KEY, self.ca_cert.as_str()),
            (CA_KEY_KEY, self.ca_key.as_str()),
            (TLS_CERT_KEY, self.leaf_cert.as_str()),
            (TLS_KEY_KEY, self.leaf_key.as_str()),
        ]
    }
}

/// base64 of the UTF-8 PEM text
pub fn encode_field(pem: &str) -> String {
    STANDARD.encode(pem.as_bytes())
}

pub fn decode_field(encoded: &str) -> Result<String> {
    let bytes = STANDARD
        .decode(encoded.trim())
        .map_err(|e| Error::EncodingError(format!("invalid base64: {e}")))?;
    pem_from_bytes(&bytes)
}

/// PEM text from raw bytes; empty input counts as missing
pub fn pem_from_bytes(bytes: &[u8]) -> Result<String> {
    if bytes.is_empty() {
        return Err(Error::EncodingError("empty value".to_string()));
    }
    String::from_utf8(bytes.to_vec())
        .map_err(|e| Error::EncodingError(format!("invalid UTF-8: {e}")))
}
