//! Consistency checks between the Secret copy and the webhook copy of the CA

use std::fmt;

use x509_parser::prelude::*;

use super::{pem_to_der, TrustBundle};

/// Why the stored trust state cannot be used as-is
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InconsistencyReason {
    /// No usable certificate Secret
    SecretMissing,
    /// The webhook configuration has no caBundle
    AnchorMissing,
    /// The Secret's CA and the webhook's caBundle differ
    AnchorMismatch,
    /// The serving certificate was not signed by the published CA
    LeafNotSignedByAnchor,
}

impl fmt::Display for InconsistencyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            InconsistencyReason::SecretMissing => "certificate secret missing",
            InconsistencyReason::AnchorMissing => "webhook caBundle missing",
            InconsistencyReason::AnchorMismatch => "secret CA differs from webhook caBundle",
            InconsistencyReason::LeafNotSignedByAnchor => {
                "serving certificate not signed by webhook caBundle"
            }
        };
        f.write_str(reason)
    }
}

/// Outcome of comparing the two stored projections of the trust bundle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrustCheck {
    Consistent,
    Inconsistent(InconsistencyReason),
}


/// Signature and equality checks over PEM certificates. Stateless.
pub struct TrustValidator;

impl TrustValidator {
    /// Whether `leaf_pem` carries a valid signature from the key in `ca_pem`.
    ///
    /// Anything that fails to parse counts as not signed.
    pub fn signed_by(leaf_pem: &str, ca_pem: &str) -> bool {
        let (Ok(leaf_der), Ok(ca_der)) = (pem_to_der(leaf_pem), pem_to_der(ca_pem)) else {
            return false;
        };
        let Ok((_, leaf)) = X509Certificate::from_der(&leaf_der) else {
            return false;
        };
        let Ok((_, ca)) = X509Certificate::from_der(&ca_der) else {
            return false;
        };
        leaf.verify_signature(Some(ca.public_key())).is_ok()
    }

    /// Exact text equality of two PEM-encoded CA certificates
    pub fn matches(ca_a: &str, ca_b: &str) -> bool {
        ca_a == ca_b
    }

    /// Both conjuncts are required: equal CA copies say nothing about
    /// whether the stored leaf actually chains to them.
    pub fn check(secret: Option<&TrustBundle>, anchor: Option<&str>) -> TrustCheck {
        let Some(bundle) = secret else {
            return TrustCheck::Inconsistent(InconsistencyReason::SecretMissing);
        };
        let Some(anchor) = anchor else {
            return TrustCheck::Inconsistent(InconsistencyReason::AnchorMissing);
        };
        if !Self::matches(&bundle.ca_cert, anchor) {
            return TrustCheck::Inconsistent(InconsistencyReason::AnchorMismatch);
        }
        if !Self::signed_by(&bundle.leaf_cert, anchor) {
            return TrustCheck::Inconsistent(InconsistencyReason::LeafNotSignedByAnchor);
        }
        TrustCheck::Consistent
    }
}
