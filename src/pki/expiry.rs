//! Remaining validity and renewal decisions

use chrono::{DateTime, TimeZone, Utc};
use x509_parser::prelude::*;

use super::pem_to_der;
use crate::config::DEFAULT_RENEWAL_THRESHOLD_DAYS;
use crate::error::{Error, Result};

const SECS_PER_DAY: f64 = 86_400.0;

/// Validity period of a certificate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CertificateWindow {
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
}

impl CertificateWindow {
    pub fn from_pem(pem: &str) -> Result<Self> {
        let der = pem_to_der(pem)?;
        let (_, cert) = X509Certificate::from_der(&der)
            .map_err(|e| Error::CryptoError(format!("failed to parse certificate: {e}")))?;
        let validity = cert.validity();
        Ok(Self {
            not_before: timestamp(validity.not_before.timestamp())?,
            not_after: timestamp(validity.not_after.timestamp())?,
        })
    }
}

fn timestamp(secs: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_opt(secs, 0)
        .single()
        .ok_or_else(|| Error::CryptoError(format!("certificate time {secs} out of range")))
}

/// When a certificate is close enough to expiry to be reissued
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExpiryPolicy {
    threshold_days: f64,
}

impl Default for ExpiryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_RENEWAL_THRESHOLD_DAYS)
    }
}

impl ExpiryPolicy {
    pub fn new(threshold_days: u32) -> Self {
        Self {
            threshold_days: f64::from(threshold_days),
        }
    }

    /// Fractional days until `notAfter`; negative once expired
    pub fn days_remaining(&self, window: &CertificateWindow, now: DateTime<Utc>) -> f64 {
        let remaining = window.not_after.signed_duration_since(now);
        remaining.num_milliseconds() as f64 / 1000.0 / SECS_PER_DAY
    }

    pub fn needs_renewal(&self, window: &CertificateWindow, now: DateTime<Utc>) -> bool {
        self.days_remaining(window, now) < self.threshold_days
    }
}
