//! Identity constants for the webhook being served.
//!
//! None of these are owned by the lifecycle engine; they name the objects it
//! reads and writes and the DNS identity it certifies.

use clap::Args;
use rcgen::Ia5String;

use crate::error::{Error, Result};

pub const DEFAULT_NAMESPACE: &str = "kube-system";
pub const DEFAULT_SECRET_NAME: &str = "app-monitoring-webhook-cert";
pub const DEFAULT_WEBHOOK_NAME: &str = "app-monitoring-webhook";
pub const DEFAULT_DNS_ENDPOINT: &str = "app-monitoring-webhook-service.kube-system.svc";
pub const DEFAULT_RESTART_SELECTOR: &str = "app=app-monitoring-webhook";
pub const DEFAULT_CA_COMMON_NAME: &str = "applicationinsights-ca";
pub const DEFAULT_RENEWAL_THRESHOLD_DAYS: u32 = 90;

/// Certificate lifetime in days; the renewal threshold must fit inside it.
pub const CERT_VALIDITY_DAYS: i64 = 2 * 365;

/// Names and identities the certificate lifecycle operates on
#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct CertConfig {
    /// Namespace holding the certificate Secret and the webhook workload
    #[arg(long, env = "WEBHOOK_NAMESPACE", default_value = DEFAULT_NAMESPACE)]
    pub namespace: String,

    /// Name of the Secret storing ca.cert / ca.key / tls.cert / tls.key
    #[arg(long, env = "WEBHOOK_CERT_SECRET", default_value = DEFAULT_SECRET_NAME)]
    pub secret_name: String,

    /// Name of the MutatingWebhookConfiguration whose caBundle is managed
    #[arg(long, env = "WEBHOOK_CONFIGURATION_NAME", default_value = DEFAULT_WEBHOOK_NAME)]
    pub webhook_name: String,

    /// DNS name the serving certificate is issued for (CN and SAN)
    #[arg(long, env = "WEBHOOK_DNS_ENDPOINT", default_value = DEFAULT_DNS_ENDPOINT)]
    pub dns_endpoint: String,

    /// Label selector for the Deployments rolled after a certificate change
    #[arg(long, env = "WEBHOOK_RESTART_SELECTOR", default_value = DEFAULT_RESTART_SELECTOR)]
    pub restart_selector: String,

    /// Common name of the self-signed CA
    #[arg(long, env = "WEBHOOK_CA_COMMON_NAME", default_value = DEFAULT_CA_COMMON_NAME)]
    pub ca_common_name: String,

    /// Reissue a certificate once fewer than this many days remain
    #[arg(
        long,
        env = "CERT_RENEWAL_THRESHOLD_DAYS",
        default_value_t = DEFAULT_RENEWAL_THRESHOLD_DAYS
    )]
    pub renewal_threshold_days: u32,
}

impl Default for CertConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            secret_name: DEFAULT_SECRET_NAME.to_string(),
            webhook_name: DEFAULT_WEBHOOK_NAME.to_string(),
            dns_endpoint: DEFAULT_DNS_ENDPOINT.to_string(),
            restart_selector: DEFAULT_RESTART_SELECTOR.to_string(),
            ca_common_name: DEFAULT_CA_COMMON_NAME.to_string(),
            renewal_threshold_days: DEFAULT_RENEWAL_THRESHOLD_DAYS,
        }
    }
}

impl CertConfig {
    /// Reject configurations that would only fail later, mid-pass.
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("namespace", &self.namespace),
            ("secret_name", &self.secret_name),
            ("webhook_name", &self.webhook_name),
            ("dns_endpoint", &self.dns_endpoint),
            ("restart_selector", &self.restart_selector),
            ("ca_common_name", &self.ca_common_name),
        ] {
            if value.trim().is_empty() {
                return Err(Error::ConfigError(format!("{field} must not be empty")));
            }
        }

        Ia5String::try_from(self.dns_endpoint.as_str()).map_err(|e| {
            Error::ConfigError(format!(
                "dns_endpoint {:?} is not a valid DNS name: {e}",
                self.dns_endpoint
            ))
        })?;

        if self.renewal_threshold_days == 0
            || i64::from(self.renewal_threshold_days) >= CERT_VALIDITY_DAYS
        {
            return Err(Error::ConfigError(format!(
                "renewal_threshold_days must be between 1 and {}, got {}",
                CERT_VALIDITY_DAYS - 1,
                self.renewal_threshold_days
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(CertConfig::default().validate().is_ok());
    }

    #[test]
    fn empty_selector_rejected() {
        let config = CertConfig {
            restart_selector: "  ".to_string(),
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("restart_selector"));
    }

    #[test]
    fn non_ascii_endpoint_rejected() {
        let config = CertConfig {
            dns_endpoint: "wébhook.kube-system.svc".to_string(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::ConfigError(_))));
    }

    #[test]
    fn threshold_must_fit_inside_validity() {
        for days in [0, 730, 1000] {
            let config = CertConfig {
                renewal_threshold_days: days,
                ..Default::default()
            };
            assert!(config.validate().is_err(), "{days} should be rejected");
        }
        let config = CertConfig {
            renewal_threshold_days: 729,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }
}
