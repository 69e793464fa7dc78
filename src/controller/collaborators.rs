//! Interfaces to the stores the reconciler reads and writes
//!
//! Every read distinguishes "absent" (`Ok(None)`) from "failed" (`Err`).
//! Absence is the normal first-run condition and leads to regeneration;
//! failures abort the pass.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::pki::TrustBundle;

/// Full trust bundle storage (the certificate Secret)
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// `Ok(None)` when no usable bundle is stored
    async fn read(&self) -> Result<Option<TrustBundle>>;

    /// Store the bundle and, in the same update, mark a restart as pending
    async fn write(&self, bundle: &TrustBundle) -> Result<()>;

    /// Whether the stored bundle was published but its restart never
    /// succeeded
    async fn restart_pending(&self) -> Result<bool>;

    async fn clear_restart_pending(&self) -> Result<()>;
}

/// The webhook registration's copy of the CA (its caBundle)
#[async_trait]
pub trait WebhookRegistry: Send + Sync {
    /// `Ok(None)` when the caBundle is empty.
    ///
    /// A registration that is missing or does not hold exactly one webhook
    /// with a client config is `Error::MalformedWebhookConfig`.
    async fn read_trust_anchor(&self) -> Result<Option<String>>;

    async fn write_trust_anchor(&self, ca_pem: &str) -> Result<()>;
}

/// Forces running webhook pods to pick up new certificate material
#[async_trait]
pub trait RestartTrigger: Send + Sync {
    /// Returns how many workloads were stamped
    async fn restart(&self, now: DateTime<Utc>) -> Result<usize>;
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
