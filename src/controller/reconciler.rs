//! Certificate lifecycle reconciliation
//!
//! One pass:
//!
//! 1. read the bundle from the Secret and the caBundle from the webhook
//! 2. if they disagree, or the leaf does not chain to the caBundle, issue a
//!    brand new CA and leaf
//! 3. otherwise reissue whichever certificate is inside the renewal
//!    threshold, keeping the CA key if the CA is reissued
//! 4. if anything was issued: write the Secret, then the caBundle, then roll
//!    the webhook Deployments
//! 5. if nothing was issued but the last publish never got its restart
//!    through, roll the Deployments now
//!
//! Writing the Secret marks a restart as pending. The marker is cleared only
//! after the restart succeeds, so a failed restart is retried by later passes
//! even though the certificates themselves no longer need work.
//!
//! The Secret is always written before the caBundle. A crash in between
//! leaves the webhook trusting the previous CA while the Secret already
//! holds the next one, which the following pass detects as a mismatch and
//! repairs.
//!
//! Passes must not overlap; callers run them one at a time.

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument};

use super::collaborators::{Clock, RestartTrigger, SecretStore, SystemClock, WebhookRegistry};
use crate::config::CertConfig;
use crate::error::{Error, Result};
use crate::pki::{
    CertificateAuthorityIssuer, CertificateWindow, ExpiryPolicy, LeafCertificateIssuer,
    TrustBundle, TrustCheck, TrustValidator,
};

/// Which certificates a pass reissued
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegenerationScope {
    /// New CA key, new CA, new leaf
    Full,
    /// CA reissued around its existing key; leaf untouched
    CaOnly,
    LeafOnly,
    /// CA reissued around its existing key, new leaf
    CaAndLeaf,
}

/// Result of one reconciliation pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Nothing was written
    Unchanged,
    Regenerated(RegenerationScope),
    /// Certificates were current, but a restart left pending by an earlier
    /// pass was triggered
    Restarted,
}

#[derive(Debug, Clone)]
struct Issuers {
    ca: CertificateAuthorityIssuer,
    leaf: LeafCertificateIssuer,
}

impl Issuers {
    fn issue_all(&self, now: DateTime<Utc>) -> Result<TrustBundle> {
        let ca = self.ca.issue(None, now)?;
        let leaf = self.leaf.issue(&ca, now)?;
        Ok(TrustBundle::new(&ca, leaf))
    }

    /// Reissue selected parts of `current`. Fields that are not reissued
    /// keep their stored bytes; the CA key is never re-serialized.
    fn renew(
        &self,
        current: TrustBundle,
        renew_ca: bool,
        renew_leaf: bool,
        now: DateTime<Utc>,
    ) -> Result<TrustBundle> {
        let mut ca = current.certificate_authority()?;
        let mut bundle = current;

        if renew_ca {
            ca = self.ca.issue(Some(ca.into_key_pair()), now)?;
            bundle.ca_cert = ca.cert_pem().to_string();
        }

        if renew_leaf {
            let leaf = self.leaf.issue(&ca, now)?;
            bundle.leaf_cert = leaf.cert_pem;
            bundle.leaf_key = leaf.key_pem;
        }

        Ok(bundle)
    }
}

/// Drives the webhook's trust material towards a consistent, unexpired state
pub struct Reconciler<S, W, R, C = SystemClock> {
    secrets: S,
    registry: W,
    restarter: R,
    clock: C,
    issuers: Issuers,
    expiry: ExpiryPolicy,
}

impl<S, W, R, C> Reconciler<S, W, R, C>
where
    S: SecretStore,
    W: WebhookRegistry,
    R: RestartTrigger,
    C: Clock,
{
    pub fn new(config: &CertConfig, secrets: S, registry: W, restarter: R, clock: C) -> Self {
        Self {
            secrets,
            registry,
            restarter,
            clock,
            issuers: Issuers {
                ca: CertificateAuthorityIssuer::new(config.ca_common_name.clone()),
                leaf: LeafCertificateIssuer::new(config.dns_endpoint.clone()),
            },
            expiry: ExpiryPolicy::new(config.renewal_threshold_days),
        }
    }

    /// Run one reconciliation pass
    #[instrument(name = "reconcile", skip(self))]
    pub async fn reconcile(&self) -> Result<ReconcileOutcome> {
        let now = self.clock.now();

        let secret = self.secrets.read().await?;
        let anchor = self.registry.read_trust_anchor().await?;

        let bundle = match (TrustValidator::check(secret.as_ref(), anchor.as_deref()), secret) {
            (TrustCheck::Consistent, Some(bundle)) => bundle,
            (check, _) => {
                info!(
                    ?check,
                    "Stored trust state unusable, regenerating CA and serving certificate"
                );
                return self.regenerate_all(now).await;
            }
        };

        let ca_window = CertificateWindow::from_pem(&bundle.ca_cert)?;
        let leaf_window = CertificateWindow::from_pem(&bundle.leaf_cert)?;
        let ca_days = self.expiry.days_remaining(&ca_window, now);
        let leaf_days = self.expiry.days_remaining(&leaf_window, now);
        let renew_ca = self.expiry.needs_renewal(&ca_window, now);
        let renew_leaf = self.expiry.needs_renewal(&leaf_window, now);

        let scope = match (renew_ca, renew_leaf) {
            (false, false) => {
                debug!(
                    ca_days_remaining = ca_days,
                    leaf_days_remaining = leaf_days,
                    "Certificates consistent and valid"
                );
                return self.finish_pending_restart(now).await;
            }
            (true, false) => RegenerationScope::CaOnly,
            (false, true) => RegenerationScope::LeafOnly,
            (true, true) => RegenerationScope::CaAndLeaf,
        };

        info!(
            ca_days_remaining = ca_days,
            leaf_days_remaining = leaf_days,
            ?scope,
            "Renewing certificates"
        );

        let issuers = self.issuers.clone();
        let renewed =
            run_blocking(move || issuers.renew(bundle, renew_ca, renew_leaf, now)).await?;

        self.publish(&renewed, now).await?;
        Ok(ReconcileOutcome::Regenerated(scope))
    }

    /// Unconditionally issue and publish a fresh CA and leaf.
    ///
    /// The webhook registration is still read first so a malformed one
    /// aborts before anything is written.
    #[instrument(name = "bootstrap", skip(self))]
    pub async fn bootstrap(&self) -> Result<ReconcileOutcome> {
        let now = self.clock.now();
        self.registry.read_trust_anchor().await?;
        info!("Bootstrapping CA and serving certificate");
        self.regenerate_all(now).await
    }

    async fn regenerate_all(&self, now: DateTime<Utc>) -> Result<ReconcileOutcome> {
        let issuers = self.issuers.clone();
        let bundle = run_blocking(move || issuers.issue_all(now)).await?;

        self.publish(&bundle, now).await?;
        Ok(ReconcileOutcome::Regenerated(RegenerationScope::Full))
    }

    /// Secret first, then caBundle, then restart
    async fn publish(&self, bundle: &TrustBundle, now: DateTime<Utc>) -> Result<()> {
        self.secrets.write(bundle).await?;
        self.registry.write_trust_anchor(&bundle.ca_cert).await?;

        let restarted = self.restart(now).await?;
        info!(restarted, "Published certificates and triggered restart");
        Ok(())
    }

    async fn finish_pending_restart(&self, now: DateTime<Utc>) -> Result<ReconcileOutcome> {
        if !self.secrets.restart_pending().await? {
            return Ok(ReconcileOutcome::Unchanged);
        }

        info!("Previous restart did not complete, retrying");
        let restarted = self.restart(now).await?;
        info!(restarted, "Triggered pending restart");
        Ok(ReconcileOutcome::Restarted)
    }

    async fn restart(&self, now: DateTime<Utc>) -> Result<usize> {
        let restarted = self.restarter.restart(now).await?;
        self.secrets.clear_restart_pending().await?;
        Ok(restarted)
    }
}

/// Key generation and signing are CPU-bound; keep them off the async workers.
async fn run_blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::CryptoError(format!("certificate issuance task failed: {e}")))?
}
