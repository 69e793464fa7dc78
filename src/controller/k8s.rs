//! Kubernetes-backed stores: the certificate Secret, the
//! MutatingWebhookConfiguration caBundle, and Deployment rollouts.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use k8s_openapi::api::admissionregistration::v1::{MutatingWebhook, MutatingWebhookConfiguration};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Secret;
use kube::{
    api::{Api, ListParams, Patch, PatchParams},
    Client, ResourceExt,
};
use serde_json::json;
use tracing::{info, instrument, warn};

use super::collaborators::{RestartTrigger, SecretStore, WebhookRegistry};
use crate::config::CertConfig;
use crate::error::{Error, Result};
use crate::pki::bundle::{encode_field, pem_from_bytes};
use crate::pki::TrustBundle;

/// Field manager for server-side apply
pub const FIELD_MANAGER: &str = "webhook-cert-operator";

/// Pod template annotation that makes the Deployment controller roll pods
pub const RESTARTED_AT_ANNOTATION: &str = "kubectl.kubernetes.io/restartedAt";

/// Secret annotation set with every bundle write and removed once the
/// webhook pods have been restarted onto it
pub const RESTART_PENDING_ANNOTATION: &str = "webhook-cert-operator/restart-pending";

// ============================================================================
// Secret
// ============================================================================

/// Trust bundle stored in a namespaced Secret
pub struct KubeSecretStore {
    api: Api<Secret>,
    name: String,
    namespace: String,
}

impl KubeSecretStore {
    pub fn new(client: Client, config: &CertConfig) -> Self {
        Self {
            api: Api::namespaced(client, &config.namespace),
            name: config.secret_name.clone(),
            namespace: config.namespace.clone(),
        }
    }
}

#[async_trait]
impl SecretStore for KubeSecretStore {
    #[instrument(skip(self), fields(secret = %self.name, namespace = %self.namespace))]
    async fn read(&self) -> Result<Option<TrustBundle>> {
        let Some(secret) = self.api.get_opt(&self.name).await? else {
            warn!("Certificate secret not found");
            return Ok(None);
        };

        let Some(data) = secret.data.as_ref().filter(|d| !d.is_empty()) else {
            warn!("Certificate secret has no data");
            return Ok(None);
        };

        match TrustBundle::from_secret_data(data) {
            Ok(bundle) => Ok(Some(bundle)),
            Err(e) => {
                warn!(error = %e, "Certificate secret is unreadable, treating as absent");
                Ok(None)
            }
        }
    }

    #[instrument(skip(self, bundle), fields(secret = %self.name, namespace = %self.namespace))]
    async fn write(&self, bundle: &TrustBundle) -> Result<()> {
        let secret = secret_apply_body(&self.name, &self.namespace, bundle);

        self.api
            .patch(
                &self.name,
                &PatchParams::apply(FIELD_MANAGER).force(),
                &Patch::Apply(&secret),
            )
            .await?;

        info!("Certificate secret written");
        Ok(())
    }

    #[instrument(skip(self), fields(secret = %self.name, namespace = %self.namespace))]
    async fn restart_pending(&self) -> Result<bool> {
        let Some(secret) = self.api.get_opt(&self.name).await? else {
            return Ok(false);
        };
        Ok(secret
            .annotations()
            .get(RESTART_PENDING_ANNOTATION)
            .is_some_and(|value| value == "true"))
    }

    #[instrument(skip(self), fields(secret = %self.name, namespace = %self.namespace))]
    async fn clear_restart_pending(&self) -> Result<()> {
        self.api
            .patch(
                &self.name,
                &PatchParams::default(),
                &Patch::Merge(&clear_restart_pending_patch()),
            )
            .await?;
        Ok(())
    }
}

/// Server-side apply body for the certificate Secret.
///
/// Apply creates the Secret on first run and otherwise only takes ownership
/// of the four certificate keys and the restart marker.
pub fn secret_apply_body(name: &str, namespace: &str, bundle: &TrustBundle) -> serde_json::Value {
    json!({
        "apiVersion": "v1",
        "kind": "Secret",
        "metadata": {
            "name": name,
            "namespace": namespace,
            "annotations": {
                RESTART_PENDING_ANNOTATION: "true",
            },
        },
        "data": bundle.to_wire(),
    })
}

/// Merge patch removing the restart marker
pub fn clear_restart_pending_patch() -> serde_json::Value {
    json!({
        "metadata": {
            "annotations": {
                RESTART_PENDING_ANNOTATION: null,
            },
        },
    })
}

// ============================================================================
// MutatingWebhookConfiguration
// ============================================================================

/// caBundle of the single webhook in a MutatingWebhookConfiguration
pub struct KubeWebhookRegistry {
    api: Api<MutatingWebhookConfiguration>,
    name: String,
}

impl KubeWebhookRegistry {
    pub fn new(client: Client, config: &CertConfig) -> Self {
        Self {
            api: Api::all(client),
            name: config.webhook_name.clone(),
        }
    }

    async fn fetch(&self) -> Result<MutatingWebhookConfiguration> {
        match self.api.get_opt(&self.name).await {
            Ok(Some(config)) => Ok(config),
            Ok(None) => Err(Error::MalformedWebhookConfig(format!(
                "MutatingWebhookConfiguration {} not found",
                self.name
            ))),
            // A webhook without clientConfig fails typed decoding
            Err(kube::Error::SerdeError(e)) => Err(Error::MalformedWebhookConfig(format!(
                "MutatingWebhookConfiguration {} could not be decoded: {e}",
                self.name
            ))),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl WebhookRegistry for KubeWebhookRegistry {
    #[instrument(skip(self), fields(webhook = %self.name))]
    async fn read_trust_anchor(&self) -> Result<Option<String>> {
        let config = self.fetch().await?;
        let webhook = sole_webhook(&config)?;
        Ok(trust_anchor(webhook))
    }

    #[instrument(skip(self, ca_pem), fields(webhook = %self.name))]
    async fn write_trust_anchor(&self, ca_pem: &str) -> Result<()> {
        let config = self.fetch().await?;
        let webhook = sole_webhook(&config)?;

        self.api
            .patch(
                &self.name,
                &PatchParams::default(),
                &Patch::Strategic(ca_bundle_patch(&webhook.name, ca_pem)),
            )
            .await?;

        info!(entry = %webhook.name, "Webhook caBundle updated");
        Ok(())
    }
}

/// The one webhook entry the registration must contain
pub fn sole_webhook(config: &MutatingWebhookConfiguration) -> Result<&MutatingWebhook> {
    let name = config.name_any();
    let webhook = match config.webhooks.as_deref() {
        Some([webhook]) => webhook,
        other => {
            return Err(Error::MalformedWebhookConfig(format!(
                "{name}: expected exactly one webhook, found {}",
                other.map_or(0, <[MutatingWebhook]>::len)
            )))
        }
    };

    let client_config = &webhook.client_config;
    if client_config.service.is_none() && client_config.url.is_none() {
        return Err(Error::MalformedWebhookConfig(format!(
            "{name}: webhook {} has no clientConfig target",
            webhook.name
        )));
    }

    Ok(webhook)
}

/// PEM text of the webhook's caBundle, if any
pub fn trust_anchor(webhook: &MutatingWebhook) -> Option<String> {
    let bundle = webhook.client_config.ca_bundle.as_ref()?;
    match pem_from_bytes(&bundle.0) {
        Ok(pem) => Some(pem),
        Err(e) => {
            if !bundle.0.is_empty() {
                warn!(webhook = %webhook.name, error = %e, "caBundle is unreadable, treating as absent");
            }
            None
        }
    }
}

/// Strategic merge patch; `webhooks` merges on `name`
pub fn ca_bundle_patch(webhook_name: &str, ca_pem: &str) -> serde_json::Value {
    json!({
        "webhooks": [{
            "name": webhook_name,
            "clientConfig": {
                "caBundle": encode_field(ca_pem),
            },
        }],
    })
}

// ============================================================================
// Deployment restart
// ============================================================================

/// Rolls every Deployment matching a label selector
pub struct KubeRestartTrigger {
    api: Api<Deployment>,
    selector: String,
}

impl KubeRestartTrigger {
    pub fn new(client: Client, config: &CertConfig) -> Self {
        Self {
            api: Api::namespaced(client, &config.namespace),
            selector: config.restart_selector.clone(),
        }
    }
}

#[async_trait]
impl RestartTrigger for KubeRestartTrigger {
    #[instrument(skip(self), fields(selector = %self.selector))]
    async fn restart(&self, now: DateTime<Utc>) -> Result<usize> {
        let deployments = self
            .api
            .list(&ListParams::default().labels(&self.selector))
            .await?;

        if deployments.items.is_empty() {
            warn!("No deployments match the restart selector");
            return Ok(0);
        }

        let patch = restart_patch(now);
        for deployment in &deployments.items {
            let name = deployment.name_any();
            self.api
                .patch(&name, &PatchParams::default(), &Patch::Merge(&patch))
                .await?;
            info!(deployment = %name, "Triggered rollout");
        }

        Ok(deployments.items.len())
    }
}

/// Merge patch stamping the restart annotation on the pod template
pub fn restart_patch(now: DateTime<Utc>) -> serde_json::Value {
    json!({
        "spec": {
            "template": {
                "metadata": {
                    "annotations": {
                        RESTARTED_AT_ANNOTATION: now.to_rfc3339_opts(SecondsFormat::Secs, true),
                    },
                },
            },
        },
    })
}
