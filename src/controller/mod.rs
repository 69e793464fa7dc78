//! Controller module for webhook certificate reconciliation
//!
//! The reconciler is written against the store traits in [`collaborators`];
//! [`k8s`] provides the Kubernetes implementations.

pub mod collaborators;
pub mod k8s;
mod reconciler;

pub use collaborators::{Clock, RestartTrigger, SecretStore, SystemClock, WebhookRegistry};
pub use k8s::{KubeRestartTrigger, KubeSecretStore, KubeWebhookRegistry};
pub use reconciler::{ReconcileOutcome, Reconciler, RegenerationScope};
