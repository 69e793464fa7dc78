//! Error types for the webhook certificate operator

use thiserror::Error;

/// Main error type for certificate lifecycle operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API call failed (transport, auth, conflict, 5xx)
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    /// Key generation, signing, or certificate parsing failed
    #[error("Crypto error: {0}")]
    CryptoError(String),

    /// The MutatingWebhookConfiguration does not have the expected shape
    #[error("Malformed webhook configuration: {0}")]
    MalformedWebhookConfig(String),

    /// Invalid operator configuration
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Wire encoding of certificate material failed
    #[error("Encoding error: {0}")]
    EncodingError(String),
}

impl Error {
    /// Whether the next scheduled pass may succeed without operator action.
    ///
    /// Only API transport failures qualify. A malformed webhook registration
    /// or broken key material will fail the same way every time.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::KubeError(_))
    }
}

impl From<rcgen::Error> for Error {
    fn from(e: rcgen::Error) -> Self {
        Error::CryptoError(e.to_string())
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
