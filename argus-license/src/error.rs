//! Error types for the licensing core.

use thiserror::Error;

/// Licensing-specific errors.
#[derive(Debug, Error)]
pub enum LicenseError {
    /// The remote authority rejected the activation key. Not retryable.
    #[error("activation denied: {0}")]
    ActivationDenied(String),

    /// No cached license exists and the authority is unreachable.
    /// Activation never falls back to an offline state; the caller may
    /// retry once connectivity returns.
    #[error("activation requires connectivity: {0}")]
    ActivationRequiresConnectivity(String),

    /// A license is already activated and re-activation is not permitted
    /// by configuration.
    #[error("a license is already activated on this installation")]
    AlreadyActivated,

    /// No license has been activated yet.
    #[error("license not activated")]
    NotActivated,

    /// Durable store failure.
    #[error(transparent)]
    Store(#[from] argus_store::StoreError),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for license operations.
pub type LicenseResult<T> = Result<T, LicenseError>;
