//! Core type definitions for the Argus license guard.
//!
//! This crate defines the fundamental types shared between the durable
//! store and the licensing core:
//! - Installation and feature identifiers
//! - The cached license record and its entitlement content
//! - Validation outcomes and the append-only attempt log row
//! - The derived feature-flag cache row
//!
//! The license *status* (active, grace, expired) is deliberately absent
//! here: it is derived from the record plus the current time, never
//! stored, and lives in `argus-license`.

mod ids;
mod license;

pub use ids::{FeatureKey, InstallationId};
pub use license::{
    Entitlement, FeatureFlagRecord, LicenseRecord, LicenseTier, OutcomeKind, UsageMetrics,
    ValidationAttempt, ValidationOutcome,
};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),

    #[error("unknown label: {0}")]
    UnknownLabel(String),
}
