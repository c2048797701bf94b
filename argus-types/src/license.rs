//! The cached license record and the types that flow through a
//! validation cycle.
//!
//! The record stores only facts (timestamps, entitlement content, the
//! revoked marker). Whether the installation is currently licensed is a
//! pure function of these facts plus "now", computed in `argus-license`.

use crate::ids::FeatureKey;
use crate::Error;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// The licensing level granted by the authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LicenseTier {
    /// Entry-level tier.
    Basic,
    /// Mid tier with advanced modules.
    Professional,
    /// Full feature set, unbounded limits negotiable.
    Enterprise,
}

impl LicenseTier {
    /// Returns the wire label for this tier.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::Professional => "professional",
            Self::Enterprise => "enterprise",
        }
    }
}

impl fmt::Display for LicenseTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LicenseTier {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "basic" => Ok(Self::Basic),
            "professional" => Ok(Self::Professional),
            "enterprise" => Ok(Self::Enterprise),
            other => Err(Error::UnknownLabel(other.to_string())),
        }
    }
}

/// Entitlement content granted by a license.
///
/// The remote authority is the source of truth for this data: every
/// Approved validation refreshes it wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entitlement {
    /// Licensing level.
    pub tier: LicenseTier,
    /// Feature keys granted by this license.
    pub features: BTreeSet<FeatureKey>,
    /// Hard expiry, or `None` for perpetual licenses.
    pub expires_at: Option<DateTime<Utc>>,
    /// Maximum cameras this installation may manage.
    pub max_cameras: Option<u32>,
    /// Maximum concurrent users.
    pub max_users: Option<u32>,
}

impl Entitlement {
    /// Returns true if the given feature key is granted.
    #[must_use]
    pub fn grants(&self, key: &FeatureKey) -> bool {
        self.features.contains(key)
    }
}

/// The cached license — the single mutable record this core owns.
///
/// Created by activation, updated in place by validation outcomes, never
/// deleted (re-activation overwrites it when policy permits).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LicenseRecord {
    /// Opaque license key, immutable once activated.
    pub license_key: String,
    /// Entitlement content from the most recent Approved outcome.
    pub entitlement: Entitlement,
    /// Hardware fingerprint captured at activation. Binding anchor;
    /// never changes for the lifetime of the record.
    pub hardware_fingerprint: String,
    /// When activation succeeded.
    pub activated_at: DateTime<Utc>,
    /// Timestamp of the most recent Approved outcome.
    pub last_successful_validation_at: DateTime<Utc>,
    /// Set the instant the first Unreachable outcome follows a healthy
    /// state; `None` while healthy. Does not restart on repeated
    /// failures within one streak.
    pub grace_started_at: Option<DateTime<Utc>>,
    /// Poison marker set on Rejected or HardwareMismatch. Once set,
    /// grace arithmetic can no longer produce Active; only a fresh
    /// Approved outcome or re-activation clears it.
    pub revoked: bool,
}

impl LicenseRecord {
    /// Returns true if the given fingerprint matches the binding anchor.
    #[must_use]
    pub fn matches_hardware(&self, fingerprint: &str) -> bool {
        self.hardware_fingerprint == fingerprint
    }
}

/// Classified result of one remote validation attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationOutcome {
    /// The authority confirmed the license; carries refreshed entitlement.
    Approved(Entitlement),
    /// The authority explicitly rejected the license (revoked/expired).
    Rejected {
        /// Authority-supplied reason.
        reason: String,
    },
    /// The authority could not be reached (timeout, transport failure).
    Unreachable {
        /// Diagnostic detail.
        detail: String,
    },
    /// The cached license is bound to different hardware. Fatal on this
    /// host; treated like Rejected but logged distinctly.
    HardwareMismatch {
        /// Fingerprint the record is bound to.
        expected: String,
        /// Fingerprint observed now.
        actual: String,
    },
}

impl ValidationOutcome {
    /// Returns the flat kind label for logging.
    #[must_use]
    pub fn kind(&self) -> OutcomeKind {
        match self {
            Self::Approved(_) => OutcomeKind::Approved,
            Self::Rejected { .. } => OutcomeKind::Rejected,
            Self::Unreachable { .. } => OutcomeKind::Unreachable,
            Self::HardwareMismatch { .. } => OutcomeKind::HardwareMismatch,
        }
    }

    /// Returns the free-form diagnostic detail, if any.
    #[must_use]
    pub fn detail(&self) -> Option<String> {
        match self {
            Self::Approved(_) => None,
            Self::Rejected { reason } => Some(reason.clone()),
            Self::Unreachable { detail } => Some(detail.clone()),
            Self::HardwareMismatch { expected, actual } => {
                Some(format!("bound to {expected}, host reports {actual}"))
            }
        }
    }
}

/// Flat outcome label stored in the attempt log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Approved,
    Rejected,
    Unreachable,
    HardwareMismatch,
}

impl OutcomeKind {
    /// Returns the label used in the attempt log.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Unreachable => "unreachable",
            Self::HardwareMismatch => "hardware_mismatch",
        }
    }
}

impl fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutcomeKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            "unreachable" => Ok(Self::Unreachable),
            "hardware_mismatch" => Ok(Self::HardwareMismatch),
            other => Err(Error::UnknownLabel(other.to_string())),
        }
    }
}

/// Append-only audit row, one per validation or activation attempt.
///
/// Written by the orchestrator after every attempt; never mutated,
/// never read back into the state machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationAttempt {
    /// When the attempt happened.
    pub attempted_at: DateTime<Utc>,
    /// Classified outcome.
    pub outcome: OutcomeKind,
    /// Free-form diagnostic detail.
    pub detail: Option<String>,
    /// Round-trip duration in milliseconds.
    pub duration_ms: u64,
    /// License key the attempt was made with.
    pub license_key: Option<String>,
    /// Hardware fingerprint observed at attempt time.
    pub hardware_id: Option<String>,
}

/// Derived feature-availability cache row.
///
/// Fully recomputed whenever status changes; stale rows are overwritten,
/// never accumulated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureFlagRecord {
    /// The feature this row describes.
    pub feature_key: FeatureKey,
    /// Whether the feature is currently available.
    pub available: bool,
    /// Why (wire label, e.g. `licensed`, `core-always-on`).
    pub reason: String,
    /// When this decision was computed.
    pub computed_at: DateTime<Utc>,
}

/// Usage metrics attached to heartbeat validations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetrics {
    /// Cameras currently managed by this installation.
    pub cameras_in_use: u32,
    /// Active user sessions.
    pub users_active: u32,
    /// Recording storage in use, gigabytes.
    pub storage_used_gb: f64,
}
