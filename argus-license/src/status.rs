//! The derived license status and the grace-period calculator.
//!
//! Status is never stored: it is a pure function of the persisted record
//! plus "now". Persisting a separately-mutable status field would create
//! a second source of truth that could diverge from the timestamps.

use argus_types::LicenseRecord;
use chrono::{DateTime, Duration, Utc};

/// The current licensing status of this installation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LicenseStatus {
    /// No license record exists.
    Unactivated,
    /// License is healthy.
    Active,
    /// Validation is failing but the offline grace window is still open.
    /// Feature checks behave exactly as in `Active`.
    Grace {
        /// Time left in the grace window.
        remaining: Duration,
    },
    /// Hard-expired, revoked, or the grace window ran out. Escapable by
    /// a fresh Approved outcome or re-activation.
    Expired,
}

impl LicenseStatus {
    /// Returns true if the license allows full product usage
    /// (Active or Grace).
    #[must_use]
    pub fn is_usable(&self) -> bool {
        matches!(self, Self::Active | Self::Grace { .. })
    }

    /// Returns the wire label for this status.
    #[must_use]
    pub fn as_label(&self) -> &'static str {
        match self {
            Self::Unactivated => "unactivated",
            Self::Active => "active",
            Self::Grace { .. } => "grace",
            Self::Expired => "expired",
        }
    }

    /// Returns the remaining grace window, if in grace.
    #[must_use]
    pub fn grace_remaining(&self) -> Option<Duration> {
        match self {
            Self::Grace { remaining } => Some(*remaining),
            _ => None,
        }
    }
}

/// Computes the status of a record at a given instant.
///
/// Ordering matters: hard expiry and revocation are authoritative
/// regardless of how recently connectivity succeeded. Grace is a
/// connectivity-loss allowance only, never a validity override. The
/// grace boundary is inclusive: `elapsed == grace_period` is still
/// `Grace` (with zero remaining).
#[must_use]
pub fn evaluate(
    record: Option<&LicenseRecord>,
    now: DateTime<Utc>,
    grace_period: Duration,
) -> LicenseStatus {
    let Some(record) = record else {
        return LicenseStatus::Unactivated;
    };

    if let Some(expires_at) = record.entitlement.expires_at {
        if now > expires_at {
            return LicenseStatus::Expired;
        }
    }

    if record.revoked {
        return LicenseStatus::Expired;
    }

    let Some(grace_started_at) = record.grace_started_at else {
        return LicenseStatus::Active;
    };

    let elapsed = now - grace_started_at;
    if elapsed <= grace_period {
        LicenseStatus::Grace {
            remaining: grace_period - elapsed,
        }
    } else {
        LicenseStatus::Expired
    }
}
