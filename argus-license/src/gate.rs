//! The feature gate.
//!
//! Stateless: a decision is a pure function of the feature key, the
//! derived status, the record snapshot and configuration. Callers hand
//! in one consistent `(status, record)` pair, so a check racing a
//! transition sees either the old or the new state, never a mix.

use crate::config::LicenseConfig;
use crate::status::LicenseStatus;
use argus_types::{FeatureFlagRecord, FeatureKey, LicenseRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Why a feature is (un)available.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AvailabilityReason {
    /// Core feature, granted by the unlicensed-core override.
    CoreAlwaysOn,
    /// Granted by the current entitlement.
    Licensed,
    /// License is usable but does not include this feature.
    NotEntitled,
    /// No license has been activated.
    Unlicensed,
    /// The license is expired (hard expiry, revocation, or grace ran out).
    LicenseExpired,
}

impl AvailabilityReason {
    /// Returns the wire label for this reason.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CoreAlwaysOn => "core-always-on",
            Self::Licensed => "licensed",
            Self::NotEntitled => "not-entitled",
            Self::Unlicensed => "unlicensed",
            Self::LicenseExpired => "license-expired",
        }
    }
}

impl fmt::Display for AvailabilityReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An availability decision for one feature key.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureDecision {
    /// The feature the decision is about.
    pub feature_key: FeatureKey,
    /// Whether the feature may be exposed right now.
    pub available: bool,
    /// Why.
    pub reason: AvailabilityReason,
}

/// Decides availability for one feature key.
#[must_use]
pub fn check_feature(
    key: &FeatureKey,
    status: &LicenseStatus,
    record: Option<&LicenseRecord>,
    config: &LicenseConfig,
) -> FeatureDecision {
    // Core features short-circuit everything, including Unactivated.
    if config.allow_unlicensed_core_features && config.is_core_feature(key) {
        return FeatureDecision {
            feature_key: key.clone(),
            available: true,
            reason: AvailabilityReason::CoreAlwaysOn,
        };
    }

    if status.is_usable() {
        let entitled = record.is_some_and(|r| r.entitlement.grants(key));
        return FeatureDecision {
            feature_key: key.clone(),
            available: entitled,
            reason: if entitled {
                AvailabilityReason::Licensed
            } else {
                AvailabilityReason::NotEntitled
            },
        };
    }

    FeatureDecision {
        feature_key: key.clone(),
        available: false,
        reason: match status {
            LicenseStatus::Unactivated => AvailabilityReason::Unlicensed,
            _ => AvailabilityReason::LicenseExpired,
        },
    }
}

/// Recomputes the full feature-flag cache: one row for every known key
/// (entitled plus core), so the persisted cache never mixes decisions
/// from two different states.
#[must_use]
pub fn compute_flags(
    status: &LicenseStatus,
    record: Option<&LicenseRecord>,
    config: &LicenseConfig,
    now: DateTime<Utc>,
) -> Vec<FeatureFlagRecord> {
    let mut keys: BTreeSet<FeatureKey> = config.core_features.clone();
    if let Some(record) = record {
        keys.extend(record.entitlement.features.iter().cloned());
    }

    keys.into_iter()
        .map(|key| {
            let decision = check_feature(&key, status, record, config);
            FeatureFlagRecord {
                feature_key: key,
                available: decision.available,
                reason: decision.reason.as_str().to_string(),
                computed_at: now,
            }
        })
        .collect()
}
