//! The license state engine.
//!
//! Owns the single mutable shared resource — the cached license record —
//! and funnels every mutation through `install_record` and
//! `record_validation_outcome`. Readers take a full-record snapshot
//! under a short read lock, so a status or feature query during an
//! in-flight validation sees the pre-cycle state, never a torn one.

use crate::config::LicenseConfig;
use crate::error::{LicenseError, LicenseResult};
use crate::status::{evaluate, LicenseStatus};
use argus_store::{LicenseStore, StoredLicense};
use argus_types::{LicenseRecord, ValidationOutcome};
use chrono::{DateTime, Utc};
use std::sync::{Arc, RwLock};
use tracing::{info, warn};

/// The state machine owner.
pub struct LicenseEngine {
    store: Arc<LicenseStore>,
    config: LicenseConfig,
    current: RwLock<Option<StoredLicense>>,
}

impl LicenseEngine {
    /// Creates an engine, loading the cached record from the store.
    pub fn new(store: Arc<LicenseStore>, config: LicenseConfig) -> LicenseResult<Self> {
        let current = store.load_license()?;
        Ok(Self {
            store,
            config,
            current: RwLock::new(current),
        })
    }

    /// Returns the configuration this engine was built with.
    #[must_use]
    pub fn config(&self) -> &LicenseConfig {
        &self.config
    }

    /// Returns a consistent snapshot of the cached record, if any.
    #[must_use]
    pub fn snapshot(&self) -> Option<LicenseRecord> {
        self.current
            .read()
            .unwrap()
            .as_ref()
            .map(|stored| stored.record.clone())
    }

    /// Computes the status at the given instant. Pure read: no network,
    /// no mutation, callable arbitrarily often and concurrently.
    #[must_use]
    pub fn current_status(&self, now: DateTime<Utc>) -> LicenseStatus {
        let snapshot = self.snapshot();
        evaluate(snapshot.as_ref(), now, self.config.grace_period)
    }

    /// Installs a freshly activated record, overwriting any previous one.
    pub fn install_record(&self, record: LicenseRecord) -> LicenseResult<()> {
        let mut guard = self.current.write().unwrap();
        let stored = self.store.save_license(&record)?;
        info!(
            tier = %stored.record.entitlement.tier,
            features = stored.record.entitlement.features.len(),
            "license activated"
        );
        *guard = Some(stored);
        Ok(())
    }

    /// Applies one classified validation outcome and returns the status
    /// as of `now`.
    ///
    /// The store write is revision-checked and the snapshot swap happens
    /// under the write lock, so the transition is visible in full or not
    /// at all. Replaying the same outcome against an already-consistent
    /// record changes nothing beyond refreshing timestamps.
    pub fn record_validation_outcome(
        &self,
        outcome: &ValidationOutcome,
        now: DateTime<Utc>,
    ) -> LicenseResult<LicenseStatus> {
        let mut guard = self.current.write().unwrap();
        let stored = guard.as_ref().ok_or(LicenseError::NotActivated)?;

        let updated = self
            .store
            .update_license(stored.revision, |record| apply_outcome(record, outcome, now))?;

        match outcome {
            ValidationOutcome::Approved(_) => {
                info!("validation approved, entitlement refreshed");
            }
            ValidationOutcome::Rejected { reason } => {
                warn!(%reason, "license rejected by authority");
            }
            ValidationOutcome::Unreachable { detail } => {
                if let Some(started) = updated.record.grace_started_at {
                    warn!(%detail, grace_started_at = %started, "authority unreachable");
                }
            }
            ValidationOutcome::HardwareMismatch { expected, actual } => {
                warn!(%expected, %actual, "hardware fingerprint mismatch, license unusable on this host");
            }
        }

        *guard = Some(updated);
        let status = evaluate(
            guard.as_ref().map(|s| &s.record),
            now,
            self.config.grace_period,
        );
        Ok(status)
    }
}

/// The transition function. Everything the state machine does to the
/// record lives here.
fn apply_outcome(record: &mut LicenseRecord, outcome: &ValidationOutcome, now: DateTime<Utc>) {
    match outcome {
        ValidationOutcome::Approved(entitlement) => {
            // The authority is the source of truth for entitlement
            // content; a successful validation also ends any failure
            // streak and clears revocation.
            record.entitlement = entitlement.clone();
            record.last_successful_validation_at = now;
            record.grace_started_at = None;
            record.revoked = false;
        }
        ValidationOutcome::Rejected { .. } | ValidationOutcome::HardwareMismatch { .. } => {
            record.revoked = true;
        }
        ValidationOutcome::Unreachable { .. } => {
            // Grace starts once per failure streak; repeated failures
            // leave the original start untouched.
            if record.grace_started_at.is_none() {
                record.grace_started_at = Some(now);
            }
        }
    }
}
