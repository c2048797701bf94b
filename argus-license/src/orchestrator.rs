//! The validation orchestrator.
//!
//! Drives one validation cycle end to end: single-flight guard, local
//! hardware-binding check, authority round-trip, outcome classification,
//! state transition, attempt logging, feature-flag recompute. Status and
//! feature reads never touch the guard; they read the latest committed
//! snapshot.

use crate::authority::{ActivationRequest, AuthorityClient, AuthorityResponse, ValidationRequest};
use crate::config::LicenseConfig;
use crate::engine::LicenseEngine;
use crate::error::{LicenseError, LicenseResult};
use crate::fingerprint::{FingerprintProvider, SystemInfo};
use crate::gate::{self, FeatureDecision};
use crate::status::{evaluate, LicenseStatus};
use argus_store::LicenseStore;
use argus_types::{
    FeatureKey, InstallationId, LicenseRecord, LicenseTier, OutcomeKind, UsageMetrics,
    ValidationAttempt, ValidationOutcome,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Snapshot of the current licensing state for operators and callers.
///
/// The only surface that exposes the remaining grace window, so
/// operators can react before expiry.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    /// Status label: `unactivated`, `active`, `grace` or `expired`.
    pub status: String,
    /// Seconds left in the grace window, when in grace.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_grace_seconds: Option<i64>,
    /// Licensed tier, when activated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier: Option<LicenseTier>,
    /// Hard expiry, when the license is not perpetual.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    /// When the authority last approved a validation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_validated_at: Option<DateTime<Utc>>,
    /// The activated license key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license_key: Option<String>,
}

impl StatusReport {
    fn new(status: &LicenseStatus, record: Option<&LicenseRecord>) -> Self {
        Self {
            status: status.as_label().to_string(),
            remaining_grace_seconds: status.grace_remaining().map(|d| d.num_seconds()),
            tier: record.map(|r| r.entitlement.tier),
            expires_at: record.and_then(|r| r.entitlement.expires_at),
            last_validated_at: record.map(|r| r.last_successful_validation_at),
            license_key: record.map(|r| r.license_key.clone()),
        }
    }
}

/// Result of a successful activation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivationReport {
    /// Status after activation (always `active`).
    pub status: String,
    /// Granted tier.
    pub tier: LicenseTier,
    /// Granted feature keys.
    pub entitled_features: BTreeSet<FeatureKey>,
    /// Hard expiry, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Result of one validation call.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    /// True when another cycle was already in flight and this call was
    /// a no-op. A concurrency signal, not an error.
    pub in_progress: bool,
    /// The classified outcome, when a cycle actually ran.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<OutcomeKind>,
    /// Status after the cycle (or the unchanged status for a no-op).
    pub status: StatusReport,
}

/// Result of a heartbeat call.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatReport {
    /// Whether a validation cycle actually ran for this heartbeat.
    pub accepted: bool,
    /// The cycle's outcome, when one ran.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<OutcomeKind>,
}

/// The licensing facade: owns the engine, the store, the authority
/// client and the single-flight discipline.
pub struct LicenseManager {
    engine: Arc<LicenseEngine>,
    store: Arc<LicenseStore>,
    client: Arc<dyn AuthorityClient>,
    fingerprint: Arc<dyn FingerprintProvider>,
    installation_id: InstallationId,
    // One in-flight validation per installation. Validation try-locks
    // and reports "in progress"; activation awaits the lock so it
    // serializes with cycles instead of interleaving record writes.
    inflight: Mutex<()>,
}

impl LicenseManager {
    /// Creates a manager, loading any cached license from the store and
    /// resolving the installation identity (generated on first run).
    pub fn new(
        store: Arc<LicenseStore>,
        client: Arc<dyn AuthorityClient>,
        fingerprint: Arc<dyn FingerprintProvider>,
        config: LicenseConfig,
    ) -> LicenseResult<Self> {
        let installation_id = store.installation_id()?;
        let engine = Arc::new(LicenseEngine::new(store.clone(), config)?);
        Ok(Self {
            engine,
            store,
            client,
            fingerprint,
            installation_id,
            inflight: Mutex::new(()),
        })
    }

    /// The configuration this manager was built with.
    #[must_use]
    pub fn config(&self) -> &LicenseConfig {
        self.engine.config()
    }

    /// The state engine, for status queries with an explicit clock.
    #[must_use]
    pub fn engine(&self) -> &LicenseEngine {
        &self.engine
    }

    /// This installation's identity.
    #[must_use]
    pub fn installation_id(&self) -> InstallationId {
        self.installation_id
    }

    /// The current hardware fingerprint.
    #[must_use]
    pub fn hardware_id(&self) -> String {
        self.fingerprint.fingerprint()
    }

    /// Activates a license key with the remote authority.
    ///
    /// Unlike validation, activation never falls back to a cached or
    /// offline state: no cache exists yet. With an existing activation
    /// and `allow_reactivation` disabled this fails without contacting
    /// the authority.
    pub async fn activate(&self, license_key: &str) -> LicenseResult<ActivationReport> {
        let _guard = self.inflight.lock().await;

        if self.engine.snapshot().is_some() && !self.config().allow_reactivation {
            return Err(LicenseError::AlreadyActivated);
        }

        let hardware_id = self.fingerprint.fingerprint();
        let request = ActivationRequest {
            license_key: license_key.to_string(),
            hardware_id: hardware_id.clone(),
            installation_id: self.installation_id,
            installation_name: self.config().installation_name.clone(),
            installation_version: self.config().app_version.clone(),
        };

        let started = Instant::now();
        let now = Utc::now();
        match self.client.activate(&request).await {
            Ok(AuthorityResponse::Approved(entitlement)) => {
                let report = ActivationReport {
                    status: LicenseStatus::Active.as_label().to_string(),
                    tier: entitlement.tier,
                    entitled_features: entitlement.features.clone(),
                    expires_at: entitlement.expires_at,
                };
                let record = LicenseRecord {
                    license_key: license_key.to_string(),
                    entitlement,
                    hardware_fingerprint: hardware_id.clone(),
                    activated_at: now,
                    last_successful_validation_at: now,
                    grace_started_at: None,
                    revoked: false,
                };
                self.engine.install_record(record)?;
                self.refresh_feature_flags(now)?;
                self.log_attempt(now, OutcomeKind::Approved, None, started, license_key, &hardware_id)?;
                info!(installation_id = %self.installation_id, "activation complete");
                Ok(report)
            }
            Ok(AuthorityResponse::Rejected { reason }) => {
                self.log_attempt(
                    now,
                    OutcomeKind::Rejected,
                    Some(reason.clone()),
                    started,
                    license_key,
                    &hardware_id,
                )?;
                Err(LicenseError::ActivationDenied(reason))
            }
            Err(e) => {
                let detail = e.to_string();
                self.log_attempt(
                    now,
                    OutcomeKind::Unreachable,
                    Some(detail.clone()),
                    started,
                    license_key,
                    &hardware_id,
                )?;
                Err(LicenseError::ActivationRequiresConnectivity(detail))
            }
        }
    }

    /// Runs one validation cycle, or reports "in progress" when a cycle
    /// already holds the guard. Fails with `NotActivated` when no
    /// license is cached.
    pub async fn validate(&self) -> LicenseResult<ValidationReport> {
        match self.inflight.try_lock() {
            Ok(_guard) => self.run_cycle(None).await,
            Err(_) => {
                debug!("validation already in progress, skipping");
                Ok(ValidationReport {
                    in_progress: true,
                    outcome: None,
                    status: self.status(),
                })
            }
        }
    }

    /// Sends a heartbeat by piggybacking one validation cycle with usage
    /// metrics and host info attached. Not accepted when a cycle is
    /// already in flight or no license exists.
    pub async fn heartbeat(&self, metrics: Option<UsageMetrics>) -> LicenseResult<HeartbeatReport> {
        match self.inflight.try_lock() {
            Ok(_guard) => match self.run_cycle(Some(metrics.unwrap_or_default())).await {
                Ok(report) => Ok(HeartbeatReport {
                    accepted: true,
                    outcome: report.outcome,
                }),
                Err(LicenseError::NotActivated) => Ok(HeartbeatReport {
                    accepted: false,
                    outcome: None,
                }),
                Err(e) => Err(e),
            },
            Err(_) => Ok(HeartbeatReport {
                accepted: false,
                outcome: None,
            }),
        }
    }

    /// Current status, computed from the committed snapshot. Never
    /// touches the network and never waits on an in-flight cycle.
    #[must_use]
    pub fn status(&self) -> StatusReport {
        let now = Utc::now();
        let record = self.engine.snapshot();
        let status = evaluate(record.as_ref(), now, self.config().grace_period);
        StatusReport::new(&status, record.as_ref())
    }

    /// Availability decision for one feature key, from one consistent
    /// `(status, record)` snapshot.
    #[must_use]
    pub fn check_feature(&self, key: &FeatureKey) -> FeatureDecision {
        let now = Utc::now();
        let record = self.engine.snapshot();
        let status = evaluate(record.as_ref(), now, self.config().grace_period);
        gate::check_feature(key, &status, record.as_ref(), self.config())
    }

    /// Recent validation attempts, newest first. Audit surface only.
    pub fn validation_history(
        &self,
        limit: usize,
        offset: usize,
    ) -> LicenseResult<Vec<ValidationAttempt>> {
        Ok(self.store.load_attempts(limit, offset)?)
    }

    // Caller holds the in-flight guard.
    async fn run_cycle(&self, metrics: Option<UsageMetrics>) -> LicenseResult<ValidationReport> {
        let record = self.engine.snapshot().ok_or(LicenseError::NotActivated)?;

        let started = Instant::now();
        let now = Utc::now();
        let hardware_id = self.fingerprint.fingerprint();

        // Hardware binding is checked locally first: a mismatched host
        // cannot be fixed by the authority, so no round-trip happens.
        let outcome = if !record.matches_hardware(&hardware_id) {
            ValidationOutcome::HardwareMismatch {
                expected: record.hardware_fingerprint.clone(),
                actual: hardware_id.clone(),
            }
        } else {
            let system_info = metrics.is_some().then(SystemInfo::collect);
            let request = ValidationRequest {
                license_key: record.license_key.clone(),
                hardware_id: hardware_id.clone(),
                installation_id: self.installation_id,
                usage_metrics: metrics,
                system_info,
            };
            match self.client.validate(&request).await {
                Ok(AuthorityResponse::Approved(entitlement)) => {
                    ValidationOutcome::Approved(entitlement)
                }
                Ok(AuthorityResponse::Rejected { reason }) => {
                    ValidationOutcome::Rejected { reason }
                }
                // Every transport failure, timeouts included, classifies
                // as Unreachable — never as Rejected.
                Err(e) => ValidationOutcome::Unreachable {
                    detail: e.to_string(),
                },
            }
        };

        let status = self.engine.record_validation_outcome(&outcome, now)?;
        self.log_attempt(
            now,
            outcome.kind(),
            outcome.detail(),
            started,
            &record.license_key,
            &hardware_id,
        )?;
        self.refresh_feature_flags(now)?;

        let snapshot = self.engine.snapshot();
        Ok(ValidationReport {
            in_progress: false,
            outcome: Some(outcome.kind()),
            status: StatusReport::new(&status, snapshot.as_ref()),
        })
    }

    /// Recomputes and persists the whole feature-flag cache for the
    /// current state.
    fn refresh_feature_flags(&self, now: DateTime<Utc>) -> LicenseResult<()> {
        let record = self.engine.snapshot();
        let status = evaluate(record.as_ref(), now, self.config().grace_period);
        let flags = gate::compute_flags(&status, record.as_ref(), self.config(), now);
        self.store.replace_feature_flags(&flags)?;
        Ok(())
    }

    fn log_attempt(
        &self,
        attempted_at: DateTime<Utc>,
        outcome: OutcomeKind,
        detail: Option<String>,
        started: Instant,
        license_key: &str,
        hardware_id: &str,
    ) -> LicenseResult<()> {
        self.store.append_attempt(&ValidationAttempt {
            attempted_at,
            outcome,
            detail,
            duration_ms: started.elapsed().as_millis() as u64,
            license_key: Some(license_key.to_string()),
            hardware_id: Some(hardware_id.to_string()),
        })?;
        Ok(())
    }
}
