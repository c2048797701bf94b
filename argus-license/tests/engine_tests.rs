mod common;

use argus_license::{LicenseEngine, LicenseError, LicenseStatus};
use argus_store::LicenseStore;
use argus_types::{FeatureKey, LicenseTier, ValidationOutcome};
use chrono::{Duration, TimeZone, Utc};
use common::{healthy_record, professional_entitlement, test_config};
use pretty_assertions::assert_eq;
use std::sync::Arc;

fn t0() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
}

fn engine_with_license() -> (LicenseEngine, Arc<LicenseStore>) {
    let store = Arc::new(LicenseStore::open_in_memory().unwrap());
    let engine = LicenseEngine::new(store.clone(), test_config()).unwrap();
    engine.install_record(healthy_record(t0())).unwrap();
    (engine, store)
}

#[test]
fn fresh_engine_is_unactivated() {
    let store = Arc::new(LicenseStore::open_in_memory().unwrap());
    let engine = LicenseEngine::new(store, test_config()).unwrap();
    assert_eq!(engine.current_status(t0()), LicenseStatus::Unactivated);
    assert!(engine.snapshot().is_none());
}

#[test]
fn engine_reloads_persisted_record() {
    let store = Arc::new(LicenseStore::open_in_memory().unwrap());
    {
        let engine = LicenseEngine::new(store.clone(), test_config()).unwrap();
        engine.install_record(healthy_record(t0())).unwrap();
    }
    let engine = LicenseEngine::new(store, test_config()).unwrap();
    assert_eq!(engine.current_status(t0()), LicenseStatus::Active);
    assert_eq!(engine.snapshot().unwrap().license_key, "ARGUS-PRO-0001");
}

#[test]
fn outcome_without_record_is_not_activated() {
    let store = Arc::new(LicenseStore::open_in_memory().unwrap());
    let engine = LicenseEngine::new(store, test_config()).unwrap();
    let err = engine
        .record_validation_outcome(
            &ValidationOutcome::Unreachable {
                detail: "dns".into(),
            },
            t0(),
        )
        .unwrap_err();
    assert!(matches!(err, LicenseError::NotActivated));
}

#[test]
fn approved_refreshes_entitlement_and_timestamps() {
    let (engine, _store) = engine_with_license();

    let mut refreshed = professional_entitlement();
    refreshed.tier = LicenseTier::Enterprise;
    refreshed.features.insert(FeatureKey::from("module.ai_search"));

    let now = t0() + Duration::hours(24);
    let status = engine
        .record_validation_outcome(&ValidationOutcome::Approved(refreshed.clone()), now)
        .unwrap();

    assert_eq!(status, LicenseStatus::Active);
    let record = engine.snapshot().unwrap();
    assert_eq!(record.entitlement, refreshed);
    assert_eq!(record.last_successful_validation_at, now);
    assert_eq!(record.grace_started_at, None);
    assert!(!record.revoked);
}

#[test]
fn approved_replay_is_idempotent() {
    let (engine, _store) = engine_with_license();
    let now = t0() + Duration::hours(24);
    let outcome = ValidationOutcome::Approved(professional_entitlement());

    let first_status = engine.record_validation_outcome(&outcome, now).unwrap();
    let first = engine.snapshot().unwrap();

    let second_status = engine.record_validation_outcome(&outcome, now).unwrap();
    let second = engine.snapshot().unwrap();

    assert_eq!(first_status, second_status);
    assert_eq!(first, second);
}

#[test]
fn grace_starts_exactly_once_per_failure_streak() {
    let (engine, _store) = engine_with_license();

    let first_failure = t0() + Duration::hours(1);
    engine
        .record_validation_outcome(
            &ValidationOutcome::Unreachable {
                detail: "timeout".into(),
            },
            first_failure,
        )
        .unwrap();
    assert_eq!(
        engine.snapshot().unwrap().grace_started_at,
        Some(first_failure)
    );

    // A later failure in the same streak leaves the start untouched.
    engine
        .record_validation_outcome(
            &ValidationOutcome::Unreachable {
                detail: "timeout".into(),
            },
            t0() + Duration::hours(10),
        )
        .unwrap();
    assert_eq!(
        engine.snapshot().unwrap().grace_started_at,
        Some(first_failure)
    );
}

#[test]
fn approved_after_failures_clears_grace() {
    let (engine, _store) = engine_with_license();

    engine
        .record_validation_outcome(
            &ValidationOutcome::Unreachable {
                detail: "offline".into(),
            },
            t0() + Duration::hours(1),
        )
        .unwrap();
    assert!(matches!(
        engine.current_status(t0() + Duration::hours(2)),
        LicenseStatus::Grace { .. }
    ));

    let status = engine
        .record_validation_outcome(
            &ValidationOutcome::Approved(professional_entitlement()),
            t0() + Duration::hours(3),
        )
        .unwrap();
    assert_eq!(status, LicenseStatus::Active);
    assert_eq!(engine.snapshot().unwrap().grace_started_at, None);
}

#[test]
fn rejected_forces_expired_immediately() {
    let (engine, _store) = engine_with_license();

    let status = engine
        .record_validation_outcome(
            &ValidationOutcome::Rejected {
                reason: "revoked by authority".into(),
            },
            t0() + Duration::hours(1),
        )
        .unwrap();
    assert_eq!(status, LicenseStatus::Expired);

    // One second later, healthy last-success timestamps cannot
    // resurrect the license.
    assert_eq!(
        engine.current_status(t0() + Duration::hours(1) + Duration::seconds(1)),
        LicenseStatus::Expired
    );
}

#[test]
fn hardware_mismatch_is_terminal_like_rejected() {
    let (engine, _store) = engine_with_license();

    let status = engine
        .record_validation_outcome(
            &ValidationOutcome::HardwareMismatch {
                expected: "fp-test-host".into(),
                actual: "fp-other-host".into(),
            },
            t0() + Duration::hours(1),
        )
        .unwrap();
    assert_eq!(status, LicenseStatus::Expired);
    assert!(engine.snapshot().unwrap().revoked);
}

#[test]
fn expired_is_escapable_by_fresh_approval() {
    let (engine, _store) = engine_with_license();

    engine
        .record_validation_outcome(
            &ValidationOutcome::Rejected {
                reason: "payment lapsed".into(),
            },
            t0() + Duration::hours(1),
        )
        .unwrap();
    assert_eq!(
        engine.current_status(t0() + Duration::hours(2)),
        LicenseStatus::Expired
    );

    let status = engine
        .record_validation_outcome(
            &ValidationOutcome::Approved(professional_entitlement()),
            t0() + Duration::hours(3),
        )
        .unwrap();
    assert_eq!(status, LicenseStatus::Active);
    assert!(!engine.snapshot().unwrap().revoked);
}

#[test]
fn full_grace_timeline() {
    // Grace duration 72h, last success at T0, unreachable at T0+1h.
    let (engine, _store) = engine_with_license();
    engine
        .record_validation_outcome(
            &ValidationOutcome::Unreachable {
                detail: "offline".into(),
            },
            t0() + Duration::hours(1),
        )
        .unwrap();

    assert_eq!(
        engine.current_status(t0() + Duration::hours(50)),
        LicenseStatus::Grace {
            remaining: Duration::hours(23)
        }
    );
    assert_eq!(
        engine.current_status(t0() + Duration::hours(74)),
        LicenseStatus::Expired
    );
}

#[test]
fn transitions_write_through_to_store() {
    let (engine, store) = engine_with_license();
    let failure_at = t0() + Duration::hours(1);
    engine
        .record_validation_outcome(
            &ValidationOutcome::Unreachable {
                detail: "offline".into(),
            },
            failure_at,
        )
        .unwrap();

    let stored = store.load_license().unwrap().unwrap();
    assert_eq!(stored.record.grace_started_at, Some(failure_at));
    // install + one outcome
    assert_eq!(stored.revision, 2);
}
