//! Shared test helpers for licensing tests.

#![allow(dead_code)]

use argus_license::{
    ActivationRequest, AuthorityClient, AuthorityError, AuthorityResponse, FixedFingerprint,
    LicenseConfig, LicenseManager, ValidationRequest,
};
use argus_store::LicenseStore;
use argus_types::{Entitlement, FeatureKey, LicenseRecord, LicenseTier};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

/// Fingerprint every test record is bound to.
pub const TEST_FINGERPRINT: &str = "fp-test-host";

/// Installs a compact tracing subscriber for test debugging.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// A professional-tier entitlement with two licensed modules.
pub fn professional_entitlement() -> Entitlement {
    let mut features = BTreeSet::new();
    features.insert(FeatureKey::from("module.analytics"));
    features.insert(FeatureKey::from("module.multi_site"));
    Entitlement {
        tier: LicenseTier::Professional,
        features,
        expires_at: None,
        max_cameras: Some(64),
        max_users: Some(10),
    }
}

/// A healthy record activated and last validated at `now`.
pub fn healthy_record(now: DateTime<Utc>) -> LicenseRecord {
    LicenseRecord {
        license_key: "ARGUS-PRO-0001".into(),
        entitlement: professional_entitlement(),
        hardware_fingerprint: TEST_FINGERPRINT.into(),
        activated_at: now,
        last_successful_validation_at: now,
        grace_started_at: None,
        revoked: false,
    }
}

/// Config used across tests: defaults plus a permissive localhost URL.
pub fn test_config() -> LicenseConfig {
    LicenseConfig::default()
}

/// Scripted authority: pops one canned result per call and records the
/// requests it saw.
pub struct MockAuthorityClient {
    script: Mutex<VecDeque<Result<AuthorityResponse, AuthorityError>>>,
    calls: AtomicUsize,
    last_validation: Mutex<Option<ValidationRequest>>,
    last_activation: Mutex<Option<ActivationRequest>>,
}

impl MockAuthorityClient {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
            last_validation: Mutex::new(None),
            last_activation: Mutex::new(None),
        }
    }

    pub fn approving() -> Self {
        let mock = Self::new();
        mock.push_approved();
        mock
    }

    pub fn push_approved(&self) {
        self.push(Ok(AuthorityResponse::Approved(professional_entitlement())));
    }

    pub fn push_approved_with(&self, entitlement: Entitlement) {
        self.push(Ok(AuthorityResponse::Approved(entitlement)));
    }

    pub fn push_rejected(&self, reason: &str) {
        self.push(Ok(AuthorityResponse::Rejected {
            reason: reason.to_string(),
        }));
    }

    pub fn push_unreachable(&self, detail: &str) {
        self.push(Err(AuthorityError::Transport(detail.to_string())));
    }

    pub fn push(&self, result: Result<AuthorityResponse, AuthorityError>) {
        self.script.lock().unwrap().push_back(result);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_validation(&self) -> Option<ValidationRequest> {
        self.last_validation.lock().unwrap().clone()
    }

    pub fn last_activation(&self) -> Option<ActivationRequest> {
        self.last_activation.lock().unwrap().clone()
    }

    fn next(&self) -> Result<AuthorityResponse, AuthorityError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(AuthorityError::Transport("script exhausted".into())))
    }
}

#[async_trait]
impl AuthorityClient for MockAuthorityClient {
    async fn activate(
        &self,
        req: &ActivationRequest,
    ) -> Result<AuthorityResponse, AuthorityError> {
        *self.last_activation.lock().unwrap() = Some(req.clone());
        self.next()
    }

    async fn validate(
        &self,
        req: &ValidationRequest,
    ) -> Result<AuthorityResponse, AuthorityError> {
        *self.last_validation.lock().unwrap() = Some(req.clone());
        self.next()
    }
}

/// Authority whose validate call parks until released. Used to hold the
/// single-flight guard open.
pub struct BlockingAuthorityClient {
    pub entered: Arc<Notify>,
    pub release: Arc<Notify>,
}

impl BlockingAuthorityClient {
    pub fn new() -> Self {
        Self {
            entered: Arc::new(Notify::new()),
            release: Arc::new(Notify::new()),
        }
    }
}

#[async_trait]
impl AuthorityClient for BlockingAuthorityClient {
    async fn activate(
        &self,
        _req: &ActivationRequest,
    ) -> Result<AuthorityResponse, AuthorityError> {
        Ok(AuthorityResponse::Approved(professional_entitlement()))
    }

    async fn validate(
        &self,
        _req: &ValidationRequest,
    ) -> Result<AuthorityResponse, AuthorityError> {
        self.entered.notify_one();
        self.release.notified().await;
        Ok(AuthorityResponse::Approved(professional_entitlement()))
    }
}

/// A manager over an in-memory store, a fixed fingerprint and the given
/// client.
pub fn manager_with(client: Arc<dyn AuthorityClient>, config: LicenseConfig) -> Arc<LicenseManager> {
    let store = Arc::new(LicenseStore::open_in_memory().unwrap());
    Arc::new(
        LicenseManager::new(
            store,
            client,
            Arc::new(FixedFingerprint(TEST_FINGERPRINT.into())),
            config,
        )
        .unwrap(),
    )
}

/// A manager with an already-activated professional license.
pub async fn activated_manager(client: Arc<dyn AuthorityClient>) -> Arc<LicenseManager> {
    let mock = MockAuthorityClient::approving();
    let store = Arc::new(LicenseStore::open_in_memory().unwrap());
    {
        let bootstrap = LicenseManager::new(
            store.clone(),
            Arc::new(mock),
            Arc::new(FixedFingerprint(TEST_FINGERPRINT.into())),
            test_config(),
        )
        .unwrap();
        bootstrap.activate("ARGUS-PRO-0001").await.unwrap();
    }
    Arc::new(
        LicenseManager::new(
            store,
            client,
            Arc::new(FixedFingerprint(TEST_FINGERPRINT.into())),
            test_config(),
        )
        .unwrap(),
    )
}
