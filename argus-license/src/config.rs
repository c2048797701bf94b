//! Configuration for the licensing core.
//!
//! Passed explicitly into constructors so the state machine stays
//! testable with simulated clocks and mock collaborators. Nothing in
//! this crate reads ambient global state.

use argus_types::FeatureKey;
use chrono::Duration;
use std::collections::BTreeSet;

/// Configuration for the license engine, feature gate and orchestrator.
#[derive(Debug, Clone)]
pub struct LicenseConfig {
    /// Base URL of the remote licensing authority, e.g.
    /// `https://licensing.example.com/api`.
    pub api_base_url: String,
    /// Bounded timeout for authority round-trips. On expiry the attempt
    /// classifies as Unreachable, never Rejected.
    pub api_timeout: std::time::Duration,
    /// Offline grace window measured from the first failed validation
    /// after a healthy state.
    pub grace_period: Duration,
    /// Interval for the external heartbeat timer. Surfaced for wiring;
    /// the core itself never schedules anything.
    pub heartbeat_interval: Duration,
    /// Whether core features stay available without a usable license.
    pub allow_unlicensed_core_features: bool,
    /// Whether activating over an existing license is permitted. When
    /// false, re-activation fails with `AlreadyActivated`.
    pub allow_reactivation: bool,
    /// The fixed set of core features covered by the unlicensed-core
    /// override.
    pub core_features: BTreeSet<FeatureKey>,
    /// Human-readable installation name sent with activation requests.
    pub installation_name: String,
    /// Product version sent with activation requests.
    pub app_version: String,
}

impl LicenseConfig {
    /// Returns true if the key belongs to the fixed core feature set.
    #[must_use]
    pub fn is_core_feature(&self, key: &FeatureKey) -> bool {
        self.core_features.contains(key)
    }
}

impl Default for LicenseConfig {
    fn default() -> Self {
        let core_features = [
            "module.camera_management",
            "module.live_view",
            "module.recording_basic",
            "module.playback",
            "module.user_management",
        ]
        .into_iter()
        .map(FeatureKey::from)
        .collect();

        Self {
            api_base_url: "http://localhost:4000/api".to_string(),
            api_timeout: std::time::Duration::from_secs(30),
            grace_period: Duration::hours(72),
            heartbeat_interval: Duration::hours(4),
            allow_unlicensed_core_features: true,
            allow_reactivation: false,
            core_features,
            installation_name: "Argus Central Command".to_string(),
            app_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
