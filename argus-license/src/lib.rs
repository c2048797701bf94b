//! Licensing core for Argus on-premise deployments.
//!
//! Decides, at any instant, whether this installation is licensed to run
//! and which features it may expose, tolerating loss of connectivity to
//! the licensing authority for a bounded grace period.
//!
//! # Design Principles
//!
//! - **Derived status**: the license status is a pure function of the
//!   persisted record plus "now" — never a separately stored enum that
//!   could diverge.
//! - **Single-flight validation**: at most one validation cycle per
//!   installation; overlapping triggers report "in progress" instead of
//!   queuing.
//! - **Non-blocking reads**: status and feature checks read the latest
//!   committed record snapshot and never wait on a cycle.
//! - **Bounded offline tolerance**: the first failed validation after a
//!   healthy state opens the grace window once; repeated failures never
//!   restart it.
//! - **Hardware binding**: the license is tied to a fingerprint captured
//!   at activation; a mismatch is terminal for the cached license.

mod authority;
mod config;
mod engine;
mod error;
mod fingerprint;
mod gate;
mod orchestrator;
mod status;

pub use authority::{
    ActivationRequest, AuthorityClient, AuthorityError, AuthorityResponse, HttpAuthorityClient,
    ValidationRequest,
};
pub use config::LicenseConfig;
pub use engine::LicenseEngine;
pub use error::{LicenseError, LicenseResult};
pub use fingerprint::{DeviceFingerprint, FingerprintProvider, FixedFingerprint, SystemInfo};
pub use gate::{check_feature, compute_flags, AvailabilityReason, FeatureDecision};
pub use orchestrator::{
    ActivationReport, HeartbeatReport, LicenseManager, StatusReport, ValidationReport,
};
pub use status::{evaluate, LicenseStatus};
