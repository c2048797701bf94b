//! Remote licensing authority client.
//!
//! The trait is the boundary: the orchestrator never sees transport
//! detail beyond `AuthorityError`, which it classifies as Unreachable
//! (validation) or ActivationRequiresConnectivity (activation). Raw
//! transport errors never reach the state engine.

use crate::config::LicenseConfig;
use crate::fingerprint::SystemInfo;
use argus_types::{Entitlement, FeatureKey, InstallationId, LicenseTier, UsageMetrics};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Transport-level failure reaching the authority. Always absorbed at
/// the orchestrator boundary, never surfaced to feature checks.
#[derive(Debug, Error)]
pub enum AuthorityError {
    /// The bounded request deadline expired.
    #[error("authority request timed out")]
    Timeout,

    /// Connection-level failure (DNS, refused, TLS, ...).
    #[error("transport failure: {0}")]
    Transport(String),

    /// The authority answered with a non-success HTTP status.
    #[error("authority returned HTTP {0}")]
    Status(u16),

    /// The response body could not be understood.
    #[error("malformed authority response: {0}")]
    BadResponse(String),
}

/// A conclusive answer from the authority.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthorityResponse {
    /// The license is valid; carries the authoritative entitlement.
    Approved(Entitlement),
    /// The license is rejected (unknown key, revoked, expired upstream).
    Rejected {
        /// Authority-supplied reason.
        reason: String,
    },
}

/// One activation round-trip's inputs.
#[derive(Debug, Clone)]
pub struct ActivationRequest {
    /// The key to exchange for entitlement data.
    pub license_key: String,
    /// Fingerprint the license will be bound to.
    pub hardware_id: String,
    /// This installation's identity.
    pub installation_id: InstallationId,
    /// Human-readable installation name.
    pub installation_name: String,
    /// Product version.
    pub installation_version: String,
}

/// One validation round-trip's inputs.
#[derive(Debug, Clone)]
pub struct ValidationRequest {
    /// The cached license key.
    pub license_key: String,
    /// Fingerprint observed now.
    pub hardware_id: String,
    /// This installation's identity.
    pub installation_id: InstallationId,
    /// Usage metrics piggybacked on heartbeat validations.
    pub usage_metrics: Option<UsageMetrics>,
    /// Host information piggybacked on heartbeat validations.
    pub system_info: Option<SystemInfo>,
}

/// Client for the remote licensing authority.
#[async_trait]
pub trait AuthorityClient: Send + Sync {
    /// Exchanges a license key for entitlement data bound to the given
    /// fingerprint.
    async fn activate(&self, req: &ActivationRequest)
        -> Result<AuthorityResponse, AuthorityError>;

    /// Asks whether the cached license is still valid.
    async fn validate(&self, req: &ValidationRequest)
        -> Result<AuthorityResponse, AuthorityError>;
}

// ── HTTP implementation ──────────────────────────────────────────

/// Authority responses arrive in a `{success, data, error}` envelope.
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    success: bool,
    data: Option<serde_json::Value>,
    error: Option<WireError>,
}

impl Envelope {
    fn error_message(&self) -> String {
        self.error
            .as_ref()
            .and_then(|e| e.message.clone())
            .unwrap_or_else(|| "request refused by authority".to_string())
    }
}

#[derive(Debug, Deserialize)]
struct WireError {
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireLicense {
    tier: LicenseTier,
    #[serde(default)]
    entitled_features: Vec<FeatureKey>,
    #[serde(default)]
    expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    max_cameras: Option<u32>,
    #[serde(default)]
    max_users: Option<u32>,
}

impl WireLicense {
    fn into_entitlement(self) -> Entitlement {
        Entitlement {
            tier: self.tier,
            features: self.entitled_features.into_iter().collect(),
            expires_at: self.expires_at,
            max_cameras: self.max_cameras,
            max_users: self.max_users,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireValidation {
    #[serde(default)]
    is_valid: bool,
    license: Option<WireLicense>,
    reason: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ActivateBody<'a> {
    license_key: &'a str,
    hardware_id: &'a str,
    installation_id: String,
    installation_name: &'a str,
    installation_version: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ValidateBody<'a> {
    license_key: &'a str,
    hardware_id: &'a str,
    installation_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    usage_metrics: Option<&'a UsageMetrics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_info: Option<&'a SystemInfo>,
}

/// HTTP client for the licensing cloud.
pub struct HttpAuthorityClient {
    base_url: String,
    client: reqwest::Client,
}

impl HttpAuthorityClient {
    /// Creates a client with the configured base URL and bounded timeout.
    #[must_use]
    pub fn new(config: &LicenseConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.api_timeout)
            .build()
            .expect("failed to create HTTP client");
        Self {
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    async fn post_json<B: Serialize>(
        &self,
        path: &str,
        installation_id: InstallationId,
        body: &B,
    ) -> Result<Envelope, AuthorityError> {
        let url = format!("{}{path}", self.base_url);
        debug!(%url, "authority request");
        let response = self
            .client
            .post(&url)
            .header("X-Installation-ID", installation_id.to_string())
            .json(body)
            .send()
            .await
            .map_err(map_transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(AuthorityError::Status(status.as_u16()));
        }
        response
            .json::<Envelope>()
            .await
            .map_err(|e| AuthorityError::BadResponse(e.to_string()))
    }
}

#[async_trait]
impl AuthorityClient for HttpAuthorityClient {
    async fn activate(
        &self,
        req: &ActivationRequest,
    ) -> Result<AuthorityResponse, AuthorityError> {
        let body = ActivateBody {
            license_key: &req.license_key,
            hardware_id: &req.hardware_id,
            installation_id: req.installation_id.to_string(),
            installation_name: &req.installation_name,
            installation_version: &req.installation_version,
        };
        let envelope = self
            .post_json("/licenses/activate", req.installation_id, &body)
            .await?;

        if !envelope.success {
            return Ok(AuthorityResponse::Rejected {
                reason: envelope.error_message(),
            });
        }
        let data = envelope
            .data
            .ok_or_else(|| AuthorityError::BadResponse("activation data missing".to_string()))?;
        let license: WireLicense = serde_json::from_value(data)
            .map_err(|e| AuthorityError::BadResponse(e.to_string()))?;
        Ok(AuthorityResponse::Approved(license.into_entitlement()))
    }

    async fn validate(
        &self,
        req: &ValidationRequest,
    ) -> Result<AuthorityResponse, AuthorityError> {
        let body = ValidateBody {
            license_key: &req.license_key,
            hardware_id: &req.hardware_id,
            installation_id: req.installation_id.to_string(),
            usage_metrics: req.usage_metrics.as_ref(),
            system_info: req.system_info.as_ref(),
        };
        let envelope = self
            .post_json("/licenses/validate", req.installation_id, &body)
            .await?;

        if !envelope.success {
            return Ok(AuthorityResponse::Rejected {
                reason: envelope.error_message(),
            });
        }
        let data = envelope
            .data
            .ok_or_else(|| AuthorityError::BadResponse("validation data missing".to_string()))?;
        let validation: WireValidation = serde_json::from_value(data)
            .map_err(|e| AuthorityError::BadResponse(e.to_string()))?;

        if validation.is_valid {
            let license = validation.license.ok_or_else(|| {
                AuthorityError::BadResponse("valid response without license data".to_string())
            })?;
            Ok(AuthorityResponse::Approved(license.into_entitlement()))
        } else {
            Ok(AuthorityResponse::Rejected {
                reason: validation
                    .reason
                    .unwrap_or_else(|| "license no longer valid".to_string()),
            })
        }
    }
}

fn map_transport(e: reqwest::Error) -> AuthorityError {
    if e.is_timeout() {
        AuthorityError::Timeout
    } else {
        AuthorityError::Transport(e.to_string())
    }
}
