//! Request/response types for the authenticated account endpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::models::{OAuthLinkResponse, SecurityEventResponse, SessionInfo};

#[derive(Debug, Serialize, ToSchema)]
pub struct TwoFactorEnableResponse {
    /// Base32 shared secret, shown exactly once.
    pub secret: String,
    /// otpauth:// URI for QR-code rendering.
    pub provisioning_uri: String,
    /// Plaintext recovery codes, shown exactly once.
    pub recovery_codes: Vec<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct TwoFactorConfirmRequest {
    #[validate(length(min = 6, max = 8))]
    pub code: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct TwoFactorDisableRequest {
    #[validate(length(min = 1))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RecoveryCodesRequest {
    #[validate(length(min = 1))]
    pub password: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RecoveryCodesResponse {
    pub recovery_codes: Vec<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SessionListResponse {
    pub sessions: Vec<SessionInfo>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RevokeAllSessionsRequest {
    /// "Log out everywhere" demands a fresh password confirmation.
    #[validate(length(min = 1))]
    pub password: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RevokedResponse {
    pub revoked: u64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OAuthLinksResponse {
    pub links: Vec<OAuthLinkResponse>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct VerificationStatusResponse {
    pub email_verified: bool,
    pub email_verified_utc: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SecurityActivityResponse {
    pub events: Vec<SecurityEventResponse>,
}

#[derive(Debug, Deserialize)]
pub struct OAuthCallbackQuery {
    pub code: String,
    pub state: String,
}

/// Connect a provider to the already-authenticated identity. The client runs
/// the authorization hop itself and posts the resulting code; the bearer
/// token decides which identity the link attaches to.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct OAuthConnectRequest {
    #[validate(length(min = 1))]
    pub code: String,
    pub code_verifier: Option<String>,
}
