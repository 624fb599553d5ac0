//! Request/response types for the authentication endpoints.

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::models::IdentityResponse;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RegisterRequest {
    pub tenant_id: Uuid,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1, max = 256))]
    pub password: String,
    #[validate(length(max = 120))]
    pub display_name: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RegisterResponse {
    pub identity: IdentityResponse,
    pub message: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct LoginRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1))]
    pub password: String,
    #[validate(length(max = 120))]
    pub device_name: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LoginResponse {
    /// Full login: opaque bearer token plus the authenticated principal.
    Success {
        token: String,
        identity: IdentityResponse,
    },
    /// Password accepted; present the challenge token with a code at the
    /// two-factor endpoint to finish.
    TwoFactorRequired {
        identity_id: Uuid,
        challenge_token: String,
    },
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct TwoFactorLoginRequest {
    pub identity_id: Uuid,
    #[validate(length(min = 1))]
    pub challenge_token: String,
    #[validate(length(min = 1, max = 16))]
    pub code: String,
    #[validate(length(max = 120))]
    pub device_name: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TwoFactorLoginResponse {
    pub token: String,
    pub identity: IdentityResponse,
    /// True when a recovery code was burned and the factor should be
    /// reprovisioned.
    pub reprovision_recommended: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recovery_codes_remaining: Option<i64>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct PasswordResetRequest {
    #[validate(email)]
    pub email: String,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct PasswordResetValidateQuery {
    pub email: String,
    pub token: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TokenValidityResponse {
    pub valid: bool,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct PasswordResetConfirm {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1))]
    pub token: String,
    #[validate(length(min = 1, max = 256))]
    pub new_password: String,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct VerifyEmailQuery {
    pub email: String,
    pub token: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ChangePasswordRequest {
    #[validate(length(min = 1))]
    pub current_password: String,
    #[validate(length(min = 1, max = 256))]
    pub new_password: String,
}
