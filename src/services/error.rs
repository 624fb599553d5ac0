//! Service error taxonomy.
//!
//! Every expected, user-facing outcome is a typed variant with a stable
//! machine-readable code; only infrastructure failures map to 5xx. Whether an
//! email exists is never distinguishable from the outside: unknown email and
//! wrong password both surface as `InvalidCredentials`.

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use super::password_policy::PolicyViolation;
use crate::dtos::ErrorResponse;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Account locked; try again in {minutes_remaining} minute(s)")]
    AccountLocked { minutes_remaining: i64 },

    #[error("Email address not verified")]
    EmailUnverified,

    #[error("Two-factor verification required")]
    TwoFactorRequired,

    #[error("Invalid two-factor code")]
    InvalidTwoFactorCode,

    #[error("Two-factor authentication is already enabled")]
    AlreadyEnabled,

    #[error("Two-factor authentication is not enabled")]
    NotEnabled,

    #[error("Token expired")]
    TokenExpired,

    #[error("Invalid token")]
    TokenInvalid,

    #[error("Password does not meet policy requirements")]
    PasswordPolicyViolation { violations: Vec<PolicyViolation> },

    #[error("Password was used recently")]
    PasswordReused,

    #[error("Unsupported provider: {0}")]
    ProviderUnsupported(String),

    #[error("Provider authentication failed: {0}")]
    ProviderAuthFailed(String),

    #[error("Cannot remove the last remaining authentication method")]
    LastAuthMethod,

    #[error("External account is already connected to an identity")]
    AlreadyConnected,

    #[error("Email already registered")]
    EmailTaken,

    #[error("Not found")]
    NotFound,

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Database error: {0}")]
    Database(anyhow::Error),

    #[error("Email delivery error: {0}")]
    Email(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ServiceError {
    /// Stable machine-readable code for API consumers.
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::InvalidCredentials => "invalid_credentials",
            ServiceError::AccountLocked { .. } => "account_locked",
            ServiceError::EmailUnverified => "email_unverified",
            ServiceError::TwoFactorRequired => "two_factor_required",
            ServiceError::InvalidTwoFactorCode => "invalid_two_factor_code",
            ServiceError::AlreadyEnabled => "two_factor_already_enabled",
            ServiceError::NotEnabled => "two_factor_not_enabled",
            ServiceError::TokenExpired => "token_expired",
            ServiceError::TokenInvalid => "token_invalid",
            ServiceError::PasswordPolicyViolation { .. } => "password_policy_violation",
            ServiceError::PasswordReused => "password_reused",
            ServiceError::ProviderUnsupported(_) => "provider_unsupported",
            ServiceError::ProviderAuthFailed(_) => "provider_auth_failed",
            ServiceError::LastAuthMethod => "last_auth_method",
            ServiceError::AlreadyConnected => "already_connected",
            ServiceError::EmailTaken => "email_taken",
            ServiceError::NotFound => "not_found",
            ServiceError::Unauthorized => "unauthorized",
            ServiceError::Database(_) => "database_error",
            ServiceError::Email(_) => "email_error",
            ServiceError::Internal(_) => "internal_error",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            ServiceError::InvalidCredentials
            | ServiceError::InvalidTwoFactorCode
            | ServiceError::Unauthorized => StatusCode::UNAUTHORIZED,
            ServiceError::AccountLocked { .. } => StatusCode::LOCKED,
            ServiceError::EmailUnverified
            | ServiceError::TwoFactorRequired
            | ServiceError::LastAuthMethod => StatusCode::FORBIDDEN,
            ServiceError::AlreadyEnabled
            | ServiceError::AlreadyConnected
            | ServiceError::EmailTaken => StatusCode::CONFLICT,
            ServiceError::NotEnabled
            | ServiceError::TokenExpired
            | ServiceError::TokenInvalid
            | ServiceError::ProviderUnsupported(_) => StatusCode::BAD_REQUEST,
            ServiceError::PasswordPolicyViolation { .. } | ServiceError::PasswordReused => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ServiceError::ProviderAuthFailed(_) => StatusCode::BAD_GATEWAY,
            ServiceError::NotFound => StatusCode::NOT_FOUND,
            ServiceError::Database(_) | ServiceError::Email(_) | ServiceError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            // Call sites that expect a specific conflict match on
            // UniqueViolation before this conversion runs.
            StoreError::UniqueViolation(key) => {
                ServiceError::Database(anyhow::anyhow!("Unexpected unique violation: {}", key))
            }
            StoreError::Database(e) => ServiceError::Database(e),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();

        // Do not leak infrastructure detail to clients.
        let (error, details) = match &self {
            ServiceError::Database(e) | ServiceError::Internal(e) => {
                tracing::error!(error = %e, code, "Request failed");
                ("Internal server error".to_string(), None)
            }
            ServiceError::Email(msg) => {
                tracing::error!(error = %msg, "Email delivery failed");
                ("Email delivery failed".to_string(), None)
            }
            ServiceError::PasswordPolicyViolation { violations } => (
                self.to_string(),
                Some(serde_json::json!(violations
                    .iter()
                    .map(|v| serde_json::json!({
                        "code": v.code(),
                        "message": v.to_string(),
                    }))
                    .collect::<Vec<_>>())),
            ),
            ServiceError::AccountLocked { minutes_remaining } => (
                self.to_string(),
                Some(serde_json::json!({ "minutes_remaining": minutes_remaining })),
            ),
            _ => (self.to_string(), None),
        };

        let mut res = (
            status,
            Json(ErrorResponse {
                code: code.to_string(),
                error,
                details,
            }),
        )
            .into_response();

        if let ServiceError::AccountLocked { minutes_remaining } = self {
            if let Ok(value) = header::HeaderValue::from_str(&(minutes_remaining * 60).to_string())
            {
                res.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }

        res
    }
}
