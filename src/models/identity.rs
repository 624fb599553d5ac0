//! Identity model - tenant-scoped user accounts and their credentials.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// Second-factor state codes as stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TwoFactorStateCode {
    Disabled,
    Pending,
    Enabled,
}

impl TwoFactorStateCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TwoFactorStateCode::Disabled => "disabled",
            TwoFactorStateCode::Pending => "pending",
            TwoFactorStateCode::Enabled => "enabled",
        }
    }
}

impl std::str::FromStr for TwoFactorStateCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "disabled" => Ok(TwoFactorStateCode::Disabled),
            "pending" => Ok(TwoFactorStateCode::Pending),
            "enabled" => Ok(TwoFactorStateCode::Enabled),
            _ => Err(format!("Invalid two-factor state: {}", s)),
        }
    }
}

/// Second factor as the domain layer sees it.
///
/// The storage layer keeps a state code plus a nullable encrypted secret;
/// this tagged form makes a confirmed factor without a secret
/// unrepresentable in the code that manipulates it.
#[derive(Debug, Clone)]
pub enum TwoFactor {
    Disabled,
    /// Secret provisioned, waiting for the first code to confirm possession.
    Pending { secret_enc: Vec<u8> },
    Enabled { secret_enc: Vec<u8> },
}

impl TwoFactor {
    pub fn state_code(&self) -> TwoFactorStateCode {
        match self {
            TwoFactor::Disabled => TwoFactorStateCode::Disabled,
            TwoFactor::Pending { .. } => TwoFactorStateCode::Pending,
            TwoFactor::Enabled { .. } => TwoFactorStateCode::Enabled,
        }
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self, TwoFactor::Enabled { .. })
    }
}

/// Identity entity (tenant-scoped).
#[derive(Debug, Clone, FromRow)]
pub struct Identity {
    pub identity_id: Uuid,
    pub tenant_id: Uuid,
    pub email: String,
    pub display_name: Option<String>,
    pub password_hash: String,
    /// False when the hash is an unusable placeholder set by an OAuth signup.
    pub password_set: bool,
    pub email_verified_utc: Option<DateTime<Utc>>,
    pub totp_state_code: String,
    pub totp_secret_enc: Option<Vec<u8>>,
    pub totp_confirmed_utc: Option<DateTime<Utc>>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl Identity {
    /// Create a new identity with an unverified email.
    pub fn new(
        tenant_id: Uuid,
        email: String,
        display_name: Option<String>,
        password_hash: String,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            identity_id: Uuid::new_v4(),
            tenant_id,
            email,
            display_name,
            password_hash,
            password_set: true,
            email_verified_utc: None,
            totp_state_code: TwoFactorStateCode::Disabled.as_str().to_string(),
            totp_secret_enc: None,
            totp_confirmed_utc: None,
            created_utc: now,
            updated_utc: now,
        }
    }

    /// Create an identity from a trusted OAuth provider claim.
    ///
    /// The provider vouches for the email, so it is pre-verified; the
    /// password slot holds an unusable placeholder.
    pub fn from_provider(
        tenant_id: Uuid,
        email: String,
        display_name: Option<String>,
        placeholder_hash: String,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            password_set: false,
            email_verified_utc: Some(now),
            ..Self::new(tenant_id, email, display_name, placeholder_hash, now)
        }
    }

    pub fn is_email_verified(&self) -> bool {
        self.email_verified_utc.is_some()
    }

    /// Decode the stored second-factor columns into the tagged form.
    pub fn two_factor(&self) -> TwoFactor {
        match (self.totp_state_code.as_str(), &self.totp_secret_enc) {
            ("pending", Some(secret)) => TwoFactor::Pending {
                secret_enc: secret.clone(),
            },
            ("enabled", Some(secret)) => TwoFactor::Enabled {
                secret_enc: secret.clone(),
            },
            // A state code without its secret is treated as disabled rather
            // than trusted; the enable flow rewrites both columns together.
            _ => TwoFactor::Disabled,
        }
    }

    /// Convert to a response without sensitive fields.
    pub fn sanitized(&self) -> IdentityResponse {
        IdentityResponse {
            identity_id: self.identity_id,
            tenant_id: self.tenant_id,
            email: self.email.clone(),
            display_name: self.display_name.clone(),
            email_verified: self.is_email_verified(),
            two_factor_enabled: self.two_factor().is_enabled(),
            created_utc: self.created_utc,
        }
    }
}

/// Identity response for the API (no credential material).
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct IdentityResponse {
    pub identity_id: Uuid,
    pub tenant_id: Uuid,
    pub email: String,
    pub display_name: Option<String>,
    pub email_verified: bool,
    pub two_factor_enabled: bool,
    pub created_utc: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_factor_requires_secret() {
        let now = Utc::now();
        let mut identity = Identity::new(
            Uuid::new_v4(),
            "a@b.test".to_string(),
            None,
            "$argon2id$fake".to_string(),
            now,
        );

        identity.totp_state_code = "enabled".to_string();
        assert!(matches!(identity.two_factor(), TwoFactor::Disabled));

        identity.totp_secret_enc = Some(vec![1, 2, 3]);
        assert!(identity.two_factor().is_enabled());
    }

    #[test]
    fn test_provider_identity_is_verified_without_password() {
        let now = Utc::now();
        let identity = Identity::from_provider(
            Uuid::new_v4(),
            "a@b.test".to_string(),
            Some("A B".to_string()),
            "$argon2id$placeholder".to_string(),
            now,
        );

        assert!(identity.is_email_verified());
        assert!(!identity.password_set);
    }
}
