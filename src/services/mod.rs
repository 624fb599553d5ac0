//! Services layer.
//!
//! Domain services for account security: credential authentication, lockout,
//! password policy, second factor, sessions, OAuth linking, ephemeral tokens
//! and the security audit log.

mod audit;
mod authenticator;
mod email;
pub mod error;
mod lockout;
mod oauth;
mod password_policy;
mod recovery;
mod sessions;
mod tokens;
mod totp;

pub use audit::SecurityAudit;
pub use authenticator::{CredentialAuthenticator, LoginOutcome, TwoFactorLogin};
pub use email::{EmailProvider, MockEmailService, SmtpEmailService};
pub use error::ServiceError;
pub use lockout::{LockoutGuard, DEFAULT_LOCK_MINUTES, DEFAULT_MAX_FAILED_ATTEMPTS};
pub use oauth::{
    AuthorizationStart, GithubProvider, GoogleProvider, OAuthLinker, OAuthProvider,
    ProviderClaims,
};
pub use password_policy::{PasswordPolicy, PolicyViolation, MIN_PASSWORD_LENGTH};
pub use recovery::RecoveryCodeVault;
pub use sessions::SessionRegistry;
pub use tokens::{EphemeralTokens, TokenCheck};
pub use totp::{SecondFactorProof, TwoFactorEnrollment, TwoFactorManager};
