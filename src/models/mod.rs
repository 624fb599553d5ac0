pub mod ephemeral_token;
pub mod identity;
pub mod lockout;
pub mod oauth_link;
pub mod password_history;
pub mod recovery_code;
pub mod security_event;
pub mod session;
pub mod tenant;

pub use ephemeral_token::{EphemeralToken, TokenPurpose};
pub use identity::{Identity, IdentityResponse, TwoFactor, TwoFactorStateCode};
pub use lockout::LockoutRecord;
pub use oauth_link::{OAuthLink, OAuthLinkResponse};
pub use password_history::{PasswordHistoryEntry, PASSWORD_HISTORY_DEPTH};
pub use recovery_code::{normalize_code, RecoveryCode, RECOVERY_POOL_SIZE};
pub use security_event::{
    RequestContext, SecurityEvent, SecurityEventResponse, SecurityEventType,
};
pub use session::{Session, SessionInfo};
pub use tenant::{Tenant, DEFAULT_TENANT_LABEL};
