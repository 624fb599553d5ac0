//! Test harness: the service graph wired over the in-memory store, a
//! manually driven clock and a capturing email provider, so every
//! time-dependent property is exercised without sleeping.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use fleetgate_auth::{
    models::{Identity, RequestContext, Tenant},
    services::{
        CredentialAuthenticator, EmailProvider, EphemeralTokens, GithubProvider, GoogleProvider,
        LockoutGuard, OAuthLinker, OAuthProvider, PasswordPolicy, RecoveryCodeVault,
        SecurityAudit, ServiceError, SessionRegistry, TwoFactorManager,
    },
    store::{MemStore, Store},
    utils::{Clock, ManualClock, SecretCipher},
};

pub const TEST_PASSWORD: &str = "Str0ng!Pass";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MailKind {
    Verification,
    PasswordReset,
}

#[derive(Debug, Clone)]
pub struct SentMail {
    pub to: String,
    pub token: String,
    pub kind: MailKind,
}

/// Email provider that captures outgoing tokens instead of sending.
#[derive(Default)]
pub struct CapturingEmail {
    sent: Mutex<Vec<SentMail>>,
}

impl CapturingEmail {
    pub fn last(&self, kind: MailKind) -> Option<SentMail> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|m| m.kind == kind)
            .cloned()
    }

    pub fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl EmailProvider for CapturingEmail {
    async fn send_verification_email(
        &self,
        to_email: &str,
        verification_token: &str,
        _base_url: &str,
    ) -> Result<(), ServiceError> {
        self.sent.lock().unwrap().push(SentMail {
            to: to_email.to_string(),
            token: verification_token.to_string(),
            kind: MailKind::Verification,
        });
        Ok(())
    }

    async fn send_password_reset_email(
        &self,
        to_email: &str,
        reset_token: &str,
        _base_url: &str,
    ) -> Result<(), ServiceError> {
        self.sent.lock().unwrap().push(SentMail {
            to: to_email.to_string(),
            token: reset_token.to_string(),
            kind: MailKind::PasswordReset,
        });
        Ok(())
    }
}

pub struct TestHarness {
    pub store: Arc<MemStore>,
    pub clock: Arc<ManualClock>,
    pub email: Arc<CapturingEmail>,
    pub audit: SecurityAudit,
    pub lockout: LockoutGuard,
    pub policy: PasswordPolicy,
    pub tokens: EphemeralTokens,
    pub vault: RecoveryCodeVault,
    pub two_factor: TwoFactorManager,
    pub sessions: SessionRegistry,
    pub oauth: OAuthLinker,
    pub auth: CredentialAuthenticator,
    pub tenant_id: Uuid,
}

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
}

pub fn ctx() -> RequestContext {
    RequestContext::new("127.0.0.1", "integration-tests")
}

pub async fn harness() -> TestHarness {
    let store: Arc<MemStore> = Arc::new(MemStore::new());
    let store_dyn: Arc<dyn Store> = store.clone();
    let clock = Arc::new(ManualClock::new(start_time()));
    let clock_dyn: Arc<dyn fleetgate_auth::utils::Clock> = clock.clone();
    let email = Arc::new(CapturingEmail::default());
    let email_dyn: Arc<dyn EmailProvider> = email.clone();

    let cipher = SecretCipher::new([42u8; 32]);

    let audit = SecurityAudit::new(store_dyn.clone());
    let lockout = LockoutGuard::new(store_dyn.clone(), audit.clone(), clock_dyn.clone(), 5, 15);
    let policy = PasswordPolicy::new(store_dyn.clone(), clock_dyn.clone());
    let tokens = EphemeralTokens::new(store_dyn.clone(), clock_dyn.clone());
    let vault = RecoveryCodeVault::new(store_dyn.clone(), clock_dyn.clone());
    let two_factor = TwoFactorManager::new(
        store_dyn.clone(),
        vault.clone(),
        audit.clone(),
        clock_dyn.clone(),
        cipher,
        "FleetGate".to_string(),
    );
    let sessions = SessionRegistry::new(store_dyn.clone(), audit.clone(), clock_dyn.clone(), 30);

    let providers: Vec<Arc<dyn OAuthProvider>> = vec![
        Arc::new(GoogleProvider::new(
            "test-client".to_string(),
            "test-secret".to_string(),
            "http://localhost/callback".to_string(),
        )),
        Arc::new(GithubProvider::new(
            "test-client".to_string(),
            "test-secret".to_string(),
            "http://localhost/callback".to_string(),
        )),
    ];
    let oauth = OAuthLinker::new(
        store_dyn.clone(),
        sessions.clone(),
        audit.clone(),
        clock_dyn.clone(),
        providers,
    );

    let auth = CredentialAuthenticator::new(
        store_dyn.clone(),
        audit.clone(),
        lockout.clone(),
        policy.clone(),
        two_factor.clone(),
        sessions.clone(),
        tokens.clone(),
        email_dyn,
        clock_dyn.clone(),
        "http://localhost:8080".to_string(),
    );

    let tenant = Tenant::new("acme-fleet".to_string(), start_time());
    let tenant_id = tenant.tenant_id;
    store_dyn.insert_tenant(&tenant).await.unwrap();

    TestHarness {
        store,
        clock,
        email,
        audit,
        lockout,
        policy,
        tokens,
        vault,
        two_factor,
        sessions,
        oauth,
        auth,
        tenant_id,
    }
}

impl TestHarness {
    /// Register an identity with the default strong password, unverified.
    pub async fn register(&self, email: &str) -> Identity {
        self.auth
            .register(self.tenant_id, email, TEST_PASSWORD, None, &ctx())
            .await
            .expect("registration failed")
    }

    /// Register and mark the email verified, returning the fresh row.
    pub async fn register_verified(&self, email: &str) -> Identity {
        let identity = self.register(email).await;
        self.store
            .mark_email_verified(identity.identity_id, self.clock.now())
            .await
            .unwrap();
        self.store
            .find_identity(identity.identity_id)
            .await
            .unwrap()
            .expect("identity vanished")
    }

    /// Current state of an identity row.
    pub async fn reload(&self, identity: &Identity) -> Identity {
        self.store
            .find_identity(identity.identity_id)
            .await
            .unwrap()
            .expect("identity vanished")
    }
}
