//! OAuth identity linker.
//!
//! Provider drivers sit behind a trait and are selected from a fixed
//! allow-list; claim resolution links or creates local identities and always
//! ends by issuing a session. Disconnecting is refused when it would leave
//! the identity with no way to authenticate.

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use super::{SecurityAudit, ServiceError, SessionRegistry};
use crate::models::{
    Identity, OAuthLink, RequestContext, SecurityEvent, SecurityEventType, Session, Tenant,
    DEFAULT_TENANT_LABEL,
};
use crate::store::{Store, StoreError};
use crate::utils::{generate_token, unusable_password_hash, Clock};

/// What a provider vouches for after a successful code exchange.
#[derive(Debug, Clone)]
pub struct ProviderClaims {
    pub provider_user_id: String,
    pub email: String,
    pub display_name: Option<String>,
    /// Raw profile payload, stored as the link snapshot.
    pub profile: serde_json::Value,
}

/// One driver per allow-listed provider.
#[async_trait]
pub trait OAuthProvider: Send + Sync {
    fn code(&self) -> &'static str;

    /// Build the redirect URL for the authorization hop.
    fn authorize_url(&self, state: &str, code_challenge: &str) -> String;

    /// Exchange the callback code for verified claims. No retry policy:
    /// provider failures surface to the caller as `ProviderAuthFailed`.
    async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
    ) -> Result<ProviderClaims, ServiceError>;
}

/// Values the handler stashes in short-lived cookies for the callback leg.
pub struct AuthorizationStart {
    pub redirect_url: String,
    pub state: String,
    pub code_verifier: String,
}

// ==================== Google ====================

#[derive(Debug, Deserialize)]
struct GoogleTokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct GoogleUserInfo {
    id: String,
    email: String,
    verified_email: bool,
    name: Option<String>,
}

pub struct GoogleProvider {
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    http: reqwest::Client,
}

impl GoogleProvider {
    pub fn new(client_id: String, client_secret: String, redirect_uri: String) -> Self {
        Self {
            client_id,
            client_secret,
            redirect_uri,
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl OAuthProvider for GoogleProvider {
    fn code(&self) -> &'static str {
        "google"
    }

    fn authorize_url(&self, state: &str, code_challenge: &str) -> String {
        format!(
            "https://accounts.google.com/o/oauth2/v2/auth?client_id={}&redirect_uri={}&response_type=code&scope=openid%20email%20profile&state={}&code_challenge={}&code_challenge_method=S256",
            self.client_id, self.redirect_uri, state, code_challenge
        )
    }

    async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
    ) -> Result<ProviderClaims, ServiceError> {
        let token_res = self
            .http
            .post("https://oauth2.googleapis.com/token")
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("code", code),
                ("code_verifier", code_verifier),
                ("grant_type", "authorization_code"),
                ("redirect_uri", self.redirect_uri.as_str()),
            ])
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Google token exchange failed");
                ServiceError::ProviderAuthFailed("google".to_string())
            })?;

        if !token_res.status().is_success() {
            let status = token_res.status();
            let body = token_res.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Google token exchange error");
            return Err(ServiceError::ProviderAuthFailed("google".to_string()));
        }

        let token: GoogleTokenResponse = token_res
            .json()
            .await
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!(e)))?;

        let user: GoogleUserInfo = self
            .http
            .get("https://www.googleapis.com/oauth2/v2/userinfo")
            .bearer_auth(&token.access_token)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Google userinfo fetch failed");
                ServiceError::ProviderAuthFailed("google".to_string())
            })?
            .json()
            .await
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!(e)))?;

        if !user.verified_email {
            return Err(ServiceError::ProviderAuthFailed(
                "google email not verified".to_string(),
            ));
        }

        let profile = serde_json::json!({
            "id": user.id,
            "email": user.email,
            "name": user.name,
        });

        Ok(ProviderClaims {
            provider_user_id: user.id,
            email: user.email,
            display_name: user.name,
            profile,
        })
    }
}

// ==================== GitHub ====================

#[derive(Debug, Deserialize)]
struct GithubTokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct GithubUser {
    id: i64,
    login: String,
    email: Option<String>,
    name: Option<String>,
}

pub struct GithubProvider {
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    http: reqwest::Client,
}

impl GithubProvider {
    pub fn new(client_id: String, client_secret: String, redirect_uri: String) -> Self {
        Self {
            client_id,
            client_secret,
            redirect_uri,
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl OAuthProvider for GithubProvider {
    fn code(&self) -> &'static str {
        "github"
    }

    fn authorize_url(&self, state: &str, _code_challenge: &str) -> String {
        format!(
            "https://github.com/login/oauth/authorize?client_id={}&redirect_uri={}&scope=read:user%20user:email&state={}",
            self.client_id, self.redirect_uri, state
        )
    }

    async fn exchange_code(
        &self,
        code: &str,
        _code_verifier: &str,
    ) -> Result<ProviderClaims, ServiceError> {
        let token_res = self
            .http
            .post("https://github.com/login/oauth/access_token")
            .header("Accept", "application/json")
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("code", code),
                ("redirect_uri", self.redirect_uri.as_str()),
            ])
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "GitHub token exchange failed");
                ServiceError::ProviderAuthFailed("github".to_string())
            })?;

        let token: GithubTokenResponse = token_res
            .json()
            .await
            .map_err(|_| ServiceError::ProviderAuthFailed("github".to_string()))?;

        let user: GithubUser = self
            .http
            .get("https://api.github.com/user")
            .header("User-Agent", "fleetgate-auth")
            .bearer_auth(&token.access_token)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "GitHub user fetch failed");
                ServiceError::ProviderAuthFailed("github".to_string())
            })?
            .json()
            .await
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!(e)))?;

        let email = user.email.clone().ok_or_else(|| {
            ServiceError::ProviderAuthFailed("github account exposes no email".to_string())
        })?;

        let profile = serde_json::json!({
            "id": user.id,
            "login": user.login,
            "email": email,
            "name": user.name,
        });

        Ok(ProviderClaims {
            provider_user_id: user.id.to_string(),
            email,
            display_name: user.name,
            profile,
        })
    }
}

// ==================== Linker ====================

#[derive(Clone)]
pub struct OAuthLinker {
    store: Arc<dyn Store>,
    sessions: SessionRegistry,
    audit: SecurityAudit,
    clock: Arc<dyn Clock>,
    providers: Arc<HashMap<&'static str, Arc<dyn OAuthProvider>>>,
}

impl OAuthLinker {
    pub fn new(
        store: Arc<dyn Store>,
        sessions: SessionRegistry,
        audit: SecurityAudit,
        clock: Arc<dyn Clock>,
        providers: Vec<Arc<dyn OAuthProvider>>,
    ) -> Self {
        let providers = providers
            .into_iter()
            .map(|p| (p.code(), p))
            .collect::<HashMap<_, _>>();
        Self {
            store,
            sessions,
            audit,
            clock,
            providers: Arc::new(providers),
        }
    }

    pub fn provider(&self, name: &str) -> Result<Arc<dyn OAuthProvider>, ServiceError> {
        self.providers
            .get(name)
            .cloned()
            .ok_or_else(|| ServiceError::ProviderUnsupported(name.to_string()))
    }

    /// First leg: build the redirect plus the state nonce and PKCE verifier
    /// the handler keeps in short-lived cookies.
    pub fn begin_authorization(&self, name: &str) -> Result<AuthorizationStart, ServiceError> {
        let provider = self.provider(name)?;

        let state = Uuid::new_v4().to_string();
        let code_verifier = generate_token();
        let code_challenge = {
            let mut hasher = Sha256::new();
            hasher.update(code_verifier.as_bytes());
            URL_SAFE_NO_PAD.encode(hasher.finalize())
        };

        Ok(AuthorizationStart {
            redirect_url: provider.authorize_url(&state, &code_challenge),
            state,
            code_verifier,
        })
    }

    /// Resolve provider claims to a local identity and issue a session.
    ///
    /// Resolution order: existing link (refresh its snapshot), then identity
    /// with the same email (silent merge by verified email), then a brand-new
    /// identity under the default tenant with a pre-verified email and an
    /// unusable password placeholder.
    pub async fn complete_authorization(
        &self,
        name: &str,
        claims: ProviderClaims,
        device_name: Option<String>,
        ctx: &RequestContext,
    ) -> Result<(Identity, String, Session), ServiceError> {
        let provider = self.provider(name)?;
        let now = self.clock.now();

        let identity = match self
            .store
            .find_oauth_link(provider.code(), &claims.provider_user_id)
            .await?
        {
            Some(link) => {
                let identity = self
                    .store
                    .find_identity(link.identity_id)
                    .await?
                    .ok_or_else(|| {
                        ServiceError::Internal(anyhow::anyhow!(
                            "OAuth link {} points at a missing identity",
                            link.link_id
                        ))
                    })?;
                self.store
                    .refresh_oauth_link(link.link_id, &claims.email, &claims.profile, now)
                    .await?;
                identity
            }
            None => match self
                .store
                .find_identity_by_email_any_tenant(&claims.email)
                .await?
            {
                Some(identity) => {
                    self.attach_link(&identity, provider.code(), &claims, ctx)
                        .await?;
                    identity
                }
                None => {
                    let identity = self.create_from_claims(provider.code(), &claims, ctx).await?;
                    identity
                }
            },
        };

        let (token, session) = self
            .sessions
            .issue(&identity, device_name, Some("oauth".to_string()), ctx)
            .await?;

        self.audit
            .record(SecurityEvent::new(
                SecurityEventType::LoginSuccess,
                Some(identity.identity_id),
                Some(identity.tenant_id),
                ctx,
                Some(serde_json::json!({ "provider": provider.code() })),
                now,
            ))
            .await;

        Ok((identity, token, session))
    }

    /// Attach a provider account to an already-authenticated identity.
    pub async fn connect(
        &self,
        identity: &Identity,
        name: &str,
        claims: ProviderClaims,
        ctx: &RequestContext,
    ) -> Result<OAuthLink, ServiceError> {
        let provider = self.provider(name)?;

        if let Some(existing) = self
            .store
            .find_oauth_link(provider.code(), &claims.provider_user_id)
            .await?
        {
            if existing.identity_id == identity.identity_id {
                // Re-connecting the same account just refreshes the snapshot.
                self.store
                    .refresh_oauth_link(
                        existing.link_id,
                        &claims.email,
                        &claims.profile,
                        self.clock.now(),
                    )
                    .await?;
                return Ok(existing);
            }
            return Err(ServiceError::AlreadyConnected);
        }

        if self
            .store
            .list_oauth_links(identity.identity_id)
            .await?
            .iter()
            .any(|l| l.provider_code == provider.code())
        {
            return Err(ServiceError::AlreadyConnected);
        }

        self.attach_link(identity, provider.code(), &claims, ctx).await
    }

    /// Remove a provider link, refusing when it is the identity's only
    /// remaining authentication method.
    pub async fn disconnect(
        &self,
        identity: &Identity,
        name: &str,
        ctx: &RequestContext,
    ) -> Result<(), ServiceError> {
        let provider = self.provider(name)?;
        let links = self.store.list_oauth_links(identity.identity_id).await?;

        let has_this_link = links.iter().any(|l| l.provider_code == provider.code());
        if !has_this_link {
            return Err(ServiceError::NotFound);
        }

        let other_links = links
            .iter()
            .filter(|l| l.provider_code != provider.code())
            .count();
        if !identity.password_set && other_links == 0 {
            return Err(ServiceError::LastAuthMethod);
        }

        self.store
            .delete_oauth_link(identity.identity_id, provider.code())
            .await?;

        self.audit
            .record(SecurityEvent::new(
                SecurityEventType::OauthDisconnected,
                Some(identity.identity_id),
                Some(identity.tenant_id),
                ctx,
                Some(serde_json::json!({ "provider": provider.code() })),
                self.clock.now(),
            ))
            .await;

        Ok(())
    }

    pub async fn list_links(&self, identity_id: Uuid) -> Result<Vec<OAuthLink>, ServiceError> {
        Ok(self.store.list_oauth_links(identity_id).await?)
    }

    async fn attach_link(
        &self,
        identity: &Identity,
        provider_code: &str,
        claims: &ProviderClaims,
        ctx: &RequestContext,
    ) -> Result<OAuthLink, ServiceError> {
        let now = self.clock.now();
        let link = OAuthLink::new(
            identity.identity_id,
            identity.tenant_id,
            provider_code.to_string(),
            claims.provider_user_id.clone(),
            claims.email.clone(),
            claims.profile.clone(),
            now,
        );

        match self.store.insert_oauth_link(&link).await {
            Ok(()) => {}
            Err(StoreError::UniqueViolation(_)) => return Err(ServiceError::AlreadyConnected),
            Err(e) => return Err(e.into()),
        }

        self.audit
            .record(SecurityEvent::new(
                SecurityEventType::OauthConnected,
                Some(identity.identity_id),
                Some(identity.tenant_id),
                ctx,
                Some(serde_json::json!({ "provider": provider_code })),
                now,
            ))
            .await;

        Ok(link)
    }

    async fn create_from_claims(
        &self,
        provider_code: &str,
        claims: &ProviderClaims,
        ctx: &RequestContext,
    ) -> Result<Identity, ServiceError> {
        let now = self.clock.now();

        let tenant = match self.store.find_tenant_by_label(DEFAULT_TENANT_LABEL).await? {
            Some(t) => t,
            None => {
                let tenant = Tenant::new(DEFAULT_TENANT_LABEL.to_string(), now);
                match self.store.insert_tenant(&tenant).await {
                    Ok(()) => tenant,
                    // Lost the creation race; the winner's row is authoritative.
                    Err(StoreError::UniqueViolation(_)) => self
                        .store
                        .find_tenant_by_label(DEFAULT_TENANT_LABEL)
                        .await?
                        .ok_or_else(|| {
                            ServiceError::Internal(anyhow::anyhow!("Default tenant vanished"))
                        })?,
                    Err(e) => return Err(e.into()),
                }
            }
        };

        let placeholder = unusable_password_hash().map_err(ServiceError::Internal)?;
        let identity = Identity::from_provider(
            tenant.tenant_id,
            claims.email.clone(),
            claims.display_name.clone(),
            placeholder.into_string(),
            now,
        );

        match self.store.insert_identity(&identity).await {
            Ok(()) => {}
            Err(StoreError::UniqueViolation(_)) => return Err(ServiceError::EmailTaken),
            Err(e) => return Err(e.into()),
        }

        self.audit
            .record(SecurityEvent::new(
                SecurityEventType::UserRegistered,
                Some(identity.identity_id),
                Some(identity.tenant_id),
                ctx,
                Some(serde_json::json!({ "via": provider_code })),
                now,
            ))
            .await;

        self.attach_link(&identity, provider_code, claims, ctx).await?;

        Ok(identity)
    }
}
