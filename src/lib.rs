pub mod config;
pub mod db;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod store;
pub mod utils;

use axum::{
    middleware::from_fn_with_state,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::config::AuthConfig;
use crate::services::{
    CredentialAuthenticator, EmailProvider, EphemeralTokens, GithubProvider, GoogleProvider,
    LockoutGuard, OAuthLinker, OAuthProvider, PasswordPolicy, RecoveryCodeVault, SecurityAudit,
    ServiceError, SessionRegistry, TwoFactorManager,
};
use crate::store::Store;
use crate::utils::{Clock, SecretCipher};

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check,
        handlers::auth::register,
        handlers::auth::login,
        handlers::auth::login_two_factor,
        handlers::password::change_password,
        handlers::password::request_password_reset,
        handlers::password::validate_password_reset,
        handlers::password::confirm_password_reset,
        handlers::email_verification::send_verification,
        handlers::email_verification::verify_email,
        handlers::email_verification::verification_status,
        handlers::two_factor::enable,
        handlers::two_factor::confirm,
        handlers::two_factor::disable,
        handlers::two_factor::regenerate_recovery_codes,
        handlers::sessions::list_sessions,
        handlers::sessions::revoke_session,
        handlers::sessions::revoke_other_sessions,
        handlers::sessions::revoke_all_sessions,
        handlers::sessions::security_activity,
        handlers::oauth::begin,
        handlers::oauth::callback,
        handlers::oauth::connect,
        handlers::oauth::list_links,
        handlers::oauth::disconnect,
    ),
    components(
        schemas(
            dtos::ErrorResponse,
            dtos::MessageResponse,
            dtos::auth::RegisterRequest,
            dtos::auth::RegisterResponse,
            dtos::auth::LoginRequest,
            dtos::auth::LoginResponse,
            dtos::auth::TwoFactorLoginRequest,
            dtos::auth::TwoFactorLoginResponse,
            dtos::auth::PasswordResetRequest,
            dtos::auth::PasswordResetConfirm,
            dtos::auth::TokenValidityResponse,
            dtos::auth::ChangePasswordRequest,
            dtos::account::TwoFactorEnableResponse,
            dtos::account::TwoFactorConfirmRequest,
            dtos::account::TwoFactorDisableRequest,
            dtos::account::RecoveryCodesRequest,
            dtos::account::RecoveryCodesResponse,
            dtos::account::SessionListResponse,
            dtos::account::RevokeAllSessionsRequest,
            dtos::account::RevokedResponse,
            dtos::account::OAuthLinksResponse,
            dtos::account::OAuthConnectRequest,
            dtos::account::VerificationStatusResponse,
            dtos::account::SecurityActivityResponse,
            models::IdentityResponse,
            models::SessionInfo,
            models::OAuthLinkResponse,
            models::SecurityEventResponse,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Authentication", description = "Registration, login and recovery flows"),
        (name = "Two-Factor", description = "Second-factor lifecycle"),
        (name = "Sessions", description = "Device sessions and revocation"),
        (name = "OAuth", description = "Third-party identity linking"),
        (name = "Account", description = "Authenticated account operations"),
        (name = "Observability", description = "Service health"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .description(Some("Opaque session token".to_string()))
                        .build(),
                ),
            );
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: AuthConfig,
    pub store: Arc<dyn Store>,
    pub pool: Option<sqlx::PgPool>,
    pub audit: SecurityAudit,
    pub authenticator: CredentialAuthenticator,
    pub sessions: SessionRegistry,
    pub two_factor: TwoFactorManager,
    pub oauth: OAuthLinker,
}

impl AppState {
    /// Wire the service graph over a store, clock and email provider.
    pub fn build(
        config: AuthConfig,
        store: Arc<dyn Store>,
        pool: Option<sqlx::PgPool>,
        clock: Arc<dyn Clock>,
        email: Arc<dyn EmailProvider>,
    ) -> Result<Self, ServiceError> {
        let cipher = SecretCipher::from_hex(&config.security.encryption_key)
            .map_err(ServiceError::Internal)?;

        let audit = SecurityAudit::new(store.clone());
        let lockout = LockoutGuard::new(
            store.clone(),
            audit.clone(),
            clock.clone(),
            config.lockout.max_failed_attempts,
            config.lockout.lock_minutes,
        );
        let policy = PasswordPolicy::new(store.clone(), clock.clone());
        let tokens = EphemeralTokens::new(store.clone(), clock.clone());
        let vault = RecoveryCodeVault::new(store.clone(), clock.clone());
        let two_factor = TwoFactorManager::new(
            store.clone(),
            vault,
            audit.clone(),
            clock.clone(),
            cipher,
            config.security.totp_issuer.clone(),
        );
        let sessions = SessionRegistry::new(
            store.clone(),
            audit.clone(),
            clock.clone(),
            config.session.ttl_days,
        );

        let providers: Vec<Arc<dyn OAuthProvider>> = vec![
            Arc::new(GoogleProvider::new(
                config.google.client_id.clone(),
                config.google.client_secret.clone(),
                config.google.redirect_uri.clone(),
            )),
            Arc::new(GithubProvider::new(
                config.github.client_id.clone(),
                config.github.client_secret.clone(),
                config.github.redirect_uri.clone(),
            )),
        ];
        let oauth = OAuthLinker::new(
            store.clone(),
            sessions.clone(),
            audit.clone(),
            clock.clone(),
            providers,
        );

        let authenticator = CredentialAuthenticator::new(
            store.clone(),
            audit.clone(),
            lockout,
            policy,
            two_factor.clone(),
            sessions.clone(),
            tokens,
            email,
            clock,
            config.base_url.clone(),
        );

        Ok(Self {
            config,
            store,
            pool,
            audit,
            authenticator,
            sessions,
            two_factor,
            oauth,
        })
    }
}

pub fn build_router(state: AppState) -> Router {
    // Endpoints behind the bearer middleware.
    let authed = Router::new()
        .route("/auth/verify-email/send", post(handlers::email_verification::send_verification))
        .route(
            "/auth/verify-email/status",
            get(handlers::email_verification::verification_status),
        )
        .route("/users/me/password", post(handlers::password::change_password))
        .route("/users/me/sessions", get(handlers::sessions::list_sessions))
        .route(
            "/users/me/sessions/revoke-others",
            post(handlers::sessions::revoke_other_sessions),
        )
        .route(
            "/users/me/sessions/revoke-all",
            post(handlers::sessions::revoke_all_sessions),
        )
        .route(
            "/users/me/sessions/:session_id",
            delete(handlers::sessions::revoke_session),
        )
        .route(
            "/users/me/security-activity",
            get(handlers::sessions::security_activity),
        )
        .route("/users/me/two-factor/enable", post(handlers::two_factor::enable))
        .route("/users/me/two-factor/confirm", post(handlers::two_factor::confirm))
        .route("/users/me/two-factor/disable", post(handlers::two_factor::disable))
        .route(
            "/users/me/two-factor/recovery-codes",
            post(handlers::two_factor::regenerate_recovery_codes),
        )
        .route("/users/me/oauth", get(handlers::oauth::list_links))
        .route(
            "/users/me/oauth/:provider",
            post(handlers::oauth::connect).delete(handlers::oauth::disconnect),
        )
        .layer(from_fn_with_state(state.clone(), middleware::auth_middleware));

    let mut app = Router::new()
        .route("/health", get(health_check))
        .route("/auth/register", post(handlers::auth::register))
        .route("/auth/login", post(handlers::auth::login))
        .route("/auth/login/2fa", post(handlers::auth::login_two_factor))
        .route("/auth/verify-email", get(handlers::email_verification::verify_email))
        .route(
            "/auth/password-reset/request",
            post(handlers::password::request_password_reset),
        )
        .route(
            "/auth/password-reset/validate",
            get(handlers::password::validate_password_reset),
        )
        .route(
            "/auth/password-reset/confirm",
            post(handlers::password::confirm_password_reset),
        )
        .route("/auth/oauth/:provider", get(handlers::oauth::begin))
        .route("/auth/oauth/:provider/callback", get(handlers::oauth::callback))
        .merge(authed);

    if state.config.swagger.enabled {
        app = app.merge(
            SwaggerUi::new("/docs").url("/.well-known/openapi.json", ApiDoc::openapi()),
        );
    }

    let allowed_origins: Vec<axum::http::HeaderValue> = state
        .config
        .security
        .allowed_origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();

    app.with_state(state)
        .layer(TraceLayer::new_for_http().make_span_with(
            |request: &axum::http::Request<_>| {
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                )
            },
        ))
        .layer(
            CorsLayer::new()
                .allow_origin(allowed_origins)
                .allow_methods([
                    axum::http::Method::GET,
                    axum::http::Method::POST,
                    axum::http::Method::DELETE,
                    axum::http::Method::OPTIONS,
                ])
                .allow_headers([
                    axum::http::header::AUTHORIZATION,
                    axum::http::header::CONTENT_TYPE,
                ]),
        )
}

/// Service health check
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy"),
        (status = 503, description = "Service is unhealthy")
    ),
    tag = "Observability"
)]
pub async fn health_check(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> Result<axum::Json<serde_json::Value>, ServiceError> {
    if let Some(pool) = &state.pool {
        db::health_check(pool).await.map_err(|e| {
            tracing::error!(error = %e, "Database health check failed");
            ServiceError::Database(anyhow::anyhow!(e))
        })?;
    }

    Ok(axum::Json(serde_json::json!({
        "status": "healthy",
        "service": state.config.service_name,
        "version": state.config.service_version,
    })))
}
