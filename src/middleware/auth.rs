//! Bearer-token authentication middleware.
//!
//! Tokens are opaque: the middleware hashes the presented value and resolves
//! it through the session registry. The session row is the sole proof of
//! validity; revoked or expired sessions are rejected here.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::models::{Identity, RequestContext, Session};
use crate::services::ServiceError;
use crate::utils::hash_token;
use crate::AppState;

/// The authenticated principal, stored in request extensions.
#[derive(Clone)]
pub struct CurrentUser {
    pub identity: Identity,
    pub session: Session,
    /// Hash of the presented token; used to exempt the calling session from
    /// bulk revocation.
    pub token_hash: String,
}

/// Pull IP and user agent out of the request headers.
pub fn request_context(
    headers: &header::HeaderMap,
    fallback_ip: Option<String>,
) -> RequestContext {
    let ip_address = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .or(fallback_ip);

    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string());

    RequestContext {
        ip_address,
        user_agent,
    }
}

/// Middleware to require an authenticated session.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, Response> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));

    let token = match token {
        Some(token) => token.to_string(),
        None => return Err(ServiceError::Unauthorized.into_response()),
    };

    let (identity, session) = match state.sessions.authenticate(&token).await {
        Ok(Some(pair)) => pair,
        Ok(None) => return Err(ServiceError::Unauthorized.into_response()),
        Err(e) => return Err(e.into_response()),
    };

    req.extensions_mut().insert(CurrentUser {
        identity,
        session,
        token_hash: hash_token(&token),
    });

    Ok(next.run(req).await)
}

/// Extractor for the principal the middleware stored.
#[axum::async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentUser>()
            .cloned()
            .ok_or_else(|| ServiceError::Unauthorized.into_response())
    }
}
