//! Session management handlers (authenticated surface).

use axum::{
    extract::{ConnectInfo, Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use std::net::SocketAddr;
use uuid::Uuid;

use crate::{
    dtos::account::{
        RevokeAllSessionsRequest, RevokedResponse, SecurityActivityResponse, SessionListResponse,
    },
    dtos::MessageResponse,
    middleware::{request_context, CurrentUser},
    models::SessionInfo,
    services::ServiceError,
    utils::{verify_password, Password, PasswordHashString, ValidatedJson},
    AppState,
};

/// List active sessions, newest activity first
#[utoipa::path(
    get,
    path = "/users/me/sessions",
    responses(
        (status = 200, description = "Active sessions", body = SessionListResponse)
    ),
    tag = "Sessions",
    security(("bearer_auth" = []))
)]
pub async fn list_sessions(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<impl IntoResponse, ServiceError> {
    let sessions = state.sessions.list_active(user.identity.identity_id).await?;
    let sessions = sessions
        .iter()
        .map(|s| SessionInfo::from_session(s, &user.token_hash))
        .collect();

    Ok((StatusCode::OK, Json(SessionListResponse { sessions })))
}

/// Revoke one session
#[utoipa::path(
    delete,
    path = "/users/me/sessions/{session_id}",
    params(("session_id" = Uuid, Path, description = "Session to revoke")),
    responses(
        (status = 200, description = "Session revoked", body = MessageResponse),
        (status = 404, description = "No such session", body = ErrorResponse)
    ),
    tag = "Sessions",
    security(("bearer_auth" = []))
)]
pub async fn revoke_session(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    user: CurrentUser,
    Path(session_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let ctx = request_context(&headers, Some(addr.ip().to_string()));
    state
        .sessions
        .revoke(&user.identity, session_id, &ctx)
        .await?;

    Ok((StatusCode::OK, Json(MessageResponse::new("Session revoked."))))
}

/// Revoke every session except the calling one
#[utoipa::path(
    post,
    path = "/users/me/sessions/revoke-others",
    responses(
        (status = 200, description = "Other sessions revoked", body = RevokedResponse)
    ),
    tag = "Sessions",
    security(("bearer_auth" = []))
)]
pub async fn revoke_other_sessions(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    user: CurrentUser,
) -> Result<impl IntoResponse, ServiceError> {
    let ctx = request_context(&headers, Some(addr.ip().to_string()));
    let revoked = state
        .sessions
        .revoke_others(&user.identity, &user.token_hash, &ctx)
        .await?;

    Ok((StatusCode::OK, Json(RevokedResponse { revoked })))
}

/// Log out everywhere, the calling session included
///
/// Demands a fresh password confirmation.
#[utoipa::path(
    post,
    path = "/users/me/sessions/revoke-all",
    request_body = RevokeAllSessionsRequest,
    responses(
        (status = 200, description = "All sessions revoked", body = RevokedResponse),
        (status = 401, description = "Password rejected", body = ErrorResponse)
    ),
    tag = "Sessions",
    security(("bearer_auth" = []))
)]
pub async fn revoke_all_sessions(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    user: CurrentUser,
    ValidatedJson(req): ValidatedJson<RevokeAllSessionsRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    verify_password(
        &Password::new(req.password),
        &PasswordHashString::new(user.identity.password_hash.clone()),
    )
    .map_err(|_| ServiceError::InvalidCredentials)?;

    let ctx = request_context(&headers, Some(addr.ip().to_string()));
    let revoked = state.sessions.revoke_all(&user.identity, &ctx).await?;

    Ok((StatusCode::OK, Json(RevokedResponse { revoked })))
}

/// Recent security activity for the authenticated identity
#[utoipa::path(
    get,
    path = "/users/me/security-activity",
    responses(
        (status = 200, description = "Recent security events, newest first", body = SecurityActivityResponse)
    ),
    tag = "Sessions",
    security(("bearer_auth" = []))
)]
pub async fn security_activity(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<impl IntoResponse, ServiceError> {
    let events = state.audit.recent(user.identity.identity_id, 50).await?;
    Ok((StatusCode::OK, Json(SecurityActivityResponse { events })))
}
