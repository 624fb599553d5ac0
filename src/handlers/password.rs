//! Password change and reset handlers.

use axum::{
    extract::{ConnectInfo, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use std::net::SocketAddr;

use crate::{
    dtos::{
        auth::{
            ChangePasswordRequest, PasswordResetConfirm, PasswordResetRequest,
            PasswordResetValidateQuery, TokenValidityResponse,
        },
        MessageResponse,
    },
    middleware::{request_context, CurrentUser},
    services::ServiceError,
    utils::ValidatedJson,
    AppState,
};

/// Change the password of the authenticated identity
#[utoipa::path(
    post,
    path = "/users/me/password",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password changed, other sessions revoked", body = MessageResponse),
        (status = 401, description = "Current password wrong", body = ErrorResponse),
        (status = 422, description = "Policy violation or reuse", body = ErrorResponse)
    ),
    tag = "Account",
    security(("bearer_auth" = []))
)]
pub async fn change_password(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    user: CurrentUser,
    ValidatedJson(req): ValidatedJson<ChangePasswordRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let ctx = request_context(&headers, Some(addr.ip().to_string()));
    state
        .authenticator
        .change_password(
            &user.identity,
            &req.current_password,
            &req.new_password,
            &user.token_hash,
            &ctx,
        )
        .await?;

    Ok((
        StatusCode::OK,
        Json(MessageResponse::new(
            "Password changed. Other sessions have been signed out.",
        )),
    ))
}

/// Request a password reset email
///
/// Always answers with the same generic message; whether the address is
/// registered is never revealed.
#[utoipa::path(
    post,
    path = "/auth/password-reset/request",
    request_body = PasswordResetRequest,
    responses(
        (status = 200, description = "Generic acknowledgement", body = MessageResponse)
    ),
    tag = "Authentication"
)]
pub async fn request_password_reset(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    ValidatedJson(req): ValidatedJson<PasswordResetRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let ctx = request_context(&headers, Some(addr.ip().to_string()));
    state
        .authenticator
        .request_password_reset(&req.email, &ctx)
        .await?;

    Ok((
        StatusCode::OK,
        Json(MessageResponse::new(
            "If that address is registered, a reset email is on its way.",
        )),
    ))
}

/// Pre-check a reset token before showing the form
#[utoipa::path(
    get,
    path = "/auth/password-reset/validate",
    params(PasswordResetValidateQuery),
    responses(
        (status = 200, description = "Token validity", body = TokenValidityResponse)
    ),
    tag = "Authentication"
)]
pub async fn validate_password_reset(
    State(state): State<AppState>,
    Query(query): Query<PasswordResetValidateQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let valid = state
        .authenticator
        .validate_password_reset(&query.email, &query.token)
        .await?;
    Ok((StatusCode::OK, Json(TokenValidityResponse { valid })))
}

/// Consume a reset token and set a new password
#[utoipa::path(
    post,
    path = "/auth/password-reset/confirm",
    request_body = PasswordResetConfirm,
    responses(
        (status = 200, description = "Password reset, all sessions revoked", body = MessageResponse),
        (status = 400, description = "Token invalid or expired", body = ErrorResponse),
        (status = 422, description = "Policy violation or reuse", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn confirm_password_reset(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    ValidatedJson(req): ValidatedJson<PasswordResetConfirm>,
) -> Result<impl IntoResponse, ServiceError> {
    let ctx = request_context(&headers, Some(addr.ip().to_string()));
    state
        .authenticator
        .confirm_password_reset(&req.email, &req.token, &req.new_password, &ctx)
        .await?;

    Ok((
        StatusCode::OK,
        Json(MessageResponse::new(
            "Password reset. Please sign in with your new password.",
        )),
    ))
}
