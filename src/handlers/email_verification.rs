//! Email verification handlers.

use axum::{
    extract::{ConnectInfo, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use std::net::SocketAddr;

use crate::{
    dtos::{account::VerificationStatusResponse, auth::VerifyEmailQuery, MessageResponse},
    middleware::{request_context, CurrentUser},
    services::ServiceError,
    AppState,
};

/// Re-send the verification email for the authenticated identity
#[utoipa::path(
    post,
    path = "/auth/verify-email/send",
    responses(
        (status = 200, description = "Verification email sent (no-op when already verified)", body = MessageResponse)
    ),
    tag = "Authentication",
    security(("bearer_auth" = []))
)]
pub async fn send_verification(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<impl IntoResponse, ServiceError> {
    state
        .authenticator
        .send_verification_email(&user.identity)
        .await?;

    Ok((
        StatusCode::OK,
        Json(MessageResponse::new("Verification email sent.")),
    ))
}

/// Verify an email address with a mailed token
#[utoipa::path(
    get,
    path = "/auth/verify-email",
    params(VerifyEmailQuery),
    responses(
        (status = 200, description = "Email verified", body = MessageResponse),
        (status = 400, description = "Token invalid or expired", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn verify_email(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Query(query): Query<VerifyEmailQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let ctx = request_context(&headers, Some(addr.ip().to_string()));
    state
        .authenticator
        .verify_email(&query.email, &query.token, &ctx)
        .await?;

    Ok((
        StatusCode::OK,
        Json(MessageResponse::new("Email verified successfully.")),
    ))
}

/// Verification status of the authenticated identity
#[utoipa::path(
    get,
    path = "/auth/verify-email/status",
    responses(
        (status = 200, description = "Verification status", body = VerificationStatusResponse)
    ),
    tag = "Authentication",
    security(("bearer_auth" = []))
)]
pub async fn verification_status(user: CurrentUser) -> impl IntoResponse {
    Json(VerificationStatusResponse {
        email_verified: user.identity.is_email_verified(),
        email_verified_utc: user.identity.email_verified_utc,
    })
}
