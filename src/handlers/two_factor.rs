//! Two-factor lifecycle handlers (authenticated surface).

use axum::{
    extract::{ConnectInfo, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use std::net::SocketAddr;

use crate::{
    dtos::{
        account::{
            RecoveryCodesRequest, RecoveryCodesResponse, TwoFactorConfirmRequest,
            TwoFactorDisableRequest, TwoFactorEnableResponse,
        },
        MessageResponse,
    },
    middleware::{request_context, CurrentUser},
    services::ServiceError,
    utils::ValidatedJson,
    AppState,
};

/// Start two-factor enrollment
///
/// The secret, provisioning URI and recovery codes in the response are shown
/// exactly once and are never retrievable again.
#[utoipa::path(
    post,
    path = "/users/me/two-factor/enable",
    responses(
        (status = 200, description = "Enrollment started", body = TwoFactorEnableResponse),
        (status = 409, description = "Already enabled", body = ErrorResponse)
    ),
    tag = "Two-Factor",
    security(("bearer_auth" = []))
)]
pub async fn enable(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<impl IntoResponse, ServiceError> {
    let enrollment = state.two_factor.enable(&user.identity).await?;

    Ok((
        StatusCode::OK,
        Json(TwoFactorEnableResponse {
            secret: enrollment.secret_base32,
            provisioning_uri: enrollment.provisioning_uri,
            recovery_codes: enrollment.recovery_codes,
        }),
    ))
}

/// Confirm enrollment with a first code
#[utoipa::path(
    post,
    path = "/users/me/two-factor/confirm",
    request_body = TwoFactorConfirmRequest,
    responses(
        (status = 200, description = "Two-factor enabled", body = MessageResponse),
        (status = 401, description = "Code rejected", body = ErrorResponse)
    ),
    tag = "Two-Factor",
    security(("bearer_auth" = []))
)]
pub async fn confirm(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    user: CurrentUser,
    ValidatedJson(req): ValidatedJson<TwoFactorConfirmRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let ctx = request_context(&headers, Some(addr.ip().to_string()));
    state
        .two_factor
        .confirm(&user.identity, &req.code, &ctx)
        .await?;

    Ok((
        StatusCode::OK,
        Json(MessageResponse::new("Two-factor authentication enabled.")),
    ))
}

/// Disable the second factor
#[utoipa::path(
    post,
    path = "/users/me/two-factor/disable",
    request_body = TwoFactorDisableRequest,
    responses(
        (status = 200, description = "Two-factor disabled", body = MessageResponse),
        (status = 401, description = "Password rejected", body = ErrorResponse)
    ),
    tag = "Two-Factor",
    security(("bearer_auth" = []))
)]
pub async fn disable(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    user: CurrentUser,
    ValidatedJson(req): ValidatedJson<TwoFactorDisableRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let ctx = request_context(&headers, Some(addr.ip().to_string()));
    state
        .two_factor
        .disable(&user.identity, &req.password, &ctx)
        .await?;

    Ok((
        StatusCode::OK,
        Json(MessageResponse::new("Two-factor authentication disabled.")),
    ))
}

/// Replace the recovery-code pool
#[utoipa::path(
    post,
    path = "/users/me/two-factor/recovery-codes",
    request_body = RecoveryCodesRequest,
    responses(
        (status = 200, description = "Fresh pool; previous codes are dead", body = RecoveryCodesResponse),
        (status = 400, description = "Two-factor not enabled", body = ErrorResponse)
    ),
    tag = "Two-Factor",
    security(("bearer_auth" = []))
)]
pub async fn regenerate_recovery_codes(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    user: CurrentUser,
    ValidatedJson(req): ValidatedJson<RecoveryCodesRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let ctx = request_context(&headers, Some(addr.ip().to_string()));
    let recovery_codes = state
        .two_factor
        .regenerate_recovery_codes(&user.identity, &req.password, &ctx)
        .await?;

    Ok((StatusCode::OK, Json(RecoveryCodesResponse { recovery_codes })))
}
