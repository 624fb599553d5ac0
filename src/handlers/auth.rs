//! Registration and login handlers.

use axum::{
    extract::{ConnectInfo, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use std::net::SocketAddr;

use crate::{
    dtos::auth::{
        LoginRequest, LoginResponse, RegisterRequest, RegisterResponse, TwoFactorLoginRequest,
        TwoFactorLoginResponse,
    },
    middleware::request_context,
    services::{LoginOutcome, SecondFactorProof, ServiceError},
    utils::ValidatedJson,
    AppState,
};

/// Register a new identity
#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Identity created, verification email sent", body = RegisterResponse),
        (status = 409, description = "Email already registered", body = ErrorResponse),
        (status = 422, description = "Password policy violation", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn register(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    ValidatedJson(req): ValidatedJson<RegisterRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let ctx = request_context(&headers, Some(addr.ip().to_string()));
    let identity = state
        .authenticator
        .register(
            req.tenant_id,
            &req.email,
            &req.password,
            req.display_name,
            &ctx,
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            identity: identity.sanitized(),
            message: "Registration successful. Please check your email to verify your account."
                .to_string(),
        }),
    ))
}

/// Login with email and password
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful or two-factor challenge issued", body = LoginResponse),
        (status = 401, description = "Invalid credentials", body = ErrorResponse),
        (status = 403, description = "Email not verified", body = ErrorResponse),
        (status = 423, description = "Account locked", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn login(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    ValidatedJson(req): ValidatedJson<LoginRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let ctx = request_context(&headers, Some(addr.ip().to_string()));
    let outcome = state
        .authenticator
        .login(&req.email, &req.password, req.device_name, &ctx)
        .await?;

    let response = match outcome {
        LoginOutcome::Success {
            token, identity, ..
        } => LoginResponse::Success {
            token,
            identity: identity.sanitized(),
        },
        LoginOutcome::TwoFactorRequired {
            identity_id,
            challenge_token,
        } => LoginResponse::TwoFactorRequired {
            identity_id,
            challenge_token,
        },
    };

    Ok((StatusCode::OK, Json(response)))
}

/// Complete a two-factor login
#[utoipa::path(
    post,
    path = "/auth/login/2fa",
    request_body = TwoFactorLoginRequest,
    responses(
        (status = 200, description = "Second factor accepted", body = TwoFactorLoginResponse),
        (status = 400, description = "Challenge expired or invalid", body = ErrorResponse),
        (status = 401, description = "Invalid two-factor code", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn login_two_factor(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    ValidatedJson(req): ValidatedJson<TwoFactorLoginRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let ctx = request_context(&headers, Some(addr.ip().to_string()));
    let login = state
        .authenticator
        .verify_two_factor(
            req.identity_id,
            &req.challenge_token,
            &req.code,
            req.device_name,
            &ctx,
        )
        .await?;

    let recovery_codes_remaining = match login.proof {
        SecondFactorProof::RecoveryCode { remaining } => Some(remaining),
        SecondFactorProof::Totp => None,
    };

    Ok((
        StatusCode::OK,
        Json(TwoFactorLoginResponse {
            token: login.token,
            identity: login.identity.sanitized(),
            reprovision_recommended: login.proof.needs_reprovision(),
            recovery_codes_remaining,
        }),
    ))
}
