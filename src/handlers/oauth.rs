//! OAuth handlers: browser redirect flow plus the authenticated
//! connect/disconnect/list surface.

use axum::{
    extract::{ConnectInfo, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
    Json,
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use std::net::SocketAddr;

use crate::{
    dtos::account::{OAuthCallbackQuery, OAuthConnectRequest, OAuthLinksResponse},
    dtos::MessageResponse,
    middleware::{request_context, CurrentUser},
    models::OAuthLinkResponse,
    services::ServiceError,
    utils::ValidatedJson,
    AppState,
};

const STATE_COOKIE: &str = "oauth_state";
const VERIFIER_COOKIE: &str = "oauth_code_verifier";

fn flow_cookie(name: &'static str, value: String) -> Cookie<'static> {
    Cookie::build((name, value))
        .path("/")
        .http_only(true)
        .secure(true)
        .max_age(time::Duration::minutes(5))
        .build()
}

/// Begin the authorization hop for a provider
#[utoipa::path(
    get,
    path = "/auth/oauth/{provider}",
    params(("provider" = String, Path, description = "Allow-listed provider code")),
    responses(
        (status = 303, description = "Redirect to the provider"),
        (status = 400, description = "Unsupported provider", body = ErrorResponse)
    ),
    tag = "OAuth"
)]
pub async fn begin(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    jar: CookieJar,
) -> Result<(CookieJar, Response), ServiceError> {
    let start = state.oauth.begin_authorization(&provider)?;

    let jar = jar
        .add(flow_cookie(STATE_COOKIE, start.state))
        .add(flow_cookie(VERIFIER_COOKIE, start.code_verifier));

    Ok((jar, Redirect::to(&start.redirect_url).into_response()))
}

/// Provider callback: exchange the code, resolve the identity, hand the
/// browser back to the frontend with a session token
#[utoipa::path(
    get,
    path = "/auth/oauth/{provider}/callback",
    params(("provider" = String, Path, description = "Allow-listed provider code")),
    responses(
        (status = 303, description = "Redirect to the frontend with a token"),
        (status = 400, description = "State mismatch", body = ErrorResponse),
        (status = 502, description = "Provider exchange failed", body = ErrorResponse)
    ),
    tag = "OAuth"
)]
pub async fn callback(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Path(provider): Path<String>,
    jar: CookieJar,
    Query(query): Query<OAuthCallbackQuery>,
) -> Result<(CookieJar, Response), ServiceError> {
    let stored_state = jar.get(STATE_COOKIE).map(|c| c.value().to_string());
    if stored_state.as_deref() != Some(query.state.as_str()) {
        return Err(ServiceError::TokenInvalid);
    }

    let code_verifier = jar
        .get(VERIFIER_COOKIE)
        .map(|c| c.value().to_string())
        .ok_or(ServiceError::TokenInvalid)?;

    let driver = state.oauth.provider(&provider)?;
    let claims = driver.exchange_code(&query.code, &code_verifier).await?;

    let ctx = request_context(&headers, Some(addr.ip().to_string()));
    let (_, token, _) = state
        .oauth
        .complete_authorization(&provider, claims, None, &ctx)
        .await?;

    let frontend_url = match provider.as_str() {
        "github" => &state.config.github.frontend_url,
        _ => &state.config.google.frontend_url,
    };
    let redirect_url = format!("{}/auth/callback#token={}", frontend_url, token);

    let jar = jar
        .remove(Cookie::from(STATE_COOKIE))
        .remove(Cookie::from(VERIFIER_COOKIE));

    Ok((jar, Redirect::to(&redirect_url).into_response()))
}

/// Connect a provider account to the authenticated identity
#[utoipa::path(
    post,
    path = "/users/me/oauth/{provider}",
    params(("provider" = String, Path, description = "Allow-listed provider code")),
    request_body = OAuthConnectRequest,
    responses(
        (status = 200, description = "Provider linked", body = MessageResponse),
        (status = 409, description = "Account linked elsewhere", body = ErrorResponse)
    ),
    tag = "OAuth",
    security(("bearer_auth" = []))
)]
pub async fn connect(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    user: CurrentUser,
    Path(provider): Path<String>,
    ValidatedJson(req): ValidatedJson<OAuthConnectRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let driver = state.oauth.provider(&provider)?;
    let claims = driver
        .exchange_code(&req.code, req.code_verifier.as_deref().unwrap_or(""))
        .await?;

    let ctx = request_context(&headers, Some(addr.ip().to_string()));
    state
        .oauth
        .connect(&user.identity, &provider, claims, &ctx)
        .await?;

    Ok((
        StatusCode::OK,
        Json(MessageResponse::new("Provider connected.")),
    ))
}

/// List connected providers
#[utoipa::path(
    get,
    path = "/users/me/oauth",
    responses(
        (status = 200, description = "Connected providers", body = OAuthLinksResponse)
    ),
    tag = "OAuth",
    security(("bearer_auth" = []))
)]
pub async fn list_links(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<impl IntoResponse, ServiceError> {
    let links = state.oauth.list_links(user.identity.identity_id).await?;
    Ok((
        StatusCode::OK,
        Json(OAuthLinksResponse {
            links: links.into_iter().map(OAuthLinkResponse::from).collect(),
        }),
    ))
}

/// Disconnect a provider
///
/// Refused when it would leave the identity with neither a usable password
/// nor another provider link.
#[utoipa::path(
    delete,
    path = "/users/me/oauth/{provider}",
    params(("provider" = String, Path, description = "Allow-listed provider code")),
    responses(
        (status = 200, description = "Provider disconnected", body = MessageResponse),
        (status = 403, description = "Last remaining authentication method", body = ErrorResponse),
        (status = 404, description = "Provider not linked", body = ErrorResponse)
    ),
    tag = "OAuth",
    security(("bearer_auth" = []))
)]
pub async fn disconnect(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    user: CurrentUser,
    Path(provider): Path<String>,
) -> Result<impl IntoResponse, ServiceError> {
    let ctx = request_context(&headers, Some(addr.ip().to_string()));
    state
        .oauth
        .disconnect(&user.identity, &provider, &ctx)
        .await?;

    Ok((
        StatusCode::OK,
        Json(MessageResponse::new("Provider disconnected.")),
    ))
}
