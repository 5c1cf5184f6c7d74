// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Login, pairing, and device-management HTTP handlers.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{ConnectInfo, Path, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::{Extension, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::{AuthSession, PAIRING_CODE_TTL_SECS};
use crate::error::HubError;
use crate::state::HubState;
use crate::transport::auth::{build_session_cookie, peer_ip, AuthFailed, CurrentSession};

// -- Request/Response types ---------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct PairRequest {
    pub code: String,
    #[serde(default)]
    pub label: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct OkResponse {
    pub ok: bool,
}

#[derive(Debug, Serialize)]
pub struct PairingCodeResponse {
    pub code: String,
    pub expires_in: i64,
}

#[derive(Debug, Serialize)]
pub struct DeviceInfo {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub ip_address: String,
}

impl From<AuthSession> for DeviceInfo {
    fn from(session: AuthSession) -> Self {
        Self {
            id: session.id,
            label: session.label,
            created_at: session.created_at,
            last_seen: session.last_seen,
            ip_address: session.ip_address,
        }
    }
}

// -- Form placeholders --------------------------------------------------------

// Real form rendering lives in the web frontend; these placeholders keep
// the routes serviceable from a bare browser.
const LOGIN_HTML: &str = "<!DOCTYPE html><html><body>\
<form method=\"post\" action=\"/login\"><input type=\"password\" name=\"password\">\
<button>Log in</button></form></body></html>";

const PAIR_HTML: &str = "<!DOCTYPE html><html><body>\
<form method=\"post\" action=\"/pair\"><input name=\"code\" maxlength=\"8\">\
<button>Pair device</button></form></body></html>";

/// `GET /login`
pub async fn login_form() -> Html<&'static str> {
    Html(LOGIN_HTML)
}

/// `GET /pair`
pub async fn pair_form() -> Html<&'static str> {
    Html(PAIR_HTML)
}

// -- Handlers -----------------------------------------------------------------

fn auth_failed(resp: (StatusCode, Json<crate::error::ErrorResponse>)) -> Response {
    let mut resp = resp.into_response();
    resp.extensions_mut().insert(AuthFailed);
    resp
}

fn with_cookie(mut resp: Response, cookie: &str) -> Response {
    if let Ok(value) = HeaderValue::from_str(cookie) {
        resp.headers_mut().insert(header::SET_COOKIE, value);
    }
    resp
}

fn user_agent(headers: &HeaderMap) -> String {
    headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_owned()
}

/// `POST /login`: exchange the password for a session cookie.
///
/// A blocked IP answers 429 before the password is even looked at.
pub async fn login(
    State(s): State<Arc<HubState>>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let ip = peer_ip(connect_info.as_ref());
    if s.limiter.is_blocked(ip) {
        return auth_failed(HubError::RateLimited.to_http_response("too many failed attempts"));
    }

    let req: LoginRequest = match serde_json::from_slice(&body) {
        Ok(req) => req,
        Err(e) => {
            return HubError::ParseError.to_http_response(format!("invalid body: {e}")).into_response()
        }
    };

    match s.auth.login(&req.password, &ip.to_string(), &user_agent(&headers)).await {
        Ok(Some(session)) => {
            s.limiter.record_success(ip);
            tracing::info!(ip = %ip, "login succeeded");
            let cookie = build_session_cookie(&session.id, false);
            with_cookie(Json(OkResponse { ok: true }).into_response(), &cookie)
        }
        Ok(None) => {
            s.limiter.record_failure(ip);
            auth_failed(HubError::Unauthorized.to_http_response("invalid password"))
        }
        Err(e) => {
            tracing::error!(err = %e, "login failed to persist session");
            HubError::SessionError.to_http_response("failed to create session").into_response()
        }
    }
}

/// `POST /pair`: redeem a pairing code for a long-lived device session.
pub async fn pair(
    State(s): State<Arc<HubState>>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let ip = peer_ip(connect_info.as_ref());
    if s.limiter.is_blocked(ip) {
        return auth_failed(HubError::RateLimited.to_http_response("too many failed attempts"));
    }

    let req: PairRequest = match serde_json::from_slice(&body) {
        Ok(req) => req,
        Err(e) => {
            return HubError::ParseError.to_http_response(format!("invalid body: {e}")).into_response()
        }
    };
    let code = req.code.trim().to_uppercase();

    match s
        .auth
        .redeem_pairing_code(&code, req.label.as_deref(), &ip.to_string(), &user_agent(&headers))
        .await
    {
        Ok(Some(session)) => {
            s.limiter.record_success(ip);
            tracing::info!(ip = %ip, label = session.label.as_deref().unwrap_or(""), "device paired");
            let cookie = build_session_cookie(&session.id, true);
            with_cookie(Json(OkResponse { ok: true }).into_response(), &cookie)
        }
        Ok(None) => {
            s.limiter.record_failure(ip);
            auth_failed(HubError::InvalidCode.to_http_response("invalid or expired pairing code"))
        }
        Err(e) => {
            tracing::error!(err = %e, "pairing failed to persist session");
            HubError::SessionError.to_http_response("failed to create session").into_response()
        }
    }
}

/// `POST /api/pair/code`: mint a pairing code for a new device.
pub async fn pair_code(State(s): State<Arc<HubState>>) -> Response {
    match s.auth.create_pairing_code().await {
        Ok(code) => (
            StatusCode::CREATED,
            Json(PairingCodeResponse { code, expires_in: PAIRING_CODE_TTL_SECS }),
        )
            .into_response(),
        Err(e) => {
            tracing::error!(err = %e, "failed to create pairing code");
            HubError::SessionError.to_http_response("failed to create pairing code").into_response()
        }
    }
}

/// `GET /api/devices`: list paired devices.
pub async fn devices_list(State(s): State<Arc<HubState>>) -> Response {
    let devices: Vec<DeviceInfo> = s.auth.devices().await.into_iter().map(Into::into).collect();
    Json(devices).into_response()
}

/// `DELETE /api/devices/{id}`: revoke a device session.
///
/// Revoking the session making the request is refused.
pub async fn device_revoke(
    State(s): State<Arc<HubState>>,
    current: Option<Extension<CurrentSession>>,
    Path(id): Path<String>,
) -> Response {
    if let Some(Extension(CurrentSession(ref session))) = current {
        if session.id == id {
            return HubError::ValidationError
                .to_http_response("cannot revoke the current session")
                .into_response();
        }
    }

    match s.auth.revoke(&id).await {
        Ok(true) => Json(OkResponse { ok: true }).into_response(),
        Ok(false) => HubError::NotFound.to_http_response("unknown device").into_response(),
        Err(e) => {
            tracing::error!(err = %e, "failed to persist device revocation");
            HubError::SessionError.to_http_response("failed to revoke device").into_response()
        }
    }
}
