// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session-cookie authentication middleware and request logging.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::header;
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::{IntoResponse, Redirect, Response};

use crate::auth::AuthSession;
use crate::error::HubError;
use crate::state::HubState;

/// Name of the browser session cookie.
pub const SESSION_COOKIE: &str = "agency_session";
/// Max-Age for device-session cookies (one year). Login cookies are
/// session-scoped and carry no Max-Age.
pub const DEVICE_COOKIE_MAX_AGE_SECS: i64 = 31_536_000;

/// The authenticated session, inserted into request extensions by
/// [`auth_layer`].
#[derive(Debug, Clone)]
pub struct CurrentSession(pub AuthSession);

/// Marker inserted into response extensions when a request failed auth;
/// read by the access-log layer.
#[derive(Debug, Clone, Copy)]
pub struct AuthFailed;

/// Paths reachable without a session cookie.
fn is_public(path: &str) -> bool {
    matches!(path, "/status" | "/login" | "/pair")
}

/// Extract the session cookie value from a Cookie header.
pub fn session_cookie_value(headers: &HeaderMap) -> Option<String> {
    let header = headers.get(header::COOKIE)?.to_str().ok()?;
    for pair in header.split(';') {
        let Some((name, value)) = pair.trim().split_once('=') else {
            continue;
        };
        if name == SESSION_COOKIE {
            return Some(value.to_owned());
        }
    }
    None
}

/// Build the Set-Cookie value for a freshly minted session.
pub fn build_session_cookie(session_id: &str, device: bool) -> String {
    let mut cookie =
        format!("{SESSION_COOKIE}={session_id}; Path=/; HttpOnly; Secure; SameSite=Strict");
    if device {
        cookie.push_str(&format!("; Max-Age={DEVICE_COOKIE_MAX_AGE_SECS}"));
    }
    cookie
}

/// Best-effort client IP. The TLS accept loop injects `ConnectInfo`; an
/// in-process test transport may not, in which case loopback is assumed.
pub fn peer_ip(connect_info: Option<&ConnectInfo<SocketAddr>>) -> IpAddr {
    connect_info
        .map(|ConnectInfo(addr)| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}

/// Axum middleware enforcing the session cookie.
///
/// Unauthenticated API requests get a 401 envelope; HTML paths redirect to
/// the login form.
pub async fn auth_layer(
    State(s): State<Arc<HubState>>,
    mut req: Request,
    next: Next,
) -> Response {
    let path = req.uri().path().to_owned();
    if is_public(&path) {
        return next.run(req).await;
    }

    let session = match session_cookie_value(req.headers()) {
        Some(id) => s.auth.validate(&id).await,
        None => None,
    };

    match session {
        Some(session) => {
            req.extensions_mut().insert(CurrentSession(session));
            next.run(req).await
        }
        None => {
            let mut resp = if path.starts_with("/api/") {
                HubError::Unauthorized
                    .to_http_response("authentication required")
                    .into_response()
            } else {
                Redirect::to("/login").into_response()
            };
            resp.extensions_mut().insert(AuthFailed);
            resp
        }
    }
}

/// Outermost middleware: one access-log line per request.
pub async fn access_log_layer(
    State(s): State<Arc<HubState>>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    req: Request,
    next: Next,
) -> Response {
    let method = req.method().to_string();
    let path = req.uri().path().to_owned();
    let ip = peer_ip(connect_info.as_ref()).to_string();

    let resp = next.run(req).await;

    let auth_ok = resp.extensions().get::<AuthFailed>().is_none();
    s.access_log.record(&ip, &method, &path, resp.status().as_u16(), auth_ok);
    resp
}
