// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP transport for the hub.

pub mod auth;
pub mod http;
pub mod http_auth;

use std::sync::Arc;

use axum::middleware;
use axum::routing::{delete, get, post, put};
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::state::HubState;

/// Build the public router: session-cookie auth plus access logging.
pub fn build_router(state: Arc<HubState>) -> Router {
    build(state, true)
}

/// Build the router for the loopback-only internal port: same API surface,
/// no auth. Sibling services on the host use it directly.
pub fn build_internal_router(state: Arc<HubState>) -> Router {
    build(state, false)
}

fn build(state: Arc<HubState>, require_auth: bool) -> Router {
    let mut router = Router::new()
        // Public surface (no auth)
        .route("/", get(http::dashboard_page))
        .route("/status", get(http::status))
        .route("/login", get(http_auth::login_form).post(http_auth::login))
        .route("/pair", get(http_auth::pair_form).post(http_auth::pair))
        // Fleet views
        .route("/api/dashboard", get(http::dashboard))
        .route("/api/agents", get(http::agents))
        .route("/api/directors", get(http::directors))
        .route("/api/helpers", get(http::helpers))
        // Task submission and status
        .route("/api/task", post(http::submit_task))
        .route("/api/task/{id}", get(http::task_status))
        .route("/api/history/{id}", get(http::task_history))
        // Work queue
        .route("/api/queue/task", post(http::queue_task))
        .route("/api/queue", get(http::queue_status))
        .route("/api/queue/{id}", get(http::queue_get))
        .route("/api/queue/{id}/cancel", post(http::queue_cancel))
        // Sessions
        .route("/api/sessions", get(http::sessions_list).post(http::sessions_add))
        .route("/api/sessions/{sid}", delete(http::sessions_delete))
        .route("/api/sessions/{sid}/tasks/{tid}", put(http::sessions_update_task))
        .route("/api/sessions/{sid}/archive", post(http::sessions_archive))
        // Pairing and devices
        .route("/api/pair/code", post(http_auth::pair_code))
        .route("/api/devices", get(http_auth::devices_list))
        .route("/api/devices/{id}", delete(http_auth::device_revoke))
        // Lifecycle
        .route("/api/shutdown", post(http::shutdown));

    if require_auth {
        router = router.layer(middleware::from_fn_with_state(state.clone(), auth::auth_layer));
    }

    router
        .layer(middleware::from_fn_with_state(state.clone(), auth::access_log_layer))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
