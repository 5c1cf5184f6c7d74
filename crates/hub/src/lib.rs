// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agency hub: coordinator for a fleet of local AI-agent workers.

pub mod access_log;
pub mod agent;
pub mod auth;
pub mod component;
pub mod config;
pub mod discovery;
pub mod dispatch;
pub mod error;
pub mod persist;
pub mod queue;
pub mod session;
pub mod state;
pub mod tls;
pub mod transport;

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::config::HubConfig;
use crate::state::HubState;
use crate::transport::{build_internal_router, build_router};

/// Run the hub until shutdown.
pub async fn run(config: HubConfig) -> anyhow::Result<()> {
    let _ = rustls::crypto::ring::default_provider().install_default();

    if config.password.is_none() {
        tracing::warn!("no password configured; browser login is disabled");
    }

    tls::ensure_certs(&config.tls_cert_path(), &config.tls_key_path(), config.tls_auto_generate)?;
    let tls_config =
        Arc::new(tls::server_config(&config.tls_cert_path(), &config.tls_key_path())?);

    let shutdown = CancellationToken::new();
    let state = Arc::new(HubState::new(config, shutdown.clone())?);

    // Ctrl-C triggers the same graceful shutdown as the API endpoint.
    {
        let token = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("interrupt received, shutting down");
                token.cancel();
            }
        });
    }

    discovery::spawn_scanner(Arc::clone(&state));
    dispatch::spawn_dispatcher(Arc::clone(&state));

    if let Some(internal_port) = state.config.internal_port {
        let router = build_internal_router(Arc::clone(&state));
        let listener = TcpListener::bind(("127.0.0.1", internal_port)).await?;
        tracing::info!(port = internal_port, "internal listener on loopback (no auth)");
        let token = shutdown.clone();
        tokio::spawn(async move {
            let service =
                router.into_make_service_with_connect_info::<std::net::SocketAddr>();
            let result = axum::serve(listener, service)
                .with_graceful_shutdown(token.cancelled_owned())
                .await;
            if let Err(e) = result {
                tracing::error!(err = %e, "internal listener failed");
            }
        });
    }

    let addr = format!("{}:{}", state.config.host, state.config.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "agency hub listening (https)");

    let router = build_router(Arc::clone(&state));
    tls::serve_tls(listener, tls_config, router, shutdown).await?;

    Ok(())
}
