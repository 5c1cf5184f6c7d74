// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! TLS provisioning and the HTTPS accept loop.

use std::io::Cursor;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Generate a self-signed certificate when none exists.
///
/// The key file is written owner-only. With auto-generation disabled a
/// missing cert or key is a startup error.
pub fn ensure_certs(cert_path: &Path, key_path: &Path, auto_generate: bool) -> anyhow::Result<()> {
    if cert_path.exists() && key_path.exists() {
        return Ok(());
    }
    if !auto_generate {
        anyhow::bail!(
            "tls cert or key missing ({}, {}) and auto-generation is disabled",
            cert_path.display(),
            key_path.display()
        );
    }

    let cert = rcgen::generate_simple_self_signed(vec![
        "localhost".to_owned(),
        "127.0.0.1".to_owned(),
    ])?;
    if let Some(dir) = cert_path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    std::fs::write(cert_path, cert.serialize_pem()?)?;
    std::fs::write(key_path, cert.serialize_private_key_pem())?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(key_path, std::fs::Permissions::from_mode(0o600))?;
    }
    tracing::info!(cert = %cert_path.display(), "generated self-signed tls certificate");
    Ok(())
}

/// Build the rustls server config from PEM files. Minimum TLS 1.2.
pub fn server_config(cert_path: &Path, key_path: &Path) -> anyhow::Result<rustls::ServerConfig> {
    let cert_pem = std::fs::read(cert_path)?;
    let certs: Vec<CertificateDer<'static>> =
        rustls_pemfile::certs(&mut Cursor::new(cert_pem)).collect::<Result<_, _>>()?;
    if certs.is_empty() {
        anyhow::bail!("no certificates found in {}", cert_path.display());
    }

    let key_pem = std::fs::read(key_path)?;
    let key: PrivateKeyDer<'static> = rustls_pemfile::private_key(&mut Cursor::new(key_pem))?
        .ok_or_else(|| anyhow::anyhow!("no private key found in {}", key_path.display()))?;

    let config = rustls::ServerConfig::builder_with_protocol_versions(&[
        &rustls::version::TLS12,
        &rustls::version::TLS13,
    ])
    .with_no_client_auth()
    .with_single_cert(certs, key)?;
    Ok(config)
}

/// Accept TLS connections and serve the router until shutdown, then wait
/// for in-flight connections to drain.
pub async fn serve_tls(
    listener: TcpListener,
    config: Arc<rustls::ServerConfig>,
    router: axum::Router,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    use tower::Service;

    let acceptor = TlsAcceptor::from(config);
    let mut make_service = router.into_make_service_with_connect_info::<SocketAddr>();
    let tracker = TaskTracker::new();

    loop {
        let (stream, peer) = tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok(pair) => pair,
                Err(e) => {
                    tracing::debug!(err = %e, "accept failed");
                    continue;
                }
            },
        };

        let tower_service = match make_service.call(peer).await {
            Ok(service) => service,
            Err(infallible) => match infallible {},
        };
        let acceptor = acceptor.clone();

        tracker.spawn(async move {
            let tls_stream = match acceptor.accept(stream).await {
                Ok(stream) => stream,
                Err(e) => {
                    tracing::debug!(peer = %peer, err = %e, "tls handshake failed");
                    return;
                }
            };

            let hyper_service = hyper_util::service::TowerToHyperService::new(tower_service);
            let result = hyper_util::server::conn::auto::Builder::new(
                hyper_util::rt::TokioExecutor::new(),
            )
            .serve_connection_with_upgrades(hyper_util::rt::TokioIo::new(tls_stream), hyper_service)
            .await;
            if let Err(e) = result {
                tracing::debug!(peer = %peer, err = ?e, "connection closed with error");
            }
        });
    }

    tracker.close();
    tracker.wait().await;
    Ok(())
}
