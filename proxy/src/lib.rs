pub mod config;
pub mod errors;
mod headers;
mod http_proxy;
pub mod metrics_defs;
mod raw_proxy;
pub mod service;
pub mod shutdown;
pub mod table;
mod tls;

#[cfg(test)]
mod testutils;

use crate::config::{Config, ListenScheme};
use crate::errors::ProxyError;
use crate::service::{ProxyShared, RequestDispatcher};
use crate::shutdown::ShutdownGate;
use hyper::body::Incoming;
use hyper_util::rt::{TokioExecutor, TokioIo, TokioTimer};
use hyper_util::server::conn::auto;
use shared::admin_service::AdminService;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_rustls::TlsAcceptor;

/// Runs the proxy until a shutdown signal arrives.
///
/// Routing documents received on `routes` replace the live table; a
/// document that fails to parse keeps the previous table live. Once the
/// shutdown gate closes, new requests fail fast and the listeners are torn
/// down after the configured grace period.
pub async fn run(config: Config, mut routes: mpsc::Receiver<String>) -> Result<(), ProxyError> {
    let shutdown = ShutdownGate::new();
    let shared = Arc::new(ProxyShared::<Incoming>::new(config.clone(), shutdown.clone()));

    {
        let shared = shared.clone();
        tokio::spawn(async move {
            while let Some(doc) = routes.recv().await {
                match shared.table.replace(&doc) {
                    Ok(count) => tracing::info!(routes = count, "Routing table updated"),
                    Err(err) => tracing::error!(
                        error = %err,
                        "Rejecting routing document, keeping previous table"
                    ),
                }
            }
        });
    }

    if let Some(admin) = &config.admin {
        let addr = format!("{}:{}", admin.host, admin.port);
        let listener = TcpListener::bind(&addr).await?;
        tracing::info!(%addr, "Admin listener ready");

        let shared = shared.clone();
        tokio::spawn(async move {
            loop {
                let (stream, _) = match listener.accept().await {
                    Ok(conn) => conn,
                    Err(err) => {
                        tracing::warn!(error = %err, "Admin accept failed");
                        continue;
                    }
                };
                let shared = shared.clone();
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);
                    let ready = {
                        let shared = shared.clone();
                        move || shared.table.is_loaded()
                    };
                    let routes = move || shared.table.document().as_ref().clone();
                    let svc = AdminService::<_, _, hyper::Error>::new(ready, routes);
                    let _ = auto::Builder::new(TokioExecutor::new())
                        .serve_connection(io, svc)
                        .await;
                });
            }
        });
    }

    for listen in &config.listen {
        let listener = TcpListener::bind(&listen.addr).await?;
        let acceptor = match listen.scheme {
            ListenScheme::Http => None,
            ListenScheme::Https => {
                let cert = listen
                    .cert_path
                    .as_deref()
                    .ok_or_else(|| ProxyError::MissingTlsConfig(listen.addr.clone()))?;
                let key = listen
                    .key_path
                    .as_deref()
                    .ok_or_else(|| ProxyError::MissingTlsConfig(listen.addr.clone()))?;
                Some(TlsAcceptor::from(tls::load_tls_config(cert, key)?))
            }
        };

        tracing::info!(addr = %listen.addr, scheme = ?listen.scheme, "Listening");
        tokio::spawn(serve_listener(listener, shared.clone(), acceptor));
    }

    wait_for_shutdown_signal().await;
    shutdown.shut_down();
    tracing::info!(
        wait_secs = config.shutdown_wait_secs,
        "Shutdown signal received, draining"
    );
    tokio::time::sleep(Duration::from_secs(config.shutdown_wait_secs)).await;

    Ok(())
}

async fn serve_listener(
    listener: TcpListener,
    shared: Arc<ProxyShared<Incoming>>,
    acceptor: Option<TlsAcceptor>,
) {
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(conn) => conn,
            Err(err) => {
                tracing::warn!(error = %err, "Accept failed");
                continue;
            }
        };
        let _ = stream.set_nodelay(true);

        let shared = shared.clone();
        let acceptor = acceptor.clone();
        tokio::spawn(async move {
            let svc = RequestDispatcher {
                shared: shared.clone(),
                peer,
                tls: acceptor.is_some(),
            };

            let mut builder = auto::Builder::new(TokioExecutor::new());
            if shared.config.read_timeout_secs > 0 {
                builder
                    .http1()
                    .timer(TokioTimer::new())
                    .header_read_timeout(Duration::from_secs(shared.config.read_timeout_secs));
            }

            let served = match acceptor {
                Some(acceptor) => match acceptor.accept(stream).await {
                    Ok(tls_stream) => {
                        builder
                            .serve_connection_with_upgrades(TokioIo::new(tls_stream), svc)
                            .await
                    }
                    Err(err) => {
                        tracing::debug!(%peer, error = %err, "TLS handshake failed");
                        return;
                    }
                },
                None => {
                    builder
                        .serve_connection_with_upgrades(TokioIo::new(stream), svc)
                        .await
                }
            };

            if let Err(err) = served {
                tracing::debug!(%peer, error = %err, "Connection closed with error");
            }
        });
    }
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = term.recv() => {}
            }
        }
        Err(err) => {
            tracing::warn!(error = %err, "Cannot install SIGTERM handler");
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
