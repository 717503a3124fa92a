use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum_server::Handle;
use tracing::info;
use tracing_subscriber::EnvFilter;

use clinicd::api::{ApiContext, build_router};
use clinicd::config::Config;
use clinicd::engine::Engine;

const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env();
    clinicd::observability::init(config.metrics_port)?;

    let tls = clinicd::tls::load_rustls_config(config.tls_cert.as_deref(), config.tls_key.as_deref())
        .await?;

    // Ensure data directory exists
    std::fs::create_dir_all(&config.data_dir)?;

    let engine = Arc::new(Engine::open(config.wal_path())?);
    let compactor_engine = engine.clone();
    let threshold = config.compact_threshold;
    tokio::spawn(async move {
        clinicd::compactor::run_compactor(compactor_engine, threshold).await;
    });

    let ctx = ApiContext::new(engine.clone(), &config.api_token, config.max_connections);
    let app = build_router(ctx);

    let addr: SocketAddr = config.addr().parse()?;
    info!("clinicd listening on {addr}");
    info!("  data_dir: {}", config.data_dir.display());
    info!("  max_connections: {}", config.max_connections);
    info!("  tls: {}", if tls.is_some() { "enabled" } else { "disabled" });
    info!(
        "  metrics: {}",
        config
            .metrics_port
            .map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics"))
    );

    // Graceful shutdown: stop accepting on SIGTERM/ctrl-c, drain in-flight requests
    let handle = Handle::new();
    tokio::spawn(shutdown_on_signal(handle.clone()));

    let service = app.into_make_service();
    match tls {
        Some(tls) => {
            axum_server::bind_rustls(addr, tls)
                .handle(handle)
                .serve(service)
                .await?
        }
        None => axum_server::bind(addr).handle(handle).serve(service).await?,
    }

    info!("flushing WAL");
    engine.close().await?;
    info!("clinicd stopped");
    Ok(())
}

async fn shutdown_on_signal(handle: Handle) {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                tracing::warn!("failed to register SIGTERM handler: {e}");
                ctrl_c.await.ok();
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }
    info!("shutdown signal received, draining connections (up to {}s)", DRAIN_TIMEOUT.as_secs());
    handle.graceful_shutdown(Some(DRAIN_TIMEOUT));
}
