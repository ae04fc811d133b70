use anyhow::Result;
use axum::{routing::get, serve, Router};
use ledgermeta_core::{config::AppConfig, pool::LedgerPoolBuilder, types::LedgerEvent};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use rustls::crypto::{ring::default_provider, CryptoProvider};
use server::router::AppState;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::{
    signal,
    sync::broadcast::{self, error::RecvError},
};
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// How long startup waits for the first session before serving anyway.
const INITIAL_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Initializes the logging system based on the configuration.
///
/// `RUST_LOG` wins when set; otherwise the configured level applies to the workspace
/// crates and everything else logs at `warn`.
fn init_logging(config: &AppConfig) {
    let level = config.logging.level.as_str();
    let filter = EnvFilter::try_from_env("RUST_LOG").unwrap_or_else(|_| {
        EnvFilter::new(format!("warn,ledgermeta_core={level},server={level}"))
    });

    let registry = tracing_subscriber::registry().with(filter);

    if config.logging.format.as_str() == "json" {
        let fmt_layer = tracing_subscriber::fmt::layer().json();
        registry.with(fmt_layer).init();
    } else {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .pretty()
            .with_file(true)
            .with_line_number(true)
            .with_target(false);
        registry.with(fmt_layer).init();
    }
}

fn init_metrics(config: &AppConfig) -> Result<Option<PrometheusHandle>> {
    if !config.metrics.enabled {
        return Ok(None);
    }

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus recorder: {e}"))?;
    Ok(Some(handle))
}

#[tokio::main]
async fn main() -> Result<()> {
    CryptoProvider::install_default(default_provider())
        .map_err(|e| anyhow::anyhow!("Failed to install crypto provider: {e:?}"))?;

    let config =
        AppConfig::load().map_err(|e| anyhow::anyhow!("Configuration loading failed: {e}"))?;
    config.validate().map_err(|e| anyhow::anyhow!("Configuration validation failed: {e}"))?;

    init_logging(&config);
    info!("Starting ledger pool server");
    debug!(
        nodes_count = config.ledger.nodes.len(),
        sessions_count = config.ledger.session_count(),
        bind_port = config.server.bind_port,
        "Configuration loaded"
    );

    let prometheus = init_metrics(&config)?;

    let pool = Arc::new(
        LedgerPoolBuilder::from_config(&config.ledger)
            .build()
            .map_err(|e| anyhow::anyhow!("Ledger pool initialization failed: {e}"))?,
    );
    pool.start();

    if pool.wait_for_connection(INITIAL_CONNECT_TIMEOUT).await {
        info!(online = pool.online_sessions(), "Ledger pool online");
    } else {
        warn!(
            timeout_secs = INITIAL_CONNECT_TIMEOUT.as_secs(),
            "No ledger node reachable yet, serving anyway"
        );
    }

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let event_handle = tokio::spawn(log_events(pool.subscribe(), shutdown_tx.subscribe()));

    let state = AppState::new(pool.clone(), prometheus.clone());

    if let (Some(handle), Some(port)) = (prometheus, config.metrics.prometheus_port) {
        if port != config.server.bind_port {
            spawn_metrics_server(&config, port, handle).await?;
        }
    }

    let app = server::create_app(state);
    let addr = config.socket_addr().map_err(|e| anyhow::anyhow!(e))?;
    info!(address = %addr, "Ledger server listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    if let Err(e) = serve(listener, app).with_graceful_shutdown(shutdown_signal()).await {
        error!(error = %e, "Server error occurred");
    }

    let _ = shutdown_tx.send(());
    pool.shutdown().await;
    if let Err(e) = event_handle.await {
        warn!(error = %e, "Event logger ended abnormally");
    }
    info!("Server shutdown complete");

    Ok(())
}

/// Serves `/metrics` alone on the dedicated Prometheus port.
async fn spawn_metrics_server(
    config: &AppConfig,
    port: u16,
    handle: PrometheusHandle,
) -> Result<()> {
    let addr: SocketAddr = format!("{}:{port}", config.server.bind_address)
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid metrics bind address: {e}"))?;

    let app = Router::new().route(
        "/metrics",
        get(move || {
            let handle = handle.clone();
            async move { handle.render() }
        }),
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(address = %addr, "Metrics server listening");

    tokio::spawn(async move {
        if let Err(e) = serve(listener, app).await {
            error!(error = %e, "Metrics server error occurred");
        }
    });

    Ok(())
}

/// Logs the deduplicated event stream until shutdown.
async fn log_events(
    mut events: broadcast::Receiver<LedgerEvent>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            event = events.recv() => match event {
                Ok(LedgerEvent::LedgerClosed(closed)) => {
                    info!(
                        ledger_index = closed.ledger_index,
                        txn_count = ?closed.txn_count,
                        "ledger closed"
                    );
                }
                Ok(LedgerEvent::Transaction(tx)) => {
                    debug!(hash = %tx.hash, ledger_index = ?tx.ledger_index, "transaction");
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped = skipped, "event logger lagging behind the pool");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install signal handler");
                () = std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown");
}
