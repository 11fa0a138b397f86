//! Grove variability server entrypoint.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use mimalloc::MiMalloc;
use tokio::net::TcpListener;
use tokio::signal;

use grove::cache::{CacheBackend, DedupCache, KeyBuilder, MemoryBackend};
use grove::config::Config;
use grove::gateway::{HandlerState, create_router};
use grove::lifecycle::{BackendScope, hydrate};
use grove::model::ModelConfig;
use grove::scoring::{DivergenceScorer, VariabilityScorer};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if std::env::args().any(|arg| arg == "--health-check") {
        std::process::exit(run_health_check().await);
    }

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Config::from_env()?;
    config.validate()?;
    let addr: SocketAddr = config.socket_addr().parse()?;

    tracing::info!(
        bind_addr = %config.bind_addr,
        port = config.port,
        namespace = %config.cache_namespace,
        "Grove starting"
    );

    let backend: Arc<dyn CacheBackend> =
        Arc::new(MemoryBackend::new(config.cache_capacity, config.cache_ttl));
    let scope = BackendScope::new(Arc::clone(&backend), config.snapshot_path.clone());

    let served = run(&config, addr, backend).await;

    match scope.close().await {
        Ok(result) => tracing::info!(?result, "Backend released"),
        Err(e) => tracing::error!(error = %e, "Failed to write snapshot"),
    }

    served?;
    tracing::info!("Grove shutdown complete");
    Ok(())
}

async fn run(config: &Config, addr: SocketAddr, backend: Arc<dyn CacheBackend>) -> anyhow::Result<()> {
    if let Some(path) = &config.snapshot_path {
        tracing::info!(path = %path.display(), "Hydrating score cache from snapshot...");
        match hydrate(backend.as_ref(), path, &config.cache_namespace, config.cache_ttl).await {
            Ok(result) => tracing::info!(?result, "Hydration complete."),
            Err(e) => tracing::warn!("Failed to hydrate snapshot: {}. Starting empty.", e),
        }
    }

    let model_config = ModelConfig::from_server_config(config);
    if model_config.testing_stub {
        tracing::warn!("No GROVE_MODEL_PATH configured, running scorer in stub mode");
    }
    let scorer: Arc<dyn DivergenceScorer> = Arc::new(VariabilityScorer::new(model_config)?);

    let state = HandlerState::new(
        DedupCache::new(backend),
        KeyBuilder::new(config.cache_namespace.clone()),
        scorer,
    )
    .with_request_timeout(config.request_timeout);

    let app = create_router(state);

    let listener = TcpListener::bind(addr).await?;
    tracing::info!(addr = %addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn run_health_check() -> i32 {
    let port = std::env::var(Config::ENV_PORT)
        .ok()
        .and_then(|p| p.parse::<u16>().ok())
        .unwrap_or(8080);

    let url = format!("http://127.0.0.1:{}/healthz", port);

    let Ok(client) = reqwest::Client::builder()
        .timeout(Duration::from_secs(1))
        .build()
    else {
        return 1;
    };

    match client.get(&url).send().await {
        Ok(res) if res.status().is_success() => 0,
        _ => 1,
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
