//! Test server harness.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use grove::cache::{CacheBackend, DedupCache, KeyBuilder, MemoryBackend};
use grove::gateway::{HandlerState, create_router};
use grove::lifecycle::{BackendScope, DehydrationResult, LifecycleResult, hydrate};
use grove::scoring::{DivergenceScorer, VariabilityScorer};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

pub const TEST_NAMESPACE: &str = "grove:integration";

#[derive(Clone, Default)]
pub struct TestServerConfig {
    /// Scorer to serve with; defaults to the stub `VariabilityScorer`.
    pub scorer: Option<Arc<dyn DivergenceScorer>>,
    pub request_timeout: Option<Duration>,
    pub snapshot_path: Option<PathBuf>,
}

pub struct TestServer {
    pub addr: SocketAddr,
    pub backend: Arc<dyn CacheBackend>,
    scope: BackendScope,
    server_handle: Option<JoinHandle<()>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl TestServer {
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn extract_url(&self) -> String {
        format!("{}{}", self.url(), grove::constants::EXTRACT_ROUTE)
    }

    /// Stops the server, then closes the backend scope (writing the snapshot if configured).
    pub async fn shutdown(mut self) -> LifecycleResult<DehydrationResult> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.server_handle.take() {
            let _ = handle.await;
        }
        self.scope.close().await
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ServerStartupError {
    #[error("Failed to bind to address: {0}")]
    BindError(#[from] std::io::Error),
    #[error("Server startup failed: {0}")]
    StartupFailed(String),
}

/// Spawns a server on an ephemeral port with an in-memory backend.
pub async fn spawn_test_server(config: TestServerConfig) -> Result<TestServer, ServerStartupError> {
    let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0))).await?;
    let addr = listener.local_addr()?;

    let backend: Arc<dyn CacheBackend> = Arc::new(MemoryBackend::new(None, None));
    let scope = BackendScope::new(Arc::clone(&backend), config.snapshot_path.clone());

    if let Some(path) = &config.snapshot_path {
        hydrate(backend.as_ref(), path, TEST_NAMESPACE, None)
            .await
            .map_err(|e| ServerStartupError::StartupFailed(e.to_string()))?;
    }

    let scorer = match config.scorer {
        Some(scorer) => scorer,
        None => Arc::new(
            VariabilityScorer::stub()
                .map_err(|e| ServerStartupError::StartupFailed(e.to_string()))?,
        ),
    };

    let state = HandlerState::new(
        DedupCache::new(Arc::clone(&backend)),
        KeyBuilder::new(TEST_NAMESPACE),
        scorer,
    )
    .with_request_timeout(config.request_timeout);

    let app = create_router(state);
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    let server_handle = tokio::spawn(async move {
        let _ = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await;
    });

    Ok(TestServer {
        addr,
        backend,
        scope,
        server_handle: Some(server_handle),
        shutdown_tx: Some(shutdown_tx),
    })
}
