//! HTTP boundary: one JSON execution endpoint plus static files at `/`.

pub mod errors;
pub mod handlers;
pub mod models;

use std::future::Future;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::post;
use tokio::net::TcpListener;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::constants::{EXECUTE_PATH, EXECUTION_GRACE};
use crate::executor::CodeExecutor;
use crate::http::errors::ServerError;
use crate::http::handlers::{AppState, execute_code};

/// Builds the service router. Other methods on the execute path get 405.
///
/// Submissions are not size limited.
pub fn router(
    executor: Arc<dyn CodeExecutor>,
    static_dir: Option<&Path>,
) -> Result<Router, ServerError> {
    let state = AppState {
        executor,
        grace: EXECUTION_GRACE,
    };
    let mut router = Router::new()
        .route(
            EXECUTE_PATH,
            post(execute_code).layer(DefaultBodyLimit::disable()),
        )
        .with_state(state);

    if let Some(dir) = static_dir {
        let dir = std::path::absolute(dir).map_err(|source| ServerError::StaticDir {
            path: dir.to_path_buf(),
            source,
        })?;
        tracing::info!("Serving static files from {}", dir.display());
        router = router.fallback_service(ServeDir::new(dir));
    }

    Ok(router.layer(TraceLayer::new_for_http()))
}

pub async fn bind(addr: SocketAddr) -> Result<TcpListener, ServerError> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })
}

/// Serves until `shutdown` resolves and in-flight requests have completed.
pub async fn serve<F>(listener: TcpListener, router: Router, shutdown: F) -> Result<(), ServerError>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        tracing::info!("Server listening on {}", addr);
    }

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(ServerError::Serve)
}

/// Resolves on Ctrl+C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}
