use std::sync::Arc;
use std::time::Duration;

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;

use crate::domain::ExecContext;
use crate::executor::CodeExecutor;
use crate::http::errors::ServerError;
use crate::http::models::{ExecutionRequest, ExecutionResponse};

#[derive(Clone, Debug)]
pub struct AppState {
    pub executor: Arc<dyn CodeExecutor>,
    /// Slack on top of the interpreter timeout before the caller gives up.
    pub grace: Duration,
}

/// `POST /api/execute`
///
/// The body is decoded regardless of its content type.
#[tracing::instrument(skip_all)]
pub async fn execute_code(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<ExecutionResponse>, ServerError> {
    let request: ExecutionRequest = serde_json::from_slice(&body)?;
    if request.code.is_empty() {
        return Err(ServerError::EmptyCode);
    }

    tracing::info!("Received code, {} bytes", request.code.len());
    tracing::debug!("Code: {:?}", request.code);

    let ctx = ExecContext::with_timeout(state.executor.timeout() + state.grace);
    let result = state.executor.execute(&ctx, &request.code).await;
    if let Some(err) = &result.error {
        tracing::info!("Execution failed: {}", err);
    }

    Ok(Json(result.into()))
}
