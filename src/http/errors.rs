use std::net::SocketAddr;
use std::path::PathBuf;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Invalid request: {0}")]
    InvalidRequest(#[from] serde_json::Error),

    #[error("Code cannot be empty")]
    EmptyCode,

    #[error("Invalid static directory {path}: {source}")]
    StaticDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("HTTP server error: {0}")]
    Serve(#[source] std::io::Error),
}

impl ServerError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServerError::InvalidRequest(_) | ServerError::EmptyCode => StatusCode::BAD_REQUEST,
            ServerError::StaticDir { .. } | ServerError::Bind { .. } | ServerError::Serve(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        (self.status_code(), self.to_string()).into_response()
    }
}
