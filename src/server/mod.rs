//! Aggregation server.
//!
//! Agents register, poll for commands, fetch the peer list and push their
//! cycle reports here. Operators start/stop sessions and read snapshots.

mod handlers;
mod registry;

pub use handlers::*;
pub use registry::{AgentRegistry, Registration};

use std::sync::Arc;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tokio::net::TcpListener;

use crate::config::ServerConfig;
use crate::error::{StoreError, ValidationError};
use crate::protocol::StatusResponse;
use crate::store::AggregationStore;

/// Shared handler state. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ServerState {
    pub store: Arc<AggregationStore>,
    pub registry: Arc<AgentRegistry>,
    pub config: Arc<ServerConfig>,
}

impl ServerState {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            store: Arc::new(AggregationStore::new()),
            registry: Arc::new(AgentRegistry::new()),
            config: Arc::new(config),
        }
    }
}

/// Handler failure, rendered as `{status: "error", message}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Conflict(#[from] StoreError),
    #[error("not found: {0}")]
    NotFound(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
        };
        (status, Json(StatusResponse::error(self.to_string()))).into_response()
    }
}

pub fn router(state: ServerState) -> Router {
    Router::new()
        .route("/register", post(register))
        .route("/get_commands", get(get_commands))
        .route("/get_clients", get(get_clients))
        .route("/report_results", post(report_results))
        .route("/start_tests", post(start_tests))
        .route("/stop_tests", post(stop_tests))
        .route("/clear_data", post(clear_data))
        .route("/snapshot", get(snapshot))
        .route("/detailed_results/{source}/{dest}", get(detailed_results))
        .route("/download_results/{test_name}", get(download_results))
        .with_state(state)
}

/// Serve on an already-bound listener until the process exits.
pub async fn serve_on(listener: TcpListener, state: ServerState) -> std::io::Result<()> {
    let addr = listener.local_addr()?;
    tracing::info!(%addr, "aggregation server listening");
    axum::serve(listener, router(state)).await
}

pub async fn serve(config: ServerConfig) -> std::io::Result<()> {
    let listener = TcpListener::bind(config.address).await?;
    serve_on(listener, ServerState::new(config)).await
}
