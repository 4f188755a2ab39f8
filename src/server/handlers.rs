//! HTTP request handlers
//!
//! Agent-facing handlers first, then the operator surface.

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, Path, Query, State},
    http::header,
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::{ApiError, Registration, ServerState};
use crate::error::ValidationError;
use crate::model::{Command, Hostname, PairRecord, TestSession};
use crate::protocol::{
    ClientsResponse, CommandQuery, CommandReply, RegisterRequest, ReportRequest, StatusResponse,
};
use crate::store::{generate_filename, save_bundle, ExportBundle, StoreSnapshot};

fn body_error(rejection: JsonRejection) -> ApiError {
    ValidationError::Body(rejection.body_text()).into()
}

pub async fn register(
    State(state): State<ServerState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<Json<StatusResponse>, ApiError> {
    let Json(request) = payload.map_err(body_error)?;
    let (hostname, ip_address) = request.validate()?;

    match state.registry.register(hostname.clone(), ip_address.clone(), Utc::now()) {
        Registration::New => tracing::info!(%hostname, %ip_address, "client registered"),
        Registration::Updated => tracing::debug!(%hostname, %ip_address, "client re-registered"),
    }
    Ok(Json(StatusResponse::ok("registered")))
}

pub async fn get_commands(
    State(state): State<ServerState>,
    Query(query): Query<CommandQuery>,
) -> Json<CommandReply> {
    let hostname = query.hostname.and_then(|h| Hostname::parse(h).ok());
    let command = state.registry.take_command(hostname.as_ref());
    if command == Some(Command::ReRegister) {
        tracing::info!(hostname = ?hostname, "unregistered client polled, sending re_register");
    }
    Json(CommandReply { command })
}

pub async fn get_clients(State(state): State<ServerState>) -> Json<ClientsResponse> {
    Json(ClientsResponse {
        clients: state.registry.clients(),
    })
}

pub async fn report_results(
    State(state): State<ServerState>,
    payload: Result<Json<ReportRequest>, JsonRejection>,
) -> Result<Json<StatusResponse>, ApiError> {
    let Json(request) = payload.map_err(body_error)?;
    let batch = request.into_batch(Utc::now())?;
    let source = batch.source.clone();

    let summary = state.store.report(batch);
    tracing::debug!(%source, results = summary.results, traces = summary.traces, "report applied");
    Ok(Json(StatusResponse::ok("results_received")))
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StartRequest {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionResponse {
    pub status: String,
    pub session: TestSession,
    /// Agents whose command slot was filled
    pub notified: usize,
}

/// Start a session. The body is optional; an empty body starts an unnamed one.
pub async fn start_tests(
    State(state): State<ServerState>,
    body: Bytes,
) -> Result<Json<SessionResponse>, ApiError> {
    let request: StartRequest = if body.is_empty() {
        StartRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| ValidationError::Body(e.to_string()))?
    };

    let session = state.store.start_session(&request.name, Utc::now())?;
    let notified = state.registry.broadcast(Command::StartTests);
    tracing::info!(name = %session.name, notified, "tests started");

    Ok(Json(SessionResponse {
        status: "tests_started".to_string(),
        session,
        notified,
    }))
}

pub async fn stop_tests(State(state): State<ServerState>) -> Json<SessionResponse> {
    let session = state.store.stop_session();
    let notified = state.registry.broadcast(Command::StopTests);
    tracing::info!(name = %session.name, notified, "tests stopped");

    Json(SessionResponse {
        status: "tests_stopped".to_string(),
        session,
        notified,
    })
}

pub async fn clear_data(State(state): State<ServerState>) -> Json<StatusResponse> {
    state.store.clear();
    tracing::info!("test data cleared");
    Json(StatusResponse::ok("data_cleared"))
}

pub async fn snapshot(State(state): State<ServerState>) -> Json<Arc<StoreSnapshot>> {
    Json(state.store.snapshot())
}

pub async fn detailed_results(
    State(state): State<ServerState>,
    Path((source, dest)): Path<(String, String)>,
) -> Result<Json<PairRecord>, ApiError> {
    let source = Hostname::parse(source)?;
    let dest = Hostname::parse(dest)?;

    let snapshot = state.store.snapshot();
    snapshot
        .pair(&source, &dest)
        .cloned()
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("{} -> {}", source, dest)))
}

/// Export the session as a JSON attachment and mark it flushed.
pub async fn download_results(
    State(state): State<ServerState>,
    Path(test_name): Path<String>,
) -> impl IntoResponse {
    let bundle = Arc::new(state.store.export(&test_name, Utc::now()));

    if let Some(dir) = state.config.archive_dir.clone() {
        archive(dir, Arc::clone(&bundle)).await;
    }

    let disposition = format!("attachment; filename=\"{}\"", generate_filename(&test_name));
    ([(header::CONTENT_DISPOSITION, disposition)], Json(bundle))
}

/// Write the bundle to the archive directory off the async workers.
/// Failures are logged; the download itself still succeeds.
async fn archive(dir: PathBuf, bundle: Arc<ExportBundle>) {
    match tokio::task::spawn_blocking(move || save_bundle(&dir, &bundle)).await {
        Ok(Ok(path)) => tracing::info!(path = %path.display(), "export archived"),
        Ok(Err(e)) => tracing::warn!(error = %e, "failed to archive export"),
        Err(e) => tracing::error!(error = %e, "archive task failed"),
    }
}
