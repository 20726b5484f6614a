use axum::{
    extract::{ConnectInfo, Path, State},
    http::{Extensions, Method, StatusCode},
    Json,
};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

use crate::models::{RepoId, RepositoryRecord};
use crate::server::AppState;

const GENERIC_FAILURE: &str = "Something went wrong";
const BAD_PAGINATION: &str = "Skip & Limit are expected to be non-negative integers";

#[derive(Serialize)]
pub struct ErrorResponse {
    pub message: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn failure(message: &str) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            message: message.to_string(),
        }),
    )
}

/// One access-log line per request.
fn log_request(extensions: &Extensions, method: &Method, path: &str, status: StatusCode, start: Instant) {
    let remote = extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.to_string())
        .unwrap_or_else(|| "-".to_string());

    info!(
        remote = %remote,
        method = %method,
        path = %path,
        status = status.as_u16(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "request"
    );
}

pub async fn analyse(
    State(state): State<Arc<AppState>>,
    Path((user, repo)): Path<(String, String)>,
    method: Method,
    extensions: Extensions,
) -> Result<Json<RepositoryRecord>, ApiError> {
    let start = Instant::now();
    let path = format!("/leaks/go/{}/{}", user, repo);

    let repo_id = match RepoId::new(&user, &repo) {
        Ok(repo_id) => repo_id,
        Err(e) => {
            error!(kind = e.kind(), "Rejected {}/{}: {}", user, repo, e);
            log_request(&extensions, &method, &path, StatusCode::INTERNAL_SERVER_ERROR, start);
            return Err(failure(GENERIC_FAILURE));
        }
    };

    // Runs to completion even when the client disconnects, so a started
    // analysis always reaches cleanup and persistence.
    let task = {
        let state = Arc::clone(&state);
        tokio::spawn(async move { state.orchestrator.analyse(&repo_id).await })
    };
    let result = match task.await {
        Ok(result) => result,
        Err(e) => {
            error!("Analysis task for {}/{} failed: {}", user, repo, e);
            log_request(&extensions, &method, &path, StatusCode::INTERNAL_SERVER_ERROR, start);
            return Err(failure(GENERIC_FAILURE));
        }
    };

    match result {
        Ok(record) => {
            log_request(&extensions, &method, &path, StatusCode::OK, start);
            Ok(Json(record))
        }
        Err(e) => {
            error!(kind = e.kind(), "Analysis of {}/{} failed: {}", user, repo, e);
            log_request(&extensions, &method, &path, StatusCode::INTERNAL_SERVER_ERROR, start);
            Err(failure(GENERIC_FAILURE))
        }
    }
}

pub async fn list_repositories(
    State(state): State<Arc<AppState>>,
    Path((skip, limit)): Path<(String, String)>,
    method: Method,
    extensions: Extensions,
) -> Result<Json<Vec<RepositoryRecord>>, ApiError> {
    let start = Instant::now();
    let path = format!("/leaks/go/all/{}/{}", skip, limit);

    let (skip, limit) = match (skip.parse::<i64>(), limit.parse::<i64>()) {
        (Ok(skip), Ok(limit)) => (skip, limit),
        _ => {
            error!("Cannot parse pagination {:?}/{:?}", skip, limit);
            log_request(&extensions, &method, &path, StatusCode::INTERNAL_SERVER_ERROR, start);
            return Err(failure(BAD_PAGINATION));
        }
    };

    match state.orchestrator.list(skip, limit) {
        Ok(records) => {
            log_request(&extensions, &method, &path, StatusCode::OK, start);
            Ok(Json(records))
        }
        Err(e) => {
            error!(kind = e.kind(), "Listing repositories failed: {}", e);
            log_request(&extensions, &method, &path, StatusCode::INTERNAL_SERVER_ERROR, start);
            let message = match e {
                crate::error::Error::InvalidArgument(_) => BAD_PAGINATION,
                _ => GENERIC_FAILURE,
            };
            Err(failure(message))
        }
    }
}

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}
