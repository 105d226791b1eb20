//! Worker registry handlers

use crate::api::rest::state::AppState;
use crate::error::{ApiError, ApiResult};
use axum::{
    extract::{Path, Query, State},
    Json,
};
use overseer_registry::WorkerQuery;
use overseer_types::WorkerRecord;
use serde::Deserialize;

/// List workers query params
#[derive(Debug, Deserialize)]
pub struct ListWorkersQuery {
    /// Exact worker name
    pub name: Option<String>,
}

/// List registered workers
pub async fn list_workers(
    State(state): State<AppState>,
    Query(query): Query<ListWorkersQuery>,
) -> ApiResult<Json<Vec<WorkerRecord>>> {
    let predicate = match query.name {
        Some(name) => WorkerQuery::Name(name),
        None => WorkerQuery::All,
    };
    let workers = state.context.workers.find_all(&predicate).await?;
    Ok(Json(workers))
}

/// Get a worker by uuid
pub async fn get_worker(
    State(state): State<AppState>,
    Path(uuid): Path<String>,
) -> ApiResult<Json<WorkerRecord>> {
    state
        .context
        .workers
        .find_one(&WorkerQuery::Uuid(uuid.clone()))
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Worker {}", uuid)))
}
