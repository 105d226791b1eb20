//! Deployment metadata handlers

use crate::api::rest::state::AppState;
use crate::error::{ApiError, ApiResult};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use overseer_types::DeploymentInfo;
use serde::Deserialize;

/// Create deployment request
#[derive(Debug, Deserialize)]
pub struct CreateDeploymentRequest {
    pub build_number: String,
}

/// List deployments
pub async fn list_deployments(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<DeploymentInfo>>> {
    let deployments = state.context.deployments.list_deployments().await?;
    Ok(Json(deployments))
}

/// Register deployment metadata for a build
pub async fn create_deployment(
    State(state): State<AppState>,
    Json(request): Json<CreateDeploymentRequest>,
) -> ApiResult<(StatusCode, Json<DeploymentInfo>)> {
    let build_number = request.build_number.trim();
    if build_number.is_empty() {
        return Err(ApiError::BadRequest("build_number is empty".to_string()));
    }

    let deployment = DeploymentInfo::new(build_number);
    state
        .context
        .deployments
        .upsert_deployment(deployment.clone())
        .await?;

    tracing::info!(build_number = %deployment.build_number, "Deployment registered");
    Ok((StatusCode::CREATED, Json(deployment)))
}

/// Delete deployment metadata
pub async fn delete_deployment(
    State(state): State<AppState>,
    Path(build_number): Path<String>,
) -> ApiResult<StatusCode> {
    if state
        .context
        .deployments
        .delete_deployment(&build_number)
        .await?
    {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("Deployment {}", build_number)))
    }
}
