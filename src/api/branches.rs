//! Branch API endpoints.

use axum::{
    extract::{Path, State},
    Json,
};

use super::{respond, respond_found, ApiResult};
use crate::models::{Branch, CreateBranchRequest, UpdateBranchRequest};
use crate::AppState;

/// GET /api/branches - List all branches.
pub async fn list_branches(State(state): State<AppState>) -> ApiResult<Vec<Branch>> {
    let result = state.repo.list_branches().await;
    respond(&state, result).await
}

/// GET /api/branches/:id - Get a single branch.
pub async fn get_branch(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Branch> {
    let result = state.repo.get_branch(&id).await;
    respond_found(&state, result, "Branch", &id).await
}

/// POST /api/branches - Create a branch.
pub async fn create_branch(
    State(state): State<AppState>,
    Json(request): Json<CreateBranchRequest>,
) -> ApiResult<Branch> {
    let result = match request.validate() {
        Ok(()) => state.repo.create_branch(&request).await,
        Err(e) => Err(e),
    };
    respond(&state, result).await
}

/// PUT /api/branches/:id - Update a branch.
pub async fn update_branch(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<UpdateBranchRequest>,
) -> ApiResult<Branch> {
    let result = match request.validate() {
        Ok(()) => state.repo.update_branch(&id, &request).await,
        Err(e) => Err(e),
    };
    respond(&state, result).await
}

/// DELETE /api/branches/:id - Delete a branch.
pub async fn delete_branch(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<()> {
    let result = state.repo.delete_branch(&id).await;
    respond(&state, result).await
}
