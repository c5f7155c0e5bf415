//! Category API endpoints.
//!
//! Renaming a category changes what its products match in search, so writes refresh the
//! affected index entries.

use axum::{
    extract::{Path, State},
    Json,
};

use super::{respond, respond_found, ApiResult};
use crate::models::{Category, CreateCategoryRequest, UpdateCategoryRequest};
use crate::AppState;

/// GET /api/categories - List all categories.
pub async fn list_categories(State(state): State<AppState>) -> ApiResult<Vec<Category>> {
    let result = state.repo.list_categories().await;
    respond(&state, result).await
}

/// GET /api/categories/:id - Get a single category.
pub async fn get_category(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Category> {
    let result = state.repo.get_category(&id).await;
    respond_found(&state, result, "Category", &id).await
}

/// POST /api/categories - Create a category.
pub async fn create_category(
    State(state): State<AppState>,
    Json(request): Json<CreateCategoryRequest>,
) -> ApiResult<Category> {
    let result = match request.validate() {
        Ok(()) => state.repo.create_category(&request).await,
        Err(e) => Err(e),
    };
    respond(&state, result).await
}

/// PUT /api/categories/:id - Update a category.
pub async fn update_category(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<UpdateCategoryRequest>,
) -> ApiResult<Category> {
    let result = match request.validate() {
        Ok(()) => state.repo.update_category(&id, &request).await,
        Err(e) => Err(e),
    };

    if let Ok(category) = &result {
        reindex_category(&state, &category.id).await;
    }
    respond(&state, result).await
}

/// DELETE /api/categories/:id - Delete a category.
pub async fn delete_category(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<()> {
    let result = state.repo.delete_category(&id).await;
    respond(&state, result).await
}

async fn reindex_category(state: &AppState, category_id: &str) {
    if let Err(e) = state.index.refresh_category(&state.repo, category_id).await {
        tracing::warn!("Failed to re-index products of category {}: {}", category_id, e);
    }
}
