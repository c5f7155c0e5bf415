//! Sync API endpoints for offline clients.

use axum::{
    extract::{Query, State},
    Json,
};

use super::{respond, ApiResult};
use crate::models::{ChangeBatch, ChangesQuery, PushRequest, PushResponse};
use crate::AppState;

/// GET /api/sync/changes?since=&limit= - Pull changes after a cursor.
pub async fn list_changes(
    State(state): State<AppState>,
    Query(query): Query<ChangesQuery>,
) -> ApiResult<ChangeBatch> {
    let page_limit = state.config.sync_page_limit;
    let limit = query.limit.unwrap_or(page_limit).clamp(1, page_limit);
    let result = state.repo.list_changes(query.since, limit).await;
    respond(&state, result).await
}

/// POST /api/sync/push - Apply changes recorded on a device.
pub async fn push_changes(
    State(state): State<AppState>,
    Json(request): Json<PushRequest>,
) -> ApiResult<PushResponse> {
    let result = match request.validate() {
        Ok(()) => crate::sync::apply_push(&state.repo, &state.index, &request).await,
        Err(e) => Err(e),
    };
    respond(&state, result).await
}
