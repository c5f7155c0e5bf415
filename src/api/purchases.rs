//! Purchase API endpoints.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    Json,
};

use super::{respond, respond_found, ApiResult};
use crate::errors::AppError;
use crate::models::{CreatePurchaseRequest, Purchase, PurchaseFilter, PurchaseTransitionRequest};
use crate::AppState;

/// GET /api/purchases
pub async fn list_purchases(
    State(state): State<AppState>,
    Query(filter): Query<PurchaseFilter>,
) -> ApiResult<Vec<Purchase>> {
    let result = state.repo.list_purchases(&filter).await;
    respond(&state, result).await
}

/// GET /api/purchases/:id
pub async fn get_purchase(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Purchase> {
    let result = state.repo.get_purchase(&id).await;
    respond_found(&state, result, "Purchase", &id).await
}

/// POST /api/purchases - Create a purchase order, optionally receiving it at once.
pub async fn create_purchase(
    State(state): State<AppState>,
    Json(request): Json<CreatePurchaseRequest>,
) -> ApiResult<Purchase> {
    let result = match request.validate() {
        Ok(()) => state.repo.create_purchase(&request).await,
        Err(e) => Err(e),
    };
    respond(&state, result).await
}

/// POST /api/purchases/:id/receive
pub async fn receive_purchase(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> ApiResult<Purchase> {
    let result = match transition_request(&body) {
        Ok(request) => state.repo.receive_purchase(&id, &request).await,
        Err(e) => Err(e),
    };
    respond(&state, result).await
}

/// POST /api/purchases/:id/cancel
pub async fn cancel_purchase(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> ApiResult<Purchase> {
    let result = match transition_request(&body) {
        Ok(request) => state.repo.cancel_purchase(&id, &request).await,
        Err(e) => Err(e),
    };
    respond(&state, result).await
}

/// The transition body is optional; an empty body means no version check.
fn transition_request(body: &[u8]) -> Result<PurchaseTransitionRequest, AppError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(PurchaseTransitionRequest::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| AppError::Validation(format!("Invalid request body: {}", e)))
}
