//! Return API endpoints.

use axum::{
    extract::{Path, Query, State},
    Json,
};

use super::{respond, respond_found, ApiResult};
use crate::models::{PurchaseReturnRequest, ReturnFilter, ReturnRecord, SaleReturnRequest};
use crate::AppState;

/// GET /api/returns
pub async fn list_returns(
    State(state): State<AppState>,
    Query(filter): Query<ReturnFilter>,
) -> ApiResult<Vec<ReturnRecord>> {
    let result = state.repo.list_returns(&filter).await;
    respond(&state, result).await
}

/// GET /api/returns/:id
pub async fn get_return(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<ReturnRecord> {
    let result = state.repo.get_return(&id).await;
    respond_found(&state, result, "Return", &id).await
}

/// POST /api/returns/sales - A customer brings goods back.
pub async fn create_sale_return(
    State(state): State<AppState>,
    Json(request): Json<SaleReturnRequest>,
) -> ApiResult<ReturnRecord> {
    let result = match request.validate() {
        Ok(()) => state.repo.create_sale_return(&request).await,
        Err(e) => Err(e),
    };
    respond(&state, result).await
}

/// POST /api/returns/purchases - Goods go back to the vendor.
pub async fn create_purchase_return(
    State(state): State<AppState>,
    Json(request): Json<PurchaseReturnRequest>,
) -> ApiResult<ReturnRecord> {
    let result = match request.validate() {
        Ok(()) => state.repo.create_purchase_return(&request).await,
        Err(e) => Err(e),
    };
    respond(&state, result).await
}
