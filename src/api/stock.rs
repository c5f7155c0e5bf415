//! Stock API endpoints.

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;

use super::{respond, ApiResult};
use crate::models::{
    LowStockItem, MovementFilter, Page, StockAdjustment, StockAdjustmentRequest, StockFilter,
    StockLevel, StockMovement, StockTransfer, StockTransferRequest,
};
use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LowStockQuery {
    #[serde(default)]
    pub branch_id: Option<String>,
}

/// GET /api/stock - Stock levels, optionally for one branch or product.
pub async fn list_stock(
    State(state): State<AppState>,
    Query(filter): Query<StockFilter>,
) -> ApiResult<Vec<StockLevel>> {
    let result = state.repo.list_stock_levels(&filter).await;
    respond(&state, result).await
}

/// GET /api/stock/movements - Movement history, newest first.
pub async fn list_movements(
    State(state): State<AppState>,
    Query(filter): Query<MovementFilter>,
    Query(page): Query<Page>,
) -> ApiResult<Vec<StockMovement>> {
    let result = state.repo.list_movements(&filter, page).await;
    respond(&state, result).await
}

/// GET /api/stock/low - Products at or below their reorder level.
pub async fn low_stock(
    State(state): State<AppState>,
    Query(query): Query<LowStockQuery>,
) -> ApiResult<Vec<LowStockItem>> {
    let result = state.repo.low_stock(query.branch_id.as_deref()).await;
    respond(&state, result).await
}

/// POST /api/stock/adjustments - Correct a stock level.
pub async fn adjust_stock(
    State(state): State<AppState>,
    Json(request): Json<StockAdjustmentRequest>,
) -> ApiResult<StockAdjustment> {
    let result = match request.validate() {
        Ok(()) => state.repo.adjust_stock(&request).await,
        Err(e) => Err(e),
    };
    respond(&state, result).await
}

/// POST /api/stock/transfers - Move stock between branches.
pub async fn transfer_stock(
    State(state): State<AppState>,
    Json(request): Json<StockTransferRequest>,
) -> ApiResult<StockTransfer> {
    let result = match request.validate() {
        Ok(()) => state.repo.transfer_stock(&request).await,
        Err(e) => Err(e),
    };
    respond(&state, result).await
}
