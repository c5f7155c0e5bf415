//! Sale API endpoints.

use axum::{
    extract::{Path, Query, State},
    Json,
};

use super::{respond, respond_found, ApiResult};
use crate::models::{CreateSaleRequest, Sale, SaleFilter};
use crate::AppState;

/// GET /api/sales
pub async fn list_sales(
    State(state): State<AppState>,
    Query(filter): Query<SaleFilter>,
) -> ApiResult<Vec<Sale>> {
    let result = state.repo.list_sales(&filter).await;
    respond(&state, result).await
}

/// GET /api/sales/:id
pub async fn get_sale(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Sale> {
    let result = state.repo.get_sale(&id).await;
    respond_found(&state, result, "Sale", &id).await
}

/// POST /api/sales - Record a sale; stock, receivable and cash move together.
pub async fn create_sale(
    State(state): State<AppState>,
    Json(request): Json<CreateSaleRequest>,
) -> ApiResult<Sale> {
    let result = match request.validate() {
        Ok(()) => state.repo.create_sale(&request).await,
        Err(e) => Err(e),
    };
    respond(&state, result).await
}
