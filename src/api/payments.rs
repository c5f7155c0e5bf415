//! Payment API endpoints.

use axum::{
    extract::{Path, Query, State},
    Json,
};

use super::{respond, respond_found, ApiResult};
use crate::models::{CreatePaymentRequest, Payment, PaymentFilter};
use crate::AppState;

/// GET /api/payments
pub async fn list_payments(
    State(state): State<AppState>,
    Query(filter): Query<PaymentFilter>,
) -> ApiResult<Vec<Payment>> {
    let result = state.repo.list_payments(&filter).await;
    respond(&state, result).await
}

/// GET /api/payments/:id
pub async fn get_payment(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Payment> {
    let result = state.repo.get_payment(&id).await;
    respond_found(&state, result, "Payment", &id).await
}

/// POST /api/payments
pub async fn create_payment(
    State(state): State<AppState>,
    Json(request): Json<CreatePaymentRequest>,
) -> ApiResult<Payment> {
    let result = match request.validate() {
        Ok(()) => state.repo.create_payment(&request).await,
        Err(e) => Err(e),
    };
    respond(&state, result).await
}
