//! Vendor and customer API endpoints.
//!
//! Both collections share one set of handlers; the route decides the `PartyKind`.

use axum::{
    extract::{Path, State},
    Json,
};

use super::{respond, respond_found, ApiResult};
use crate::models::{CreatePartyRequest, Party, PartyBalance, PartyKind, UpdatePartyRequest};
use crate::AppState;

async fn list(state: AppState, kind: PartyKind) -> ApiResult<Vec<Party>> {
    let result = state.repo.list_parties(kind).await;
    respond(&state, result).await
}

async fn get(state: AppState, kind: PartyKind, id: String) -> ApiResult<Party> {
    let result = state.repo.get_party(kind, &id).await;
    respond_found(&state, result, kind.label(), &id).await
}

async fn create(state: AppState, kind: PartyKind, request: CreatePartyRequest) -> ApiResult<Party> {
    let result = match request.validate() {
        Ok(()) => state.repo.create_party(kind, &request).await,
        Err(e) => Err(e),
    };
    respond(&state, result).await
}

async fn update(
    state: AppState,
    kind: PartyKind,
    id: String,
    request: UpdatePartyRequest,
) -> ApiResult<Party> {
    let result = match request.validate() {
        Ok(()) => state.repo.update_party(kind, &id, &request).await,
        Err(e) => Err(e),
    };
    respond(&state, result).await
}

async fn delete(state: AppState, kind: PartyKind, id: String) -> ApiResult<()> {
    let result = state.repo.delete_party(kind, &id).await;
    respond(&state, result).await
}

async fn balance(state: AppState, kind: PartyKind, id: String) -> ApiResult<PartyBalance> {
    let result = state.repo.party_balance(kind, &id).await;
    respond(&state, result).await
}

/// GET /api/vendors
pub async fn list_vendors(State(state): State<AppState>) -> ApiResult<Vec<Party>> {
    list(state, PartyKind::Vendor).await
}

/// GET /api/vendors/:id
pub async fn get_vendor(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Party> {
    get(state, PartyKind::Vendor, id).await
}

/// POST /api/vendors
pub async fn create_vendor(
    State(state): State<AppState>,
    Json(request): Json<CreatePartyRequest>,
) -> ApiResult<Party> {
    create(state, PartyKind::Vendor, request).await
}

/// PUT /api/vendors/:id
pub async fn update_vendor(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<UpdatePartyRequest>,
) -> ApiResult<Party> {
    update(state, PartyKind::Vendor, id, request).await
}

/// DELETE /api/vendors/:id
pub async fn delete_vendor(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<()> {
    delete(state, PartyKind::Vendor, id).await
}

/// GET /api/vendors/:id/balance - What we owe the vendor.
pub async fn vendor_balance(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<PartyBalance> {
    balance(state, PartyKind::Vendor, id).await
}

/// GET /api/customers
pub async fn list_customers(State(state): State<AppState>) -> ApiResult<Vec<Party>> {
    list(state, PartyKind::Customer).await
}

/// GET /api/customers/:id
pub async fn get_customer(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Party> {
    get(state, PartyKind::Customer, id).await
}

/// POST /api/customers
pub async fn create_customer(
    State(state): State<AppState>,
    Json(request): Json<CreatePartyRequest>,
) -> ApiResult<Party> {
    create(state, PartyKind::Customer, request).await
}

/// PUT /api/customers/:id
pub async fn update_customer(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<UpdatePartyRequest>,
) -> ApiResult<Party> {
    update(state, PartyKind::Customer, id, request).await
}

/// DELETE /api/customers/:id
pub async fn delete_customer(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<()> {
    delete(state, PartyKind::Customer, id).await
}

/// GET /api/customers/:id/balance - What the customer owes us.
pub async fn customer_balance(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<PartyBalance> {
    balance(state, PartyKind::Customer, id).await
}
