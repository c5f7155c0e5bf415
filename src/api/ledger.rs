//! Ledger API endpoints.

use axum::extract::{Query, State};

use super::{respond, ApiResult};
use crate::models::{LedgerEntry, LedgerFilter, Page, TrialBalance};
use crate::AppState;

/// GET /api/ledger/entries - Ledger lines, newest first.
pub async fn list_ledger_entries(
    State(state): State<AppState>,
    Query(filter): Query<LedgerFilter>,
    Query(page): Query<Page>,
) -> ApiResult<Vec<LedgerEntry>> {
    let result = state.repo.list_ledger_entries(&filter, page).await;
    respond(&state, result).await
}

/// GET /api/ledger/balances - Trial balance across all accounts.
pub async fn trial_balance(State(state): State<AppState>) -> ApiResult<TrialBalance> {
    let result = state.repo.trial_balance().await;
    respond(&state, result).await
}
