//! REST API module.
//!
//! Every response carries the revision the client should compare against its cache.

mod branches;
mod categories;
mod datastore;
mod ledger;
mod parties;
mod payments;
mod products;
mod purchases;
mod returns;
mod sales;
mod stock;
mod sync;

pub use branches::*;
pub use categories::*;
pub use datastore::*;
pub use ledger::*;
pub use parties::*;
pub use payments::*;
pub use products::*;
pub use purchases::*;
pub use returns::*;
pub use sales::*;
pub use stock::*;
pub use sync::*;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::errors::{AppError, AppErrorWithRevision};
use crate::AppState;

/// Success response envelope.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub data: T,
    pub revision_id: i64,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn new(data: T, revision_id: i64) -> Self {
        Self {
            success: true,
            data,
            revision_id,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

/// Response type that can be either success or error.
pub type ApiResult<T> = Result<ApiResponse<T>, AppErrorWithRevision>;

/// Create a successful API response.
pub fn success<T: Serialize>(data: T, revision_id: i64) -> ApiResult<T> {
    Ok(ApiResponse::new(data, revision_id))
}

/// Create an error API response.
pub fn error<T: Serialize>(err: AppError, revision_id: i64) -> ApiResult<T> {
    Err(AppErrorWithRevision {
        error: err,
        revision_id,
    })
}

/// Wrap the outcome of a repository call, stamped with the revision after it ran.
pub async fn respond<T: Serialize>(state: &AppState, result: Result<T, AppError>) -> ApiResult<T> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);
    match result {
        Ok(data) => success(data, revision_id),
        Err(e) => error(e, revision_id),
    }
}

/// Like [`respond`], mapping a missing record to `NotFound`.
pub async fn respond_found<T: Serialize>(
    state: &AppState,
    result: Result<Option<T>, AppError>,
    label: &str,
    id: &str,
) -> ApiResult<T> {
    let result = result.and_then(|found| {
        found.ok_or_else(|| AppError::NotFound(format!("{} {} not found", label, id)))
    });
    respond(state, result).await
}
