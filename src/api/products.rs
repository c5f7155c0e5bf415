//! Product API endpoints, including full-text search.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use super::{error, respond, respond_found, success, ApiResult};
use crate::models::{CreateProductRequest, Product, ProductFilter, UpdateProductRequest};
use crate::AppState;

/// Maximum number of search results allowed.
const MAX_SEARCH_LIMIT: usize = 100;

/// Search query parameters.
#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    /// Search query string.
    pub q: String,
    /// Maximum number of results (default: 20).
    #[serde(default = "default_limit")]
    pub limit: usize,
    /// Offset for pagination (default: 0).
    #[serde(default)]
    pub offset: usize,
}

fn default_limit() -> usize {
    20
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub results: Vec<SearchResultItem>,
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResultItem {
    pub product: Product,
    pub score: f32,
}

/// GET /api/products - List products, optionally by category or active flag.
pub async fn list_products(
    State(state): State<AppState>,
    Query(filter): Query<ProductFilter>,
) -> ApiResult<Vec<Product>> {
    let result = state.repo.list_products(&filter).await;
    respond(&state, result).await
}

/// GET /api/products/:id - Get a single product.
pub async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Product> {
    let result = state.repo.get_product(&id).await;
    respond_found(&state, result, "Product", &id).await
}

/// POST /api/products - Create a product.
pub async fn create_product(
    State(state): State<AppState>,
    Json(request): Json<CreateProductRequest>,
) -> ApiResult<Product> {
    let result = match request.validate() {
        Ok(()) => state.repo.create_product(&request).await,
        Err(e) => Err(e),
    };

    if let Ok(product) = &result {
        index_product(&state, product).await;
    }
    respond(&state, result).await
}

/// PUT /api/products/:id - Update a product.
pub async fn update_product(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<UpdateProductRequest>,
) -> ApiResult<Product> {
    let result = match request.validate() {
        Ok(()) => state.repo.update_product(&id, &request).await,
        Err(e) => Err(e),
    };

    if let Ok(product) = &result {
        index_product(&state, product).await;
    }
    respond(&state, result).await
}

/// DELETE /api/products/:id - Delete a product.
pub async fn delete_product(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<()> {
    let result = state.repo.delete_product(&id).await;

    if result.is_ok() {
        if let Err(e) = state.index.remove_product(&id).await {
            tracing::warn!("Failed to remove product from index: {}", e);
        }
    }
    respond(&state, result).await
}

/// GET /api/products/search - Search products by name, SKU, barcode, category or description.
pub async fn search_products(
    State(state): State<AppState>,
    Query(params): Query<SearchQuery>,
) -> ApiResult<SearchResponse> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    let limit = params.limit.min(MAX_SEARCH_LIMIT);

    let hits = match state.index.search(&params.q, limit, params.offset) {
        Ok(hits) => hits,
        Err(e) => return error(e, revision_id),
    };

    // The index may briefly lag a delete; skip ids that no longer resolve
    let mut results = Vec::with_capacity(hits.len());
    for hit in hits {
        if let Ok(Some(product)) = state.repo.get_product(&hit.product_id).await {
            results.push(SearchResultItem {
                product,
                score: hit.score,
            });
        }
    }

    let total = results.len();
    success(
        SearchResponse {
            results,
            total,
            limit,
            offset: params.offset,
        },
        revision_id,
    )
}

async fn index_product(state: &AppState, product: &Product) {
    if let Err(e) = state
        .index
        .refresh_products(&state.repo, std::slice::from_ref(product))
        .await
    {
        tracing::warn!("Failed to index product {}: {}", product.id, e);
    }
}
