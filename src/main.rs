//! Retail Backend
//!
//! Multi-branch inventory, sales and double-entry bookkeeping over a REST API,
//! with SQLite persistence, Tantivy product search and an offline sync channel.

mod api;
mod auth;
mod config;
mod db;
mod errors;
mod models;
mod search;
mod sync;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use config::{Config, LogFormat};
use db::Repository;
use models::ProductFilter;
use search::ProductIndex;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub index: Arc<ProductIndex>,
    pub config: Arc<Config>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::from_env()?;

    init_logging(&config);

    tracing::info!("Starting retail backend");
    tracing::info!("Database path: {:?}", config.db_path);
    tracing::info!("Index path: {:?}", config.index_path);
    tracing::info!("Bind address: {}", config.bind_addr);

    if config.api_psk.is_none() {
        tracing::warn!("No API PSK configured (RETAIL_API_PSK). Authentication is disabled!");
    }

    // Initialize database
    let pool = db::init_database(&config.db_path).await?;
    let repo = Arc::new(Repository::new(pool));

    // The index is derived data; rebuild it from the catalog on every start.
    let index = Arc::new(ProductIndex::open(&config.index_path)?);
    tracing::info!("Building product index...");
    let products = repo.list_products(&ProductFilter::default()).await?;
    let categories = repo.list_categories().await?;
    index.rebuild(&products, &categories).await?;
    tracing::info!("Product index built with {} products", products.len());

    let state = AppState {
        repo,
        index,
        config: Arc::new(config.clone()),
    };

    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}

fn init_logging(config: &Config) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    match config.log_format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init(),
    }
}

/// Create the application router with all routes.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let psk = state.config.api_psk.clone();

    let api_routes = Router::new()
        // Datastore
        .route("/datastore", get(api::get_datastore))
        .route("/datastore/revision", get(api::get_revision))
        // Branches
        .route("/branches", get(api::list_branches).post(api::create_branch))
        .route(
            "/branches/{id}",
            get(api::get_branch)
                .put(api::update_branch)
                .delete(api::delete_branch),
        )
        // Categories
        .route(
            "/categories",
            get(api::list_categories).post(api::create_category),
        )
        .route(
            "/categories/{id}",
            get(api::get_category)
                .put(api::update_category)
                .delete(api::delete_category),
        )
        // Products
        .route("/products", get(api::list_products).post(api::create_product))
        .route("/products/search", get(api::search_products))
        .route(
            "/products/{id}",
            get(api::get_product)
                .put(api::update_product)
                .delete(api::delete_product),
        )
        // Vendors
        .route("/vendors", get(api::list_vendors).post(api::create_vendor))
        .route(
            "/vendors/{id}",
            get(api::get_vendor)
                .put(api::update_vendor)
                .delete(api::delete_vendor),
        )
        .route("/vendors/{id}/balance", get(api::vendor_balance))
        // Customers
        .route(
            "/customers",
            get(api::list_customers).post(api::create_customer),
        )
        .route(
            "/customers/{id}",
            get(api::get_customer)
                .put(api::update_customer)
                .delete(api::delete_customer),
        )
        .route("/customers/{id}/balance", get(api::customer_balance))
        // Stock
        .route("/stock", get(api::list_stock))
        .route("/stock/movements", get(api::list_movements))
        .route("/stock/low", get(api::low_stock))
        .route("/stock/adjustments", post(api::adjust_stock))
        .route("/stock/transfers", post(api::transfer_stock))
        // Purchases
        .route(
            "/purchases",
            get(api::list_purchases).post(api::create_purchase),
        )
        .route("/purchases/{id}", get(api::get_purchase))
        .route("/purchases/{id}/receive", post(api::receive_purchase))
        .route("/purchases/{id}/cancel", post(api::cancel_purchase))
        // Sales
        .route("/sales", get(api::list_sales).post(api::create_sale))
        .route("/sales/{id}", get(api::get_sale))
        // Returns
        .route("/returns", get(api::list_returns))
        .route("/returns/sales", post(api::create_sale_return))
        .route("/returns/purchases", post(api::create_purchase_return))
        .route("/returns/{id}", get(api::get_return))
        // Payments
        .route("/payments", get(api::list_payments).post(api::create_payment))
        .route("/payments/{id}", get(api::get_payment))
        // Ledger
        .route("/ledger/entries", get(api::list_ledger_entries))
        .route("/ledger/balances", get(api::trial_balance))
        // Sync
        .route("/sync/changes", get(api::list_changes))
        .route("/sync/push", post(api::push_changes))
        .layer(middleware::from_fn(move |req, next| {
            auth::psk_auth_layer(psk.clone(), req, next)
        }));

    // Health check (no auth required)
    let health_routes = Router::new().route("/health", get(health_check));

    Router::new()
        .nest("/api", api_routes)
        .merge(health_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> &'static str {
    "OK"
}
