//! Bootstrap snapshot for clients that start syncing from scratch.

use serde::{Deserialize, Serialize};

use super::{Branch, Category, Party, Product, StockLevel};

/// Full catalog plus stock, tagged with the revision and changelog cursor it reflects.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Datastore {
    pub schema_version: i32,
    pub generated_at: String,
    pub revision_id: i64,
    /// Changelog position the snapshot includes; pull changes after it
    pub cursor: i64,
    pub branches: Vec<Branch>,
    pub categories: Vec<Category>,
    pub products: Vec<Product>,
    pub vendors: Vec<Party>,
    pub customers: Vec<Party>,
    pub stock_levels: Vec<StockLevel>,
}

/// Revision information for change detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevisionInfo {
    pub revision_id: i64,
    pub generated_at: String,
}
