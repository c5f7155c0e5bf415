//! Product model.
//!
//! Prices are integers in minor currency units.

use serde::{Deserialize, Serialize};

use super::common::{require_non_negative, require_text};
use crate::errors::AppError;

/// A sellable, stockable item.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: String,
    pub sku: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub barcode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_id: Option<String>,
    pub unit: String,
    pub cost_price: i64,
    pub sale_price: i64,
    pub reorder_level: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub active: bool,
    pub updated_at: String,
    #[serde(default)]
    pub version: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProductRequest {
    #[serde(default)]
    pub id: Option<String>,
    pub sku: String,
    pub name: String,
    #[serde(default)]
    pub barcode: Option<String>,
    #[serde(default)]
    pub category_id: Option<String>,
    #[serde(default = "default_unit")]
    pub unit: String,
    #[serde(default)]
    pub cost_price: i64,
    #[serde(default)]
    pub sale_price: i64,
    #[serde(default)]
    pub reorder_level: i64,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_unit() -> String {
    "pcs".to_string()
}

fn default_active() -> bool {
    true
}

impl CreateProductRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        require_text(&self.sku, "SKU")?;
        require_text(&self.name, "Product name")?;
        require_text(&self.unit, "Unit")?;
        require_non_negative(self.cost_price, "costPrice")?;
        require_non_negative(self.sale_price, "salePrice")?;
        require_non_negative(self.reorder_level, "reorderLevel")
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProductRequest {
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub barcode: Option<String>,
    #[serde(default)]
    pub category_id: Option<String>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub cost_price: Option<i64>,
    #[serde(default)]
    pub sale_price: Option<i64>,
    #[serde(default)]
    pub reorder_level: Option<i64>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub active: Option<bool>,
    #[serde(default)]
    pub expected_version: Option<i64>,
}

impl UpdateProductRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        if let Some(sku) = &self.sku {
            require_text(sku, "SKU")?;
        }
        if let Some(name) = &self.name {
            require_text(name, "Product name")?;
        }
        if let Some(unit) = &self.unit {
            require_text(unit, "Unit")?;
        }
        if let Some(v) = self.cost_price {
            require_non_negative(v, "costPrice")?;
        }
        if let Some(v) = self.sale_price {
            require_non_negative(v, "salePrice")?;
        }
        if let Some(v) = self.reorder_level {
            require_non_negative(v, "reorderLevel")?;
        }
        Ok(())
    }
}

/// Product list filters.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductFilter {
    #[serde(default)]
    pub category_id: Option<String>,
    #[serde(default)]
    pub active: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_product_defaults() {
        let req: CreateProductRequest =
            serde_json::from_value(serde_json::json!({ "sku": "A-1", "name": "Apple" })).unwrap();
        assert_eq!(req.unit, "pcs");
        assert!(req.active);
        assert_eq!(req.cost_price, 0);
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_negative_price_rejected() {
        let req = UpdateProductRequest {
            sale_price: Some(-1),
            ..Default::default()
        };
        assert!(matches!(req.validate(), Err(AppError::Validation(_))));
    }
}
