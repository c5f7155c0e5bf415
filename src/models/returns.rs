//! Customer returns against sales and returns of goods to vendors.

use serde::{Deserialize, Serialize};

use super::common::{require_non_negative, require_text, validate_lines, LineItemRequest};
use crate::errors::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnKind {
    Sale,
    Purchase,
}

impl ReturnKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReturnKind::Sale => "sale",
            ReturnKind::Purchase => "purchase",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "sale" => Some(ReturnKind::Sale),
            "purchase" => Some(ReturnKind::Purchase),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReturnItem {
    pub product_id: String,
    pub quantity: i64,
    /// Value credited per unit (net of any sale discount)
    pub unit_amount: i64,
    pub line_total: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReturnRecord {
    pub id: String,
    pub kind: ReturnKind,
    /// The sale or purchase being reversed
    pub source_id: String,
    pub branch_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub party_id: Option<String>,
    pub items: Vec<ReturnItem>,
    pub total: i64,
    pub refund_amount: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleReturnRequest {
    pub sale_id: String,
    pub items: Vec<LineItemRequest>,
    #[serde(default)]
    pub refund_amount: Option<i64>,
    #[serde(default)]
    pub reason: Option<String>,
}

impl SaleReturnRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        require_text(&self.sale_id, "saleId")?;
        validate_return_lines(&self.items, self.refund_amount)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseReturnRequest {
    pub purchase_id: String,
    pub items: Vec<LineItemRequest>,
    #[serde(default)]
    pub refund_amount: Option<i64>,
    #[serde(default)]
    pub reason: Option<String>,
}

impl PurchaseReturnRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        require_text(&self.purchase_id, "purchaseId")?;
        validate_return_lines(&self.items, self.refund_amount)
    }
}

fn validate_return_lines(items: &[LineItemRequest], refund: Option<i64>) -> Result<(), AppError> {
    validate_lines(items.iter().map(|i| (i.product_id.as_str(), i.quantity)))?;
    let mut seen = std::collections::HashSet::new();
    for item in items {
        if !seen.insert(item.product_id.as_str()) {
            return Err(AppError::Validation(format!(
                "Product {} listed more than once",
                item.product_id
            )));
        }
    }
    if let Some(refund) = refund {
        require_non_negative(refund, "refundAmount")?;
    }
    Ok(())
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReturnFilter {
    #[serde(default)]
    pub kind: Option<ReturnKind>,
    #[serde(default)]
    pub source_id: Option<String>,
}
