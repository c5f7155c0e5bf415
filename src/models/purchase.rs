//! Purchase orders from vendors.

use serde::{Deserialize, Serialize};

use super::common::{require_non_negative, require_text, validate_lines};
use crate::errors::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseStatus {
    Ordered,
    Received,
    Cancelled,
}

impl PurchaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PurchaseStatus::Ordered => "ordered",
            PurchaseStatus::Received => "received",
            PurchaseStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ordered" => Some(PurchaseStatus::Ordered),
            "received" => Some(PurchaseStatus::Received),
            "cancelled" => Some(PurchaseStatus::Cancelled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseItem {
    pub product_id: String,
    pub quantity: i64,
    pub unit_cost: i64,
    pub line_total: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Purchase {
    pub id: String,
    pub vendor_id: String,
    pub branch_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_no: Option<String>,
    pub status: PurchaseStatus,
    pub items: Vec<PurchaseItem>,
    pub total: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub received_at: Option<String>,
    #[serde(default)]
    pub version: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseItemRequest {
    pub product_id: String,
    pub quantity: i64,
    /// Falls back to the product's cost price
    #[serde(default)]
    pub unit_cost: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePurchaseRequest {
    pub vendor_id: String,
    pub branch_id: String,
    #[serde(default)]
    pub reference_no: Option<String>,
    pub items: Vec<PurchaseItemRequest>,
    #[serde(default)]
    pub notes: Option<String>,
    /// Receive the goods in the same transaction
    #[serde(default)]
    pub receive: bool,
}

impl CreatePurchaseRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        require_text(&self.vendor_id, "vendorId")?;
        require_text(&self.branch_id, "branchId")?;
        validate_lines(
            self.items
                .iter()
                .map(|i| (i.product_id.as_str(), i.quantity)),
        )?;
        for item in &self.items {
            if let Some(cost) = item.unit_cost {
                require_non_negative(cost, "unitCost")?;
            }
        }
        Ok(())
    }
}

/// Body of the receive/cancel transitions.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseTransitionRequest {
    #[serde(default)]
    pub expected_version: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseFilter {
    #[serde(default)]
    pub vendor_id: Option<String>,
    #[serde(default)]
    pub status: Option<PurchaseStatus>,
}
