//! Stock levels, movements, adjustments and transfers.

use serde::{Deserialize, Serialize};

use super::common::{require_text, validate_lines, LineItemRequest};
use super::Product;
use crate::errors::AppError;

/// Why a stock level changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementReason {
    PurchaseReceipt,
    Sale,
    SaleReturn,
    PurchaseReturn,
    Adjustment,
    TransferIn,
    TransferOut,
}

impl MovementReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementReason::PurchaseReceipt => "purchase_receipt",
            MovementReason::Sale => "sale",
            MovementReason::SaleReturn => "sale_return",
            MovementReason::PurchaseReturn => "purchase_return",
            MovementReason::Adjustment => "adjustment",
            MovementReason::TransferIn => "transfer_in",
            MovementReason::TransferOut => "transfer_out",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "purchase_receipt" => Some(MovementReason::PurchaseReceipt),
            "sale" => Some(MovementReason::Sale),
            "sale_return" => Some(MovementReason::SaleReturn),
            "purchase_return" => Some(MovementReason::PurchaseReturn),
            "adjustment" => Some(MovementReason::Adjustment),
            "transfer_in" => Some(MovementReason::TransferIn),
            "transfer_out" => Some(MovementReason::TransferOut),
            _ => None,
        }
    }
}

/// On-hand quantity of one product at one branch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockLevel {
    pub branch_id: String,
    pub product_id: String,
    pub quantity: i64,
    pub updated_at: String,
}

/// One entry of the append-only stock journal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockMovement {
    pub id: String,
    pub branch_id: String,
    pub product_id: String,
    pub quantity_delta: i64,
    pub reason: MovementReason,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockFilter {
    #[serde(default)]
    pub branch_id: Option<String>,
    #[serde(default)]
    pub product_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MovementFilter {
    #[serde(default)]
    pub branch_id: Option<String>,
    #[serde(default)]
    pub product_id: Option<String>,
    #[serde(default)]
    pub reference_id: Option<String>,
}

/// Manual correction of a stock level (stocktake, damage, shrinkage).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockAdjustmentRequest {
    pub branch_id: String,
    pub product_id: String,
    pub quantity_delta: i64,
    #[serde(default)]
    pub note: Option<String>,
}

impl StockAdjustmentRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        require_text(&self.branch_id, "branchId")?;
        require_text(&self.product_id, "productId")?;
        if self.quantity_delta == 0 {
            return Err(AppError::Validation(
                "quantityDelta must not be zero".to_string(),
            ));
        }
        if self.quantity_delta.checked_abs().is_none() {
            return Err(AppError::Validation(
                "quantityDelta is out of range".to_string(),
            ));
        }
        Ok(())
    }
}

/// Result of an adjustment: the new level and the journal entry.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StockAdjustment {
    pub level: StockLevel,
    pub movement: StockMovement,
}

/// Move stock between two branches.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockTransferRequest {
    pub from_branch_id: String,
    pub to_branch_id: String,
    pub items: Vec<LineItemRequest>,
    #[serde(default)]
    pub note: Option<String>,
}

impl StockTransferRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        require_text(&self.from_branch_id, "fromBranchId")?;
        require_text(&self.to_branch_id, "toBranchId")?;
        if self.from_branch_id == self.to_branch_id {
            return Err(AppError::Validation(
                "Source and destination branch must differ".to_string(),
            ));
        }
        validate_lines(
            self.items
                .iter()
                .map(|i| (i.product_id.as_str(), i.quantity)),
        )
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StockTransfer {
    pub transfer_id: String,
    pub movements: Vec<StockMovement>,
}

/// A stock level at or under its product's reorder level.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LowStockItem {
    pub branch_id: String,
    pub quantity: i64,
    pub product: Product,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_movement_reason_round_trip_names() {
        for reason in [
            MovementReason::PurchaseReceipt,
            MovementReason::Sale,
            MovementReason::TransferOut,
        ] {
            assert_eq!(MovementReason::parse(reason.as_str()), Some(reason));
        }
        assert_eq!(MovementReason::parse("theft"), None);
    }

    #[test]
    fn test_adjustment_delta_bounds() {
        let adjustment = |quantity_delta| StockAdjustmentRequest {
            branch_id: "b1".to_string(),
            product_id: "p1".to_string(),
            quantity_delta,
            note: None,
        };
        assert!(adjustment(0).validate().is_err());
        assert!(adjustment(i64::MIN).validate().is_err());
        assert!(adjustment(-i64::MAX).validate().is_ok());
        assert!(adjustment(3).validate().is_ok());
    }

    #[test]
    fn test_transfer_to_same_branch_rejected() {
        let req = StockTransferRequest {
            from_branch_id: "b1".to_string(),
            to_branch_id: "b1".to_string(),
            items: vec![LineItemRequest {
                product_id: "p1".to_string(),
                quantity: 1,
            }],
            note: None,
        };
        assert!(req.validate().is_err());
    }
}
