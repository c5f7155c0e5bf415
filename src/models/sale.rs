//! Sales at a branch, optionally on a customer's account.

use serde::{Deserialize, Serialize};

use super::common::{require_non_negative, require_text, validate_lines};
use crate::errors::AppError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleItem {
    pub product_id: String,
    pub quantity: i64,
    pub unit_price: i64,
    /// Product cost captured at the time of sale, used for COGS and returns
    pub unit_cost: i64,
    pub line_total: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sale {
    pub id: String,
    pub branch_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,
    pub items: Vec<SaleItem>,
    pub subtotal: i64,
    pub discount: i64,
    pub total: i64,
    pub paid_amount: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_reference: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleItemRequest {
    pub product_id: String,
    pub quantity: i64,
    /// Falls back to the product's sale price
    #[serde(default)]
    pub unit_price: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSaleRequest {
    #[serde(default)]
    pub id: Option<String>,
    pub branch_id: String,
    #[serde(default)]
    pub customer_id: Option<String>,
    pub items: Vec<SaleItemRequest>,
    #[serde(default)]
    pub discount: i64,
    /// Defaults to the full total for walk-in sales and to zero on account
    #[serde(default)]
    pub paid_amount: Option<i64>,
    #[serde(default)]
    pub payment_method: Option<String>,
    /// Idempotency key supplied by the till or an offline device
    #[serde(default)]
    pub client_reference: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl CreateSaleRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        require_text(&self.branch_id, "branchId")?;
        validate_lines(
            self.items
                .iter()
                .map(|i| (i.product_id.as_str(), i.quantity)),
        )?;
        for item in &self.items {
            if let Some(price) = item.unit_price {
                require_non_negative(price, "unitPrice")?;
            }
        }
        require_non_negative(self.discount, "discount")?;
        if let Some(paid) = self.paid_amount {
            require_non_negative(paid, "paidAmount")?;
        }
        Ok(())
    }

    /// Resolve the paid amount against the computed total.
    pub fn settle(&self, total: i64) -> Result<i64, AppError> {
        let paid = match (self.paid_amount, &self.customer_id) {
            (Some(paid), _) => paid,
            (None, None) => total,
            (None, Some(_)) => 0,
        };
        if paid > total {
            return Err(AppError::Validation(format!(
                "paidAmount {} exceeds sale total {}",
                paid, total
            )));
        }
        if self.customer_id.is_none() && paid != total {
            return Err(AppError::Validation(
                "Walk-in sales must be paid in full".to_string(),
            ));
        }
        Ok(paid)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleFilter {
    #[serde(default)]
    pub branch_id: Option<String>,
    #[serde(default)]
    pub customer_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(customer: Option<&str>, paid: Option<i64>) -> CreateSaleRequest {
        CreateSaleRequest {
            id: None,
            branch_id: "b1".to_string(),
            customer_id: customer.map(str::to_string),
            items: vec![SaleItemRequest {
                product_id: "p1".to_string(),
                quantity: 1,
                unit_price: None,
            }],
            discount: 0,
            paid_amount: paid,
            payment_method: None,
            client_reference: None,
            notes: None,
        }
    }

    #[test]
    fn test_walk_in_defaults_to_full_payment() {
        assert_eq!(request(None, None).settle(500).unwrap(), 500);
        assert!(request(None, Some(100)).settle(500).is_err());
    }

    #[test]
    fn test_account_sale_defaults_to_credit() {
        assert_eq!(request(Some("c1"), None).settle(500).unwrap(), 0);
        assert_eq!(request(Some("c1"), Some(200)).settle(500).unwrap(), 200);
        assert!(request(Some("c1"), Some(600)).settle(500).is_err());
    }
}
