//! Cash movements settling customer and vendor balances.

use serde::{Deserialize, Serialize};

use super::common::require_text;
use super::PartyKind;
use crate::errors::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentDirection {
    /// Received from a customer
    Incoming,
    /// Paid to a vendor
    Outgoing,
}

impl PaymentDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentDirection::Incoming => "incoming",
            PaymentDirection::Outgoing => "outgoing",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "incoming" => Some(PaymentDirection::Incoming),
            "outgoing" => Some(PaymentDirection::Outgoing),
            _ => None,
        }
    }

    pub fn party_kind(&self) -> PartyKind {
        match self {
            PaymentDirection::Incoming => PartyKind::Customer,
            PaymentDirection::Outgoing => PartyKind::Vendor,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub id: String,
    pub direction: PaymentDirection,
    pub party_id: String,
    pub amount: i64,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentRequest {
    pub direction: PaymentDirection,
    pub party_id: String,
    pub amount: i64,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
}

fn default_method() -> String {
    "cash".to_string()
}

impl CreatePaymentRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        require_text(&self.party_id, "partyId")?;
        require_text(&self.method, "method")?;
        if self.amount <= 0 {
            return Err(AppError::Validation(
                "Payment amount must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentFilter {
    #[serde(default)]
    pub party_id: Option<String>,
    #[serde(default)]
    pub direction: Option<PaymentDirection>,
}
