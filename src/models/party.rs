//! Vendors and customers.
//!
//! Both are trading parties with the same shape; they live in separate tables and their
//! balances come from different ledger accounts.

use serde::{Deserialize, Serialize};

use super::common::require_text;
use crate::errors::AppError;

/// Which side of trade a party is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartyKind {
    Vendor,
    Customer,
}

impl PartyKind {
    pub fn table(&self) -> &'static str {
        match self {
            PartyKind::Vendor => "vendors",
            PartyKind::Customer => "customers",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            PartyKind::Vendor => "Vendor",
            PartyKind::Customer => "Customer",
        }
    }
}

/// A vendor or customer record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Party {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub active: bool,
    pub updated_at: String,
    #[serde(default)]
    pub version: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePartyRequest {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl CreatePartyRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        require_text(&self.name, "Name")
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePartyRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub active: Option<bool>,
    #[serde(default)]
    pub expected_version: Option<i64>,
}

impl UpdatePartyRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        if let Some(name) = &self.name {
            require_text(name, "Name")?;
        }
        Ok(())
    }
}

/// Outstanding balance of a party, derived from the ledger.
///
/// Positive means the customer owes us, or we owe the vendor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartyBalance {
    pub party_id: String,
    pub kind: PartyKind,
    pub balance: i64,
}
