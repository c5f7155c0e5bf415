//! Branch (store location) model.

use serde::{Deserialize, Serialize};

use super::common::require_text;
use crate::errors::AppError;

/// A physical store or warehouse that holds stock.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Branch {
    pub id: String,
    pub name: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    pub active: bool,
    pub updated_at: String,
    /// Internal version for optimistic concurrency control
    #[serde(default)]
    pub version: i64,
}

/// Request body for creating a branch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBranchRequest {
    /// Client-generated id for records created offline
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    pub code: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl CreateBranchRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        require_text(&self.name, "Branch name")?;
        require_text(&self.code, "Branch code")
    }
}

/// Request body for updating a branch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBranchRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub active: Option<bool>,
    #[serde(default)]
    pub expected_version: Option<i64>,
}

impl UpdateBranchRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        if let Some(name) = &self.name {
            require_text(name, "Branch name")?;
        }
        if let Some(code) = &self.code {
            require_text(code, "Branch code")?;
        }
        Ok(())
    }
}
