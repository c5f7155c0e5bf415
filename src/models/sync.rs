//! Changelog and device sync protocol types.

use serde::{Deserialize, Serialize};

use super::common::require_text;
use crate::errors::AppError;

/// Kinds of records that appear in the changelog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Branch,
    Category,
    Product,
    Vendor,
    Customer,
    StockLevel,
    Purchase,
    Sale,
    Return,
    Payment,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Branch => "branch",
            EntityType::Category => "category",
            EntityType::Product => "product",
            EntityType::Vendor => "vendor",
            EntityType::Customer => "customer",
            EntityType::StockLevel => "stock_level",
            EntityType::Purchase => "purchase",
            EntityType::Sale => "sale",
            EntityType::Return => "return",
            EntityType::Payment => "payment",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "branch" => Some(EntityType::Branch),
            "category" => Some(EntityType::Category),
            "product" => Some(EntityType::Product),
            "vendor" => Some(EntityType::Vendor),
            "customer" => Some(EntityType::Customer),
            "stock_level" => Some(EntityType::StockLevel),
            "purchase" => Some(EntityType::Purchase),
            "sale" => Some(EntityType::Sale),
            "return" => Some(EntityType::Return),
            "payment" => Some(EntityType::Payment),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeOperation {
    Upsert,
    Delete,
}

impl ChangeOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeOperation::Upsert => "upsert",
            ChangeOperation::Delete => "delete",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "upsert" => Some(ChangeOperation::Upsert),
            "delete" => Some(ChangeOperation::Delete),
            _ => None,
        }
    }
}

/// One row of the server changelog.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeRecord {
    pub seq: i64,
    pub entity_type: EntityType,
    pub entity_id: String,
    pub operation: ChangeOperation,
    /// Entity state after the change; null for deletes
    pub payload: serde_json::Value,
    pub created_at: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChangesQuery {
    #[serde(default)]
    pub since: i64,
    #[serde(default)]
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeBatch {
    pub changes: Vec<ChangeRecord>,
    /// Pass back as `since` to continue
    pub cursor: i64,
    pub has_more: bool,
}

/// Operation requested by a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PushOperation {
    Upsert,
    Delete,
    Create,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushChange {
    pub client_change_id: String,
    pub entity_type: EntityType,
    #[serde(default)]
    pub entity_id: Option<String>,
    pub operation: PushOperation,
    #[serde(default)]
    pub payload: serde_json::Value,
    /// Version the device last saw; used as the expected version on update
    #[serde(default)]
    pub base_version: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushRequest {
    pub device_id: String,
    pub changes: Vec<PushChange>,
}

impl PushRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        require_text(&self.device_id, "deviceId")?;
        if self.changes.is_empty() {
            return Err(AppError::Validation("No changes provided".to_string()));
        }
        for change in &self.changes {
            require_text(&change.client_change_id, "clientChangeId")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PushStatus {
    Applied,
    Duplicate,
    Conflict,
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushResult {
    pub client_change_id: String,
    pub status: PushStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_version: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl PushResult {
    pub fn applied(client_change_id: &str, entity_id: String) -> Self {
        Self {
            client_change_id: client_change_id.to_string(),
            status: PushStatus::Applied,
            entity_id: Some(entity_id),
            current_version: None,
            message: None,
        }
    }

    /// Classify a failed apply: version conflicts are retryable, everything else is rejected.
    pub fn from_error(client_change_id: &str, entity_id: Option<String>, err: &AppError) -> Self {
        let (status, current_version) = match err {
            AppError::Conflict {
                current_version, ..
            } => (PushStatus::Conflict, Some(*current_version)),
            _ => (PushStatus::Rejected, None),
        };
        Self {
            client_change_id: client_change_id.to_string(),
            status,
            entity_id,
            current_version,
            message: Some(err.message()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushResponse {
    pub results: Vec<PushResult>,
    pub cursor: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_maps_to_conflict_status() {
        let err = AppError::Conflict {
            message: "stale".to_string(),
            current_version: 4,
        };
        let result = PushResult::from_error("c1", Some("p1".to_string()), &err);
        assert_eq!(result.status, PushStatus::Conflict);
        assert_eq!(result.current_version, Some(4));

        let rejected =
            PushResult::from_error("c2", None, &AppError::Validation("bad".to_string()));
        assert_eq!(rejected.status, PushStatus::Rejected);
        assert_eq!(rejected.message.as_deref(), Some("bad"));
    }

    #[test]
    fn test_push_change_deserialize() {
        let change: PushChange = serde_json::from_value(serde_json::json!({
            "clientChangeId": "d1-1",
            "entityType": "product",
            "entityId": "p1",
            "operation": "upsert",
            "payload": { "name": "Milk" },
            "baseVersion": 2
        }))
        .unwrap();
        assert_eq!(change.entity_type, EntityType::Product);
        assert_eq!(change.operation, PushOperation::Upsert);
        assert_eq!(change.base_version, Some(2));
    }
}
