//! Applying changes pushed by offline devices.
//!
//! Each change is applied on its own; one rejected change never blocks the rest of the
//! batch. Every outcome except a server failure is remembered per device, so a retried
//! push is answered from the receipt instead of being applied again. A device that wants
//! another attempt at a conflicted or rejected change sends it under a new client change id.

use serde::de::DeserializeOwned;

use crate::db::Repository;
use crate::errors::AppError;
use crate::models::{
    CreateBranchRequest, CreateCategoryRequest, CreatePartyRequest, CreateProductRequest,
    CreateSaleRequest, EntityType, PartyKind, PushChange, PushOperation, PushRequest,
    PushResponse, PushResult, PushStatus, UpdateBranchRequest, UpdateCategoryRequest,
    UpdatePartyRequest, UpdateProductRequest,
};
use crate::search::ProductIndex;

/// Apply every change in `request` and report a result per change.
pub async fn apply_push(
    repo: &Repository,
    index: &ProductIndex,
    request: &PushRequest,
) -> Result<PushResponse, AppError> {
    let mut results = Vec::with_capacity(request.changes.len());

    for change in &request.changes {
        if let Some(mut previous) = repo
            .find_receipt(&request.device_id, &change.client_change_id)
            .await?
        {
            previous.status = PushStatus::Duplicate;
            results.push(previous);
            continue;
        }

        let result = match apply_change(repo, index, change).await {
            Ok(entity_id) => PushResult::applied(&change.client_change_id, entity_id),
            Err(err @ (AppError::Database(_) | AppError::Internal(_))) => return Err(err),
            Err(err) => {
                tracing::debug!(
                    device_id = %request.device_id,
                    client_change_id = %change.client_change_id,
                    "Push change not applied: {}",
                    err
                );
                PushResult::from_error(&change.client_change_id, change.entity_id.clone(), &err)
            }
        };
        repo.store_receipt(&request.device_id, &result).await?;
        results.push(result);
    }

    let applied = results
        .iter()
        .filter(|r| r.status == PushStatus::Applied)
        .count();
    tracing::info!(
        device_id = %request.device_id,
        received = request.changes.len(),
        applied,
        "Processed sync push"
    );

    Ok(PushResponse {
        results,
        cursor: repo.current_cursor().await?,
    })
}

/// Apply one change, returning the id of the affected entity.
async fn apply_change(
    repo: &Repository,
    index: &ProductIndex,
    change: &PushChange,
) -> Result<String, AppError> {
    match (change.entity_type, change.operation) {
        (EntityType::Sale, PushOperation::Create) => {
            let mut request: CreateSaleRequest = decode(change)?;
            if request.id.is_none() {
                request.id = change.entity_id.clone();
            }
            request.validate()?;
            Ok(repo.create_sale(&request).await?.id)
        }
        (entity_type, PushOperation::Upsert) if is_catalog(entity_type) => {
            let id = require_entity_id(change)?;
            upsert_catalog(repo, index, change, id).await?;
            Ok(id.to_string())
        }
        (entity_type, PushOperation::Delete) if is_catalog(entity_type) => {
            let id = require_entity_id(change)?;
            match delete_catalog(repo, entity_type, id).await {
                // already gone on the server
                Ok(()) | Err(AppError::NotFound(_)) => {}
                Err(err) => return Err(err),
            }
            if entity_type == EntityType::Product {
                if let Err(e) = index.remove_product(id).await {
                    tracing::warn!("Failed to remove product from index: {}", e);
                }
            }
            Ok(id.to_string())
        }
        (entity_type, operation) => Err(AppError::Validation(format!(
            "Operation {:?} is not supported for {}",
            operation,
            entity_type.as_str()
        ))),
    }
}

fn is_catalog(entity_type: EntityType) -> bool {
    matches!(
        entity_type,
        EntityType::Branch
            | EntityType::Category
            | EntityType::Product
            | EntityType::Vendor
            | EntityType::Customer
    )
}

fn require_entity_id(change: &PushChange) -> Result<&str, AppError> {
    change
        .entity_id
        .as_deref()
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| AppError::Validation("entityId is required".to_string()))
}

fn decode<T: DeserializeOwned>(change: &PushChange) -> Result<T, AppError> {
    serde_json::from_value(change.payload.clone()).map_err(|e| {
        AppError::Validation(format!(
            "Invalid {} payload: {}",
            change.entity_type.as_str(),
            e
        ))
    })
}

/// Update the record when the server has it, otherwise create it under the device's id.
async fn upsert_catalog(
    repo: &Repository,
    index: &ProductIndex,
    change: &PushChange,
    id: &str,
) -> Result<(), AppError> {
    let expected_version = change.base_version;

    match change.entity_type {
        EntityType::Branch => {
            if repo.get_branch(id).await?.is_some() {
                let mut request: UpdateBranchRequest = decode(change)?;
                request.expected_version = expected_version;
                request.validate()?;
                repo.update_branch(id, &request).await?;
            } else {
                let mut request: CreateBranchRequest = decode(change)?;
                request.id = Some(id.to_string());
                request.validate()?;
                repo.create_branch(&request).await?;
            }
        }
        EntityType::Category => {
            if repo.get_category(id).await?.is_some() {
                let mut request: UpdateCategoryRequest = decode(change)?;
                request.expected_version = expected_version;
                request.validate()?;
                repo.update_category(id, &request).await?;
            } else {
                let mut request: CreateCategoryRequest = decode(change)?;
                request.id = Some(id.to_string());
                request.validate()?;
                repo.create_category(&request).await?;
            }
        }
        EntityType::Product => {
            let product = if repo.get_product(id).await?.is_some() {
                let mut request: UpdateProductRequest = decode(change)?;
                request.expected_version = expected_version;
                request.validate()?;
                repo.update_product(id, &request).await?
            } else {
                let mut request: CreateProductRequest = decode(change)?;
                request.id = Some(id.to_string());
                request.validate()?;
                repo.create_product(&request).await?
            };
            if let Err(e) = index
                .refresh_products(repo, std::slice::from_ref(&product))
                .await
            {
                tracing::warn!("Failed to index product {}: {}", product.id, e);
            }
        }
        EntityType::Vendor | EntityType::Customer => {
            let kind = party_kind(change.entity_type);
            if repo.get_party(kind, id).await?.is_some() {
                let mut request: UpdatePartyRequest = decode(change)?;
                request.expected_version = expected_version;
                request.validate()?;
                repo.update_party(kind, id, &request).await?;
            } else {
                let mut request: CreatePartyRequest = decode(change)?;
                request.id = Some(id.to_string());
                request.validate()?;
                repo.create_party(kind, &request).await?;
            }
        }
        other => {
            return Err(AppError::Validation(format!(
                "{} cannot be upserted",
                other.as_str()
            )))
        }
    }
    Ok(())
}

async fn delete_catalog(repo: &Repository, entity_type: EntityType, id: &str) -> Result<(), AppError> {
    match entity_type {
        EntityType::Branch => repo.delete_branch(id).await,
        EntityType::Category => repo.delete_category(id).await,
        EntityType::Product => repo.delete_product(id).await,
        EntityType::Vendor | EntityType::Customer => {
            repo.delete_party(party_kind(entity_type), id).await
        }
        other => Err(AppError::Validation(format!(
            "{} cannot be deleted",
            other.as_str()
        ))),
    }
}

fn party_kind(entity_type: EntityType) -> PartyKind {
    if entity_type == EntityType::Vendor {
        PartyKind::Vendor
    } else {
        PartyKind::Customer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::{seed_branch, seed_product, test_repo};
    use crate::models::StockAdjustmentRequest;
    use serde_json::json;
    use tempfile::TempDir;

    fn change(id: &str, entity_type: EntityType, operation: PushOperation, payload: serde_json::Value) -> PushChange {
        PushChange {
            client_change_id: id.to_string(),
            entity_type,
            entity_id: Some(format!("{}-entity", id)),
            operation,
            payload,
            base_version: None,
        }
    }

    #[tokio::test]
    async fn test_push_is_idempotent_per_device() {
        let (repo, _dir) = test_repo().await;
        let index_dir = TempDir::new().unwrap();
        let index = ProductIndex::open(index_dir.path()).unwrap();

        let request = PushRequest {
            device_id: "till-1".to_string(),
            changes: vec![change(
                "c1",
                EntityType::Product,
                PushOperation::Upsert,
                json!({ "sku": "OFF-1", "name": "Offline Soap" }),
            )],
        };

        let first = apply_push(&repo, &index, &request).await.unwrap();
        assert_eq!(first.results[0].status, PushStatus::Applied);
        assert_eq!(first.results[0].entity_id.as_deref(), Some("c1-entity"));
        let revision = repo.get_revision_id().await.unwrap();

        let second = apply_push(&repo, &index, &request).await.unwrap();
        assert_eq!(second.results[0].status, PushStatus::Duplicate);
        assert_eq!(second.cursor, first.cursor);
        assert_eq!(repo.get_revision_id().await.unwrap(), revision);

        assert_eq!(index.search("soap", 10, 0).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_stale_base_version_conflicts() {
        let (repo, _dir) = test_repo().await;
        let index_dir = TempDir::new().unwrap();
        let index = ProductIndex::open(index_dir.path()).unwrap();

        let create = change(
            "c1",
            EntityType::Branch,
            PushOperation::Upsert,
            json!({ "name": "Main", "code": "MAIN" }),
        );
        let mut rename = change("c1", EntityType::Branch, PushOperation::Upsert, json!({ "name": "Main St" }));
        rename.client_change_id = "c2".to_string();
        rename.base_version = Some(1);
        let mut stale = rename.clone();
        stale.client_change_id = "c3".to_string();
        stale.payload = json!({ "name": "Old Town" });

        let response = apply_push(
            &repo,
            &index,
            &PushRequest {
                device_id: "till-1".to_string(),
                changes: vec![create, rename, stale],
            },
        )
        .await
        .unwrap();

        let statuses: Vec<PushStatus> = response.results.iter().map(|r| r.status).collect();
        assert_eq!(
            statuses,
            vec![PushStatus::Applied, PushStatus::Applied, PushStatus::Conflict]
        );
        assert_eq!(response.results[2].current_version, Some(2));
        let branch = repo.get_branch("c1-entity").await.unwrap().unwrap();
        assert_eq!(branch.name, "Main St");
    }

    #[tokio::test]
    async fn test_unsupported_and_invalid_changes_rejected() {
        let (repo, _dir) = test_repo().await;
        let index_dir = TempDir::new().unwrap();
        let index = ProductIndex::open(index_dir.path()).unwrap();

        let response = apply_push(
            &repo,
            &index,
            &PushRequest {
                device_id: "till-1".to_string(),
                changes: vec![
                    change("c1", EntityType::Payment, PushOperation::Create, json!({})),
                    change("c2", EntityType::Product, PushOperation::Upsert, json!({ "name": "No SKU" })),
                    change("c3", EntityType::Customer, PushOperation::Delete, json!(null)),
                ],
            },
        )
        .await
        .unwrap();

        assert_eq!(response.results[0].status, PushStatus::Rejected);
        assert_eq!(response.results[1].status, PushStatus::Rejected);
        // deleting something the server never had still converges
        assert_eq!(response.results[2].status, PushStatus::Applied);

        let receipt = repo.find_receipt("till-1", "c2").await.unwrap().unwrap();
        assert_eq!(receipt.status, PushStatus::Rejected);
    }

    #[tokio::test]
    async fn test_retried_rejection_is_answered_from_receipt() {
        let (repo, _dir) = test_repo().await;
        let index_dir = TempDir::new().unwrap();
        let index = ProductIndex::open(index_dir.path()).unwrap();
        let branch = seed_branch(&repo, "MAIN").await;
        let product = seed_product(&repo, "TEA-1", 40, 100).await;

        let request = PushRequest {
            device_id: "till-1".to_string(),
            changes: vec![change(
                "c1",
                EntityType::Sale,
                PushOperation::Create,
                json!({
                    "branchId": branch.id,
                    "items": [{ "productId": product.id, "quantity": 1 }]
                }),
            )],
        };

        // nothing on the shelf yet
        let first = apply_push(&repo, &index, &request).await.unwrap();
        assert_eq!(first.results[0].status, PushStatus::Rejected);

        repo.adjust_stock(&StockAdjustmentRequest {
            branch_id: branch.id.clone(),
            product_id: product.id.clone(),
            quantity_delta: 5,
            note: None,
        })
        .await
        .unwrap();

        let retry = apply_push(&repo, &index, &request).await.unwrap();
        assert_eq!(retry.results[0].status, PushStatus::Duplicate);
        assert!(retry.results[0].message.is_some());
        assert!(repo.get_sale("c1-entity").await.unwrap().is_none());
    }
}
