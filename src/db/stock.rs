//! Stock levels and movements.
//!
//! `apply_stock_delta` is the only code path that changes a stock level. Decrements are
//! a single conditional UPDATE so no interleaving of writers can take a level below zero.

use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection};

use super::catalog::{product_from_row, require_branch, require_product};
use super::ledger;
use super::repository::{now, record_upsert};
use super::Repository;
use crate::errors::AppError;
use crate::models::common::line_total;
use crate::models::{
    Account, EntityType, LowStockItem, MovementFilter, MovementReason, Page, Posting,
    ReferenceType, StockAdjustment, StockAdjustmentRequest, StockFilter, StockLevel,
    StockMovement, StockTransfer, StockTransferRequest,
};

impl Repository {
    pub async fn list_stock_levels(&self, filter: &StockFilter) -> Result<Vec<StockLevel>, AppError> {
        let mut conn = self.pool.acquire().await?;
        fetch_stock_levels(&mut conn, filter).await
    }

    /// Movements, newest first.
    pub async fn list_movements(
        &self,
        filter: &MovementFilter,
        page: Page,
    ) -> Result<Vec<StockMovement>, AppError> {
        let page = page.clamped();
        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT id, branch_id, product_id, quantity_delta, reason, reference_id, note, created_at FROM stock_movements WHERE 1 = 1",
        );
        if let Some(branch_id) = &filter.branch_id {
            query.push(" AND branch_id = ").push_bind(branch_id.clone());
        }
        if let Some(product_id) = &filter.product_id {
            query.push(" AND product_id = ").push_bind(product_id.clone());
        }
        if let Some(reference_id) = &filter.reference_id {
            query.push(" AND reference_id = ").push_bind(reference_id.clone());
        }
        query
            .push(" ORDER BY created_at DESC, rowid DESC LIMIT ")
            .push_bind(page.limit)
            .push(" OFFSET ")
            .push_bind(page.offset);

        let rows = query.build().fetch_all(&self.pool).await?;
        rows.iter().map(movement_from_row).collect()
    }

    /// Manual correction of one stock level, valued at the product's cost price.
    pub async fn adjust_stock(
        &self,
        request: &StockAdjustmentRequest,
    ) -> Result<StockAdjustment, AppError> {
        let mut tx = self.begin_write().await?;
        require_branch(&mut tx, &request.branch_id).await?;
        let product = require_product(&mut tx, &request.product_id).await?;

        let (level, movement) = apply_stock_delta(
            &mut tx,
            &request.branch_id,
            &request.product_id,
            request.quantity_delta,
            MovementReason::Adjustment,
            None,
            request.note.as_deref(),
        )
        .await?;

        let value = line_total(request.quantity_delta, product.cost_price)?;
        let posting = Posting::new(ReferenceType::Adjustment, movement.id.clone())
            .memo(format!("Stock adjustment for {}", product.sku))
            .transfer(
                (Account::Inventory, None),
                (Account::InventoryAdjustment, None),
                value,
            );
        ledger::post(&mut tx, &posting).await?;

        tx.commit().await?;

        tracing::info!(
            branch_id = %request.branch_id,
            product_id = %request.product_id,
            delta = request.quantity_delta,
            quantity = level.quantity,
            "Adjusted stock"
        );
        Ok(StockAdjustment { level, movement })
    }

    /// Move stock between branches. Every line succeeds or none does.
    pub async fn transfer_stock(
        &self,
        request: &StockTransferRequest,
    ) -> Result<StockTransfer, AppError> {
        let transfer_id = uuid::Uuid::new_v4().to_string();

        let mut tx = self.begin_write().await?;
        require_branch(&mut tx, &request.from_branch_id).await?;
        require_branch(&mut tx, &request.to_branch_id).await?;

        let mut movements = Vec::with_capacity(request.items.len() * 2);
        for item in &request.items {
            require_product(&mut tx, &item.product_id).await?;
            let (_, out) = apply_stock_delta(
                &mut tx,
                &request.from_branch_id,
                &item.product_id,
                -item.quantity,
                MovementReason::TransferOut,
                Some(transfer_id.as_str()),
                request.note.as_deref(),
            )
            .await?;
            let (_, into) = apply_stock_delta(
                &mut tx,
                &request.to_branch_id,
                &item.product_id,
                item.quantity,
                MovementReason::TransferIn,
                Some(transfer_id.as_str()),
                request.note.as_deref(),
            )
            .await?;
            movements.push(out);
            movements.push(into);
        }

        tx.commit().await?;

        tracing::info!(
            transfer_id = %transfer_id,
            from = %request.from_branch_id,
            to = %request.to_branch_id,
            lines = request.items.len(),
            "Transferred stock"
        );
        Ok(StockTransfer {
            transfer_id,
            movements,
        })
    }

    /// Active products at or below their reorder level.
    pub async fn low_stock(&self, branch_id: Option<&str>) -> Result<Vec<LowStockItem>, AppError> {
        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(
            r#"SELECT s.branch_id AS stock_branch_id, s.quantity AS stock_quantity,
                p.id, p.sku, p.name, p.barcode, p.category_id, p.unit, p.cost_price,
                p.sale_price, p.reorder_level, p.description, p.active, p.updated_at, p.version
            FROM stock_levels s
            JOIN products p ON p.id = s.product_id
            WHERE p.active = 1 AND s.quantity <= p.reorder_level"#,
        );
        if let Some(branch_id) = branch_id {
            query.push(" AND s.branch_id = ").push_bind(branch_id.to_string());
        }
        query.push(" ORDER BY s.quantity ASC, p.name ASC");

        let rows = query.build().fetch_all(&self.pool).await?;
        Ok(rows
            .iter()
            .map(|row| LowStockItem {
                branch_id: row.get("stock_branch_id"),
                quantity: row.get("stock_quantity"),
                product: product_from_row(row),
            })
            .collect())
    }
}

pub(super) async fn fetch_stock_levels(
    conn: &mut SqliteConnection,
    filter: &StockFilter,
) -> Result<Vec<StockLevel>, AppError> {
    let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(
        "SELECT branch_id, product_id, quantity, updated_at FROM stock_levels WHERE 1 = 1",
    );
    if let Some(branch_id) = &filter.branch_id {
        query.push(" AND branch_id = ").push_bind(branch_id.clone());
    }
    if let Some(product_id) = &filter.product_id {
        query.push(" AND product_id = ").push_bind(product_id.clone());
    }
    query.push(" ORDER BY branch_id, product_id");

    let rows = query.build().fetch_all(&mut *conn).await?;
    Ok(rows.iter().map(level_from_row).collect())
}

/// Apply a signed quantity change to one stock level and record the movement.
///
/// Returns `InsufficientStock` when a decrement exceeds what is on hand.
pub(super) async fn apply_stock_delta(
    conn: &mut SqliteConnection,
    branch_id: &str,
    product_id: &str,
    delta: i64,
    reason: MovementReason,
    reference_id: Option<&str>,
    note: Option<&str>,
) -> Result<(StockLevel, StockMovement), AppError> {
    let timestamp = now();

    let quantity: Option<i64> = if delta >= 0 {
        let row = sqlx::query(
            r#"INSERT INTO stock_levels (branch_id, product_id, quantity, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(branch_id, product_id) DO UPDATE SET
                quantity = quantity + excluded.quantity,
                updated_at = excluded.updated_at
            RETURNING quantity"#,
        )
        .bind(branch_id)
        .bind(product_id)
        .bind(delta)
        .bind(&timestamp)
        .fetch_one(&mut *conn)
        .await?;
        Some(row.get("quantity"))
    } else {
        let requested = delta
            .checked_neg()
            .ok_or_else(|| AppError::Validation(format!("Quantity {} is out of range", delta)))?;
        sqlx::query(
            r#"UPDATE stock_levels SET quantity = quantity - ?, updated_at = ?
            WHERE branch_id = ? AND product_id = ? AND quantity >= ?
            RETURNING quantity"#,
        )
        .bind(requested)
        .bind(&timestamp)
        .bind(branch_id)
        .bind(product_id)
        .bind(requested)
        .fetch_optional(&mut *conn)
        .await?
        .map(|row| row.get("quantity"))
    };

    let Some(quantity) = quantity else {
        let available: i64 = sqlx::query(
            "SELECT quantity FROM stock_levels WHERE branch_id = ? AND product_id = ?",
        )
        .bind(branch_id)
        .bind(product_id)
        .fetch_optional(&mut *conn)
        .await?
        .map(|row| row.get("quantity"))
        .unwrap_or(0);
        return Err(AppError::InsufficientStock {
            product_id: product_id.to_string(),
            branch_id: branch_id.to_string(),
            available,
            requested: delta.saturating_neg(),
        });
    };

    let movement = StockMovement {
        id: uuid::Uuid::new_v4().to_string(),
        branch_id: branch_id.to_string(),
        product_id: product_id.to_string(),
        quantity_delta: delta,
        reason,
        reference_id: reference_id.map(str::to_string),
        note: note.map(str::to_string),
        created_at: timestamp.clone(),
    };
    sqlx::query(
        r#"INSERT INTO stock_movements (
            id, branch_id, product_id, quantity_delta, reason, reference_id, note, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&movement.id)
    .bind(&movement.branch_id)
    .bind(&movement.product_id)
    .bind(movement.quantity_delta)
    .bind(movement.reason.as_str())
    .bind(&movement.reference_id)
    .bind(&movement.note)
    .bind(&movement.created_at)
    .execute(&mut *conn)
    .await?;

    let level = StockLevel {
        branch_id: branch_id.to_string(),
        product_id: product_id.to_string(),
        quantity,
        updated_at: timestamp,
    };
    record_upsert(conn, EntityType::StockLevel, &stock_level_key(&level), &level).await?;

    Ok((level, movement))
}

/// Changelog id for a stock level, which has a composite key.
fn stock_level_key(level: &StockLevel) -> String {
    format!("{}:{}", level.branch_id, level.product_id)
}

fn level_from_row(row: &SqliteRow) -> StockLevel {
    StockLevel {
        branch_id: row.get("branch_id"),
        product_id: row.get("product_id"),
        quantity: row.get("quantity"),
        updated_at: row.get("updated_at"),
    }
}

fn movement_from_row(row: &SqliteRow) -> Result<StockMovement, AppError> {
    let reason: String = row.get("reason");
    Ok(StockMovement {
        id: row.get("id"),
        branch_id: row.get("branch_id"),
        product_id: row.get("product_id"),
        quantity_delta: row.get("quantity_delta"),
        reason: MovementReason::parse(&reason)
            .ok_or_else(|| AppError::Database(format!("Unknown movement reason: {}", reason)))?,
        reference_id: row.get("reference_id"),
        note: row.get("note"),
        created_at: row.get("created_at"),
    })
}

#[cfg(test)]
mod tests {
    use crate::db::test_support::{seed_branch, seed_product, test_repo};
    use crate::errors::AppError;
    use crate::models::*;

    #[tokio::test]
    async fn test_adjustment_cannot_go_negative() {
        let (repo, _dir) = test_repo().await;
        let branch = seed_branch(&repo, "MAIN").await;
        let product = seed_product(&repo, "SKU-1", 100, 150).await;

        let gain = repo
            .adjust_stock(&StockAdjustmentRequest {
                branch_id: branch.id.clone(),
                product_id: product.id.clone(),
                quantity_delta: 5,
                note: Some("opening count".to_string()),
            })
            .await
            .unwrap();
        assert_eq!(gain.level.quantity, 5);

        let err = repo
            .adjust_stock(&StockAdjustmentRequest {
                branch_id: branch.id.clone(),
                product_id: product.id.clone(),
                quantity_delta: -6,
                note: None,
            })
            .await
            .unwrap_err();
        match err {
            AppError::InsufficientStock {
                available,
                requested,
                ..
            } => {
                assert_eq!(available, 5);
                assert_eq!(requested, 6);
            }
            other => panic!("expected insufficient stock, got {:?}", other),
        }

        let levels = repo
            .list_stock_levels(&StockFilter::default())
            .await
            .unwrap();
        assert_eq!(levels.len(), 1);
        assert_eq!(levels[0].quantity, 5);

        // the gain is valued at cost on the inventory account
        let tb = repo.trial_balance().await.unwrap();
        assert!(tb.balanced);
        assert_eq!(tb.total_debit, 500);
    }

    #[tokio::test]
    async fn test_unrepresentable_decrement_is_rejected() {
        let (repo, _dir) = test_repo().await;
        let branch = seed_branch(&repo, "MAIN").await;
        let product = seed_product(&repo, "SKU-1", 100, 150).await;

        let err = repo
            .adjust_stock(&StockAdjustmentRequest {
                branch_id: branch.id.clone(),
                product_id: product.id.clone(),
                quantity_delta: i64::MIN,
                note: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(repo.get_revision_id().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_transfer_is_all_or_nothing() {
        let (repo, _dir) = test_repo().await;
        let main = seed_branch(&repo, "MAIN").await;
        let kiosk = seed_branch(&repo, "KIOSK").await;
        let apples = seed_product(&repo, "APL", 10, 20).await;
        let pears = seed_product(&repo, "PEAR", 10, 20).await;

        repo.adjust_stock(&StockAdjustmentRequest {
            branch_id: main.id.clone(),
            product_id: apples.id.clone(),
            quantity_delta: 10,
            note: None,
        })
        .await
        .unwrap();

        let request = |pear_qty: i64| StockTransferRequest {
            from_branch_id: main.id.clone(),
            to_branch_id: kiosk.id.clone(),
            items: vec![
                LineItemRequest {
                    product_id: apples.id.clone(),
                    quantity: 4,
                },
                LineItemRequest {
                    product_id: pears.id.clone(),
                    quantity: pear_qty,
                },
            ],
            note: None,
        };

        let err = repo.transfer_stock(&request(1)).await.unwrap_err();
        assert!(matches!(err, AppError::InsufficientStock { .. }));
        let main_levels = repo
            .list_stock_levels(&StockFilter {
                branch_id: Some(main.id.clone()),
                product_id: None,
            })
            .await
            .unwrap();
        assert_eq!(main_levels[0].quantity, 10);

        let mut only_apples = request(1);
        only_apples.items.truncate(1);
        let transfer = repo.transfer_stock(&only_apples).await.unwrap();
        assert_eq!(transfer.movements.len(), 2);

        let moved = repo
            .list_movements(
                &MovementFilter {
                    reference_id: Some(transfer.transfer_id.clone()),
                    ..Default::default()
                },
                Page::default(),
            )
            .await
            .unwrap();
        assert_eq!(moved.len(), 2);
        assert_eq!(moved.iter().map(|m| m.quantity_delta).sum::<i64>(), 0);
    }

    #[tokio::test]
    async fn test_low_stock_respects_reorder_level() {
        let (repo, _dir) = test_repo().await;
        let branch = seed_branch(&repo, "MAIN").await;
        let product = repo
            .create_product(
                &serde_json::from_value(serde_json::json!({
                    "sku": "MILK",
                    "name": "Milk",
                    "reorderLevel": 3
                }))
                .unwrap(),
            )
            .await
            .unwrap();

        repo.adjust_stock(&StockAdjustmentRequest {
            branch_id: branch.id.clone(),
            product_id: product.id.clone(),
            quantity_delta: 3,
            note: None,
        })
        .await
        .unwrap();
        let low = repo.low_stock(Some(branch.id.as_str())).await.unwrap();
        assert_eq!(low.len(), 1);
        assert_eq!(low[0].product.sku, "MILK");

        repo.adjust_stock(&StockAdjustmentRequest {
            branch_id: branch.id.clone(),
            product_id: product.id.clone(),
            quantity_delta: 1,
            note: None,
        })
        .await
        .unwrap();
        assert!(repo.low_stock(None).await.unwrap().is_empty());
    }
}
