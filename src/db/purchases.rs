//! Purchase orders: ordered, then received into stock or cancelled.

use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection};

use super::catalog::{require_branch, require_party, require_product};
use super::ledger;
use super::repository::{check_version, now, record_upsert, stale_write};
use super::stock::apply_stock_delta;
use super::Repository;
use crate::errors::AppError;
use crate::models::common::{line_total, sum_amounts};
use crate::models::{
    Account, CreatePurchaseRequest, EntityType, MovementReason, PartyKind, Posting, Purchase,
    PurchaseFilter, PurchaseItem, PurchaseStatus, PurchaseTransitionRequest, ReferenceType,
};

const PURCHASE_COLUMNS: &str =
    "id, vendor_id, branch_id, reference_no, status, total, notes, created_at, received_at, version";

impl Repository {
    pub async fn list_purchases(&self, filter: &PurchaseFilter) -> Result<Vec<Purchase>, AppError> {
        let mut conn = self.pool.acquire().await?;
        let mut query: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {} FROM purchases WHERE 1 = 1", PURCHASE_COLUMNS));
        if let Some(vendor_id) = &filter.vendor_id {
            query.push(" AND vendor_id = ").push_bind(vendor_id.clone());
        }
        if let Some(status) = filter.status {
            query.push(" AND status = ").push_bind(status.as_str());
        }
        query.push(" ORDER BY created_at DESC");

        let rows = query.build().fetch_all(&mut *conn).await?;
        let mut purchases = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut purchase = purchase_from_row(row)?;
            purchase.items = fetch_purchase_items(&mut conn, &purchase.id).await?;
            purchases.push(purchase);
        }
        Ok(purchases)
    }

    pub async fn get_purchase(&self, id: &str) -> Result<Option<Purchase>, AppError> {
        let mut conn = self.pool.acquire().await?;
        fetch_purchase(&mut conn, id).await
    }

    pub async fn create_purchase(
        &self,
        request: &CreatePurchaseRequest,
    ) -> Result<Purchase, AppError> {
        let mut tx = self.begin_write().await?;
        require_party(&mut tx, PartyKind::Vendor, &request.vendor_id).await?;
        require_branch(&mut tx, &request.branch_id).await?;

        let mut items = Vec::with_capacity(request.items.len());
        for item in &request.items {
            let product = require_product(&mut tx, &item.product_id).await?;
            let unit_cost = item.unit_cost.unwrap_or(product.cost_price);
            items.push(PurchaseItem {
                product_id: item.product_id.clone(),
                quantity: item.quantity,
                unit_cost,
                line_total: line_total(item.quantity, unit_cost)?,
            });
        }

        let mut purchase = Purchase {
            id: uuid::Uuid::new_v4().to_string(),
            vendor_id: request.vendor_id.clone(),
            branch_id: request.branch_id.clone(),
            reference_no: request.reference_no.clone(),
            status: PurchaseStatus::Ordered,
            total: sum_amounts(items.iter().map(|i| i.line_total))?,
            items,
            notes: request.notes.clone(),
            created_at: now(),
            received_at: None,
            version: 1,
        };

        sqlx::query(
            r#"INSERT INTO purchases (
                id, vendor_id, branch_id, reference_no, status, total, notes, created_at, received_at, version
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, NULL, 1)"#,
        )
        .bind(&purchase.id)
        .bind(&purchase.vendor_id)
        .bind(&purchase.branch_id)
        .bind(&purchase.reference_no)
        .bind(purchase.status.as_str())
        .bind(purchase.total)
        .bind(&purchase.notes)
        .bind(&purchase.created_at)
        .execute(&mut *tx)
        .await?;

        for (line_no, item) in purchase.items.iter().enumerate() {
            sqlx::query(
                "INSERT INTO purchase_items (purchase_id, line_no, product_id, quantity, unit_cost, line_total) VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(&purchase.id)
            .bind(line_no as i64)
            .bind(&item.product_id)
            .bind(item.quantity)
            .bind(item.unit_cost)
            .bind(item.line_total)
            .execute(&mut *tx)
            .await?;
        }

        if request.receive {
            receive_into_stock(&mut tx, &mut purchase).await?;
        }

        record_upsert(&mut tx, EntityType::Purchase, &purchase.id, &purchase).await?;
        tx.commit().await?;

        tracing::info!(
            purchase_id = %purchase.id,
            vendor_id = %purchase.vendor_id,
            total = purchase.total,
            status = purchase.status.as_str(),
            "Created purchase"
        );
        Ok(purchase)
    }

    /// Book an ordered purchase into stock and the vendor's payable.
    pub async fn receive_purchase(
        &self,
        id: &str,
        request: &PurchaseTransitionRequest,
    ) -> Result<Purchase, AppError> {
        let mut tx = self.begin_write().await?;
        let mut purchase = require_ordered(&mut tx, id, request).await?;

        receive_into_stock(&mut tx, &mut purchase).await?;

        record_upsert(&mut tx, EntityType::Purchase, id, &purchase).await?;
        tx.commit().await?;

        tracing::info!(purchase_id = %id, total = purchase.total, "Received purchase");
        Ok(purchase)
    }

    pub async fn cancel_purchase(
        &self,
        id: &str,
        request: &PurchaseTransitionRequest,
    ) -> Result<Purchase, AppError> {
        let mut tx = self.begin_write().await?;
        let mut purchase = require_ordered(&mut tx, id, request).await?;

        set_status(&mut tx, &mut purchase, PurchaseStatus::Cancelled).await?;

        record_upsert(&mut tx, EntityType::Purchase, id, &purchase).await?;
        tx.commit().await?;

        tracing::info!(purchase_id = %id, "Cancelled purchase");
        Ok(purchase)
    }
}

async fn require_ordered(
    conn: &mut SqliteConnection,
    id: &str,
    request: &PurchaseTransitionRequest,
) -> Result<Purchase, AppError> {
    let purchase = fetch_purchase(conn, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Purchase {} not found", id)))?;
    check_version("Purchase", id, purchase.version, request.expected_version)?;
    if purchase.status != PurchaseStatus::Ordered {
        return Err(AppError::Conflict {
            message: format!(
                "Purchase {} is already {}",
                id,
                purchase.status.as_str()
            ),
            current_version: purchase.version,
        });
    }
    Ok(purchase)
}

async fn receive_into_stock(
    conn: &mut SqliteConnection,
    purchase: &mut Purchase,
) -> Result<(), AppError> {
    for item in &purchase.items {
        apply_stock_delta(
            conn,
            &purchase.branch_id,
            &item.product_id,
            item.quantity,
            MovementReason::PurchaseReceipt,
            Some(purchase.id.as_str()),
            None,
        )
        .await?;
    }

    let posting = Posting::new(ReferenceType::Purchase, purchase.id.clone())
        .memo(match &purchase.reference_no {
            Some(reference) => format!("Purchase {} received", reference),
            None => "Purchase received".to_string(),
        })
        .transfer(
            (Account::Inventory, None),
            (Account::AccountsPayable, Some(purchase.vendor_id.as_str())),
            purchase.total,
        );
    ledger::post(conn, &posting).await?;

    purchase.received_at = Some(now());
    set_status(conn, purchase, PurchaseStatus::Received).await
}

async fn set_status(
    conn: &mut SqliteConnection,
    purchase: &mut Purchase,
    status: PurchaseStatus,
) -> Result<(), AppError> {
    let result = sqlx::query(
        "UPDATE purchases SET status = ?, received_at = ?, version = version + 1 WHERE id = ? AND version = ?",
    )
    .bind(status.as_str())
    .bind(&purchase.received_at)
    .bind(&purchase.id)
    .bind(purchase.version)
    .execute(&mut *conn)
    .await?;
    if result.rows_affected() == 0 {
        return Err(stale_write(purchase.version));
    }
    purchase.status = status;
    purchase.version += 1;
    Ok(())
}

pub(super) async fn fetch_purchase(
    conn: &mut SqliteConnection,
    id: &str,
) -> Result<Option<Purchase>, AppError> {
    let sql = format!("SELECT {} FROM purchases WHERE id = ?", PURCHASE_COLUMNS);
    let Some(row) = sqlx::query(&sql).bind(id).fetch_optional(&mut *conn).await? else {
        return Ok(None);
    };
    let mut purchase = purchase_from_row(&row)?;
    purchase.items = fetch_purchase_items(conn, id).await?;
    Ok(Some(purchase))
}

async fn fetch_purchase_items(
    conn: &mut SqliteConnection,
    purchase_id: &str,
) -> Result<Vec<PurchaseItem>, AppError> {
    let rows = sqlx::query(
        "SELECT product_id, quantity, unit_cost, line_total FROM purchase_items WHERE purchase_id = ? ORDER BY line_no",
    )
    .bind(purchase_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows
        .iter()
        .map(|row| PurchaseItem {
            product_id: row.get("product_id"),
            quantity: row.get("quantity"),
            unit_cost: row.get("unit_cost"),
            line_total: row.get("line_total"),
        })
        .collect())
}

fn purchase_from_row(row: &SqliteRow) -> Result<Purchase, AppError> {
    let status: String = row.get("status");
    Ok(Purchase {
        id: row.get("id"),
        vendor_id: row.get("vendor_id"),
        branch_id: row.get("branch_id"),
        reference_no: row.get("reference_no"),
        status: PurchaseStatus::parse(&status)
            .ok_or_else(|| AppError::Database(format!("Unknown purchase status: {}", status)))?,
        items: Vec::new(),
        total: row.get("total"),
        notes: row.get("notes"),
        created_at: row.get("created_at"),
        received_at: row.get("received_at"),
        version: row.get("version"),
    })
}

#[cfg(test)]
mod tests {
    use crate::db::test_support::{seed_branch, seed_party, seed_product, test_repo};
    use crate::errors::AppError;
    use crate::models::*;

    fn order(vendor_id: &str, branch_id: &str, product_id: &str, receive: bool) -> CreatePurchaseRequest {
        CreatePurchaseRequest {
            vendor_id: vendor_id.to_string(),
            branch_id: branch_id.to_string(),
            reference_no: Some("PO-1".to_string()),
            items: vec![PurchaseItemRequest {
                product_id: product_id.to_string(),
                quantity: 12,
                unit_cost: None,
            }],
            notes: None,
            receive,
        }
    }

    #[tokio::test]
    async fn test_receive_once() {
        let (repo, _dir) = test_repo().await;
        let branch = seed_branch(&repo, "MAIN").await;
        let vendor = seed_party(&repo, PartyKind::Vendor, "Acme").await;
        let product = seed_product(&repo, "SKU-1", 40, 60).await;

        let purchase = repo
            .create_purchase(&order(&vendor.id, &branch.id, &product.id, false))
            .await
            .unwrap();
        assert_eq!(purchase.status, PurchaseStatus::Ordered);
        assert_eq!(purchase.total, 480);
        assert!(repo
            .list_stock_levels(&StockFilter::default())
            .await
            .unwrap()
            .is_empty());

        let received = repo
            .receive_purchase(
                &purchase.id,
                &PurchaseTransitionRequest {
                    expected_version: Some(1),
                },
            )
            .await
            .unwrap();
        assert_eq!(received.status, PurchaseStatus::Received);
        assert_eq!(received.version, 2);
        assert!(received.received_at.is_some());

        let again = repo
            .receive_purchase(&purchase.id, &PurchaseTransitionRequest::default())
            .await;
        assert!(matches!(again, Err(AppError::Conflict { .. })));

        let levels = repo
            .list_stock_levels(&StockFilter::default())
            .await
            .unwrap();
        assert_eq!(levels[0].quantity, 12);

        let owed = repo
            .party_balance(PartyKind::Vendor, &vendor.id)
            .await
            .unwrap();
        assert_eq!(owed.balance, 480);
    }

    #[tokio::test]
    async fn test_cancelled_purchase_cannot_be_received() {
        let (repo, _dir) = test_repo().await;
        let branch = seed_branch(&repo, "MAIN").await;
        let vendor = seed_party(&repo, PartyKind::Vendor, "Acme").await;
        let product = seed_product(&repo, "SKU-1", 40, 60).await;

        let purchase = repo
            .create_purchase(&order(&vendor.id, &branch.id, &product.id, false))
            .await
            .unwrap();
        let cancelled = repo
            .cancel_purchase(&purchase.id, &PurchaseTransitionRequest::default())
            .await
            .unwrap();
        assert_eq!(cancelled.status, PurchaseStatus::Cancelled);

        let err = repo
            .receive_purchase(&purchase.id, &PurchaseTransitionRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict { .. }));
    }

    #[tokio::test]
    async fn test_unknown_vendor_is_not_found() {
        let (repo, _dir) = test_repo().await;
        let branch = seed_branch(&repo, "MAIN").await;
        let product = seed_product(&repo, "SKU-1", 40, 60).await;

        let err = repo
            .create_purchase(&order("nobody", &branch.id, &product.id, true))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert!(repo
            .list_purchases(&PurchaseFilter::default())
            .await
            .unwrap()
            .is_empty());
    }
}
