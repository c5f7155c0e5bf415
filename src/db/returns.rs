//! Customer returns against sales and our returns to vendors against received purchases.
//!
//! Return values are derived from the source document, never from the request, so a
//! discounted sale refunds its discounted price.

use std::collections::HashMap;

use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection};

use super::ledger;
use super::purchases::fetch_purchase;
use super::repository::{now, record_upsert};
use super::sales::fetch_sale;
use super::stock::apply_stock_delta;
use super::Repository;
use crate::errors::AppError;
use crate::models::common::{line_total, prorate, sum_amounts};
use crate::models::{
    Account, EntityType, LineItemRequest, MovementReason, Posting, PurchaseReturnRequest,
    PurchaseStatus, ReferenceType, ReturnFilter, ReturnItem, ReturnKind, ReturnRecord,
    SaleReturnRequest,
};

const RETURN_COLUMNS: &str =
    "id, kind, source_id, branch_id, party_id, total, refund_amount, reason, created_at";

/// Per-product totals on a source document.
#[derive(Debug, Default, Clone, Copy)]
struct LineAggregate {
    quantity: i64,
    amount: i64,
    cost: i64,
}

/// Value of returned units, plus their cost for sale returns.
struct PricedLine {
    item: ReturnItem,
    cost: i64,
}

impl Repository {
    pub async fn list_returns(&self, filter: &ReturnFilter) -> Result<Vec<ReturnRecord>, AppError> {
        let mut conn = self.pool.acquire().await?;
        let mut query: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {} FROM returns WHERE 1 = 1", RETURN_COLUMNS));
        if let Some(kind) = filter.kind {
            query.push(" AND kind = ").push_bind(kind.as_str());
        }
        if let Some(source_id) = &filter.source_id {
            query.push(" AND source_id = ").push_bind(source_id.clone());
        }
        query.push(" ORDER BY created_at DESC");

        let rows = query.build().fetch_all(&mut *conn).await?;
        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut record = return_from_row(row)?;
            record.items = fetch_return_items(&mut conn, &record.id).await?;
            records.push(record);
        }
        Ok(records)
    }

    pub async fn get_return(&self, id: &str) -> Result<Option<ReturnRecord>, AppError> {
        let mut conn = self.pool.acquire().await?;
        let sql = format!("SELECT {} FROM returns WHERE id = ?", RETURN_COLUMNS);
        let Some(row) = sqlx::query(&sql).bind(id).fetch_optional(&mut *conn).await? else {
            return Ok(None);
        };
        let mut record = return_from_row(&row)?;
        record.items = fetch_return_items(&mut conn, id).await?;
        Ok(Some(record))
    }

    pub async fn create_sale_return(
        &self,
        request: &SaleReturnRequest,
    ) -> Result<ReturnRecord, AppError> {
        let mut tx = self.begin_write().await?;
        let sale = fetch_sale(&mut tx, &request.sale_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Sale {} not found", request.sale_id)))?;

        let mut sold: HashMap<String, LineAggregate> = HashMap::new();
        for item in &sale.items {
            let entry = sold.entry(item.product_id.clone()).or_default();
            entry.quantity += item.quantity;
            entry.amount += item.line_total;
            entry.cost += line_total(item.quantity, item.unit_cost)?;
        }
        let returned = returned_quantities(&mut tx, ReturnKind::Sale, &sale.id).await?;

        let lines = price_lines(&request.items, &sold, &returned, "sale", |gross| {
            prorate(gross, sale.total, sale.subtotal)
        })?;
        let total = sum_amounts(lines.iter().map(|l| l.item.line_total))?;
        let cost = sum_amounts(lines.iter().map(|l| l.cost))?;

        let refund_amount = match (&sale.customer_id, request.refund_amount) {
            (None, Some(refund)) if refund != total => {
                return Err(AppError::Validation(format!(
                    "Walk-in returns are refunded in full: expected {}, got {}",
                    total, refund
                )))
            }
            (None, _) => total,
            (Some(_), refund) => refund.unwrap_or(0),
        };
        if refund_amount > total {
            return Err(AppError::Validation(format!(
                "refundAmount {} exceeds return value {}",
                refund_amount, total
            )));
        }

        let record = ReturnRecord {
            id: uuid::Uuid::new_v4().to_string(),
            kind: ReturnKind::Sale,
            source_id: sale.id.clone(),
            branch_id: sale.branch_id.clone(),
            party_id: sale.customer_id.clone(),
            items: lines.into_iter().map(|l| l.item).collect(),
            total,
            refund_amount,
            reason: request.reason.clone(),
            created_at: now(),
        };
        insert_return(&mut tx, &record, MovementReason::SaleReturn, 1).await?;

        let customer = record.party_id.as_deref();
        let posting = Posting::new(ReferenceType::SaleReturn, record.id.clone())
            .memo(format!("Return against sale {}", sale.id))
            .transfer(
                (Account::SalesReturns, None),
                (Account::AccountsReceivable, customer),
                total,
            )
            .transfer(
                (Account::Inventory, None),
                (Account::CostOfGoodsSold, None),
                cost,
            )
            .transfer(
                (Account::AccountsReceivable, customer),
                (Account::Cash, None),
                refund_amount,
            );
        ledger::post(&mut tx, &posting).await?;

        record_upsert(&mut tx, EntityType::Return, &record.id, &record).await?;
        tx.commit().await?;

        tracing::info!(
            return_id = %record.id,
            sale_id = %record.source_id,
            total = record.total,
            refund = record.refund_amount,
            "Recorded sale return"
        );
        Ok(record)
    }

    pub async fn create_purchase_return(
        &self,
        request: &PurchaseReturnRequest,
    ) -> Result<ReturnRecord, AppError> {
        let mut tx = self.begin_write().await?;
        let purchase = fetch_purchase(&mut tx, &request.purchase_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("Purchase {} not found", request.purchase_id))
            })?;
        if purchase.status != PurchaseStatus::Received {
            return Err(AppError::Conflict {
                message: format!(
                    "Purchase {} is {}; only received purchases can be returned",
                    purchase.id,
                    purchase.status.as_str()
                ),
                current_version: purchase.version,
            });
        }

        let mut received: HashMap<String, LineAggregate> = HashMap::new();
        for item in &purchase.items {
            let entry = received.entry(item.product_id.clone()).or_default();
            entry.quantity += item.quantity;
            entry.amount += item.line_total;
            entry.cost += item.line_total;
        }
        let returned = returned_quantities(&mut tx, ReturnKind::Purchase, &purchase.id).await?;

        let lines = price_lines(&request.items, &received, &returned, "purchase", |gross| gross)?;
        let total = sum_amounts(lines.iter().map(|l| l.item.line_total))?;

        let refund_amount = request.refund_amount.unwrap_or(0);
        if refund_amount > total {
            return Err(AppError::Validation(format!(
                "refundAmount {} exceeds return value {}",
                refund_amount, total
            )));
        }

        let record = ReturnRecord {
            id: uuid::Uuid::new_v4().to_string(),
            kind: ReturnKind::Purchase,
            source_id: purchase.id.clone(),
            branch_id: purchase.branch_id.clone(),
            party_id: Some(purchase.vendor_id.clone()),
            items: lines.into_iter().map(|l| l.item).collect(),
            total,
            refund_amount,
            reason: request.reason.clone(),
            created_at: now(),
        };
        insert_return(&mut tx, &record, MovementReason::PurchaseReturn, -1).await?;

        let vendor = Some(purchase.vendor_id.as_str());
        let posting = Posting::new(ReferenceType::PurchaseReturn, record.id.clone())
            .memo(format!("Return against purchase {}", purchase.id))
            .transfer(
                (Account::AccountsPayable, vendor),
                (Account::Inventory, None),
                total,
            )
            .transfer(
                (Account::Cash, None),
                (Account::AccountsPayable, vendor),
                refund_amount,
            );
        ledger::post(&mut tx, &posting).await?;

        record_upsert(&mut tx, EntityType::Return, &record.id, &record).await?;
        tx.commit().await?;

        tracing::info!(
            return_id = %record.id,
            purchase_id = %record.source_id,
            total = record.total,
            "Recorded purchase return"
        );
        Ok(record)
    }
}

/// Check each requested line against what is still returnable and value it.
///
/// `net` turns the gross amount of the returned units into the amount actually credited.
fn price_lines(
    items: &[LineItemRequest],
    source: &HashMap<String, LineAggregate>,
    returned: &HashMap<String, i64>,
    label: &str,
    net: impl Fn(i64) -> i64,
) -> Result<Vec<PricedLine>, AppError> {
    items
        .iter()
        .map(|item| {
            let line = source.get(&item.product_id).ok_or_else(|| {
                AppError::Validation(format!(
                    "Product {} is not on the {}",
                    item.product_id, label
                ))
            })?;
            let already = returned.get(&item.product_id).copied().unwrap_or(0);
            let remaining = line.quantity - already;
            if item.quantity > remaining {
                return Err(AppError::Validation(format!(
                    "Cannot return {} of product {}: only {} remaining on the {}",
                    item.quantity, item.product_id, remaining, label
                )));
            }

            let value = net(prorate(item.quantity, line.amount, line.quantity));
            Ok(PricedLine {
                item: ReturnItem {
                    product_id: item.product_id.clone(),
                    quantity: item.quantity,
                    unit_amount: value / item.quantity,
                    line_total: value,
                },
                cost: prorate(item.quantity, line.cost, line.quantity),
            })
        })
        .collect()
}

async fn returned_quantities(
    conn: &mut SqliteConnection,
    kind: ReturnKind,
    source_id: &str,
) -> Result<HashMap<String, i64>, AppError> {
    let rows = sqlx::query(
        r#"SELECT ri.product_id, SUM(ri.quantity) AS quantity
        FROM return_items ri
        JOIN returns r ON r.id = ri.return_id
        WHERE r.kind = ? AND r.source_id = ?
        GROUP BY ri.product_id"#,
    )
    .bind(kind.as_str())
    .bind(source_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows
        .iter()
        .map(|row| (row.get("product_id"), row.get("quantity")))
        .collect())
}

/// Insert the return with its lines and move stock by `direction × quantity` per line.
async fn insert_return(
    conn: &mut SqliteConnection,
    record: &ReturnRecord,
    reason: MovementReason,
    direction: i64,
) -> Result<(), AppError> {
    sqlx::query(
        r#"INSERT INTO returns (
            id, kind, source_id, branch_id, party_id, total, refund_amount, reason, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&record.id)
    .bind(record.kind.as_str())
    .bind(&record.source_id)
    .bind(&record.branch_id)
    .bind(&record.party_id)
    .bind(record.total)
    .bind(record.refund_amount)
    .bind(&record.reason)
    .bind(&record.created_at)
    .execute(&mut *conn)
    .await?;

    for (line_no, item) in record.items.iter().enumerate() {
        sqlx::query(
            "INSERT INTO return_items (return_id, line_no, product_id, quantity, unit_amount, line_total) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.id)
        .bind(line_no as i64)
        .bind(&item.product_id)
        .bind(item.quantity)
        .bind(item.unit_amount)
        .bind(item.line_total)
        .execute(&mut *conn)
        .await?;

        apply_stock_delta(
            conn,
            &record.branch_id,
            &item.product_id,
            direction * item.quantity,
            reason,
            Some(record.id.as_str()),
            record.reason.as_deref(),
        )
        .await?;
    }
    Ok(())
}

async fn fetch_return_items(
    conn: &mut SqliteConnection,
    return_id: &str,
) -> Result<Vec<ReturnItem>, AppError> {
    let rows = sqlx::query(
        "SELECT product_id, quantity, unit_amount, line_total FROM return_items WHERE return_id = ? ORDER BY line_no",
    )
    .bind(return_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows
        .iter()
        .map(|row| ReturnItem {
            product_id: row.get("product_id"),
            quantity: row.get("quantity"),
            unit_amount: row.get("unit_amount"),
            line_total: row.get("line_total"),
        })
        .collect())
}

fn return_from_row(row: &SqliteRow) -> Result<ReturnRecord, AppError> {
    let kind: String = row.get("kind");
    Ok(ReturnRecord {
        id: row.get("id"),
        kind: ReturnKind::parse(&kind)
            .ok_or_else(|| AppError::Database(format!("Unknown return kind: {}", kind)))?,
        source_id: row.get("source_id"),
        branch_id: row.get("branch_id"),
        party_id: row.get("party_id"),
        items: Vec::new(),
        total: row.get("total"),
        refund_amount: row.get("refund_amount"),
        reason: row.get("reason"),
        created_at: row.get("created_at"),
    })
}

#[cfg(test)]
mod tests {
    use crate::db::test_support::{seed_branch, seed_party, seed_product, test_repo};
    use crate::db::Repository;
    use crate::errors::AppError;
    use crate::models::*;

    async fn setup(repo: &Repository) -> (Branch, Product, Party) {
        let branch = seed_branch(repo, "MAIN").await;
        let product = seed_product(repo, "SKU-1", 60, 100).await;
        let customer = seed_party(repo, PartyKind::Customer, "Dana").await;
        repo.adjust_stock(&StockAdjustmentRequest {
            branch_id: branch.id.clone(),
            product_id: product.id.clone(),
            quantity_delta: 10,
            note: None,
        })
        .await
        .unwrap();
        (branch, product, customer)
    }

    fn line(product: &Product, quantity: i64) -> Vec<LineItemRequest> {
        vec![LineItemRequest {
            product_id: product.id.clone(),
            quantity,
        }]
    }

    #[tokio::test]
    async fn test_full_return_nets_receivable_and_restores_stock() {
        let (repo, _dir) = test_repo().await;
        let (branch, product, customer) = setup(&repo).await;

        let sale = repo
            .create_sale(&CreateSaleRequest {
                id: None,
                branch_id: branch.id.clone(),
                customer_id: Some(customer.id.clone()),
                items: vec![SaleItemRequest {
                    product_id: product.id.clone(),
                    quantity: 4,
                    unit_price: None,
                }],
                discount: 40,
                paid_amount: Some(0),
                payment_method: None,
                client_reference: None,
                notes: None,
            })
            .await
            .unwrap();
        assert_eq!(sale.total, 360);

        let record = repo
            .create_sale_return(&SaleReturnRequest {
                sale_id: sale.id.clone(),
                items: line(&product, 4),
                refund_amount: None,
                reason: Some("damaged".to_string()),
            })
            .await
            .unwrap();
        assert_eq!(record.total, 360);
        assert_eq!(record.refund_amount, 0);

        let balance = repo
            .party_balance(PartyKind::Customer, &customer.id)
            .await
            .unwrap();
        assert_eq!(balance.balance, 0);

        let levels = repo
            .list_stock_levels(&StockFilter::default())
            .await
            .unwrap();
        assert_eq!(levels[0].quantity, 10);
        assert!(repo.trial_balance().await.unwrap().balanced);

        let more = repo
            .create_sale_return(&SaleReturnRequest {
                sale_id: sale.id.clone(),
                items: line(&product, 1),
                refund_amount: None,
                reason: None,
            })
            .await;
        assert!(matches!(more, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_walk_in_return_refunds_in_full() {
        let (repo, _dir) = test_repo().await;
        let (branch, product, _) = setup(&repo).await;

        let sale = repo
            .create_sale(&CreateSaleRequest {
                id: None,
                branch_id: branch.id.clone(),
                customer_id: None,
                items: vec![SaleItemRequest {
                    product_id: product.id.clone(),
                    quantity: 2,
                    unit_price: None,
                }],
                discount: 0,
                paid_amount: None,
                payment_method: None,
                client_reference: None,
                notes: None,
            })
            .await
            .unwrap();

        let partial_refund = repo
            .create_sale_return(&SaleReturnRequest {
                sale_id: sale.id.clone(),
                items: line(&product, 1),
                refund_amount: Some(10),
                reason: None,
            })
            .await;
        assert!(matches!(partial_refund, Err(AppError::Validation(_))));

        let record = repo
            .create_sale_return(&SaleReturnRequest {
                sale_id: sale.id.clone(),
                items: line(&product, 1),
                refund_amount: None,
                reason: None,
            })
            .await
            .unwrap();
        assert_eq!(record.refund_amount, 100);
        assert_eq!(record.items[0].unit_amount, 100);
    }

    #[tokio::test]
    async fn test_purchase_return_reduces_payable() {
        let (repo, _dir) = test_repo().await;
        let branch = seed_branch(&repo, "MAIN").await;
        let product = seed_product(&repo, "SKU-1", 25, 40).await;
        let vendor = seed_party(&repo, PartyKind::Vendor, "Acme").await;

        let purchase = repo
            .create_purchase(&CreatePurchaseRequest {
                vendor_id: vendor.id.clone(),
                branch_id: branch.id.clone(),
                reference_no: None,
                items: vec![PurchaseItemRequest {
                    product_id: product.id.clone(),
                    quantity: 8,
                    unit_cost: Some(30),
                }],
                notes: None,
                receive: true,
            })
            .await
            .unwrap();

        let record = repo
            .create_purchase_return(&PurchaseReturnRequest {
                purchase_id: purchase.id.clone(),
                items: line(&product, 3),
                refund_amount: None,
                reason: None,
            })
            .await
            .unwrap();
        assert_eq!(record.total, 90);
        assert_eq!(record.party_id.as_deref(), Some(vendor.id.as_str()));

        let owed = repo
            .party_balance(PartyKind::Vendor, &vendor.id)
            .await
            .unwrap();
        assert_eq!(owed.balance, 240 - 90);

        let levels = repo
            .list_stock_levels(&StockFilter::default())
            .await
            .unwrap();
        assert_eq!(levels[0].quantity, 5);

        let listed = repo
            .list_returns(&ReturnFilter {
                kind: Some(ReturnKind::Purchase),
                source_id: None,
            })
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].items.len(), 1);
    }
}
