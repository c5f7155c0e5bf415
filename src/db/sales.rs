//! Point-of-sale transactions.

use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection};

use super::catalog::{require_branch, require_party, require_product};
use super::ledger;
use super::repository::{new_id, now, record_upsert};
use super::stock::apply_stock_delta;
use super::Repository;
use crate::errors::AppError;
use crate::models::common::{line_total, sum_amounts};
use crate::models::{
    Account, CreateSaleRequest, EntityType, MovementReason, PartyKind, Posting, ReferenceType,
    Sale, SaleFilter, SaleItem,
};

const SALE_COLUMNS: &str = "id, branch_id, customer_id, subtotal, discount, total, paid_amount, payment_method, client_reference, notes, created_at";

impl Repository {
    pub async fn list_sales(&self, filter: &SaleFilter) -> Result<Vec<Sale>, AppError> {
        let mut conn = self.pool.acquire().await?;
        let mut query: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {} FROM sales WHERE 1 = 1", SALE_COLUMNS));
        if let Some(branch_id) = &filter.branch_id {
            query.push(" AND branch_id = ").push_bind(branch_id.clone());
        }
        if let Some(customer_id) = &filter.customer_id {
            query.push(" AND customer_id = ").push_bind(customer_id.clone());
        }
        query.push(" ORDER BY created_at DESC");

        let rows = query.build().fetch_all(&mut *conn).await?;
        let mut sales = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut sale = sale_from_row(row);
            sale.items = fetch_sale_items(&mut conn, &sale.id).await?;
            sales.push(sale);
        }
        Ok(sales)
    }

    pub async fn get_sale(&self, id: &str) -> Result<Option<Sale>, AppError> {
        let mut conn = self.pool.acquire().await?;
        fetch_sale(&mut conn, id).await
    }

    /// Record a sale. A repeated `clientReference` returns the sale already recorded.
    pub async fn create_sale(&self, request: &CreateSaleRequest) -> Result<Sale, AppError> {
        if let Some(existing) = self.find_by_client_reference(request).await? {
            tracing::debug!(sale_id = %existing.id, "Sale already recorded for client reference");
            return Ok(existing);
        }

        match self.insert_sale(request).await {
            // lost a race with another submission of the same reference
            Err(AppError::Constraint(message)) => match self.find_by_client_reference(request).await? {
                Some(existing) => Ok(existing),
                None => Err(AppError::Constraint(message)),
            },
            result => result,
        }
    }

    async fn find_by_client_reference(
        &self,
        request: &CreateSaleRequest,
    ) -> Result<Option<Sale>, AppError> {
        let Some(reference) = request
            .client_reference
            .as_deref()
            .filter(|r| !r.trim().is_empty())
        else {
            return Ok(None);
        };

        let mut conn = self.pool.acquire().await?;
        let sql = format!("SELECT {} FROM sales WHERE client_reference = ?", SALE_COLUMNS);
        let Some(row) = sqlx::query(&sql)
            .bind(reference)
            .fetch_optional(&mut *conn)
            .await?
        else {
            return Ok(None);
        };
        let mut sale = sale_from_row(&row);
        sale.items = fetch_sale_items(&mut conn, &sale.id).await?;
        Ok(Some(sale))
    }

    async fn insert_sale(&self, request: &CreateSaleRequest) -> Result<Sale, AppError> {
        let mut tx = self.begin_write().await?;
        require_branch(&mut tx, &request.branch_id).await?;
        if let Some(customer_id) = &request.customer_id {
            require_party(&mut tx, PartyKind::Customer, customer_id).await?;
        }

        let mut items = Vec::with_capacity(request.items.len());
        for item in &request.items {
            let product = require_product(&mut tx, &item.product_id).await?;
            let unit_price = item.unit_price.unwrap_or(product.sale_price);
            items.push(SaleItem {
                product_id: item.product_id.clone(),
                quantity: item.quantity,
                unit_price,
                unit_cost: product.cost_price,
                line_total: line_total(item.quantity, unit_price)?,
            });
        }

        let subtotal = sum_amounts(items.iter().map(|i| i.line_total))?;
        if request.discount > subtotal {
            return Err(AppError::Validation(format!(
                "Discount {} exceeds subtotal {}",
                request.discount, subtotal
            )));
        }
        let total = subtotal - request.discount;
        let paid_amount = request.settle(total)?;
        let cost = items
            .iter()
            .map(|i| line_total(i.quantity, i.unit_cost))
            .collect::<Result<Vec<_>, _>>()
            .and_then(sum_amounts)?;

        let sale = Sale {
            id: new_id(request.id.as_ref()),
            branch_id: request.branch_id.clone(),
            customer_id: request.customer_id.clone(),
            items,
            subtotal,
            discount: request.discount,
            total,
            paid_amount,
            payment_method: request.payment_method.clone(),
            client_reference: request
                .client_reference
                .clone()
                .filter(|r| !r.trim().is_empty()),
            notes: request.notes.clone(),
            created_at: now(),
        };

        sqlx::query(
            r#"INSERT INTO sales (
                id, branch_id, customer_id, subtotal, discount, total, paid_amount,
                payment_method, client_reference, notes, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&sale.id)
        .bind(&sale.branch_id)
        .bind(&sale.customer_id)
        .bind(sale.subtotal)
        .bind(sale.discount)
        .bind(sale.total)
        .bind(sale.paid_amount)
        .bind(&sale.payment_method)
        .bind(&sale.client_reference)
        .bind(&sale.notes)
        .bind(&sale.created_at)
        .execute(&mut *tx)
        .await?;

        for (line_no, item) in sale.items.iter().enumerate() {
            sqlx::query(
                "INSERT INTO sale_items (sale_id, line_no, product_id, quantity, unit_price, unit_cost, line_total) VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&sale.id)
            .bind(line_no as i64)
            .bind(&item.product_id)
            .bind(item.quantity)
            .bind(item.unit_price)
            .bind(item.unit_cost)
            .bind(item.line_total)
            .execute(&mut *tx)
            .await?;

            apply_stock_delta(
                &mut tx,
                &sale.branch_id,
                &item.product_id,
                -item.quantity,
                MovementReason::Sale,
                Some(sale.id.as_str()),
                None,
            )
            .await?;
        }

        let customer = sale.customer_id.as_deref();
        let posting = Posting::new(ReferenceType::Sale, sale.id.clone())
            .memo("Sale")
            .transfer(
                (Account::AccountsReceivable, customer),
                (Account::SalesRevenue, None),
                sale.total,
            )
            .transfer(
                (Account::CostOfGoodsSold, None),
                (Account::Inventory, None),
                cost,
            )
            .transfer(
                (Account::Cash, None),
                (Account::AccountsReceivable, customer),
                sale.paid_amount,
            );
        ledger::post(&mut tx, &posting).await?;

        record_upsert(&mut tx, EntityType::Sale, &sale.id, &sale).await?;
        tx.commit().await?;

        tracing::info!(
            sale_id = %sale.id,
            branch_id = %sale.branch_id,
            total = sale.total,
            paid = sale.paid_amount,
            "Recorded sale"
        );
        Ok(sale)
    }
}

pub(super) async fn fetch_sale(
    conn: &mut SqliteConnection,
    id: &str,
) -> Result<Option<Sale>, AppError> {
    let sql = format!("SELECT {} FROM sales WHERE id = ?", SALE_COLUMNS);
    let Some(row) = sqlx::query(&sql).bind(id).fetch_optional(&mut *conn).await? else {
        return Ok(None);
    };
    let mut sale = sale_from_row(&row);
    sale.items = fetch_sale_items(conn, id).await?;
    Ok(Some(sale))
}

async fn fetch_sale_items(
    conn: &mut SqliteConnection,
    sale_id: &str,
) -> Result<Vec<SaleItem>, AppError> {
    let rows = sqlx::query(
        "SELECT product_id, quantity, unit_price, unit_cost, line_total FROM sale_items WHERE sale_id = ? ORDER BY line_no",
    )
    .bind(sale_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows
        .iter()
        .map(|row| SaleItem {
            product_id: row.get("product_id"),
            quantity: row.get("quantity"),
            unit_price: row.get("unit_price"),
            unit_cost: row.get("unit_cost"),
            line_total: row.get("line_total"),
        })
        .collect())
}

fn sale_from_row(row: &SqliteRow) -> Sale {
    Sale {
        id: row.get("id"),
        branch_id: row.get("branch_id"),
        customer_id: row.get("customer_id"),
        items: Vec::new(),
        subtotal: row.get("subtotal"),
        discount: row.get("discount"),
        total: row.get("total"),
        paid_amount: row.get("paid_amount"),
        payment_method: row.get("payment_method"),
        client_reference: row.get("client_reference"),
        notes: row.get("notes"),
        created_at: row.get("created_at"),
    }
}

#[cfg(test)]
mod tests {
    use crate::db::test_support::{seed_branch, seed_party, seed_product, test_repo};
    use crate::errors::AppError;
    use crate::models::*;

    async fn stocked(repo: &crate::db::Repository, qty: i64) -> (Branch, Product) {
        let branch = seed_branch(repo, "MAIN").await;
        let product = seed_product(repo, "SKU-1", 60, 100).await;
        repo.adjust_stock(&StockAdjustmentRequest {
            branch_id: branch.id.clone(),
            product_id: product.id.clone(),
            quantity_delta: qty,
            note: None,
        })
        .await
        .unwrap();
        (branch, product)
    }

    fn sale(branch: &Branch, product: &Product, quantity: i64) -> CreateSaleRequest {
        CreateSaleRequest {
            id: None,
            branch_id: branch.id.clone(),
            customer_id: None,
            items: vec![SaleItemRequest {
                product_id: product.id.clone(),
                quantity,
                unit_price: None,
            }],
            discount: 0,
            paid_amount: None,
            payment_method: Some("cash".to_string()),
            client_reference: None,
            notes: None,
        }
    }

    #[tokio::test]
    async fn test_credit_sale_books_receivable() {
        let (repo, _dir) = test_repo().await;
        let (branch, product) = stocked(&repo, 10).await;
        let customer = seed_party(&repo, PartyKind::Customer, "Dana").await;

        let mut request = sale(&branch, &product, 3);
        request.customer_id = Some(customer.id.clone());
        request.discount = 50;
        request.paid_amount = Some(100);

        let recorded = repo.create_sale(&request).await.unwrap();
        assert_eq!(recorded.subtotal, 300);
        assert_eq!(recorded.total, 250);
        assert_eq!(recorded.items[0].unit_cost, 60);

        let balance = repo
            .party_balance(PartyKind::Customer, &customer.id)
            .await
            .unwrap();
        assert_eq!(balance.balance, 150);

        let levels = repo
            .list_stock_levels(&StockFilter::default())
            .await
            .unwrap();
        assert_eq!(levels[0].quantity, 7);
        assert!(repo.trial_balance().await.unwrap().balanced);
    }

    #[tokio::test]
    async fn test_oversell_leaves_no_trace() {
        let (repo, _dir) = test_repo().await;
        let (branch, product) = stocked(&repo, 2).await;
        let revision = repo.get_revision_id().await.unwrap();

        let err = repo.create_sale(&sale(&branch, &product, 3)).await.unwrap_err();
        assert!(matches!(err, AppError::InsufficientStock { available: 2, .. }));

        assert_eq!(repo.get_revision_id().await.unwrap(), revision);
        assert!(repo.list_sales(&SaleFilter::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_client_reference_is_idempotent() {
        let (repo, _dir) = test_repo().await;
        let (branch, product) = stocked(&repo, 5).await;

        let mut request = sale(&branch, &product, 1);
        request.client_reference = Some("till-1-0042".to_string());

        let first = repo.create_sale(&request).await.unwrap();
        let revision = repo.get_revision_id().await.unwrap();
        let second = repo.create_sale(&request).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(repo.get_revision_id().await.unwrap(), revision);
        let levels = repo
            .list_stock_levels(&StockFilter::default())
            .await
            .unwrap();
        assert_eq!(levels[0].quantity, 4);
    }

    #[tokio::test]
    async fn test_discount_above_subtotal_rejected() {
        let (repo, _dir) = test_repo().await;
        let (branch, product) = stocked(&repo, 5).await;

        let mut request = sale(&branch, &product, 1);
        request.discount = 101;
        let err = repo.create_sale(&request).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }
}
