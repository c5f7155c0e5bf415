//! Branches, categories, products, vendors and customers.
//!
//! Updates are partial and guarded by optimistic concurrency on `version`.

use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection};

use super::repository::{check_version, new_id, now, record_delete, record_upsert, stale_write};
use super::Repository;
use crate::errors::AppError;
use crate::models::{
    Account, Branch, Category, CreateBranchRequest, CreateCategoryRequest, CreatePartyRequest,
    CreateProductRequest, EntityType, Party, PartyKind, PaymentDirection, Product, ProductFilter,
    UpdateBranchRequest, UpdateCategoryRequest, UpdatePartyRequest, UpdateProductRequest,
};

const BRANCH_COLUMNS: &str = "id, name, code, address, active, updated_at, version";
const CATEGORY_COLUMNS: &str = "id, name, parent_id, description, updated_at, version";
const PRODUCT_COLUMNS: &str = "id, sku, name, barcode, category_id, unit, cost_price, sale_price, reorder_level, description, active, updated_at, version";
const PARTY_COLUMNS: &str = "id, name, phone, email, address, notes, active, updated_at, version";

/// Longest parent chain walked when checking for category cycles.
const MAX_CATEGORY_DEPTH: usize = 64;

impl Repository {
    // ==================== BRANCH OPERATIONS ====================

    pub async fn list_branches(&self) -> Result<Vec<Branch>, AppError> {
        let mut conn = self.pool.acquire().await?;
        fetch_branches(&mut conn).await
    }

    pub async fn get_branch(&self, id: &str) -> Result<Option<Branch>, AppError> {
        let mut conn = self.pool.acquire().await?;
        fetch_branch(&mut conn, id).await
    }

    pub async fn create_branch(&self, request: &CreateBranchRequest) -> Result<Branch, AppError> {
        let branch = Branch {
            id: new_id(request.id.as_ref()),
            name: request.name.trim().to_string(),
            code: request.code.trim().to_string(),
            address: request.address.clone(),
            active: request.active,
            updated_at: now(),
            version: 1,
        };

        let mut tx = self.begin_write().await?;
        sqlx::query(
            "INSERT INTO branches (id, name, code, address, active, updated_at, version) VALUES (?, ?, ?, ?, ?, ?, 1)",
        )
        .bind(&branch.id)
        .bind(&branch.name)
        .bind(&branch.code)
        .bind(&branch.address)
        .bind(branch.active as i32)
        .bind(&branch.updated_at)
        .execute(&mut *tx)
        .await?;
        record_upsert(&mut tx, EntityType::Branch, &branch.id, &branch).await?;
        tx.commit().await?;

        tracing::info!(branch_id = %branch.id, code = %branch.code, "Created branch");
        Ok(branch)
    }

    pub async fn update_branch(
        &self,
        id: &str,
        request: &UpdateBranchRequest,
    ) -> Result<Branch, AppError> {
        let mut tx = self.begin_write().await?;
        let existing = fetch_branch(&mut tx, id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Branch {} not found", id)))?;
        check_version("Branch", id, existing.version, request.expected_version)?;

        let updated = Branch {
            id: existing.id.clone(),
            name: request.name.clone().unwrap_or(existing.name),
            code: request.code.clone().unwrap_or(existing.code),
            address: request.address.clone().or(existing.address),
            active: request.active.unwrap_or(existing.active),
            updated_at: now(),
            version: existing.version + 1,
        };

        let result = sqlx::query(
            "UPDATE branches SET name = ?, code = ?, address = ?, active = ?, updated_at = ?, version = ? WHERE id = ? AND version = ?",
        )
        .bind(&updated.name)
        .bind(&updated.code)
        .bind(&updated.address)
        .bind(updated.active as i32)
        .bind(&updated.updated_at)
        .bind(updated.version)
        .bind(id)
        .bind(existing.version)
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(stale_write(existing.version));
        }

        record_upsert(&mut tx, EntityType::Branch, id, &updated).await?;
        tx.commit().await?;
        Ok(updated)
    }

    pub async fn delete_branch(&self, id: &str) -> Result<(), AppError> {
        self.delete_row("branches", "Branch", EntityType::Branch, id)
            .await
    }

    // ==================== CATEGORY OPERATIONS ====================

    pub async fn list_categories(&self) -> Result<Vec<Category>, AppError> {
        let mut conn = self.pool.acquire().await?;
        fetch_categories(&mut conn).await
    }

    pub async fn get_category(&self, id: &str) -> Result<Option<Category>, AppError> {
        let mut conn = self.pool.acquire().await?;
        fetch_category(&mut conn, id).await
    }

    pub async fn create_category(
        &self,
        request: &CreateCategoryRequest,
    ) -> Result<Category, AppError> {
        let category = Category {
            id: new_id(request.id.as_ref()),
            name: request.name.trim().to_string(),
            parent_id: request.parent_id.clone().filter(|p| !p.is_empty()),
            description: request.description.clone(),
            updated_at: now(),
            version: 1,
        };

        let mut tx = self.begin_write().await?;
        if let Some(parent_id) = &category.parent_id {
            require_category(&mut tx, parent_id).await?;
        }
        sqlx::query(
            "INSERT INTO categories (id, name, parent_id, description, updated_at, version) VALUES (?, ?, ?, ?, ?, 1)",
        )
        .bind(&category.id)
        .bind(&category.name)
        .bind(&category.parent_id)
        .bind(&category.description)
        .bind(&category.updated_at)
        .execute(&mut *tx)
        .await?;
        record_upsert(&mut tx, EntityType::Category, &category.id, &category).await?;
        tx.commit().await?;

        tracing::info!(category_id = %category.id, "Created category");
        Ok(category)
    }

    pub async fn update_category(
        &self,
        id: &str,
        request: &UpdateCategoryRequest,
    ) -> Result<Category, AppError> {
        let mut tx = self.begin_write().await?;
        let existing = fetch_category(&mut tx, id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Category {} not found", id)))?;
        check_version("Category", id, existing.version, request.expected_version)?;

        let parent_id = request
            .parent_id
            .clone()
            .or(existing.parent_id)
            .filter(|p| !p.is_empty());
        if let Some(parent_id) = &parent_id {
            ensure_no_category_cycle(&mut tx, id, parent_id).await?;
        }

        let updated = Category {
            id: existing.id.clone(),
            name: request.name.clone().unwrap_or(existing.name),
            parent_id,
            description: request.description.clone().or(existing.description),
            updated_at: now(),
            version: existing.version + 1,
        };

        let result = sqlx::query(
            "UPDATE categories SET name = ?, parent_id = ?, description = ?, updated_at = ?, version = ? WHERE id = ? AND version = ?",
        )
        .bind(&updated.name)
        .bind(&updated.parent_id)
        .bind(&updated.description)
        .bind(&updated.updated_at)
        .bind(updated.version)
        .bind(id)
        .bind(existing.version)
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(stale_write(existing.version));
        }

        record_upsert(&mut tx, EntityType::Category, id, &updated).await?;
        tx.commit().await?;
        Ok(updated)
    }

    pub async fn delete_category(&self, id: &str) -> Result<(), AppError> {
        self.delete_row("categories", "Category", EntityType::Category, id)
            .await
    }

    // ==================== PRODUCT OPERATIONS ====================

    pub async fn list_products(&self, filter: &ProductFilter) -> Result<Vec<Product>, AppError> {
        let mut conn = self.pool.acquire().await?;
        fetch_products(&mut conn, filter).await
    }

    pub async fn get_product(&self, id: &str) -> Result<Option<Product>, AppError> {
        let mut conn = self.pool.acquire().await?;
        fetch_product(&mut conn, id).await
    }

    pub async fn create_product(
        &self,
        request: &CreateProductRequest,
    ) -> Result<Product, AppError> {
        let product = Product {
            id: new_id(request.id.as_ref()),
            sku: request.sku.trim().to_string(),
            name: request.name.trim().to_string(),
            barcode: request.barcode.clone(),
            category_id: request.category_id.clone().filter(|c| !c.is_empty()),
            unit: request.unit.clone(),
            cost_price: request.cost_price,
            sale_price: request.sale_price,
            reorder_level: request.reorder_level,
            description: request.description.clone(),
            active: request.active,
            updated_at: now(),
            version: 1,
        };

        let mut tx = self.begin_write().await?;
        if let Some(category_id) = &product.category_id {
            require_category(&mut tx, category_id).await?;
        }
        sqlx::query(
            r#"INSERT INTO products (
                id, sku, name, barcode, category_id, unit, cost_price, sale_price,
                reorder_level, description, active, updated_at, version
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 1)"#,
        )
        .bind(&product.id)
        .bind(&product.sku)
        .bind(&product.name)
        .bind(&product.barcode)
        .bind(&product.category_id)
        .bind(&product.unit)
        .bind(product.cost_price)
        .bind(product.sale_price)
        .bind(product.reorder_level)
        .bind(&product.description)
        .bind(product.active as i32)
        .bind(&product.updated_at)
        .execute(&mut *tx)
        .await?;
        record_upsert(&mut tx, EntityType::Product, &product.id, &product).await?;
        tx.commit().await?;

        tracing::info!(product_id = %product.id, sku = %product.sku, "Created product");
        Ok(product)
    }

    pub async fn update_product(
        &self,
        id: &str,
        request: &UpdateProductRequest,
    ) -> Result<Product, AppError> {
        let mut tx = self.begin_write().await?;
        let existing = fetch_product(&mut tx, id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Product {} not found", id)))?;
        check_version("Product", id, existing.version, request.expected_version)?;

        let category_id = request
            .category_id
            .clone()
            .or(existing.category_id)
            .filter(|c| !c.is_empty());
        if let Some(category_id) = &category_id {
            require_category(&mut tx, category_id).await?;
        }

        let updated = Product {
            id: existing.id.clone(),
            sku: request.sku.clone().unwrap_or(existing.sku),
            name: request.name.clone().unwrap_or(existing.name),
            barcode: request.barcode.clone().or(existing.barcode),
            category_id,
            unit: request.unit.clone().unwrap_or(existing.unit),
            cost_price: request.cost_price.unwrap_or(existing.cost_price),
            sale_price: request.sale_price.unwrap_or(existing.sale_price),
            reorder_level: request.reorder_level.unwrap_or(existing.reorder_level),
            description: request.description.clone().or(existing.description),
            active: request.active.unwrap_or(existing.active),
            updated_at: now(),
            version: existing.version + 1,
        };

        let result = sqlx::query(
            r#"UPDATE products SET
                sku = ?, name = ?, barcode = ?, category_id = ?, unit = ?, cost_price = ?,
                sale_price = ?, reorder_level = ?, description = ?, active = ?, updated_at = ?,
                version = ?
            WHERE id = ? AND version = ?"#,
        )
        .bind(&updated.sku)
        .bind(&updated.name)
        .bind(&updated.barcode)
        .bind(&updated.category_id)
        .bind(&updated.unit)
        .bind(updated.cost_price)
        .bind(updated.sale_price)
        .bind(updated.reorder_level)
        .bind(&updated.description)
        .bind(updated.active as i32)
        .bind(&updated.updated_at)
        .bind(updated.version)
        .bind(id)
        .bind(existing.version)
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(stale_write(existing.version));
        }

        record_upsert(&mut tx, EntityType::Product, id, &updated).await?;
        tx.commit().await?;
        Ok(updated)
    }

    pub async fn delete_product(&self, id: &str) -> Result<(), AppError> {
        self.delete_row("products", "Product", EntityType::Product, id)
            .await
    }

    // ==================== VENDOR / CUSTOMER OPERATIONS ====================

    pub async fn list_parties(&self, kind: PartyKind) -> Result<Vec<Party>, AppError> {
        let mut conn = self.pool.acquire().await?;
        fetch_parties(&mut conn, kind).await
    }

    pub async fn get_party(&self, kind: PartyKind, id: &str) -> Result<Option<Party>, AppError> {
        let mut conn = self.pool.acquire().await?;
        fetch_party(&mut conn, kind, id).await
    }

    pub async fn create_party(
        &self,
        kind: PartyKind,
        request: &CreatePartyRequest,
    ) -> Result<Party, AppError> {
        let party = Party {
            id: new_id(request.id.as_ref()),
            name: request.name.trim().to_string(),
            phone: request.phone.clone(),
            email: request.email.clone(),
            address: request.address.clone(),
            notes: request.notes.clone(),
            active: request.active,
            updated_at: now(),
            version: 1,
        };

        let sql = format!(
            "INSERT INTO {} (id, name, phone, email, address, notes, active, updated_at, version) VALUES (?, ?, ?, ?, ?, ?, ?, ?, 1)",
            kind.table()
        );
        let mut tx = self.begin_write().await?;
        sqlx::query(&sql)
            .bind(&party.id)
            .bind(&party.name)
            .bind(&party.phone)
            .bind(&party.email)
            .bind(&party.address)
            .bind(&party.notes)
            .bind(party.active as i32)
            .bind(&party.updated_at)
            .execute(&mut *tx)
            .await?;
        record_upsert(&mut tx, party_entity(kind), &party.id, &party).await?;
        tx.commit().await?;

        tracing::info!(party_id = %party.id, kind = kind.label(), "Created party");
        Ok(party)
    }

    pub async fn update_party(
        &self,
        kind: PartyKind,
        id: &str,
        request: &UpdatePartyRequest,
    ) -> Result<Party, AppError> {
        let mut tx = self.begin_write().await?;
        let existing = fetch_party(&mut tx, kind, id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("{} {} not found", kind.label(), id)))?;
        check_version(kind.label(), id, existing.version, request.expected_version)?;

        let updated = Party {
            id: existing.id.clone(),
            name: request.name.clone().unwrap_or(existing.name),
            phone: request.phone.clone().or(existing.phone),
            email: request.email.clone().or(existing.email),
            address: request.address.clone().or(existing.address),
            notes: request.notes.clone().or(existing.notes),
            active: request.active.unwrap_or(existing.active),
            updated_at: now(),
            version: existing.version + 1,
        };

        let sql = format!(
            "UPDATE {} SET name = ?, phone = ?, email = ?, address = ?, notes = ?, active = ?, updated_at = ?, version = ? WHERE id = ? AND version = ?",
            kind.table()
        );
        let result = sqlx::query(&sql)
            .bind(&updated.name)
            .bind(&updated.phone)
            .bind(&updated.email)
            .bind(&updated.address)
            .bind(&updated.notes)
            .bind(updated.active as i32)
            .bind(&updated.updated_at)
            .bind(updated.version)
            .bind(id)
            .bind(existing.version)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(stale_write(existing.version));
        }

        record_upsert(&mut tx, party_entity(kind), id, &updated).await?;
        tx.commit().await?;
        Ok(updated)
    }

    /// Payments and ledger lines carry the party id without a foreign key, so they are
    /// checked here before the row goes.
    pub async fn delete_party(&self, kind: PartyKind, id: &str) -> Result<(), AppError> {
        let (direction, account) = match kind {
            PartyKind::Customer => (PaymentDirection::Incoming, Account::AccountsReceivable),
            PartyKind::Vendor => (PaymentDirection::Outgoing, Account::AccountsPayable),
        };

        let mut tx = self.begin_write().await?;
        let references: i64 = sqlx::query_scalar(
            r#"SELECT
                (SELECT COUNT(*) FROM payments WHERE party_id = ? AND direction = ?)
              + (SELECT COUNT(*) FROM ledger_entries WHERE party_id = ? AND account = ?)"#,
        )
        .bind(id)
        .bind(direction.as_str())
        .bind(id)
        .bind(account.as_str())
        .fetch_one(&mut *tx)
        .await?;
        if references > 0 {
            return Err(AppError::Constraint(format!(
                "{} {} has payments or ledger entries and cannot be deleted",
                kind.label(),
                id
            )));
        }

        delete_row_in(&mut tx, kind.table(), kind.label(), party_entity(kind), id).await?;
        tx.commit().await?;

        tracing::info!(id = %id, "Deleted {}", kind.label().to_lowercase());
        Ok(())
    }

    /// Hard delete; rows still referenced elsewhere fail with a constraint error.
    async fn delete_row(
        &self,
        table: &str,
        label: &str,
        entity_type: EntityType,
        id: &str,
    ) -> Result<(), AppError> {
        let mut tx = self.begin_write().await?;
        delete_row_in(&mut tx, table, label, entity_type, id).await?;
        tx.commit().await?;

        tracing::info!(id = %id, "Deleted {}", label.to_lowercase());
        Ok(())
    }
}

pub(super) fn party_entity(kind: PartyKind) -> EntityType {
    match kind {
        PartyKind::Vendor => EntityType::Vendor,
        PartyKind::Customer => EntityType::Customer,
    }
}

// Connection-level fetches shared with the transactional modules

pub(super) async fn fetch_branches(conn: &mut SqliteConnection) -> Result<Vec<Branch>, AppError> {
    let sql = format!("SELECT {} FROM branches ORDER BY name", BRANCH_COLUMNS);
    let rows = sqlx::query(&sql).fetch_all(&mut *conn).await?;
    Ok(rows.iter().map(branch_from_row).collect())
}

pub(super) async fn fetch_branch(
    conn: &mut SqliteConnection,
    id: &str,
) -> Result<Option<Branch>, AppError> {
    let sql = format!("SELECT {} FROM branches WHERE id = ?", BRANCH_COLUMNS);
    let row = sqlx::query(&sql).bind(id).fetch_optional(&mut *conn).await?;
    Ok(row.as_ref().map(branch_from_row))
}

pub(super) async fn require_branch(
    conn: &mut SqliteConnection,
    id: &str,
) -> Result<Branch, AppError> {
    fetch_branch(conn, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Branch {} not found", id)))
}

pub(super) async fn fetch_categories(
    conn: &mut SqliteConnection,
) -> Result<Vec<Category>, AppError> {
    let sql = format!("SELECT {} FROM categories ORDER BY name", CATEGORY_COLUMNS);
    let rows = sqlx::query(&sql).fetch_all(&mut *conn).await?;
    Ok(rows.iter().map(category_from_row).collect())
}

pub(super) async fn fetch_category(
    conn: &mut SqliteConnection,
    id: &str,
) -> Result<Option<Category>, AppError> {
    let sql = format!("SELECT {} FROM categories WHERE id = ?", CATEGORY_COLUMNS);
    let row = sqlx::query(&sql).bind(id).fetch_optional(&mut *conn).await?;
    Ok(row.as_ref().map(category_from_row))
}

async fn require_category(conn: &mut SqliteConnection, id: &str) -> Result<Category, AppError> {
    fetch_category(conn, id)
        .await?
        .ok_or_else(|| AppError::Validation(format!("Category {} does not exist", id)))
}

/// Walk up from `parent_id`; reaching `id` would make the category its own ancestor.
async fn delete_row_in(
    conn: &mut SqliteConnection,
    table: &str,
    label: &str,
    entity_type: EntityType,
    id: &str,
) -> Result<(), AppError> {
    let sql = format!("DELETE FROM {} WHERE id = ?", table);
    let result = sqlx::query(&sql).bind(id).execute(&mut *conn).await?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("{} {} not found", label, id)));
    }
    record_delete(conn, entity_type, id).await
}

async fn ensure_no_category_cycle(
    conn: &mut SqliteConnection,
    id: &str,
    parent_id: &str,
) -> Result<(), AppError> {
    let mut current = Some(parent_id.to_string());
    for _ in 0..MAX_CATEGORY_DEPTH {
        let Some(candidate) = current else {
            return Ok(());
        };
        if candidate == id {
            return Err(AppError::Validation(
                "A category cannot be nested under itself".to_string(),
            ));
        }
        current = require_category(conn, &candidate).await?.parent_id;
    }
    Err(AppError::Validation(
        "Category hierarchy is too deep".to_string(),
    ))
}

pub(super) async fn fetch_products(
    conn: &mut SqliteConnection,
    filter: &ProductFilter,
) -> Result<Vec<Product>, AppError> {
    let mut query: QueryBuilder<Sqlite> =
        QueryBuilder::new(format!("SELECT {} FROM products WHERE 1 = 1", PRODUCT_COLUMNS));
    if let Some(category_id) = &filter.category_id {
        query.push(" AND category_id = ").push_bind(category_id.clone());
    }
    if let Some(active) = filter.active {
        query.push(" AND active = ").push_bind(active as i32);
    }
    query.push(" ORDER BY name");

    let rows = query.build().fetch_all(&mut *conn).await?;
    Ok(rows.iter().map(product_from_row).collect())
}

pub(super) async fn fetch_product(
    conn: &mut SqliteConnection,
    id: &str,
) -> Result<Option<Product>, AppError> {
    let sql = format!("SELECT {} FROM products WHERE id = ?", PRODUCT_COLUMNS);
    let row = sqlx::query(&sql).bind(id).fetch_optional(&mut *conn).await?;
    Ok(row.as_ref().map(product_from_row))
}

pub(super) async fn require_product(
    conn: &mut SqliteConnection,
    id: &str,
) -> Result<Product, AppError> {
    fetch_product(conn, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Product {} not found", id)))
}

pub(super) async fn fetch_parties(
    conn: &mut SqliteConnection,
    kind: PartyKind,
) -> Result<Vec<Party>, AppError> {
    let sql = format!("SELECT {} FROM {} ORDER BY name", PARTY_COLUMNS, kind.table());
    let rows = sqlx::query(&sql).fetch_all(&mut *conn).await?;
    Ok(rows.iter().map(party_from_row).collect())
}

pub(super) async fn fetch_party(
    conn: &mut SqliteConnection,
    kind: PartyKind,
    id: &str,
) -> Result<Option<Party>, AppError> {
    let sql = format!("SELECT {} FROM {} WHERE id = ?", PARTY_COLUMNS, kind.table());
    let row = sqlx::query(&sql).bind(id).fetch_optional(&mut *conn).await?;
    Ok(row.as_ref().map(party_from_row))
}

pub(super) async fn require_party(
    conn: &mut SqliteConnection,
    kind: PartyKind,
    id: &str,
) -> Result<Party, AppError> {
    fetch_party(conn, kind, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("{} {} not found", kind.label(), id)))
}

// Helper functions for row conversion

fn branch_from_row(row: &SqliteRow) -> Branch {
    let active: i32 = row.get("active");
    Branch {
        id: row.get("id"),
        name: row.get("name"),
        code: row.get("code"),
        address: row.get("address"),
        active: active != 0,
        updated_at: row.get("updated_at"),
        version: row.get("version"),
    }
}

fn category_from_row(row: &SqliteRow) -> Category {
    Category {
        id: row.get("id"),
        name: row.get("name"),
        parent_id: row.get("parent_id"),
        description: row.get("description"),
        updated_at: row.get("updated_at"),
        version: row.get("version"),
    }
}

pub(super) fn product_from_row(row: &SqliteRow) -> Product {
    let active: i32 = row.get("active");
    Product {
        id: row.get("id"),
        sku: row.get("sku"),
        name: row.get("name"),
        barcode: row.get("barcode"),
        category_id: row.get("category_id"),
        unit: row.get("unit"),
        cost_price: row.get("cost_price"),
        sale_price: row.get("sale_price"),
        reorder_level: row.get("reorder_level"),
        description: row.get("description"),
        active: active != 0,
        updated_at: row.get("updated_at"),
        version: row.get("version"),
    }
}

fn party_from_row(row: &SqliteRow) -> Party {
    let active: i32 = row.get("active");
    Party {
        id: row.get("id"),
        name: row.get("name"),
        phone: row.get("phone"),
        email: row.get("email"),
        address: row.get("address"),
        notes: row.get("notes"),
        active: active != 0,
        updated_at: row.get("updated_at"),
        version: row.get("version"),
    }
}

#[cfg(test)]
mod tests {
    use crate::db::test_support::{seed_party, test_repo};
    use crate::errors::AppError;
    use crate::models::*;

    fn product_request(sku: &str) -> CreateProductRequest {
        serde_json::from_value(serde_json::json!({
            "sku": sku,
            "name": format!("Product {}", sku),
            "costPrice": 100,
            "salePrice": 150
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_duplicate_sku_is_constraint_error() {
        let (repo, _dir) = test_repo().await;
        repo.create_product(&product_request("SKU-1")).await.unwrap();

        let err = repo.create_product(&product_request("SKU-1")).await.unwrap_err();
        assert!(matches!(err, AppError::Constraint(_)));
        // the failed insert rolled back its revision bump
        assert_eq!(repo.get_revision_id().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_update_bumps_version_and_detects_stale_writes() {
        let (repo, _dir) = test_repo().await;
        let product = repo.create_product(&product_request("SKU-2")).await.unwrap();

        let updated = repo
            .update_product(
                &product.id,
                &UpdateProductRequest {
                    sale_price: Some(175),
                    expected_version: Some(1),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.version, 2);
        assert_eq!(updated.sale_price, 175);
        assert_eq!(updated.cost_price, 100);

        let stale = repo
            .update_product(
                &product.id,
                &UpdateProductRequest {
                    name: Some("Stale".to_string()),
                    expected_version: Some(1),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(
            stale,
            Err(AppError::Conflict {
                current_version: 2,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_category_cycle_rejected() {
        let (repo, _dir) = test_repo().await;
        let parent = repo
            .create_category(&CreateCategoryRequest {
                id: None,
                name: "Food".to_string(),
                parent_id: None,
                description: None,
            })
            .await
            .unwrap();
        let child = repo
            .create_category(&CreateCategoryRequest {
                id: None,
                name: "Dairy".to_string(),
                parent_id: Some(parent.id.clone()),
                description: None,
            })
            .await
            .unwrap();

        let err = repo
            .update_category(
                &parent.id,
                &UpdateCategoryRequest {
                    parent_id: Some(child.id.clone()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_delete_referenced_category_is_constraint_error() {
        let (repo, _dir) = test_repo().await;
        let category = repo
            .create_category(&CreateCategoryRequest {
                id: Some("cat-1".to_string()),
                name: "Drinks".to_string(),
                parent_id: None,
                description: None,
            })
            .await
            .unwrap();
        let mut request = product_request("SKU-3");
        request.category_id = Some(category.id.clone());
        repo.create_product(&request).await.unwrap();

        let err = repo.delete_category(&category.id).await.unwrap_err();
        assert!(matches!(err, AppError::Constraint(_)));
        assert!(repo.get_category("cat-1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_delete_party_with_payments_is_constraint_error() {
        let (repo, _dir) = test_repo().await;
        let customer = seed_party(&repo, PartyKind::Customer, "Corner Cafe").await;
        repo.create_payment(&CreatePaymentRequest {
            direction: PaymentDirection::Incoming,
            party_id: customer.id.clone(),
            amount: 500,
            method: "cash".to_string(),
            reference: None,
            note: None,
        })
        .await
        .unwrap();
        let revision = repo.get_revision_id().await.unwrap();

        let err = repo
            .delete_party(PartyKind::Customer, &customer.id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Constraint(_)));
        assert!(repo
            .get_party(PartyKind::Customer, &customer.id)
            .await
            .unwrap()
            .is_some());
        assert_eq!(repo.get_revision_id().await.unwrap(), revision);

        // an unreferenced party still goes
        let idle = seed_party(&repo, PartyKind::Customer, "Passer-by").await;
        repo.delete_party(PartyKind::Customer, &idle.id).await.unwrap();
        assert!(repo
            .get_party(PartyKind::Customer, &idle.id)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_parties_are_kept_apart() {
        let (repo, _dir) = test_repo().await;
        let vendor = repo
            .create_party(
                PartyKind::Vendor,
                &CreatePartyRequest {
                    id: None,
                    name: "Acme Wholesale".to_string(),
                    phone: None,
                    email: None,
                    address: None,
                    notes: None,
                    active: true,
                },
            )
            .await
            .unwrap();

        assert!(repo
            .get_party(PartyKind::Customer, &vendor.id)
            .await
            .unwrap()
            .is_none());
        assert_eq!(repo.list_parties(PartyKind::Vendor).await.unwrap().len(), 1);
        assert!(matches!(
            repo.delete_party(PartyKind::Customer, &vendor.id).await,
            Err(AppError::NotFound(_))
        ));
    }
}
