//! Database module for SQLite persistence.
//!
//! SQLite is the source of truth for all application data. Every write runs in one
//! transaction that also bumps the revision counter and appends to the changelog.

mod catalog;
mod ledger;
mod payments;
mod purchases;
mod repository;
mod returns;
mod sales;
mod stock;
mod sync;

#[cfg(test)]
pub(crate) mod test_support;

pub use repository::*;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

/// Current schema version stored in `meta`.
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database connection pool and run migrations.
pub async fn init_database(db_path: &Path) -> Result<SqlitePool, sqlx::Error> {
    if let Some(parent) = db_path.parent() {
        tokio::fs::create_dir_all(parent).await.ok();
    }

    let db_url = format!("sqlite:{}?mode=rwc", db_path.display());

    let options = SqliteConnectOptions::from_str(&db_url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
        .busy_timeout(std::time::Duration::from_secs(30));

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    run_migrations(&pool).await?;

    Ok(pool)
}

/// Run database migrations.
async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS meta (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            schema_version INTEGER NOT NULL DEFAULT 1,
            revision_id INTEGER NOT NULL DEFAULT 0,
            generated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        INSERT OR IGNORE INTO meta (id, schema_version, revision_id, generated_at)
        VALUES (1, 1, 0, datetime('now'));
        "#,
    )
    .execute(pool)
    .await?;

    // Catalog
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS branches (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            code TEXT NOT NULL UNIQUE,
            address TEXT,
            active INTEGER NOT NULL DEFAULT 1,
            updated_at TEXT NOT NULL,
            version INTEGER NOT NULL DEFAULT 1
        );

        CREATE TABLE IF NOT EXISTS categories (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            parent_id TEXT REFERENCES categories(id),
            description TEXT,
            updated_at TEXT NOT NULL,
            version INTEGER NOT NULL DEFAULT 1
        );

        CREATE TABLE IF NOT EXISTS products (
            id TEXT PRIMARY KEY,
            sku TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            barcode TEXT,
            category_id TEXT REFERENCES categories(id),
            unit TEXT NOT NULL,
            cost_price INTEGER NOT NULL DEFAULT 0 CHECK (cost_price >= 0),
            sale_price INTEGER NOT NULL DEFAULT 0 CHECK (sale_price >= 0),
            reorder_level INTEGER NOT NULL DEFAULT 0,
            description TEXT,
            active INTEGER NOT NULL DEFAULT 1,
            updated_at TEXT NOT NULL,
            version INTEGER NOT NULL DEFAULT 1
        );

        CREATE TABLE IF NOT EXISTS vendors (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            phone TEXT,
            email TEXT,
            address TEXT,
            notes TEXT,
            active INTEGER NOT NULL DEFAULT 1,
            updated_at TEXT NOT NULL,
            version INTEGER NOT NULL DEFAULT 1
        );

        CREATE TABLE IF NOT EXISTS customers (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            phone TEXT,
            email TEXT,
            address TEXT,
            notes TEXT,
            active INTEGER NOT NULL DEFAULT 1,
            updated_at TEXT NOT NULL,
            version INTEGER NOT NULL DEFAULT 1
        );
        "#,
    )
    .execute(pool)
    .await?;

    // Stock
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS stock_levels (
            branch_id TEXT NOT NULL REFERENCES branches(id),
            product_id TEXT NOT NULL REFERENCES products(id),
            quantity INTEGER NOT NULL CHECK (quantity >= 0),
            updated_at TEXT NOT NULL,
            PRIMARY KEY (branch_id, product_id)
        );

        CREATE TABLE IF NOT EXISTS stock_movements (
            id TEXT PRIMARY KEY,
            branch_id TEXT NOT NULL REFERENCES branches(id),
            product_id TEXT NOT NULL REFERENCES products(id),
            quantity_delta INTEGER NOT NULL,
            reason TEXT NOT NULL,
            reference_id TEXT,
            note TEXT,
            created_at TEXT NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;

    // Trade documents
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS purchases (
            id TEXT PRIMARY KEY,
            vendor_id TEXT NOT NULL REFERENCES vendors(id),
            branch_id TEXT NOT NULL REFERENCES branches(id),
            reference_no TEXT,
            status TEXT NOT NULL,
            total INTEGER NOT NULL,
            notes TEXT,
            created_at TEXT NOT NULL,
            received_at TEXT,
            version INTEGER NOT NULL DEFAULT 1
        );

        CREATE TABLE IF NOT EXISTS purchase_items (
            purchase_id TEXT NOT NULL REFERENCES purchases(id) ON DELETE CASCADE,
            line_no INTEGER NOT NULL,
            product_id TEXT NOT NULL REFERENCES products(id),
            quantity INTEGER NOT NULL CHECK (quantity > 0),
            unit_cost INTEGER NOT NULL,
            line_total INTEGER NOT NULL,
            PRIMARY KEY (purchase_id, line_no)
        );

        CREATE TABLE IF NOT EXISTS sales (
            id TEXT PRIMARY KEY,
            branch_id TEXT NOT NULL REFERENCES branches(id),
            customer_id TEXT REFERENCES customers(id),
            subtotal INTEGER NOT NULL,
            discount INTEGER NOT NULL DEFAULT 0,
            total INTEGER NOT NULL,
            paid_amount INTEGER NOT NULL,
            payment_method TEXT,
            client_reference TEXT UNIQUE,
            notes TEXT,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS sale_items (
            sale_id TEXT NOT NULL REFERENCES sales(id) ON DELETE CASCADE,
            line_no INTEGER NOT NULL,
            product_id TEXT NOT NULL REFERENCES products(id),
            quantity INTEGER NOT NULL CHECK (quantity > 0),
            unit_price INTEGER NOT NULL,
            unit_cost INTEGER NOT NULL,
            line_total INTEGER NOT NULL,
            PRIMARY KEY (sale_id, line_no)
        );

        CREATE TABLE IF NOT EXISTS returns (
            id TEXT PRIMARY KEY,
            kind TEXT NOT NULL,
            source_id TEXT NOT NULL,
            branch_id TEXT NOT NULL REFERENCES branches(id),
            party_id TEXT,
            total INTEGER NOT NULL,
            refund_amount INTEGER NOT NULL DEFAULT 0,
            reason TEXT,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS return_items (
            return_id TEXT NOT NULL REFERENCES returns(id) ON DELETE CASCADE,
            line_no INTEGER NOT NULL,
            product_id TEXT NOT NULL REFERENCES products(id),
            quantity INTEGER NOT NULL CHECK (quantity > 0),
            unit_amount INTEGER NOT NULL,
            line_total INTEGER NOT NULL,
            PRIMARY KEY (return_id, line_no)
        );

        CREATE TABLE IF NOT EXISTS payments (
            id TEXT PRIMARY KEY,
            direction TEXT NOT NULL,
            party_id TEXT NOT NULL,
            amount INTEGER NOT NULL CHECK (amount > 0),
            method TEXT NOT NULL,
            reference TEXT,
            note TEXT,
            created_at TEXT NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;

    // Ledger and sync
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS ledger_entries (
            id TEXT PRIMARY KEY,
            transaction_id TEXT NOT NULL,
            account TEXT NOT NULL,
            party_id TEXT,
            debit INTEGER NOT NULL DEFAULT 0 CHECK (debit >= 0),
            credit INTEGER NOT NULL DEFAULT 0 CHECK (credit >= 0),
            reference_type TEXT NOT NULL,
            reference_id TEXT NOT NULL,
            memo TEXT,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS changelog (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            operation TEXT NOT NULL,
            payload TEXT,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS sync_receipts (
            device_id TEXT NOT NULL,
            client_change_id TEXT NOT NULL,
            result TEXT NOT NULL,
            created_at TEXT NOT NULL,
            PRIMARY KEY (device_id, client_change_id)
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_products_name ON products(name);
        CREATE INDEX IF NOT EXISTS idx_products_category ON products(category_id);
        CREATE INDEX IF NOT EXISTS idx_stock_movements_product ON stock_movements(product_id, branch_id);
        CREATE INDEX IF NOT EXISTS idx_stock_movements_reference ON stock_movements(reference_id);
        CREATE INDEX IF NOT EXISTS idx_sales_branch ON sales(branch_id);
        CREATE INDEX IF NOT EXISTS idx_sales_customer ON sales(customer_id);
        CREATE INDEX IF NOT EXISTS idx_purchases_vendor ON purchases(vendor_id);
        CREATE INDEX IF NOT EXISTS idx_returns_source ON returns(kind, source_id);
        CREATE INDEX IF NOT EXISTS idx_payments_party ON payments(party_id);
        CREATE INDEX IF NOT EXISTS idx_ledger_account ON ledger_entries(account);
        CREATE INDEX IF NOT EXISTS idx_ledger_party ON ledger_entries(party_id);
        CREATE INDEX IF NOT EXISTS idx_ledger_reference ON ledger_entries(reference_id);
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("nested").join("retail.sqlite");

        let pool = init_database(&db_path).await.unwrap();
        run_migrations(&pool).await.unwrap();

        let repo = Repository::new(pool);
        assert_eq!(repo.get_revision_id().await.unwrap(), 0);
        assert_eq!(repo.current_cursor().await.unwrap(), 0);
    }
}
