//! Database repository: shared write plumbing and the bootstrap snapshot.
//!
//! Entity operations live in the sibling modules as further `impl Repository` blocks.

use chrono::Utc;
use serde::Serialize;
use sqlx::{Row, Sqlite, SqliteConnection, SqlitePool, Transaction};

use super::{catalog, stock};
use crate::errors::AppError;
use crate::models::{ChangeOperation, Datastore, EntityType, PartyKind, RevisionInfo};

/// Database repository for all data operations.
#[derive(Clone)]
pub struct Repository {
    pub(super) pool: SqlitePool,
}

impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get the current revision ID.
    pub async fn get_revision_id(&self) -> Result<i64, AppError> {
        let row = sqlx::query("SELECT revision_id FROM meta WHERE id = 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("revision_id"))
    }

    /// Get revision info.
    pub async fn get_revision_info(&self) -> Result<RevisionInfo, AppError> {
        let row = sqlx::query("SELECT revision_id, generated_at FROM meta WHERE id = 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(RevisionInfo {
            revision_id: row.get("revision_id"),
            generated_at: row.get("generated_at"),
        })
    }

    /// Latest changelog sequence number, 0 when empty.
    pub async fn current_cursor(&self) -> Result<i64, AppError> {
        let mut conn = self.pool.acquire().await?;
        cursor_in(&mut conn).await
    }

    /// Catalog and stock snapshot read inside one transaction so that it matches `cursor`.
    pub async fn get_datastore(&self) -> Result<Datastore, AppError> {
        let mut tx = self.pool.begin().await?;

        let meta =
            sqlx::query("SELECT schema_version, revision_id, generated_at FROM meta WHERE id = 1")
                .fetch_one(&mut *tx)
                .await?;
        let cursor = cursor_in(&mut tx).await?;

        let branches = catalog::fetch_branches(&mut tx).await?;
        let categories = catalog::fetch_categories(&mut tx).await?;
        let products = catalog::fetch_products(&mut tx, &Default::default()).await?;
        let vendors = catalog::fetch_parties(&mut tx, PartyKind::Vendor).await?;
        let customers = catalog::fetch_parties(&mut tx, PartyKind::Customer).await?;
        let stock_levels = stock::fetch_stock_levels(&mut tx, &Default::default()).await?;

        tx.commit().await?;

        Ok(Datastore {
            schema_version: meta.get("schema_version"),
            revision_id: meta.get("revision_id"),
            generated_at: meta.get("generated_at"),
            cursor,
            branches,
            categories,
            products,
            vendors,
            customers,
            stock_levels,
        })
    }

    /// Open a write transaction.
    ///
    /// The revision bump is the first statement so the transaction holds SQLite's write
    /// lock before it reads anything; a failed write rolls the bump back with the rest.
    pub(super) async fn begin_write(&self) -> Result<Transaction<'static, Sqlite>, AppError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE meta SET revision_id = revision_id + 1, generated_at = ? WHERE id = 1")
            .bind(now())
            .execute(&mut *tx)
            .await?;
        Ok(tx)
    }
}

pub(super) async fn cursor_in(conn: &mut SqliteConnection) -> Result<i64, AppError> {
    let row = sqlx::query("SELECT COALESCE(MAX(seq), 0) AS cursor FROM changelog")
        .fetch_one(&mut *conn)
        .await?;
    Ok(row.get("cursor"))
}

pub(super) fn now() -> String {
    Utc::now().to_rfc3339()
}

/// Use a client-supplied id when present, otherwise generate one.
pub(super) fn new_id(requested: Option<&String>) -> String {
    match requested {
        Some(id) if !id.trim().is_empty() => id.trim().to_string(),
        _ => uuid::Uuid::new_v4().to_string(),
    }
}

/// Reject a write whose expected version does not match the stored one.
pub(super) fn check_version(
    label: &str,
    id: &str,
    current: i64,
    expected: Option<i64>,
) -> Result<(), AppError> {
    match expected {
        Some(expected) if expected != current => Err(AppError::Conflict {
            message: format!(
                "{} {} version mismatch: expected {}, current {}",
                label, id, expected, current
            ),
            current_version: current,
        }),
        _ => Ok(()),
    }
}

pub(super) fn stale_write(current_version: i64) -> AppError {
    AppError::Conflict {
        message: "Concurrent modification detected".to_string(),
        current_version,
    }
}

/// Append an upsert to the changelog with the entity's new state.
pub(super) async fn record_upsert<T: Serialize>(
    conn: &mut SqliteConnection,
    entity_type: EntityType,
    entity_id: &str,
    entity: &T,
) -> Result<(), AppError> {
    let payload = serde_json::to_string(entity)
        .map_err(|e| AppError::Internal(format!("Failed to encode changelog payload: {}", e)))?;
    append_change(
        conn,
        entity_type,
        entity_id,
        ChangeOperation::Upsert,
        Some(payload),
    )
    .await
}

/// Append a delete tombstone to the changelog.
pub(super) async fn record_delete(
    conn: &mut SqliteConnection,
    entity_type: EntityType,
    entity_id: &str,
) -> Result<(), AppError> {
    append_change(conn, entity_type, entity_id, ChangeOperation::Delete, None).await
}

async fn append_change(
    conn: &mut SqliteConnection,
    entity_type: EntityType,
    entity_id: &str,
    operation: ChangeOperation,
    payload: Option<String>,
) -> Result<(), AppError> {
    sqlx::query(
        "INSERT INTO changelog (entity_type, entity_id, operation, payload, created_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(entity_type.as_str())
    .bind(entity_id)
    .bind(operation.as_str())
    .bind(payload)
    .bind(now())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_version() {
        assert!(check_version("Product", "p1", 3, None).is_ok());
        assert!(check_version("Product", "p1", 3, Some(3)).is_ok());
        match check_version("Product", "p1", 3, Some(2)) {
            Err(AppError::Conflict {
                current_version, ..
            }) => assert_eq!(current_version, 3),
            other => panic!("expected conflict, got {:?}", other),
        }
    }

    #[test]
    fn test_new_id_prefers_client_id() {
        assert_eq!(new_id(Some(&" till-7 ".to_string())), "till-7");
        assert_eq!(new_id(Some(&"  ".to_string())).len(), 36);
        assert_eq!(new_id(None).len(), 36);
    }
}
