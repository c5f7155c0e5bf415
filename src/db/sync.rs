//! Changelog reads and push receipts for device sync.

use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::repository::now;
use super::Repository;
use crate::errors::AppError;
use crate::models::{ChangeBatch, ChangeOperation, ChangeRecord, EntityType, PushResult};

impl Repository {
    /// Changes after `since` in commit order, at most `limit` of them.
    pub async fn list_changes(&self, since: i64, limit: i64) -> Result<ChangeBatch, AppError> {
        let limit = limit.max(1);
        let rows = sqlx::query(
            "SELECT seq, entity_type, entity_id, operation, payload, created_at FROM changelog WHERE seq > ? ORDER BY seq ASC LIMIT ?",
        )
        .bind(since)
        .bind(limit + 1)
        .fetch_all(&self.pool)
        .await?;

        let has_more = rows.len() as i64 > limit;
        let changes = rows
            .iter()
            .take(limit as usize)
            .map(change_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        let cursor = changes.last().map(|c| c.seq).unwrap_or(since);

        Ok(ChangeBatch {
            changes,
            cursor,
            has_more,
        })
    }

    /// Result previously returned for this device's change, if it was processed.
    pub async fn find_receipt(
        &self,
        device_id: &str,
        client_change_id: &str,
    ) -> Result<Option<PushResult>, AppError> {
        let row = sqlx::query(
            "SELECT result FROM sync_receipts WHERE device_id = ? AND client_change_id = ?",
        )
        .bind(device_id)
        .bind(client_change_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            let result: String = row.get("result");
            serde_json::from_str(&result)
                .map_err(|e| AppError::Database(format!("Corrupt sync receipt: {}", e)))
        })
        .transpose()
    }

    pub async fn store_receipt(&self, device_id: &str, result: &PushResult) -> Result<(), AppError> {
        let encoded = serde_json::to_string(result)
            .map_err(|e| AppError::Internal(format!("Failed to encode sync receipt: {}", e)))?;
        sqlx::query(
            "INSERT OR IGNORE INTO sync_receipts (device_id, client_change_id, result, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(device_id)
        .bind(&result.client_change_id)
        .bind(encoded)
        .bind(now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn change_from_row(row: &SqliteRow) -> Result<ChangeRecord, AppError> {
    let entity_type: String = row.get("entity_type");
    let operation: String = row.get("operation");
    let payload: Option<String> = row.get("payload");

    Ok(ChangeRecord {
        seq: row.get("seq"),
        entity_type: EntityType::parse(&entity_type)
            .ok_or_else(|| AppError::Database(format!("Unknown entity type: {}", entity_type)))?,
        entity_id: row.get("entity_id"),
        operation: ChangeOperation::parse(&operation)
            .ok_or_else(|| AppError::Database(format!("Unknown operation: {}", operation)))?,
        payload: match payload {
            Some(payload) => serde_json::from_str(&payload)
                .map_err(|e| AppError::Database(format!("Corrupt changelog payload: {}", e)))?,
            None => serde_json::Value::Null,
        },
        created_at: row.get("created_at"),
    })
}

#[cfg(test)]
mod tests {
    use crate::db::test_support::{seed_branch, test_repo};
    use crate::models::*;

    #[tokio::test]
    async fn test_changes_page_by_cursor() {
        let (repo, _dir) = test_repo().await;
        for code in ["A", "B", "C"] {
            seed_branch(&repo, code).await;
        }
        let doomed = seed_branch(&repo, "D").await;
        repo.delete_branch(&doomed.id).await.unwrap();

        let first = repo.list_changes(0, 2).await.unwrap();
        assert_eq!(first.changes.len(), 2);
        assert!(first.has_more);
        assert_eq!(first.cursor, first.changes[1].seq);

        let rest = repo.list_changes(first.cursor, 10).await.unwrap();
        assert_eq!(rest.changes.len(), 3);
        assert!(!rest.has_more);
        assert!(rest.changes.windows(2).all(|w| w[0].seq < w[1].seq));

        let tombstone = rest.changes.last().unwrap();
        assert_eq!(tombstone.operation, ChangeOperation::Delete);
        assert_eq!(tombstone.entity_id, doomed.id);
        assert!(tombstone.payload.is_null());

        let empty = repo.list_changes(rest.cursor, 10).await.unwrap();
        assert!(empty.changes.is_empty());
        assert_eq!(empty.cursor, rest.cursor);
    }

    #[tokio::test]
    async fn test_receipts_round_trip() {
        let (repo, _dir) = test_repo().await;
        assert!(repo.find_receipt("till-1", "c1").await.unwrap().is_none());

        repo.store_receipt("till-1", &PushResult::applied("c1", "p1".to_string()))
            .await
            .unwrap();
        let stored = repo.find_receipt("till-1", "c1").await.unwrap().unwrap();
        assert_eq!(stored.status, PushStatus::Applied);
        assert_eq!(stored.entity_id.as_deref(), Some("p1"));
        assert!(repo.find_receipt("till-2", "c1").await.unwrap().is_none());
    }
}
