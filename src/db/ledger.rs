//! Double-entry ledger: postings, entry listing and balances.

use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection};

use super::catalog::require_party;
use super::repository::now;
use super::Repository;
use crate::errors::AppError;
use crate::models::{
    Account, LedgerEntry, LedgerFilter, Page, PartyBalance, PartyKind, Posting, ReferenceType,
    TrialBalance,
};

impl Repository {
    pub async fn list_ledger_entries(
        &self,
        filter: &LedgerFilter,
        page: Page,
    ) -> Result<Vec<LedgerEntry>, AppError> {
        let page = page.clamped();
        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT id, transaction_id, account, party_id, debit, credit, reference_type, reference_id, memo, created_at FROM ledger_entries WHERE 1 = 1",
        );
        if let Some(account) = filter.account {
            query.push(" AND account = ").push_bind(account.as_str());
        }
        if let Some(party_id) = &filter.party_id {
            query.push(" AND party_id = ").push_bind(party_id.clone());
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
        rows.iter().map(entry_from_row).collect()
    }

    pub async fn trial_balance(&self) -> Result<TrialBalance, AppError> {
        let rows = sqlx::query(
            "SELECT account, COALESCE(SUM(debit), 0) AS debit, COALESCE(SUM(credit), 0) AS credit FROM ledger_entries GROUP BY account",
        )
        .fetch_all(&self.pool)
        .await?;

        let sums = rows
            .iter()
            .map(|row| {
                let account: String = row.get("account");
                let account = Account::parse(&account)
                    .ok_or_else(|| AppError::Database(format!("Unknown account: {}", account)))?;
                Ok((account, row.get("debit"), row.get("credit")))
            })
            .collect::<Result<Vec<_>, AppError>>()?;

        Ok(TrialBalance::from_sums(&sums))
    }

    /// Outstanding balance with a party: what a customer owes us, or what we owe a vendor.
    pub async fn party_balance(&self, kind: PartyKind, id: &str) -> Result<PartyBalance, AppError> {
        let mut conn = self.pool.acquire().await?;
        require_party(&mut conn, kind, id).await?;

        let (account, expr) = match kind {
            PartyKind::Customer => (Account::AccountsReceivable, "debit - credit"),
            PartyKind::Vendor => (Account::AccountsPayable, "credit - debit"),
        };
        let sql = format!(
            "SELECT COALESCE(SUM({}), 0) AS balance FROM ledger_entries WHERE account = ? AND party_id = ?",
            expr
        );
        let row = sqlx::query(&sql)
            .bind(account.as_str())
            .bind(id)
            .fetch_one(&mut *conn)
            .await?;

        Ok(PartyBalance {
            party_id: id.to_string(),
            kind,
            balance: row.get("balance"),
        })
    }
}

/// Write a posting as one ledger transaction. Returns `None` when nothing was posted.
pub(super) async fn post(
    conn: &mut SqliteConnection,
    posting: &Posting,
) -> Result<Option<String>, AppError> {
    if posting.is_empty() {
        return Ok(None);
    }
    if !posting.is_balanced() {
        let (debit, credit) = posting.totals();
        return Err(AppError::Internal(format!(
            "Unbalanced posting for {} {}: debit {} != credit {}",
            posting.reference_type.as_str(),
            posting.reference_id,
            debit,
            credit
        )));
    }

    let transaction_id = uuid::Uuid::new_v4().to_string();
    let created_at = now();
    for line in &posting.lines {
        sqlx::query(
            r#"INSERT INTO ledger_entries (
                id, transaction_id, account, party_id, debit, credit,
                reference_type, reference_id, memo, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(&transaction_id)
        .bind(line.account.as_str())
        .bind(&line.party_id)
        .bind(line.debit)
        .bind(line.credit)
        .bind(posting.reference_type.as_str())
        .bind(&posting.reference_id)
        .bind(&posting.memo)
        .bind(&created_at)
        .execute(&mut *conn)
        .await?;
    }

    tracing::debug!(
        transaction_id = %transaction_id,
        reference_id = %posting.reference_id,
        lines = posting.lines.len(),
        "Posted ledger transaction"
    );
    Ok(Some(transaction_id))
}

fn entry_from_row(row: &SqliteRow) -> Result<LedgerEntry, AppError> {
    let account: String = row.get("account");
    let reference_type: String = row.get("reference_type");
    Ok(LedgerEntry {
        id: row.get("id"),
        transaction_id: row.get("transaction_id"),
        account: Account::parse(&account)
            .ok_or_else(|| AppError::Database(format!("Unknown account: {}", account)))?,
        party_id: row.get("party_id"),
        debit: row.get("debit"),
        credit: row.get("credit"),
        reference_type: ReferenceType::parse(&reference_type).ok_or_else(|| {
            AppError::Database(format!("Unknown reference type: {}", reference_type))
        })?,
        reference_id: row.get("reference_id"),
        memo: row.get("memo"),
        created_at: row.get("created_at"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::test_repo;
    use crate::models::PostingLine;

    #[tokio::test]
    async fn test_unbalanced_posting_rejected() {
        let (repo, _dir) = test_repo().await;
        let mut posting = Posting::new(ReferenceType::Adjustment, "adj-1");
        posting.lines.push(PostingLine {
            account: Account::Cash,
            party_id: None,
            debit: 10,
            credit: 0,
        });

        let mut conn = repo.pool.acquire().await.unwrap();
        let err = post(&mut conn, &posting).await.unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));

        let empty = Posting::new(ReferenceType::Adjustment, "adj-2");
        assert_eq!(post(&mut conn, &empty).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_entries_share_transaction_id() {
        let (repo, _dir) = test_repo().await;
        let posting = Posting::new(ReferenceType::Payment, "pay-1")
            .memo("Till float")
            .transfer(
                (Account::Cash, None),
                (Account::InventoryAdjustment, None),
                250,
            );

        let mut conn = repo.pool.acquire().await.unwrap();
        let txn = post(&mut conn, &posting).await.unwrap().unwrap();
        drop(conn);

        let entries = repo
            .list_ledger_entries(
                &LedgerFilter {
                    reference_id: Some("pay-1".to_string()),
                    ..Default::default()
                },
                Page::default(),
            )
            .await
            .unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e.transaction_id == txn));

        let cash_only = repo
            .list_ledger_entries(
                &LedgerFilter {
                    account: Some(Account::Cash),
                    ..Default::default()
                },
                Page::default(),
            )
            .await
            .unwrap();
        assert_eq!(cash_only.len(), 1);
        assert_eq!(cash_only[0].debit, 250);
    }
}
