//! Settlements with customers and vendors outside of a sale.

use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite};

use super::catalog::require_party;
use super::ledger;
use super::repository::{now, record_upsert};
use super::Repository;
use crate::errors::AppError;
use crate::models::{
    Account, CreatePaymentRequest, EntityType, Payment, PaymentDirection, PaymentFilter, Posting,
    ReferenceType,
};

const PAYMENT_COLUMNS: &str = "id, direction, party_id, amount, method, reference, note, created_at";

impl Repository {
    pub async fn list_payments(&self, filter: &PaymentFilter) -> Result<Vec<Payment>, AppError> {
        let mut query: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {} FROM payments WHERE 1 = 1", PAYMENT_COLUMNS));
        if let Some(party_id) = &filter.party_id {
            query.push(" AND party_id = ").push_bind(party_id.clone());
        }
        if let Some(direction) = filter.direction {
            query.push(" AND direction = ").push_bind(direction.as_str());
        }
        query.push(" ORDER BY created_at DESC");

        let rows = query.build().fetch_all(&self.pool).await?;
        rows.iter().map(payment_from_row).collect()
    }

    pub async fn get_payment(&self, id: &str) -> Result<Option<Payment>, AppError> {
        let sql = format!("SELECT {} FROM payments WHERE id = ?", PAYMENT_COLUMNS);
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;
        row.as_ref().map(payment_from_row).transpose()
    }

    /// Incoming money settles a customer's receivable; outgoing money settles a vendor payable.
    pub async fn create_payment(&self, request: &CreatePaymentRequest) -> Result<Payment, AppError> {
        let mut tx = self.begin_write().await?;
        require_party(&mut tx, request.direction.party_kind(), &request.party_id).await?;

        let payment = Payment {
            id: uuid::Uuid::new_v4().to_string(),
            direction: request.direction,
            party_id: request.party_id.clone(),
            amount: request.amount,
            method: request.method.clone(),
            reference: request.reference.clone(),
            note: request.note.clone(),
            created_at: now(),
        };

        sqlx::query(
            "INSERT INTO payments (id, direction, party_id, amount, method, reference, note, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&payment.id)
        .bind(payment.direction.as_str())
        .bind(&payment.party_id)
        .bind(payment.amount)
        .bind(&payment.method)
        .bind(&payment.reference)
        .bind(&payment.note)
        .bind(&payment.created_at)
        .execute(&mut *tx)
        .await?;

        let party = Some(payment.party_id.as_str());
        let posting = Posting::new(ReferenceType::Payment, payment.id.clone());
        let posting = match payment.direction {
            PaymentDirection::Incoming => posting.memo("Customer payment").transfer(
                (Account::Cash, None),
                (Account::AccountsReceivable, party),
                payment.amount,
            ),
            PaymentDirection::Outgoing => posting.memo("Vendor payment").transfer(
                (Account::AccountsPayable, party),
                (Account::Cash, None),
                payment.amount,
            ),
        };
        ledger::post(&mut tx, &posting).await?;

        record_upsert(&mut tx, EntityType::Payment, &payment.id, &payment).await?;
        tx.commit().await?;

        tracing::info!(
            payment_id = %payment.id,
            party_id = %payment.party_id,
            direction = payment.direction.as_str(),
            amount = payment.amount,
            "Recorded payment"
        );
        Ok(payment)
    }
}

fn payment_from_row(row: &SqliteRow) -> Result<Payment, AppError> {
    let direction: String = row.get("direction");
    Ok(Payment {
        id: row.get("id"),
        direction: PaymentDirection::parse(&direction).ok_or_else(|| {
            AppError::Database(format!("Unknown payment direction: {}", direction))
        })?,
        party_id: row.get("party_id"),
        amount: row.get("amount"),
        method: row.get("method"),
        reference: row.get("reference"),
        note: row.get("note"),
        created_at: row.get("created_at"),
    })
}

#[cfg(test)]
mod tests {
    use crate::db::test_support::{seed_party, test_repo};
    use crate::errors::AppError;
    use crate::models::*;

    fn payment(direction: PaymentDirection, party_id: &str, amount: i64) -> CreatePaymentRequest {
        CreatePaymentRequest {
            direction,
            party_id: party_id.to_string(),
            amount,
            method: "cash".to_string(),
            reference: None,
            note: None,
        }
    }

    #[tokio::test]
    async fn test_payment_direction_must_match_party() {
        let (repo, _dir) = test_repo().await;
        let vendor = seed_party(&repo, PartyKind::Vendor, "Acme").await;

        let err = repo
            .create_payment(&payment(PaymentDirection::Incoming, &vendor.id, 100))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let paid = repo
            .create_payment(&payment(PaymentDirection::Outgoing, &vendor.id, 100))
            .await
            .unwrap();
        let owed = repo
            .party_balance(PartyKind::Vendor, &vendor.id)
            .await
            .unwrap();
        // paying ahead of any invoice leaves a credit with the vendor
        assert_eq!(owed.balance, -100);

        let fetched = repo.get_payment(&paid.id).await.unwrap().unwrap();
        assert_eq!(fetched.direction, PaymentDirection::Outgoing);
        assert_eq!(
            repo.list_payments(&PaymentFilter {
                party_id: Some(vendor.id.clone()),
                direction: None,
            })
            .await
            .unwrap()
            .len(),
            1
        );
    }
}
