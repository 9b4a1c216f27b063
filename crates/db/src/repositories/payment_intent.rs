use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{sqlite::SqliteRow, Row};

use roofline_core::domain::payment::{PaymentIntent, PaymentIntentId, PaymentKind, PaymentStatus};
use roofline_core::domain::quote::QuoteId;

use super::{parse_timestamp, PaymentIntentRepository, RepositoryError};
use crate::DbPool;

pub struct SqlPaymentIntentRepository {
    pool: DbPool,
}

impl SqlPaymentIntentRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl PaymentIntentRepository for SqlPaymentIntentRepository {
    async fn find_by_id(
        &self,
        id: &PaymentIntentId,
    ) -> Result<Option<PaymentIntent>, RepositoryError> {
        let row = sqlx::query(
            "SELECT
                id,
                quote_id,
                kind,
                amount,
                currency,
                status,
                client_secret,
                created_at,
                updated_at
             FROM payment_intent
             WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(intent_from_row).transpose()
    }

    async fn list_for_quote(
        &self,
        quote_id: &QuoteId,
    ) -> Result<Vec<PaymentIntent>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT
                id,
                quote_id,
                kind,
                amount,
                currency,
                status,
                client_secret,
                created_at,
                updated_at
             FROM payment_intent
             WHERE quote_id = ?
             ORDER BY created_at ASC, id ASC",
        )
        .bind(&quote_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(intent_from_row).collect()
    }

    async fn save(&self, intent: PaymentIntent) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO payment_intent (
                id,
                quote_id,
                kind,
                amount,
                currency,
                status,
                client_secret,
                created_at,
                updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                status = excluded.status,
                client_secret = excluded.client_secret,
                updated_at = excluded.updated_at",
        )
        .bind(&intent.id.0)
        .bind(&intent.quote_id.0)
        .bind(intent.kind.as_str())
        .bind(intent.amount.to_string())
        .bind(&intent.currency)
        .bind(intent.status.as_str())
        .bind(intent.client_secret.as_deref())
        .bind(intent.created_at.to_rfc3339())
        .bind(intent.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn record_webhook_event(
        &self,
        event_id: &str,
        event_type: &str,
        received_at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "INSERT INTO webhook_event (id, event_type, received_at)
             VALUES (?, ?, ?)
             ON CONFLICT(id) DO NOTHING",
        )
        .bind(event_id)
        .bind(event_type)
        .bind(received_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

fn intent_from_row(row: SqliteRow) -> Result<PaymentIntent, RepositoryError> {
    let kind_raw: String = row.try_get("kind")?;
    let kind = PaymentKind::parse(&kind_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown payment kind `{kind_raw}`")))?;

    let status_raw: String = row.try_get("status")?;
    let status = PaymentStatus::parse(&status_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown payment status `{status_raw}`")))?;

    let amount_raw: String = row.try_get("amount")?;
    let amount = Decimal::from_str(&amount_raw).map_err(|error| {
        RepositoryError::Decode(format!("invalid decimal in `amount`: `{amount_raw}` ({error})"))
    })?;

    Ok(PaymentIntent {
        id: PaymentIntentId(row.try_get("id")?),
        quote_id: QuoteId(row.try_get("quote_id")?),
        kind,
        amount,
        currency: row.try_get("currency")?,
        status,
        client_secret: row.try_get("client_secret")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use roofline_core::domain::payment::{
        PaymentIntent, PaymentIntentId, PaymentKind, PaymentStatus,
    };

    use super::SqlPaymentIntentRepository;
    use crate::repositories::test_support::{now, sample_quote, setup_pool};
    use crate::repositories::{PaymentIntentRepository, QuoteRepository, SqlQuoteRepository};

    #[tokio::test]
    async fn sql_payment_intent_repo_round_trip_and_status_update() {
        let pool = setup_pool().await;
        let quotes = SqlQuoteRepository::new(pool.clone());
        let intents = SqlPaymentIntentRepository::new(pool.clone());
        let quote = sample_quote();
        quotes.save(quote.clone()).await.expect("save quote");

        let mut intent = PaymentIntent {
            id: PaymentIntentId("pi_123".to_string()),
            quote_id: quote.id.clone(),
            kind: PaymentKind::Deposit,
            amount: Decimal::new(66_338, 2),
            currency: "USD".to_string(),
            status: PaymentStatus::RequiresPaymentMethod,
            client_secret: Some("pi_123_secret_abc".to_string()),
            created_at: now(),
            updated_at: now(),
        };
        intents.save(intent.clone()).await.expect("save intent");
        assert_eq!(intents.find_by_id(&intent.id).await.expect("find"), Some(intent.clone()));

        intent.status = PaymentStatus::Succeeded;
        intent.updated_at = now() + chrono::Duration::minutes(5);
        intents.save(intent.clone()).await.expect("update intent");

        let listed = intents.list_for_quote(&quote.id).await.expect("list");
        assert_eq!(listed, vec![intent]);
        pool.close().await;
    }

    #[tokio::test]
    async fn webhook_events_are_recorded_once() {
        let pool = setup_pool().await;
        let intents = SqlPaymentIntentRepository::new(pool.clone());

        assert!(intents
            .record_webhook_event("evt_1", "payment_intent.succeeded", now())
            .await
            .expect("first delivery"));
        assert!(!intents
            .record_webhook_event("evt_1", "payment_intent.succeeded", now())
            .await
            .expect("redelivery"));
        pool.close().await;
    }
}
