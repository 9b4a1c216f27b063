use chrono::Utc;
use sqlx::{sqlite::SqliteRow, Row};

use roofline_core::domain::quote::{Quote, QuoteId, QuoteStatus};

use super::{decode_json, encode_json, QuoteRepository, RepositoryError};
use crate::DbPool;

/// Quote content is stored as one JSON document; `status` lives in its own
/// column and wins over the document on read.
pub struct SqlQuoteRepository {
    pool: DbPool,
}

impl SqlQuoteRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl QuoteRepository for SqlQuoteRepository {
    async fn find_by_id(&self, id: &QuoteId) -> Result<Option<Quote>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, status, payload_json
             FROM quote
             WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(quote_from_row).transpose()
    }

    async fn save(&self, quote: Quote) -> Result<(), RepositoryError> {
        let payload = encode_json("payload_json", &quote)?;

        sqlx::query(
            "INSERT INTO quote (
                id,
                status,
                customer_name,
                damage_type,
                urgency,
                total,
                currency,
                payload_json,
                created_at,
                valid_until,
                updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                status = excluded.status,
                payload_json = excluded.payload_json,
                updated_at = excluded.updated_at",
        )
        .bind(&quote.id.0)
        .bind(quote.status.as_str())
        .bind(&quote.customer.name)
        .bind(quote.assessment.damage_type.as_str())
        .bind(quote.assessment.urgency.as_str())
        .bind(quote.total.to_string())
        .bind(&quote.currency)
        .bind(payload)
        .bind(quote.created_at.to_rfc3339())
        .bind(quote.valid_until.to_rfc3339())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_recent(&self, limit: u32) -> Result<Vec<Quote>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, status, payload_json
             FROM quote
             ORDER BY created_at DESC, id ASC
             LIMIT ?",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(quote_from_row).collect()
    }
}

fn quote_from_row(row: SqliteRow) -> Result<Quote, RepositoryError> {
    let id: String = row.try_get("id")?;
    let status_raw: String = row.try_get("status")?;
    let status = QuoteStatus::parse(&status_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown quote status `{status_raw}`")))?;

    let payload: String = row.try_get("payload_json")?;
    let mut quote: Quote = decode_json("payload_json", &payload)?;
    if quote.id.0 != id {
        return Err(RepositoryError::Decode(format!(
            "quote row `{id}` carries payload for `{}`",
            quote.id.0
        )));
    }
    quote.status = status;
    Ok(quote)
}

#[cfg(test)]
mod tests {
    use roofline_core::domain::quote::{QuoteId, QuoteStatus};

    use super::SqlQuoteRepository;
    use crate::repositories::test_support::{sample_quote, setup_pool};
    use crate::repositories::{QuoteRepository, RepositoryError};

    #[tokio::test]
    async fn sql_quote_repo_round_trip() {
        let pool = setup_pool().await;
        let repo = SqlQuoteRepository::new(pool.clone());
        let quote = sample_quote();

        repo.save(quote.clone()).await.expect("save quote");
        let found = repo.find_by_id(&quote.id).await.expect("find quote");

        assert_eq!(found, Some(quote));
        pool.close().await;
    }

    #[tokio::test]
    async fn status_changes_are_persisted_by_resave() {
        let pool = setup_pool().await;
        let repo = SqlQuoteRepository::new(pool.clone());
        let mut quote = sample_quote();
        repo.save(quote.clone()).await.expect("save quote");

        quote.transition_to(QuoteStatus::Accepted).expect("accept");
        repo.save(quote.clone()).await.expect("resave quote");

        let found = repo.find_by_id(&quote.id).await.expect("find").expect("present");
        assert_eq!(found.status, QuoteStatus::Accepted);
        assert_eq!(found.total, quote.total);
        pool.close().await;
    }

    #[tokio::test]
    async fn missing_quote_is_none() {
        let pool = setup_pool().await;
        let repo = SqlQuoteRepository::new(pool.clone());

        let found = repo.find_by_id(&QuoteId("Q-missing".to_string())).await.expect("find");
        assert_eq!(found, None);
        pool.close().await;
    }

    #[tokio::test]
    async fn corrupt_payload_is_a_decode_error() {
        let pool = setup_pool().await;
        let repo = SqlQuoteRepository::new(pool.clone());
        let quote = sample_quote();
        repo.save(quote.clone()).await.expect("save quote");

        sqlx::query("UPDATE quote SET payload_json = '{' WHERE id = ?")
            .bind(&quote.id.0)
            .execute(&pool)
            .await
            .expect("corrupt row");

        let error = repo.find_by_id(&quote.id).await.expect_err("decode should fail");
        assert!(matches!(error, RepositoryError::Decode(_)));
        pool.close().await;
    }

    #[tokio::test]
    async fn list_recent_returns_newest_first() {
        let pool = setup_pool().await;
        let repo = SqlQuoteRepository::new(pool.clone());
        let older = sample_quote();
        let mut newer = sample_quote();
        newer.created_at = older.created_at + chrono::Duration::hours(1);

        repo.save(older.clone()).await.expect("save older");
        repo.save(newer.clone()).await.expect("save newer");

        let listed = repo.list_recent(10).await.expect("list");
        let ids: Vec<_> = listed.iter().map(|quote| quote.id.clone()).collect();
        assert_eq!(ids, vec![newer.id, older.id]);
        pool.close().await;
    }
}
