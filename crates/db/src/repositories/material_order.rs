use chrono::Utc;
use sqlx::{sqlite::SqliteRow, Row};

use roofline_core::domain::order::{MaterialOrder, MaterialOrderId, OrderStatus};
use roofline_core::domain::quote::QuoteId;

use super::{decode_json, encode_json, MaterialOrderRepository, RepositoryError};
use crate::DbPool;

pub struct SqlMaterialOrderRepository {
    pool: DbPool,
}

impl SqlMaterialOrderRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl MaterialOrderRepository for SqlMaterialOrderRepository {
    async fn find_by_id(
        &self,
        id: &MaterialOrderId,
    ) -> Result<Option<MaterialOrder>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, status, payload_json
             FROM material_order
             WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(order_from_row).transpose()
    }

    async fn list_for_quote(
        &self,
        quote_id: &QuoteId,
    ) -> Result<Vec<MaterialOrder>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, status, payload_json
             FROM material_order
             WHERE quote_id = ?
             ORDER BY created_at ASC, id ASC",
        )
        .bind(&quote_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(order_from_row).collect()
    }

    async fn save(&self, order: MaterialOrder) -> Result<(), RepositoryError> {
        let payload = encode_json("payload_json", &order)?;

        sqlx::query(
            "INSERT INTO material_order (
                id,
                quote_id,
                status,
                delivery_date,
                total_cost,
                payload_json,
                created_at,
                updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                status = excluded.status,
                delivery_date = excluded.delivery_date,
                payload_json = excluded.payload_json,
                updated_at = excluded.updated_at",
        )
        .bind(&order.id.0)
        .bind(&order.quote_id.0)
        .bind(order.status.as_str())
        .bind(order.delivery_date.to_string())
        .bind(order.costs.total.to_string())
        .bind(payload)
        .bind(order.created_at.to_rfc3339())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn order_from_row(row: SqliteRow) -> Result<MaterialOrder, RepositoryError> {
    let status_raw: String = row.try_get("status")?;
    let status = OrderStatus::parse(&status_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown order status `{status_raw}`")))?;

    let payload: String = row.try_get("payload_json")?;
    let order: MaterialOrder = decode_json("payload_json", &payload)?;
    if order.status != status {
        let id: String = row.try_get("id")?;
        return Err(RepositoryError::Decode(format!(
            "material order `{id}` status column `{status_raw}` disagrees with payload `{}`",
            order.status.as_str()
        )));
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Utc};

    use roofline_core::domain::order::{MaterialOrderId, OrderStatus};
    use roofline_core::domain::quote::QuoteStatus;
    use roofline_core::ordering::plan_order;

    use super::SqlMaterialOrderRepository;
    use crate::repositories::test_support::{now, sample_quote, setup_pool};
    use crate::repositories::{MaterialOrderRepository, QuoteRepository, SqlQuoteRepository};

    #[tokio::test]
    async fn sql_material_order_repo_round_trip_with_history() {
        let pool = setup_pool().await;
        let quotes = SqlQuoteRepository::new(pool.clone());
        let orders = SqlMaterialOrderRepository::new(pool.clone());

        let mut quote = sample_quote();
        quote.transition_to(QuoteStatus::Accepted).expect("accept");
        quotes.save(quote.clone()).await.expect("save quote");

        let required_by = NaiveDate::from_ymd_opt(2026, 3, 20).expect("date");
        let mut order = plan_order(&quote, required_by, now()).expect("plan");
        orders.save(order.clone()).await.expect("save order");

        order.transition_to(OrderStatus::Cancelled, "customer postponed", Utc::now())
            .expect("cancel");
        orders.save(order.clone()).await.expect("update order");

        let found = orders.find_by_id(&order.id).await.expect("find").expect("present");
        assert_eq!(found, order);
        assert_eq!(found.history.len(), 2);

        let listed = orders.list_for_quote(&quote.id).await.expect("list");
        assert_eq!(listed, vec![order]);
        pool.close().await;
    }

    #[tokio::test]
    async fn orders_require_an_existing_quote() {
        let pool = setup_pool().await;
        let orders = SqlMaterialOrderRepository::new(pool.clone());

        let mut quote = sample_quote();
        quote.transition_to(QuoteStatus::Accepted).expect("accept");
        let required_by = NaiveDate::from_ymd_opt(2026, 3, 20).expect("date");
        let order = plan_order(&quote, required_by, now()).expect("plan");

        assert!(orders.save(order).await.is_err(), "foreign key should reject orphan order");
        assert_eq!(
            orders.find_by_id(&MaterialOrderId("MO-none".to_string())).await.expect("find"),
            None
        );
        pool.close().await;
    }
}
