use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use roofline_core::domain::order::{MaterialOrder, MaterialOrderId};
use roofline_core::domain::payment::{PaymentIntent, PaymentIntentId};
use roofline_core::domain::quote::{Quote, QuoteId};
use roofline_core::errors::ApplicationError;

pub mod material_order;
pub mod memory;
pub mod payment_intent;
pub mod quote;

pub use material_order::SqlMaterialOrderRepository;
pub use memory::{
    InMemoryMaterialOrderRepository, InMemoryPaymentIntentRepository, InMemoryQuoteRepository,
};
pub use payment_intent::SqlPaymentIntentRepository;
pub use quote::SqlQuoteRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<RepositoryError> for ApplicationError {
    fn from(value: RepositoryError) -> Self {
        Self::Persistence(value.to_string())
    }
}

#[async_trait]
pub trait QuoteRepository: Send + Sync {
    async fn find_by_id(&self, id: &QuoteId) -> Result<Option<Quote>, RepositoryError>;
    async fn save(&self, quote: Quote) -> Result<(), RepositoryError>;
    async fn list_recent(&self, limit: u32) -> Result<Vec<Quote>, RepositoryError>;
}

#[async_trait]
pub trait MaterialOrderRepository: Send + Sync {
    async fn find_by_id(
        &self,
        id: &MaterialOrderId,
    ) -> Result<Option<MaterialOrder>, RepositoryError>;
    async fn list_for_quote(&self, quote_id: &QuoteId)
        -> Result<Vec<MaterialOrder>, RepositoryError>;
    async fn save(&self, order: MaterialOrder) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait PaymentIntentRepository: Send + Sync {
    async fn find_by_id(
        &self,
        id: &PaymentIntentId,
    ) -> Result<Option<PaymentIntent>, RepositoryError>;
    async fn list_for_quote(&self, quote_id: &QuoteId)
        -> Result<Vec<PaymentIntent>, RepositoryError>;
    async fn save(&self, intent: PaymentIntent) -> Result<(), RepositoryError>;

    /// Records a delivered webhook event id. Returns `false` when the id
    /// was already seen.
    async fn record_webhook_event(
        &self,
        event_id: &str,
        event_type: &str,
        received_at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError>;
}

fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}

fn decode_json<T: serde::de::DeserializeOwned>(
    column: &str,
    value: &str,
) -> Result<T, RepositoryError> {
    serde_json::from_str(value)
        .map_err(|error| RepositoryError::Decode(format!("invalid json in `{column}`: {error}")))
}

fn encode_json<T: serde::Serialize>(column: &str, value: &T) -> Result<String, RepositoryError> {
    serde_json::to_string(value)
        .map_err(|error| RepositoryError::Decode(format!("cannot encode `{column}`: {error}")))
}

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::{DateTime, TimeZone, Utc};

    use roofline_core::domain::assessment::{DamageAssessment, DamageType, Severity, Urgency};
    use roofline_core::domain::quote::{CustomerInfo, Quote};
    use roofline_core::estimating::{DeterministicEstimator, EstimatingPolicy, Estimator};

    use crate::{connect_with_settings, migrations, DbPool};

    pub fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).single().expect("timestamp")
    }

    pub fn sample_quote() -> Quote {
        DeterministicEstimator::new(EstimatingPolicy::default())
            .draft_quote(
                CustomerInfo {
                    name: "Dana Ruiz".to_string(),
                    address: "14 Elm St, Springfield".to_string(),
                    email: Some("dana@example.com".to_string()),
                    phone: None,
                },
                DamageAssessment {
                    damage_type: DamageType::StormDamage,
                    severity: Severity::Severe,
                    area: 900,
                    urgency: Urgency::Urgent,
                },
                now(),
            )
            .expect("draft quote")
    }

    pub async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect pool");
        migrations::run_pending(&pool).await.expect("run migrations");
        pool
    }
}
