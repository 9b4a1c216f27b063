use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use roofline_core::domain::order::{MaterialOrder, MaterialOrderId};
use roofline_core::domain::payment::{PaymentIntent, PaymentIntentId};
use roofline_core::domain::quote::{Quote, QuoteId};

use super::{MaterialOrderRepository, PaymentIntentRepository, QuoteRepository, RepositoryError};

#[derive(Default)]
pub struct InMemoryQuoteRepository {
    quotes: RwLock<HashMap<String, Quote>>,
}

#[async_trait::async_trait]
impl QuoteRepository for InMemoryQuoteRepository {
    async fn find_by_id(&self, id: &QuoteId) -> Result<Option<Quote>, RepositoryError> {
        let quotes = self.quotes.read().await;
        Ok(quotes.get(&id.0).cloned())
    }

    async fn save(&self, quote: Quote) -> Result<(), RepositoryError> {
        let mut quotes = self.quotes.write().await;
        quotes.insert(quote.id.0.clone(), quote);
        Ok(())
    }

    async fn list_recent(&self, limit: u32) -> Result<Vec<Quote>, RepositoryError> {
        let quotes = self.quotes.read().await;
        let mut listed: Vec<Quote> = quotes.values().cloned().collect();
        listed.sort_by(|left, right| {
            right.created_at.cmp(&left.created_at).then_with(|| left.id.0.cmp(&right.id.0))
        });
        listed.truncate(limit as usize);
        Ok(listed)
    }
}

#[derive(Default)]
pub struct InMemoryMaterialOrderRepository {
    orders: RwLock<HashMap<String, MaterialOrder>>,
}

#[async_trait::async_trait]
impl MaterialOrderRepository for InMemoryMaterialOrderRepository {
    async fn find_by_id(
        &self,
        id: &MaterialOrderId,
    ) -> Result<Option<MaterialOrder>, RepositoryError> {
        let orders = self.orders.read().await;
        Ok(orders.get(&id.0).cloned())
    }

    async fn list_for_quote(
        &self,
        quote_id: &QuoteId,
    ) -> Result<Vec<MaterialOrder>, RepositoryError> {
        let orders = self.orders.read().await;
        let mut listed: Vec<MaterialOrder> =
            orders.values().filter(|order| &order.quote_id == quote_id).cloned().collect();
        listed.sort_by(|left, right| {
            left.created_at.cmp(&right.created_at).then_with(|| left.id.0.cmp(&right.id.0))
        });
        Ok(listed)
    }

    async fn save(&self, order: MaterialOrder) -> Result<(), RepositoryError> {
        let mut orders = self.orders.write().await;
        orders.insert(order.id.0.clone(), order);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryPaymentIntentRepository {
    intents: RwLock<HashMap<String, PaymentIntent>>,
    webhook_events: RwLock<HashSet<String>>,
}

#[async_trait::async_trait]
impl PaymentIntentRepository for InMemoryPaymentIntentRepository {
    async fn find_by_id(
        &self,
        id: &PaymentIntentId,
    ) -> Result<Option<PaymentIntent>, RepositoryError> {
        let intents = self.intents.read().await;
        Ok(intents.get(&id.0).cloned())
    }

    async fn list_for_quote(
        &self,
        quote_id: &QuoteId,
    ) -> Result<Vec<PaymentIntent>, RepositoryError> {
        let intents = self.intents.read().await;
        let mut listed: Vec<PaymentIntent> =
            intents.values().filter(|intent| &intent.quote_id == quote_id).cloned().collect();
        listed.sort_by(|left, right| {
            left.created_at.cmp(&right.created_at).then_with(|| left.id.0.cmp(&right.id.0))
        });
        Ok(listed)
    }

    async fn save(&self, intent: PaymentIntent) -> Result<(), RepositoryError> {
        let mut intents = self.intents.write().await;
        intents.insert(intent.id.0.clone(), intent);
        Ok(())
    }

    async fn record_webhook_event(
        &self,
        event_id: &str,
        _event_type: &str,
        _received_at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let mut events = self.webhook_events.write().await;
        Ok(events.insert(event_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use roofline_core::domain::payment::{
        PaymentIntent, PaymentIntentId, PaymentKind, PaymentStatus,
    };
    use roofline_core::domain::quote::QuoteStatus;
    use roofline_core::ordering::plan_order;

    use crate::repositories::test_support::{now, sample_quote};
    use crate::repositories::{
        InMemoryMaterialOrderRepository, InMemoryPaymentIntentRepository,
        InMemoryQuoteRepository, MaterialOrderRepository, PaymentIntentRepository,
        QuoteRepository,
    };

    #[tokio::test]
    async fn in_memory_quote_repo_round_trip() {
        let repo = InMemoryQuoteRepository::default();
        let quote = sample_quote();

        repo.save(quote.clone()).await.expect("save quote");
        let found = repo.find_by_id(&quote.id).await.expect("find quote");

        assert_eq!(found, Some(quote.clone()));
        assert_eq!(repo.list_recent(1).await.expect("list"), vec![quote]);
    }

    #[tokio::test]
    async fn in_memory_order_repo_lists_by_quote() {
        let repo = InMemoryMaterialOrderRepository::default();
        let mut quote = sample_quote();
        quote.transition_to(QuoteStatus::Accepted).expect("accept");
        let order = plan_order(&quote, NaiveDate::from_ymd_opt(2026, 3, 20).expect("date"), now())
            .expect("plan");

        repo.save(order.clone()).await.expect("save order");

        assert_eq!(repo.find_by_id(&order.id).await.expect("find"), Some(order.clone()));
        assert_eq!(repo.list_for_quote(&quote.id).await.expect("list"), vec![order]);
    }

    #[tokio::test]
    async fn in_memory_payment_repo_dedupes_webhook_events() {
        let repo = InMemoryPaymentIntentRepository::default();
        let quote = sample_quote();
        let intent = PaymentIntent {
            id: PaymentIntentId("pi_sim_1".to_string()),
            quote_id: quote.id.clone(),
            kind: PaymentKind::Full,
            amount: quote.total,
            currency: "USD".to_string(),
            status: PaymentStatus::RequiresPaymentMethod,
            client_secret: None,
            created_at: now(),
            updated_at: now(),
        };

        repo.save(intent.clone()).await.expect("save intent");
        assert_eq!(repo.list_for_quote(&quote.id).await.expect("list"), vec![intent]);
        assert!(repo.record_webhook_event("evt_1", "x", now()).await.expect("first"));
        assert!(!repo.record_webhook_event("evt_1", "x", now()).await.expect("again"));
    }
}
