use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::quote::QuoteId;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MaterialOrderId(pub String);

impl MaterialOrderId {
    pub fn generate() -> Self {
        Self(format!("MO-{}", Uuid::new_v4().simple()))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "confirmed" => Some(Self::Confirmed),
            "shipped" => Some(Self::Shipped),
            "delivered" => Some(Self::Delivered),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShippingMethod {
    Standard,
    Expedited,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub material: String,
    pub quantity: u32,
    pub unit: String,
    pub unit_cost: Decimal,
    pub cost: Decimal,
    pub supplier_id: String,
}

/// One supplier's share of an order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplierAllocation {
    pub supplier_id: String,
    pub supplier_name: String,
    pub shipping: ShippingMethod,
    pub materials_cost: Decimal,
    pub expedite_fee: Decimal,
    pub expected_delivery: NaiveDate,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCosts {
    pub materials: Decimal,
    pub expedite_fees: Decimal,
    pub total: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingNumber {
    pub supplier_id: String,
    pub number: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    pub status: OrderStatus,
    pub note: String,
    pub changed_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialOrder {
    pub id: MaterialOrderId,
    pub quote_id: QuoteId,
    pub items: Vec<OrderItem>,
    pub suppliers: Vec<SupplierAllocation>,
    pub costs: OrderCosts,
    pub required_by: NaiveDate,
    /// Latest expected delivery across all suppliers.
    pub delivery_date: NaiveDate,
    pub status: OrderStatus,
    pub tracking_numbers: Vec<TrackingNumber>,
    pub history: Vec<StatusChange>,
    pub created_at: DateTime<Utc>,
}

impl MaterialOrder {
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        matches!(
            (self.status, next),
            (OrderStatus::Pending, OrderStatus::Confirmed)
                | (OrderStatus::Confirmed, OrderStatus::Shipped)
                | (OrderStatus::Shipped, OrderStatus::Delivered)
                | (OrderStatus::Pending, OrderStatus::Cancelled)
                | (OrderStatus::Confirmed, OrderStatus::Cancelled)
                | (OrderStatus::Shipped, OrderStatus::Cancelled)
        )
    }

    pub fn transition_to(
        &mut self,
        next: OrderStatus,
        note: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        if !self.can_transition_to(next) {
            return Err(DomainError::InvalidOrderTransition { from: self.status, to: next });
        }

        self.status = next;
        self.history.push(StatusChange { status: next, note: note.into(), changed_at: at });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Utc};
    use rust_decimal::Decimal;

    use super::{MaterialOrder, MaterialOrderId, OrderCosts, OrderStatus, StatusChange};
    use crate::domain::quote::QuoteId;
    use crate::errors::DomainError;

    fn order() -> MaterialOrder {
        let now = Utc::now();
        let date = NaiveDate::from_ymd_opt(2026, 3, 10).expect("date");
        MaterialOrder {
            id: MaterialOrderId::generate(),
            quote_id: QuoteId("Q-1".to_string()),
            items: Vec::new(),
            suppliers: Vec::new(),
            costs: OrderCosts {
                materials: Decimal::ZERO,
                expedite_fees: Decimal::ZERO,
                total: Decimal::ZERO,
            },
            required_by: date,
            delivery_date: date,
            status: OrderStatus::Pending,
            tracking_numbers: Vec::new(),
            history: vec![StatusChange {
                status: OrderStatus::Pending,
                note: "order planned".to_string(),
                changed_at: now,
            }],
            created_at: now,
        }
    }

    #[test]
    fn walks_forward_through_fulfilment_and_records_history() {
        let mut order = order();
        let now = Utc::now();
        order.transition_to(OrderStatus::Confirmed, "supplier accepted", now).expect("confirm");
        order.transition_to(OrderStatus::Shipped, "left warehouse", now).expect("ship");
        order.transition_to(OrderStatus::Delivered, "on site", now).expect("deliver");

        let statuses: Vec<_> = order.history.iter().map(|change| change.status).collect();
        assert_eq!(
            statuses,
            vec![
                OrderStatus::Pending,
                OrderStatus::Confirmed,
                OrderStatus::Shipped,
                OrderStatus::Delivered
            ]
        );
    }

    #[test]
    fn delivered_orders_cannot_be_cancelled() {
        let mut order = order();
        order.status = OrderStatus::Delivered;
        let error = order
            .transition_to(OrderStatus::Cancelled, "too late", Utc::now())
            .expect_err("delivered -> cancelled");
        assert!(matches!(error, DomainError::InvalidOrderTransition { .. }));
        assert_eq!(order.history.len(), 1);
    }

    #[test]
    fn cannot_skip_confirmation() {
        let mut order = order();
        assert!(order.transition_to(OrderStatus::Shipped, "skip", Utc::now()).is_err());
        assert_eq!(order.status, OrderStatus::Pending);
    }
}
