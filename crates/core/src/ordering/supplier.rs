use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::order::{OrderItem, SupplierAllocation, TrackingNumber};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplierConfirmation {
    pub tracking: TrackingNumber,
    pub confirmed_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShipmentState {
    AwaitingPickup,
    InTransit,
    Delivered,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SupplierError {
    #[error("supplier `{supplier_id}` rejected the order: {reason}")]
    Rejected { supplier_id: String, reason: String },
    #[error("supplier `{supplier_id}` is unreachable: {reason}")]
    Unavailable { supplier_id: String, reason: String },
    #[error("supplier `{supplier_id}` does not know tracking number `{number}`")]
    UnknownShipment { supplier_id: String, number: String },
}

#[async_trait]
pub trait SupplierClient: Send + Sync {
    async fn submit(
        &self,
        allocation: &SupplierAllocation,
        items: &[OrderItem],
    ) -> Result<SupplierConfirmation, SupplierError>;

    async fn shipment_state(
        &self,
        tracking: &TrackingNumber,
        expected_delivery: NaiveDate,
        today: NaiveDate,
    ) -> Result<ShipmentState, SupplierError>;
}

/// Accepts every submission and issues a random `TRK` tracking number.
/// Shipments progress against the allocation's expected delivery date.
#[derive(Clone, Debug, Default)]
pub struct SimulatedSupplierClient {
    offline: BTreeSet<String>,
}

impl SimulatedSupplierClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every call for `supplier_id` fail as unreachable.
    pub fn with_offline_supplier(mut self, supplier_id: impl Into<String>) -> Self {
        self.offline.insert(supplier_id.into());
        self
    }

    fn ensure_online(&self, supplier_id: &str) -> Result<(), SupplierError> {
        if self.offline.contains(supplier_id) {
            return Err(SupplierError::Unavailable {
                supplier_id: supplier_id.to_string(),
                reason: "simulated outage".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl SupplierClient for SimulatedSupplierClient {
    async fn submit(
        &self,
        allocation: &SupplierAllocation,
        items: &[OrderItem],
    ) -> Result<SupplierConfirmation, SupplierError> {
        self.ensure_online(&allocation.supplier_id)?;
        if items.iter().any(|item| item.supplier_id != allocation.supplier_id) {
            return Err(SupplierError::Rejected {
                supplier_id: allocation.supplier_id.clone(),
                reason: "order contains items from another supplier".to_string(),
            });
        }

        Ok(SupplierConfirmation {
            tracking: TrackingNumber {
                supplier_id: allocation.supplier_id.clone(),
                number: generate_tracking_number(),
            },
            confirmed_at: Utc::now(),
        })
    }

    async fn shipment_state(
        &self,
        tracking: &TrackingNumber,
        expected_delivery: NaiveDate,
        today: NaiveDate,
    ) -> Result<ShipmentState, SupplierError> {
        self.ensure_online(&tracking.supplier_id)?;
        if !is_tracking_number(&tracking.number) {
            return Err(SupplierError::UnknownShipment {
                supplier_id: tracking.supplier_id.clone(),
                number: tracking.number.clone(),
            });
        }

        let days_out = (expected_delivery - today).num_days();
        Ok(match days_out {
            days if days <= 0 => ShipmentState::Delivered,
            1 => ShipmentState::InTransit,
            _ => ShipmentState::AwaitingPickup,
        })
    }
}

/// `TRK` followed by twelve digits.
pub fn generate_tracking_number() -> String {
    let mut rng = rand::thread_rng();
    let digits: u64 = rng.gen_range(0..1_000_000_000_000);
    format!("TRK{digits:012}")
}

pub fn is_tracking_number(value: &str) -> bool {
    value
        .strip_prefix("TRK")
        .map(|digits| digits.len() == 12 && digits.bytes().all(|byte| byte.is_ascii_digit()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    use super::{
        generate_tracking_number, is_tracking_number, ShipmentState, SimulatedSupplierClient,
        SupplierClient, SupplierError,
    };
    use crate::domain::order::{OrderItem, ShippingMethod, SupplierAllocation, TrackingNumber};

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, day).expect("date")
    }

    fn allocation(supplier_id: &str) -> SupplierAllocation {
        SupplierAllocation {
            supplier_id: supplier_id.to_string(),
            supplier_name: supplier_id.to_string(),
            shipping: ShippingMethod::Standard,
            materials_cost: Decimal::new(70_000, 2),
            expedite_fee: Decimal::ZERO,
            expected_delivery: date(5),
        }
    }

    fn item(supplier_id: &str) -> OrderItem {
        OrderItem {
            material: "asphalt_shingles".to_string(),
            quantity: 200,
            unit: "sq_ft".to_string(),
            unit_cost: Decimal::new(350, 2),
            cost: Decimal::new(70_000, 2),
            supplier_id: supplier_id.to_string(),
        }
    }

    #[test]
    fn tracking_numbers_are_trk_plus_twelve_digits() {
        for _ in 0..32 {
            let number = generate_tracking_number();
            assert_eq!(number.len(), 15);
            assert!(is_tracking_number(&number), "{number} is malformed");
        }
        assert!(!is_tracking_number("TRK12345"));
        assert!(!is_tracking_number("ABC123456789012"));
    }

    #[tokio::test]
    async fn simulated_supplier_confirms_with_tracking_number() {
        let client = SimulatedSupplierClient::new();
        let confirmation =
            client.submit(&allocation("abc_supply"), &[item("abc_supply")]).await.expect("submit");

        assert_eq!(confirmation.tracking.supplier_id, "abc_supply");
        assert!(is_tracking_number(&confirmation.tracking.number));
    }

    #[tokio::test]
    async fn offline_supplier_is_reported_unavailable() {
        let client = SimulatedSupplierClient::new().with_offline_supplier("srs");
        let error = client.submit(&allocation("srs"), &[item("srs")]).await.expect_err("offline");

        assert!(matches!(error, SupplierError::Unavailable { ref supplier_id, .. } if supplier_id == "srs"));
    }

    #[tokio::test]
    async fn mixed_supplier_items_are_rejected() {
        let client = SimulatedSupplierClient::new();
        let error =
            client.submit(&allocation("abc_supply"), &[item("beacon")]).await.expect_err("mixed");

        assert!(matches!(error, SupplierError::Rejected { .. }));
    }

    #[tokio::test]
    async fn shipment_state_follows_expected_delivery() {
        let client = SimulatedSupplierClient::new();
        let tracking = TrackingNumber {
            supplier_id: "beacon".to_string(),
            number: generate_tracking_number(),
        };

        let states = [
            client.shipment_state(&tracking, date(5), date(2)).await.expect("early"),
            client.shipment_state(&tracking, date(5), date(4)).await.expect("eve"),
            client.shipment_state(&tracking, date(5), date(5)).await.expect("due"),
        ];
        assert_eq!(
            states,
            [ShipmentState::AwaitingPickup, ShipmentState::InTransit, ShipmentState::Delivered]
        );
    }
}
