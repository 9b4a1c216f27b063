//! Material ordering: supplier grouping and delivery feasibility
//! ([`planner`]), and the supplier seam orders move through ([`supplier`]).
//!
//! An order's status only changes through supplier calls or an explicit
//! cancel. Every change is appended to the order's history.

pub mod planner;
pub mod supplier;

use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;

use crate::domain::order::{MaterialOrder, OrderStatus};
use crate::domain::quote::QuoteStatus;
use crate::errors::{ApplicationError, DomainError};
pub use planner::plan_order;
pub use supplier::{
    ShipmentState, SimulatedSupplierClient, SupplierClient, SupplierConfirmation, SupplierError,
};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum OrderingError {
    #[error("quote must be accepted before ordering materials (status: {status:?})")]
    QuoteNotAccepted { status: QuoteStatus },
    #[error("quote validity lapsed at {valid_until}")]
    QuoteExpired { valid_until: DateTime<Utc> },
    #[error("quote has no materials to order")]
    NothingToOrder,
    #[error(
        "suppliers {suppliers:?} cannot deliver by {required_by}; earliest possible date is {earliest_possible}"
    )]
    DeliveryInfeasible { required_by: NaiveDate, suppliers: Vec<String>, earliest_possible: NaiveDate },
    #[error("material references unknown supplier `{0}`")]
    UnknownSupplier(String),
    #[error(transparent)]
    Supplier(#[from] SupplierError),
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("ordering invariant violated: {0}")]
    Internal(String),
}

impl From<OrderingError> for ApplicationError {
    fn from(value: OrderingError) -> Self {
        match value {
            OrderingError::Domain(domain) => Self::Domain(domain),
            OrderingError::Supplier(error) => Self::Integration(error.to_string()),
            OrderingError::Internal(message) => {
                Self::Domain(DomainError::InvariantViolation(message))
            }
            other => Self::Domain(DomainError::InvariantViolation(other.to_string())),
        }
    }
}

/// Sends each supplier its share of a pending order and confirms the order
/// once every supplier has issued a tracking number. A failure leaves the
/// order pending with no tracking numbers recorded.
pub async fn submit_order(
    order: &mut MaterialOrder,
    client: &dyn SupplierClient,
    now: DateTime<Utc>,
) -> Result<(), OrderingError> {
    if order.status != OrderStatus::Pending {
        return Err(DomainError::InvalidOrderTransition {
            from: order.status,
            to: OrderStatus::Confirmed,
        }
        .into());
    }

    let mut tracking_numbers = Vec::with_capacity(order.suppliers.len());
    for allocation in &order.suppliers {
        let items = order
            .items
            .iter()
            .filter(|item| item.supplier_id == allocation.supplier_id)
            .cloned()
            .collect::<Vec<_>>();
        let confirmation = client.submit(allocation, &items).await?;
        tracking_numbers.push(confirmation.tracking);
    }

    let note = format!("confirmed by {} supplier(s)", tracking_numbers.len());
    order.transition_to(OrderStatus::Confirmed, note, now)?;
    order.tracking_numbers = tracking_numbers;
    Ok(())
}

/// Polls every shipment and advances the order to `shipped` once any
/// shipment is moving and to `delivered` once all have arrived. Returns
/// whether the status changed.
pub async fn refresh_shipments(
    order: &mut MaterialOrder,
    client: &dyn SupplierClient,
    today: NaiveDate,
    now: DateTime<Utc>,
) -> Result<bool, OrderingError> {
    if !matches!(order.status, OrderStatus::Confirmed | OrderStatus::Shipped) {
        return Ok(false);
    }

    let mut states = Vec::with_capacity(order.tracking_numbers.len());
    for tracking in &order.tracking_numbers {
        let expected_delivery = order
            .suppliers
            .iter()
            .find(|allocation| allocation.supplier_id == tracking.supplier_id)
            .map(|allocation| allocation.expected_delivery)
            .unwrap_or(order.delivery_date);
        states.push(client.shipment_state(tracking, expected_delivery, today).await?);
    }
    if states.is_empty() {
        return Ok(false);
    }

    let all_delivered = states.iter().all(|state| *state == ShipmentState::Delivered);
    let any_moving = states.iter().any(|state| *state != ShipmentState::AwaitingPickup);
    let before = order.status;

    if any_moving && order.status == OrderStatus::Confirmed {
        order.transition_to(OrderStatus::Shipped, "supplier reported shipment in transit", now)?;
    }
    if all_delivered {
        order.transition_to(OrderStatus::Delivered, "all shipments delivered", now)?;
    }

    Ok(order.status != before)
}

pub fn cancel_order(
    order: &mut MaterialOrder,
    reason: &str,
    now: DateTime<Utc>,
) -> Result<(), OrderingError> {
    let reason = reason.trim();
    let note = if reason.is_empty() { "cancelled".to_string() } else { reason.to_string() };
    order.transition_to(OrderStatus::Cancelled, note, now)?;
    Ok(())
}
