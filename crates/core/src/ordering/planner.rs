use std::collections::BTreeMap;

use chrono::{DateTime, Days, NaiveDate, Utc};
use rust_decimal::Decimal;

use crate::domain::order::{
    MaterialOrder, MaterialOrderId, OrderCosts, OrderItem, OrderStatus, ShippingMethod,
    StatusChange, SupplierAllocation,
};
use crate::domain::quote::{MaterialLine, Quote, QuoteStatus};
use crate::estimating::catalog::{find_supplier, SupplierSpec};
use crate::ordering::OrderingError;

/// Builds a pending order for an accepted, unexpired quote, shipping each
/// supplier group standard when the required date allows it and expedited
/// otherwise.
pub fn plan_order(
    quote: &Quote,
    required_by: NaiveDate,
    now: DateTime<Utc>,
) -> Result<MaterialOrder, OrderingError> {
    if quote.status != QuoteStatus::Accepted {
        return Err(OrderingError::QuoteNotAccepted { status: quote.status });
    }
    if quote.is_expired_at(now) {
        return Err(OrderingError::QuoteExpired { valid_until: quote.valid_until });
    }
    if quote.materials.is_empty() {
        return Err(OrderingError::NothingToOrder);
    }

    let order_date = now.date_naive();
    let groups = group_by_supplier(&quote.materials)?;

    let mut suppliers = Vec::with_capacity(groups.len());
    let mut late = Vec::new();
    let mut earliest_possible = order_date;

    for (supplier, lines) in groups.values() {
        let standard = add_days(order_date, supplier.standard_lead_days)?;
        let expedited = add_days(order_date, supplier.expedited_lead_days)?;
        earliest_possible = earliest_possible.max(expedited);

        let materials_cost: Decimal = lines.iter().map(|line| line.cost).sum();
        let (shipping, expected_delivery, expedite_fee) = if standard <= required_by {
            (ShippingMethod::Standard, standard, Decimal::ZERO)
        } else if expedited <= required_by {
            (ShippingMethod::Expedited, expedited, supplier.expedite_fee())
        } else {
            late.push(supplier.id.to_string());
            continue;
        };

        suppliers.push(SupplierAllocation {
            supplier_id: supplier.id.to_string(),
            supplier_name: supplier.name.to_string(),
            shipping,
            materials_cost,
            expedite_fee,
            expected_delivery,
        });
    }

    if !late.is_empty() {
        return Err(OrderingError::DeliveryInfeasible {
            required_by,
            suppliers: late,
            earliest_possible,
        });
    }

    let items = groups
        .values()
        .flat_map(|(_, lines)| lines.iter())
        .map(|line| OrderItem {
            material: line.material.clone(),
            quantity: line.quantity,
            unit: line.unit.clone(),
            unit_cost: line.unit_cost,
            cost: line.cost,
            supplier_id: line.supplier_id.clone(),
        })
        .collect::<Vec<_>>();

    let materials: Decimal = suppliers.iter().map(|allocation| allocation.materials_cost).sum();
    let expedite_fees: Decimal = suppliers.iter().map(|allocation| allocation.expedite_fee).sum();
    let delivery_date = suppliers
        .iter()
        .map(|allocation| allocation.expected_delivery)
        .max()
        .unwrap_or(order_date);

    Ok(MaterialOrder {
        id: MaterialOrderId::generate(),
        quote_id: quote.id.clone(),
        items,
        suppliers,
        costs: OrderCosts { materials, expedite_fees, total: materials + expedite_fees },
        required_by,
        delivery_date,
        status: OrderStatus::Pending,
        tracking_numbers: Vec::new(),
        history: vec![StatusChange {
            status: OrderStatus::Pending,
            note: format!("planned against quote {}", quote.id.0),
            changed_at: now,
        }],
        created_at: now,
    })
}

/// Keyed by supplier id so allocation order is stable.
fn group_by_supplier(
    materials: &[MaterialLine],
) -> Result<BTreeMap<&'static str, (&'static SupplierSpec, Vec<&MaterialLine>)>, OrderingError> {
    let mut groups: BTreeMap<&'static str, (&'static SupplierSpec, Vec<&MaterialLine>)> =
        BTreeMap::new();
    for line in materials {
        let supplier = find_supplier(&line.supplier_id)
            .ok_or_else(|| OrderingError::UnknownSupplier(line.supplier_id.clone()))?;
        groups.entry(supplier.id).or_insert_with(|| (supplier, Vec::new())).1.push(line);
    }
    Ok(groups)
}

fn add_days(date: NaiveDate, days: u32) -> Result<NaiveDate, OrderingError> {
    date.checked_add_days(Days::new(u64::from(days)))
        .ok_or_else(|| OrderingError::Internal(format!("lead time of {days} days overflows")))
}
