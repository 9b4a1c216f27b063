use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::domain::quote::{LaborLine, MaterialLine};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingTraceStep {
    pub stage: String,
    pub detail: String,
    pub amount: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingTrace {
    pub currency: String,
    pub steps: Vec<PricingTraceStep>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingResult {
    pub materials_total: Decimal,
    pub labor_total: Decimal,
    pub emergency_premium: Decimal,
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
    pub trace: PricingTrace,
}

pub trait PricingEngine: Send + Sync {
    fn price(
        &self,
        materials: &[MaterialLine],
        labor: &[LaborLine],
        tax_rate: Decimal,
        currency: &str,
    ) -> PricingResult;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct DeterministicPricingEngine;

impl PricingEngine for DeterministicPricingEngine {
    fn price(
        &self,
        materials: &[MaterialLine],
        labor: &[LaborLine],
        tax_rate: Decimal,
        currency: &str,
    ) -> PricingResult {
        price_with_trace(materials, labor, tax_rate, currency)
    }
}

/// Cents, half away from zero.
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

pub fn price_with_trace(
    materials: &[MaterialLine],
    labor: &[LaborLine],
    tax_rate: Decimal,
    currency: &str,
) -> PricingResult {
    let materials_total: Decimal = materials.iter().map(|line| line.cost).sum();
    let labor_total: Decimal = labor.iter().map(|line| line.cost).sum();
    let emergency_premium: Decimal = labor
        .iter()
        .filter(|line| line.emergency_adjusted)
        .map(|line| line.cost - round_money(line.hours * line.skill_level.base_rate()))
        .sum();
    let subtotal = materials_total + labor_total;
    let tax = round_money(subtotal * tax_rate);
    let total = subtotal + tax;

    let mut steps = vec![
        PricingTraceStep {
            stage: "materials".to_string(),
            detail: format!("sum(quantity * unit_cost) over {} lines", materials.len()),
            amount: materials_total,
        },
        PricingTraceStep {
            stage: "labor".to_string(),
            detail: format!("sum(hours * rate) over {} lines", labor.len()),
            amount: labor_total,
        },
    ];
    if !emergency_premium.is_zero() {
        steps.push(PricingTraceStep {
            stage: "emergency_premium".to_string(),
            detail: "included in labor: non-basic rates raised for emergency response".to_string(),
            amount: emergency_premium,
        });
    }
    steps.push(PricingTraceStep {
        stage: "subtotal".to_string(),
        detail: "materials + labor".to_string(),
        amount: subtotal,
    });
    steps.push(PricingTraceStep {
        stage: "tax".to_string(),
        detail: format!("subtotal * {}", tax_rate.normalize()),
        amount: tax,
    });
    steps.push(PricingTraceStep {
        stage: "total".to_string(),
        detail: "subtotal + tax".to_string(),
        amount: total,
    });

    PricingResult {
        materials_total,
        labor_total,
        emergency_premium,
        subtotal,
        tax,
        total,
        trace: PricingTrace { currency: currency.to_string(), steps },
    }
}
