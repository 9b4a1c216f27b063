//! Quote drafting: damage assessment in, priced quote out.
//!
//! Everything here is table lookups and fixed-point arithmetic; the same
//! assessment, policy and clock always produce the same quote content.

pub mod catalog;
pub mod pricing;

use chrono::{DateTime, Days, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::config::PricingConfig;
use crate::domain::assessment::{DamageAssessment, Urgency};
use crate::domain::quote::{
    CustomerInfo, LaborLine, MaterialLine, Quote, QuoteId, QuoteStatus, SkillLevel, Timeline,
};
use crate::errors::DomainError;

use self::catalog::{find_material, labor_requirements, material_requirements};
use self::pricing::{round_money, DeterministicPricingEngine, PricingEngine};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EstimatingPolicy {
    pub tax_rate: Decimal,
    pub emergency_multiplier: Decimal,
    pub deposit_pct: Decimal,
    pub quote_validity_days: u32,
    pub warranty_years: u32,
    pub crew_hours_per_day: u32,
    pub currency: String,
}

impl Default for EstimatingPolicy {
    fn default() -> Self {
        Self {
            tax_rate: Decimal::new(8, 2),
            emergency_multiplier: Decimal::new(15, 1),
            deposit_pct: Decimal::new(50, 2),
            quote_validity_days: 30,
            warranty_years: 5,
            crew_hours_per_day: 16,
            currency: "USD".to_string(),
        }
    }
}

impl From<&PricingConfig> for EstimatingPolicy {
    fn from(config: &PricingConfig) -> Self {
        Self {
            tax_rate: config.tax_rate,
            emergency_multiplier: config.emergency_multiplier,
            deposit_pct: config.deposit_pct,
            quote_validity_days: config.quote_validity_days,
            warranty_years: config.warranty_years,
            crew_hours_per_day: config.crew_hours_per_day,
            currency: config.currency.clone(),
        }
    }
}

pub trait Estimator: Send + Sync {
    fn draft_quote(
        &self,
        customer: CustomerInfo,
        assessment: DamageAssessment,
        now: DateTime<Utc>,
    ) -> Result<Quote, DomainError>;
}

pub struct DeterministicEstimator<P = DeterministicPricingEngine> {
    policy: EstimatingPolicy,
    pricing_engine: P,
}

impl DeterministicEstimator<DeterministicPricingEngine> {
    pub fn new(policy: EstimatingPolicy) -> Self {
        Self { policy, pricing_engine: DeterministicPricingEngine }
    }
}

impl<P> DeterministicEstimator<P> {
    pub fn with_pricing_engine(policy: EstimatingPolicy, pricing_engine: P) -> Self {
        Self { policy, pricing_engine }
    }

    pub fn policy(&self) -> &EstimatingPolicy {
        &self.policy
    }
}

impl<P> Estimator for DeterministicEstimator<P>
where
    P: PricingEngine,
{
    fn draft_quote(
        &self,
        customer: CustomerInfo,
        assessment: DamageAssessment,
        now: DateTime<Utc>,
    ) -> Result<Quote, DomainError> {
        assessment.validate()?;
        if customer.name.trim().is_empty() {
            return Err(DomainError::InvariantViolation("customer name is required".into()));
        }

        let materials = estimate_materials(&assessment)?;
        let labor = estimate_labor(&assessment, self.policy.emergency_multiplier);
        let pricing = self.pricing_engine.price(
            &materials,
            &labor,
            self.policy.tax_rate,
            &self.policy.currency,
        );
        let timeline = build_timeline(&assessment, &labor, self.policy.crew_hours_per_day, now)?;
        let valid_until = now
            .checked_add_days(Days::new(u64::from(self.policy.quote_validity_days)))
            .ok_or_else(|| DomainError::InvariantViolation("validity date overflow".into()))?;

        Ok(Quote {
            id: QuoteId::generate(),
            status: QuoteStatus::Issued,
            customer,
            assessment,
            materials,
            labor,
            materials_total: pricing.materials_total,
            labor_total: pricing.labor_total,
            subtotal: pricing.subtotal,
            tax_rate: self.policy.tax_rate,
            tax: pricing.tax,
            total: pricing.total,
            currency: self.policy.currency.clone(),
            timeline,
            terms: standard_terms(&self.policy, valid_until),
            trace: pricing.trace,
            created_at: now,
            valid_until,
        })
    }
}

pub fn estimate_materials(assessment: &DamageAssessment) -> Result<Vec<MaterialLine>, DomainError> {
    let multiplier = assessment.severity.multiplier();

    material_requirements(assessment.damage_type)
        .iter()
        .map(|requirement| {
            let spec = find_material(requirement.material).ok_or_else(|| {
                DomainError::InvariantViolation(format!(
                    "material `{}` missing from catalog",
                    requirement.material
                ))
            })?;
            let quantity = (requirement.basis.base_quantity(assessment.area) * multiplier)
                .ceil()
                .to_u32()
                .ok_or_else(|| {
                    DomainError::InvariantViolation(format!(
                        "quantity for `{}` out of range",
                        spec.code
                    ))
                })?;
            let unit_cost = spec.unit_cost();

            Ok(MaterialLine {
                material: spec.code.to_string(),
                description: spec.description.to_string(),
                unit: spec.unit.to_string(),
                quantity,
                unit_cost,
                cost: round_money(Decimal::from(quantity) * unit_cost),
                supplier_id: spec.supplier_id.to_string(),
            })
        })
        .collect()
}

/// Per-area hours scale with severity; fixed hours (inspection, setup) do not.
/// Under emergency urgency every non-basic line is billed at
/// `emergency_multiplier` times its base rate.
pub fn estimate_labor(assessment: &DamageAssessment, emergency_multiplier: Decimal) -> Vec<LaborLine> {
    let area_hundreds = Decimal::from(assessment.area) / Decimal::ONE_HUNDRED;
    let severity = assessment.severity.multiplier();
    let emergency = assessment.urgency == Urgency::Emergency;

    labor_requirements(assessment.damage_type)
        .iter()
        .map(|spec| {
            let hours = round_money(
                spec.fixed_hours() + area_hundreds * spec.hours_per_100_sq_ft() * severity,
            );
            let adjusted = emergency && spec.skill_level != SkillLevel::Basic;
            let rate = if adjusted {
                round_money(spec.skill_level.base_rate() * emergency_multiplier)
            } else {
                spec.skill_level.base_rate()
            };

            LaborLine {
                task: spec.task.to_string(),
                skill_level: spec.skill_level,
                hours,
                rate,
                cost: round_money(hours * rate),
                emergency_adjusted: adjusted,
            }
        })
        .collect()
}

pub fn build_timeline(
    assessment: &DamageAssessment,
    labor: &[LaborLine],
    crew_hours_per_day: u32,
    now: DateTime<Utc>,
) -> Result<Timeline, DomainError> {
    if crew_hours_per_day == 0 {
        return Err(DomainError::InvariantViolation("crew_hours_per_day must be positive".into()));
    }

    let total_hours: Decimal = labor.iter().map(|line| line.hours).sum();
    let work_days = (total_hours / Decimal::from(crew_hours_per_day))
        .ceil()
        .to_u32()
        .unwrap_or(u32::MAX)
        .max(1);
    let start_within_days = assessment.urgency.start_within_days();

    let estimated_start = now
        .date_naive()
        .checked_add_days(Days::new(u64::from(start_within_days)))
        .ok_or_else(|| DomainError::InvariantViolation("start date overflow".into()))?;
    let estimated_completion = estimated_start
        .checked_add_days(Days::new(u64::from(work_days - 1)))
        .ok_or_else(|| DomainError::InvariantViolation("completion date overflow".into()))?;

    Ok(Timeline { start_within_days, work_days, estimated_start, estimated_completion })
}

pub fn standard_terms(policy: &EstimatingPolicy, valid_until: DateTime<Utc>) -> Vec<String> {
    let deposit = (policy.deposit_pct * Decimal::ONE_HUNDRED).normalize();
    vec![
        format!("{deposit}% deposit due at signing; balance due on completion."),
        format!("Pricing valid until {}.", valid_until.format("%Y-%m-%d")),
        format!("{} year workmanship warranty on all repairs.", policy.warranty_years),
        "Hidden deck damage found during tear-off is quoted separately before work continues."
            .to_string(),
    ]
}
